//! End-to-end scenarios exercising the full solve pipeline.

use std::collections::BTreeSet;

use kabocha::constraints;
use kabocha::Model;
use kabocha::Solver;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn binary_inequality_has_a_unique_solution() {
    init_logging();
    // x in [1, 3], y in [1, 3], x < y, y < 3.
    let build = || {
        let mut model = Model::new();
        let x = model.create_variable("x", 1, 3).unwrap();
        let y = model.create_variable("y", 1, 3).unwrap();
        let three = model.create_constant("three", 3).unwrap();
        model.add_constraint(constraints::int_lt(x, y)).unwrap();
        model.add_constraint(constraints::int_lt(y, three)).unwrap();
        model
    };

    let mut model = build();
    let mut solver = Solver::default();
    let solution = solver.solve(&mut model).expect("satisfiable");
    assert_eq!(solution.value("x"), Some(1));
    assert_eq!(solution.value("y"), Some(2));

    let mut model = build();
    let mut solver = Solver::default();
    let mut solutions = Vec::new();
    let count = solver.solve_all(&mut model, |solution| {
        solutions.push((solution.value("x").unwrap(), solution.value("y").unwrap()));
        true
    });
    assert_eq!(count, 1);
    assert_eq!(solutions, vec![(1, 2)]);
}

#[test]
fn all_different_triangle_enumerates_every_permutation() {
    let mut model = Model::new();
    let a = model.create_variable("a", 1, 3).unwrap();
    let b = model.create_variable("b", 1, 3).unwrap();
    let c = model.create_variable("c", 1, 3).unwrap();
    model
        .add_constraint(constraints::all_different(vec![a, b, c]))
        .unwrap();

    let mut solver = Solver::default();
    let mut seen = BTreeSet::new();
    let count = solver.solve_all(&mut model, |solution| {
        let triple = (
            solution.value("a").unwrap(),
            solution.value("b").unwrap(),
            solution.value("c").unwrap(),
        );
        assert!(seen.insert(triple), "solution {triple:?} reported twice");
        true
    });

    assert_eq!(count, 6);
    assert_eq!(seen.len(), 6);
    for (a, b, c) in seen {
        let mut values = [a, b, c];
        values.sort_unstable();
        assert_eq!(values, [1, 2, 3]);
    }
}

#[test]
fn linear_equation_with_ordering_is_satisfiable() {
    let mut model = Model::new();
    let x = model.create_variable("x", 0, 9).unwrap();
    let y = model.create_variable("y", 0, 9).unwrap();
    let z = model.create_variable("z", 0, 9).unwrap();
    model
        .add_constraint(constraints::int_lin_eq(vec![1, 1, 1], vec![x, y, z], 5))
        .unwrap();
    model.add_constraint(constraints::int_le(y, x)).unwrap();

    let mut solver = Solver::default();
    let solution = solver.solve(&mut model).expect("satisfiable");
    let (x, y, z) = (
        solution.value("x").unwrap(),
        solution.value("y").unwrap(),
        solution.value("z").unwrap(),
    );
    assert_eq!(x + y + z, 5);
    assert!(x >= y);
}

#[test]
fn linear_equation_pins_the_rest_when_x_is_zero() {
    let mut model = Model::new();
    let x = model.create_variable("x", 0, 9).unwrap();
    let y = model.create_variable("y", 0, 9).unwrap();
    let z = model.create_variable("z", 0, 9).unwrap();
    let zero = model.create_constant("zero", 0).unwrap();
    model
        .add_constraint(constraints::int_lin_eq(vec![1, 1, 1], vec![x, y, z], 5))
        .unwrap();
    model.add_constraint(constraints::int_le(y, x)).unwrap();
    model.add_constraint(constraints::int_eq(x, zero)).unwrap();

    let mut solver = Solver::default();
    let solution = solver.solve(&mut model).expect("satisfiable");
    assert_eq!(solution.value("x"), Some(0));
    assert_eq!(solution.value("y"), Some(0));
    assert_eq!(solution.value("z"), Some(5));
}

#[test]
fn circuit_enumerates_the_hamiltonian_tours_of_k4() {
    let mut model = Model::new();
    let successors: Vec<_> = (0..4)
        .map(|node| model.create_variable(format!("x{node}"), 0, 3).unwrap())
        .collect();
    model
        .add_constraint(constraints::circuit(successors))
        .unwrap();

    let mut solver = Solver::default();
    let mut tours = BTreeSet::new();
    let count = solver.solve_all(&mut model, |solution| {
        let tour: Vec<i64> = (0..4)
            .map(|node| solution.value(&format!("x{node}")).unwrap())
            .collect();
        assert!(tours.insert(tour));
        true
    });

    // Fixing the start node, K4 has (4 - 1)! directed Hamiltonian tours.
    assert_eq!(count, 6);

    for tour in tours {
        let mut node = 0usize;
        let mut visited = BTreeSet::new();
        for _ in 0..4 {
            assert!(visited.insert(node));
            node = tour[node] as usize;
        }
        assert_eq!(node, 0, "tour {tour:?} does not return to the start");
    }
}

#[test]
fn optimisation_reaches_the_bound_with_monotone_incumbents() {
    init_logging();
    let mut model = Model::new();
    let x = model.create_variable("x", 1, 10).unwrap();
    let y = model.create_variable("y", 1, 10).unwrap();
    let total = model.create_variable("total", 2, 20).unwrap();
    model
        .add_constraint(constraints::int_lin_le(vec![1, 1], vec![x, y], 7))
        .unwrap();
    model
        .add_constraint(constraints::int_lin_eq(vec![1, 1, -1], vec![x, y, total], 0))
        .unwrap();

    let mut solver = Solver::default();
    let mut incumbents = Vec::new();
    let best = solver
        .solve_optimize(&mut model, total, false, |solution| {
            incumbents.push(solution.value("total").unwrap());
            true
        })
        .expect("satisfiable");

    assert_eq!(best.value("total"), Some(7));
    assert_eq!(
        best.value("x").unwrap() + best.value("y").unwrap(),
        7,
        "the witness must attain the bound"
    );
    assert!(!incumbents.is_empty());
    assert!(
        incumbents.windows(2).all(|pair| pair[0] < pair[1]),
        "incumbents must improve strictly: {incumbents:?}"
    );
    assert_eq!(*incumbents.last().unwrap(), 7);
}

#[test]
fn element_links_index_and_result() {
    // arr = [10, 20, 30, 40], 1-based index.
    let build = || {
        let mut model = Model::new();
        let index = model.create_variable("index", 1, 4).unwrap();
        let result = model.create_variable("result", 0, 100).unwrap();
        model
            .add_constraint(constraints::int_element(index, vec![10, 20, 30, 40], result))
            .unwrap();
        (model, index, result)
    };

    // Forcing result = 30 instantiates index = 3.
    let (mut model, _, result) = build();
    let thirty = model.create_constant("thirty", 30).unwrap();
    model
        .add_constraint(constraints::int_eq(result, thirty))
        .unwrap();
    let mut solver = Solver::default();
    let solution = solver.solve(&mut model).expect("satisfiable");
    assert_eq!(solution.value("index"), Some(3));

    // Restricting index to {2, 4} restricts result to {20, 40}.
    let (mut model, index, _) = build();
    let picked = model.create_variable_from_values("picked", &[2, 4]).unwrap();
    model.add_constraint(constraints::int_eq(index, picked)).unwrap();
    let mut solver = Solver::default();
    let mut results = BTreeSet::new();
    let _ = solver.solve_all(&mut model, |solution| {
        let _ = results.insert(solution.value("result").unwrap());
        true
    });
    assert_eq!(results.into_iter().collect::<Vec<_>>(), vec![20, 40]);
}

#[test]
fn unsatisfiable_models_report_unsat() {
    let mut model = Model::new();
    let a = model.create_variable("a", 1, 2).unwrap();
    let b = model.create_variable("b", 1, 2).unwrap();
    let c = model.create_variable("c", 1, 2).unwrap();
    model
        .add_constraint(constraints::all_different(vec![a, b, c]))
        .unwrap();

    let mut solver = Solver::default();
    assert_eq!(solver.solve(&mut model), None);
    assert!(!solver.is_stopped());

    let mut model = Model::new();
    let x = model.create_variable("x", 0, 5).unwrap();
    let y = model.create_variable("y", 0, 5).unwrap();
    model.add_constraint(constraints::int_lt(x, y)).unwrap();
    model.add_constraint(constraints::int_lt(y, x)).unwrap();
    let mut solver = Solver::default();
    assert_eq!(solver.solve_all(&mut model, |_| true), 0);
}

#[test]
fn identical_seeds_solve_identically() {
    let build = || {
        let mut model = Model::new();
        let vars: Vec<_> = (0..5)
            .map(|i| model.create_variable(format!("v{i}"), 1, 5).unwrap())
            .collect();
        model
            .add_constraint(constraints::all_different(vars.clone()))
            .unwrap();
        model
            .add_constraint(constraints::int_lin_le(vec![1, 1], vec![vars[0], vars[1]], 5))
            .unwrap();
        model
    };

    let mut first_model = build();
    let mut second_model = build();
    let mut first_solver = Solver::with_seed(99);
    let mut second_solver = Solver::with_seed(99);

    let first = first_solver.solve(&mut first_model).expect("satisfiable");
    let second = second_solver.solve(&mut second_model).expect("satisfiable");

    assert_eq!(first, second);
    assert_eq!(first_solver.stats(), second_solver.stats());
}

#[test]
fn cancellation_before_solving_returns_unknown() {
    let mut model = Model::new();
    let x = model.create_variable("x", 1, 3).unwrap();
    let y = model.create_variable("y", 1, 3).unwrap();
    model.add_constraint(constraints::int_ne(x, y)).unwrap();

    let mut solver = Solver::default();
    solver.stop();
    assert_eq!(solver.solve(&mut model), None);
    assert!(solver.is_stopped());

    // After resetting the flag the same solver finds a solution.
    solver.reset_stop();
    let solution = solver.solve(&mut model);
    assert!(solution.is_some());
}

#[test]
fn hinted_solution_is_returned_first() {
    let build = || {
        let mut model = Model::new();
        let vars: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|name| model.create_variable(*name, 1, 3).unwrap())
            .collect();
        model
            .add_constraint(constraints::all_different(vars))
            .unwrap();
        model
    };

    let mut model = build();
    let hint: kabocha::Solution = [("a", 3), ("b", 1), ("c", 2)]
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value))
        .collect();

    let mut solver = Solver::default();
    solver.set_hint_solution(&hint, &model);
    let solution = solver.solve(&mut model).expect("satisfiable");
    assert_eq!(solution, hint);
}

#[test]
fn nogoods_and_activities_carry_over_between_solvers() {
    let build = || {
        let mut model = Model::new();
        let vars: Vec<_> = (0..4)
            .map(|i| model.create_variable(format!("q{i}"), 1, 4).unwrap())
            .collect();
        model
            .add_constraint(constraints::all_different(vars.clone()))
            .unwrap();
        model
            .add_constraint(constraints::int_lin_eq(
                vec![1, 1, 1, 1],
                vars,
                10,
            ))
            .unwrap();
        model
    };

    // Enumerate three solutions; the first two get blocked by permanent NoGoods (the last report
    // stops the search before its blocker is added).
    let mut model = build();
    let mut solver = Solver::default();
    let mut count = 0;
    let _ = solver.solve_all(&mut model, |_| {
        count += 1;
        count < 3
    });
    assert_eq!(count, 3);

    let exported = solver.get_nogoods(&model, 0);
    assert!(!exported.is_empty());
    let activities = solver.get_activity_map(&model);

    let mut fresh_model = build();
    let mut fresh_solver = Solver::default();
    let imported = fresh_solver.add_nogoods(&exported, &fresh_model);
    assert_eq!(imported, exported.len());
    fresh_solver.set_activity(&activities, &fresh_model);

    // The two blocked assignments stay blocked in the fresh solver.
    let enumerated = fresh_solver.solve_all(&mut fresh_model, |_| true);
    let all_solutions_count = {
        let mut reference_model = build();
        let mut reference_solver = Solver::default();
        reference_solver.solve_all(&mut reference_model, |_| true)
    };
    assert_eq!(enumerated, all_solutions_count - 2);
}

#[test]
fn statistics_are_populated_and_bisection_counters_stay_zero() {
    let mut model = Model::new();
    let vars: Vec<_> = (0..6)
        .map(|i| model.create_variable(format!("n{i}"), 1, 6).unwrap())
        .collect();
    model
        .add_constraint(constraints::all_different(vars))
        .unwrap();

    let mut solver = Solver::default();
    solver.set_bisection_threshold(32);
    let solution = solver.solve(&mut model);
    assert!(solution.is_some());

    let stats = solver.stats();
    assert!(stats.depth_count > 0);
    assert!(stats.avg_depth() > 0.0);
    assert!(stats.max_depth >= 1);
    assert_eq!(stats.bisect_count, 0);
    assert_eq!(stats.enumerate_count, 0);
}

#[test]
fn defined_variables_are_deprioritised_but_still_solved() {
    let mut model = Model::new();
    let x = model.create_variable("x", 1, 5).unwrap();
    let y = model.create_variable("y", 1, 5).unwrap();
    let sum = model.create_variable("sum", 2, 10).unwrap();
    model.set_defined_var(sum).unwrap();
    model
        .add_constraint(constraints::int_lin_eq(vec![1, 1, -1], vec![x, y, sum], 0))
        .unwrap();
    model.add_constraint(constraints::int_ne(x, y)).unwrap();

    let mut solver = Solver::default();
    let solution = solver.solve(&mut model).expect("satisfiable");
    assert_eq!(
        solution.value("sum").unwrap(),
        solution.value("x").unwrap() + solution.value("y").unwrap()
    );
}

#[test]
fn aliases_appear_in_solutions() {
    let mut model = Model::new();
    let x = model.create_variable("x", 4, 4).unwrap();
    model.add_variable_alias("answer", x).unwrap();

    let mut solver = Solver::default();
    let solution = solver.solve(&mut model).expect("satisfiable");
    assert_eq!(solution.value("x"), Some(4));
    assert_eq!(solution.value("answer"), Some(4));
}

#[test]
fn reified_and_boolean_constraints_cooperate() {
    // b1 <-> (x <= y), b2 <-> (x == y), and the clause b1 \/ b2 must hold.
    let mut model = Model::new();
    let x = model.create_variable("x", 1, 3).unwrap();
    let y = model.create_variable("y", 1, 3).unwrap();
    let b1 = model.create_variable("b1", 0, 1).unwrap();
    let b2 = model.create_variable("b2", 0, 1).unwrap();
    model
        .add_constraint(constraints::int_le_reif(x, y, b1))
        .unwrap();
    model
        .add_constraint(constraints::int_eq_reif(x, y, b2))
        .unwrap();
    model
        .add_constraint(constraints::bool_clause(vec![b1, b2], vec![]))
        .unwrap();

    let mut solver = Solver::default();
    let count = solver.solve_all(&mut model, |solution| {
        let (x, y) = (solution.value("x").unwrap(), solution.value("y").unwrap());
        assert!(x <= y || x == y);
        true
    });

    // Exactly the pairs with x <= y remain: 6 of the 9 combinations.
    assert_eq!(count, 6);
}
