use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::basic_types::HashMap;
use crate::basic_types::Solution;
use crate::basic_types::StorageKey;
use crate::engine::nogoods::NamedNoGood;
use crate::engine::search::SearchEngine;
use crate::engine::search::DEFAULT_SEED;
use crate::engine::variables::VariableId;
use crate::model::Model;
use crate::statistics::log_statistic_postfix;
use crate::statistics::SolverStats;

/// The solver: depth-first search with propagation to fixpoint, activity-weighted variable
/// selection, NoGood learning, Luby-like restarts, and branch-and-bound optimisation.
///
/// A solver owns its search state (activities, learned NoGoods, statistics) across calls, so
/// NoGoods learned or imported earlier keep pruning later calls against the same model. The
/// model passed to a solve call is borrowed exclusively for the duration of that call.
///
/// # Example
/// ```rust
/// use kabocha::constraints;
/// use kabocha::Model;
/// use kabocha::Solver;
///
/// let mut model = Model::new();
/// let x = model.create_variable("x", 1, 3).unwrap();
/// let y = model.create_variable("y", 1, 3).unwrap();
/// let three = model.create_constant("three", 3).unwrap();
/// model.add_constraint(constraints::int_lt(x, y)).unwrap();
/// model.add_constraint(constraints::int_lt(y, three)).unwrap();
///
/// let mut solver = Solver::default();
/// let solution = solver.solve(&mut model).expect("satisfiable");
/// assert_eq!(solution.value("x"), Some(1));
/// assert_eq!(solution.value("y"), Some(2));
/// ```
#[derive(Debug)]
pub struct Solver {
    engine: SearchEngine,
}

impl Default for Solver {
    fn default() -> Self {
        Solver::with_seed(DEFAULT_SEED)
    }
}

impl Solver {
    pub fn new() -> Self {
        Solver::default()
    }

    /// Creates a solver whose tie-breaking shuffles derive from `seed`. Two solvers with the
    /// same seed explore identically.
    pub fn with_seed(seed: u64) -> Self {
        Solver {
            engine: SearchEngine::with_seed(seed),
        }
    }

    /// Searches for one solution. `None` means the model is unsatisfiable, or that the search
    /// was cancelled (check [`Solver::is_stopped`]).
    pub fn solve(&mut self, model: &mut Model) -> Option<Solution> {
        self.engine.solve(model)
    }

    /// Enumerates solutions, invoking `callback` for each; the callback returns `true` to keep
    /// enumerating. Returns the number of solutions reported. Every reported solution is blocked
    /// for the rest of this solver's lifetime.
    pub fn solve_all(
        &mut self,
        model: &mut Model,
        mut callback: impl FnMut(&Solution) -> bool,
    ) -> usize {
        self.engine.solve_all(model, &mut callback)
    }

    /// Optimises `objective` by branch and bound. `on_improve` sees every strictly improving
    /// solution and returns `true` to continue; the result is the optimum if the search
    /// completed, the best incumbent if it was cancelled, or `None` if no solution exists.
    pub fn solve_optimize(
        &mut self,
        model: &mut Model,
        objective: VariableId,
        minimize: bool,
        mut on_improve: impl FnMut(&Solution) -> bool,
    ) -> Option<Solution> {
        self.engine
            .solve_optimize(model, objective, minimize, &mut on_improve)
    }

    // ===== Cancellation =====

    /// Requests cancellation; the search unwinds at the next safe point and returns its best
    /// answer so far. Callable from another thread through [`Solver::stop_flag`].
    pub fn stop(&self) {
        self.engine.stop();
    }

    pub fn reset_stop(&self) {
        self.engine.reset_stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.engine.is_stopped()
    }

    /// The shared cancellation flag, for wiring up external timeouts.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.engine.stop_flag()
    }

    // ===== Configuration =====

    /// Elevates restart and incumbent reporting to info-level logging.
    pub fn set_verbose(&mut self, enabled: bool) {
        self.engine.verbose = enabled;
    }

    /// Enables or disables learning new NoGoods from failed subtrees.
    pub fn set_nogood_learning(&mut self, enabled: bool) {
        self.engine.nogood_learning = enabled;
    }

    /// Enables or disables the restart loop; without restarts a single unbounded search runs.
    pub fn set_restart_enabled(&mut self, enabled: bool) {
        self.engine.restart_enabled = enabled;
    }

    /// Enables or disables the activity scores during variable selection.
    pub fn set_activity_selection(&mut self, enabled: bool) {
        self.engine.activity_selection = enabled;
    }

    /// Orders variable selection by `(activity, domain size)` instead of
    /// `(domain size, activity)`. The restart loop alternates this on its own.
    pub fn set_activity_first(&mut self, enabled: bool) {
        self.engine.activity_first = enabled;
    }

    /// Reserved for a bisection branching strategy; the value is stored and the related
    /// statistics stay zero until such a strategy exists.
    pub fn set_bisection_threshold(&mut self, threshold: usize) {
        self.engine.bisection_threshold = threshold;
    }

    // ===== Warm starts =====

    /// Seeds value ordering with a (partial) assignment; hinted values are tried first.
    pub fn set_hint_solution(&mut self, hint: &Solution, model: &Model) {
        self.engine.hint = resolve_names(hint.iter(), model);
    }

    /// Seeds the variable activities by name, e.g. carried over from a related model.
    pub fn set_activity(&mut self, activity: &BTreeMap<String, f64>, model: &Model) {
        self.engine.preset_activity = resolve_names(
            activity.iter().map(|(name, &score)| (name.as_str(), score)),
            model,
        );
    }

    /// The current activity scores of all variables with a positive score, keyed by name.
    pub fn get_activity_map(&self, model: &Model) -> BTreeMap<String, f64> {
        let mut result = BTreeMap::new();
        for index in 0..model.num_variables() {
            let var = VariableId::create_from_index(index);
            let score = self.engine.activity_of(var);
            if score > 0.0 {
                let _ = result.insert(model.variable_name(var).to_owned(), score);
            }
        }
        result
    }

    /// Exports up to `max_count` NoGoods keyed by variable name (`0` meaning all), e.g. to seed
    /// a later solve on a rebuilt model.
    pub fn get_nogoods(&self, model: &Model, max_count: usize) -> Vec<NamedNoGood> {
        self.engine.nogoods.export(model.assignments(), max_count)
    }

    /// Imports name-keyed NoGoods; entries mentioning unknown variables are skipped. Returns the
    /// number added.
    pub fn add_nogoods(&mut self, nogoods: &[NamedNoGood], model: &Model) -> usize {
        self.engine
            .nogoods
            .import(nogoods, |name| model.variable_id(name))
    }

    // ===== Statistics =====

    /// The statistics of the most recent solve call.
    pub fn stats(&self) -> &SolverStats {
        &self.engine.stats
    }

    /// Logs the statistics through [`crate::statistics::log_statistic`].
    pub fn log_statistics(&self) {
        self.engine.stats.log();
        log_statistic_postfix();
    }
}

fn resolve_names<'a, V>(
    entries: impl Iterator<Item = (&'a str, V)>,
    model: &Model,
) -> HashMap<VariableId, V> {
    entries
        .filter_map(|(name, value)| model.variable_id(name).map(|var| (var, value)))
        .collect()
}
