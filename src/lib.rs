//! # Kabocha
//! Kabocha is a finite-domain constraint satisfaction and optimisation solver for integer
//! variables. A model is a set of variables with finite integer domains plus constraints over
//! them; the solver decides satisfiability, enumerates solutions, or optimises an integer
//! objective by branch and bound.
//!
//! The engine is a depth-first search over trailed domains: propagators narrow domains through a
//! centralized update queue, failures are recorded as NoGoods with two watched literals,
//! variable selection is activity-weighted, and a Luby-like restart schedule with reuse of the
//! best partial assignment keeps the search out of heavy tails.
//!
//! # Solving a model
//! Variables are created on a [`Model`] and referenced by [`VariableId`]; constraints come from
//! the factory functions in [`constraints`]:
//! ```rust
//! use kabocha::constraints;
//! use kabocha::Model;
//! use kabocha::Solver;
//!
//! let mut model = Model::new();
//! let x = model.create_variable("x", 0, 9).unwrap();
//! let y = model.create_variable("y", 0, 9).unwrap();
//! let z = model.create_variable("z", 0, 9).unwrap();
//!
//! // x + y + z = 5, and x >= y
//! model
//!     .add_constraint(constraints::int_lin_eq(vec![1, 1, 1], vec![x, y, z], 5))
//!     .unwrap();
//! model.add_constraint(constraints::int_le(y, x)).unwrap();
//!
//! let mut solver = Solver::default();
//! let solution = solver.solve(&mut model).expect("satisfiable");
//!
//! let (x, y, z) = (
//!     solution.value("x").unwrap(),
//!     solution.value("y").unwrap(),
//!     solution.value("z").unwrap(),
//! );
//! assert_eq!(x + y + z, 5);
//! assert!(x >= y);
//! ```
//!
//! # Enumerating all solutions
//! [`Solver::solve_all`] reports every solution to a callback; each one is blocked by a
//! permanent NoGood so it cannot be reported twice:
//! ```rust
//! use kabocha::constraints;
//! use kabocha::Model;
//! use kabocha::Solver;
//!
//! let mut model = Model::new();
//! let vars: Vec<_> = ["a", "b", "c"]
//!     .iter()
//!     .map(|name| model.create_variable(*name, 1, 3).unwrap())
//!     .collect();
//! model
//!     .add_constraint(constraints::all_different(vars))
//!     .unwrap();
//!
//! let mut solver = Solver::default();
//! let count = solver.solve_all(&mut model, |_solution| true);
//!
//! // The three variables permute the values 1..=3.
//! assert_eq!(count, 6);
//! ```
//!
//! # Optimisation
//! [`Solver::solve_optimize`] runs branch and bound on an objective variable, tightening the
//! objective bound at the root after every incumbent until the remaining space is infeasible:
//! ```rust
//! use kabocha::constraints;
//! use kabocha::Model;
//! use kabocha::Solver;
//!
//! let mut model = Model::new();
//! let x = model.create_variable("x", 1, 10).unwrap();
//! let y = model.create_variable("y", 1, 10).unwrap();
//! let total = model.create_variable("total", 2, 20).unwrap();
//! model
//!     .add_constraint(constraints::int_lin_le(vec![1, 1], vec![x, y], 7))
//!     .unwrap();
//! model
//!     .add_constraint(constraints::int_lin_eq(vec![1, 1, -1], vec![x, y, total], 0))
//!     .unwrap();
//!
//! let mut solver = Solver::default();
//! let best = solver
//!     .solve_optimize(&mut model, total, false, |_incumbent| true)
//!     .expect("satisfiable");
//! assert_eq!(best.value("total"), Some(7));
//! ```
//!
//! # Cancellation
//! [`Solver::stop`] (or setting the shared [`Solver::stop_flag`] from a timeout thread) makes
//! the search unwind at the next safe point and return its best answer so far; statistics remain
//! valid. The solver has no clock of its own.

pub(crate) mod asserts;
pub(crate) mod basic_types;
pub(crate) mod engine;

pub mod constraints;
pub mod model;
pub mod statistics;

// A private module with public re-exports, so that the main API is exported directly from the
// crate root: `use kabocha::Solver;` rather than `use kabocha::api::Solver;`.
mod api;

pub use api::*;
