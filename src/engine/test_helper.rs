#![cfg(test)]
//! Helpers for testing propagators: a [`TestHarness`] wires a [`Model`] to a search engine so a
//! test can post a constraint, run the root fixpoint, make decisions, and observe the resulting
//! domains.

use crate::constraints::Constraint;
use crate::engine::search::SearchEngine;
use crate::engine::variables::DecisionLevel;
use crate::engine::variables::VariableId;
use crate::model::Model;

#[derive(Debug, Default)]
pub(crate) struct TestHarness {
    pub(crate) model: Model,
    pub(crate) engine: SearchEngine,
    next_level: DecisionLevel,
    num_vars: usize,
}

impl TestHarness {
    pub(crate) fn new() -> Self {
        TestHarness::default()
    }

    pub(crate) fn new_variable(&mut self, lower_bound: i64, upper_bound: i64) -> VariableId {
        let name = format!("x{}", self.num_vars);
        self.num_vars += 1;
        self.model
            .create_variable(name, lower_bound, upper_bound)
            .expect("fresh test variable")
    }

    pub(crate) fn new_sparse_variable(&mut self, values: &[i64]) -> VariableId {
        let name = format!("x{}", self.num_vars);
        self.num_vars += 1;
        self.model
            .create_variable_from_values(name, values)
            .expect("fresh test variable")
    }

    pub(crate) fn post(&mut self, constraint: impl Constraint + 'static) {
        self.model
            .add_constraint(constraint)
            .expect("posting onto an unfrozen model");
    }

    /// Builds the watch list and runs presolve plus the root fixpoint.
    pub(crate) fn prepare(&mut self) -> bool {
        self.model.build_constraint_watch_list();
        self.engine.presolve(&mut self.model)
    }

    /// Drains the pending queue; on failure the remaining queue is cleared.
    pub(crate) fn propagate(&mut self) -> bool {
        let ok = self.engine.process_queue(&mut self.model);
        if !ok {
            self.model.assignments.clear_pending();
        }
        ok
    }

    /// Branches on `var = value` at a fresh decision level and propagates to a fixpoint.
    pub(crate) fn decide(&mut self, var: VariableId, value: i64) -> bool {
        self.next_level += 1;
        self.engine.set_decision_level(self.next_level);
        let prev_min = self.model.assignments.lower_bound(var);
        let prev_max = self.model.assignments.upper_bound(var);
        if !self
            .model
            .assignments
            .instantiate(self.next_level, var, value)
        {
            return false;
        }
        let ok = self
            .engine
            .propagate_instantiate(&mut self.model, var, prev_min, prev_max)
            && self.engine.process_queue(&mut self.model);
        if !ok {
            self.model.assignments.clear_pending();
        }
        ok
    }

    /// Enqueues a removal without branching; combine with [`TestHarness::propagate`].
    pub(crate) fn remove(&mut self, var: VariableId, value: i64) -> bool {
        self.model.assignments.enqueue_remove_value(var, value);
        true
    }

    pub(crate) fn backtrack_to(&mut self, level: DecisionLevel) {
        self.model.assignments.clear_pending();
        self.model.backtrack(level);
        self.next_level = level;
        self.engine.set_decision_level(level);
    }

    pub(crate) fn contains(&self, var: VariableId, value: i64) -> bool {
        self.model.assignments.contains(var, value)
    }

    pub(crate) fn value(&self, var: VariableId) -> Option<i64> {
        if self.model.assignments.is_instantiated(var) {
            Some(self.model.assignments.value(var))
        } else {
            None
        }
    }

    pub(crate) fn upper_bound(&self, var: VariableId) -> i64 {
        self.model.assignments.upper_bound(var)
    }

    pub(crate) fn is_model_satisfied(&self) -> bool {
        self.model.verify_assignment()
    }

    pub(crate) fn assert_bounds(&self, var: VariableId, lower_bound: i64, upper_bound: i64) {
        let actual_lower = self.model.assignments.lower_bound(var);
        let actual_upper = self.model.assignments.upper_bound(var);
        assert_eq!(
            (lower_bound, upper_bound),
            (actual_lower, actual_upper),
            "expected bounds [{lower_bound}, {upper_bound}] but found [{actual_lower}, {actual_upper}]"
        );
    }
}
