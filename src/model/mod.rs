//! The model: variables, constraints, and the watch list connecting them.

use std::collections::BTreeMap;

use log::error;
use thiserror::Error;

use crate::basic_types::HashMap;
use crate::basic_types::Solution;
use crate::basic_types::StorageKey;
use crate::constraints::Constraint;
use crate::constraints::PropagationContext;
use crate::engine::assignments::Assignments;
use crate::engine::domains::Domain;
use crate::engine::variables::ConstraintId;
use crate::engine::variables::DecisionLevel;
use crate::engine::variables::VariableId;
use crate::engine::watch_list::WatchList;
use crate::engine::watch_list::WatcherId;

/// A misuse of the model-construction API.
///
/// These are programmer errors, reported eagerly so the model stays diagnosable; they are
/// unrelated to the `bool`-valued inconsistency signalling inside the search.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("a variable or alias named `{0}` already exists")]
    DuplicateName(String),
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),
    #[error("invalid domain for `{name}`: {reason}")]
    InvalidDomain { name: String, reason: &'static str },
    #[error("the model is frozen once the constraint watch list has been built")]
    Frozen,
}

/// A fully-ground constraint model: integer variables with finite domains plus the constraints
/// over them.
///
/// The model is built up through [`Model::create_variable`] and [`Model::add_constraint`]; once
/// [`Model::build_constraint_watch_list`] has run (the solver calls it on entry) the model is
/// frozen and only the solver mutates it, exclusively for the duration of a solve call.
#[derive(Default)]
pub struct Model {
    pub(crate) assignments: Assignments,
    pub(crate) constraints: Vec<Box<dyn Constraint>>,
    pub(crate) watch_list: WatchList,
    name_to_id: HashMap<String, VariableId>,
    aliases: BTreeMap<String, VariableId>,
    watches_built: bool,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("num_variables", &self.assignments.num_variables())
            .field("num_constraints", &self.constraints.len())
            .field("watches_built", &self.watches_built)
            .finish()
    }
}

impl Model {
    pub fn new() -> Self {
        Model::default()
    }

    fn register(&mut self, name: String, domain: Domain) -> Result<VariableId, ModelError> {
        if self.watches_built {
            return Err(ModelError::Frozen);
        }
        if self.name_to_id.contains_key(&name) || self.aliases.contains_key(&name) {
            return Err(ModelError::DuplicateName(name));
        }
        let var = self.assignments.grow(name.clone(), domain);
        let _ = self.name_to_id.insert(name, var);
        self.watch_list.grow();
        Ok(var)
    }

    /// Creates a variable with the interval domain `[min, max]`.
    pub fn create_variable(
        &mut self,
        name: impl Into<String>,
        min: i64,
        max: i64,
    ) -> Result<VariableId, ModelError> {
        let name = name.into();
        if min > max {
            return Err(ModelError::InvalidDomain {
                name,
                reason: "the lower bound exceeds the upper bound",
            });
        }
        self.register(name, Domain::interval(min, max))
    }

    /// Creates a variable fixed to a single value.
    pub fn create_constant(
        &mut self,
        name: impl Into<String>,
        value: i64,
    ) -> Result<VariableId, ModelError> {
        self.register(name.into(), Domain::interval(value, value))
    }

    /// Creates a variable whose domain holds exactly `values` (duplicates are merged).
    pub fn create_variable_from_values(
        &mut self,
        name: impl Into<String>,
        values: &[i64],
    ) -> Result<VariableId, ModelError> {
        let name = name.into();
        if values.is_empty() {
            return Err(ModelError::InvalidDomain {
                name,
                reason: "the domain must contain at least one value",
            });
        }
        self.register(name, Domain::from_values(values.to_vec()))
    }

    /// Registers an additional name for `var`; aliases show up in solutions.
    pub fn add_variable_alias(
        &mut self,
        alias: impl Into<String>,
        var: VariableId,
    ) -> Result<(), ModelError> {
        let alias = alias.into();
        self.check_var(var)?;
        if self.name_to_id.contains_key(&alias) || self.aliases.contains_key(&alias) {
            return Err(ModelError::DuplicateName(alias));
        }
        let _ = self.aliases.insert(alias, var);
        Ok(())
    }

    /// Marks `var` as functionally determined by other variables; such variables are
    /// deprioritised during branching.
    pub fn set_defined_var(&mut self, var: VariableId) -> Result<(), ModelError> {
        self.check_var(var)?;
        self.assignments.set_defined(var);
        Ok(())
    }

    /// Adds a constraint over previously created variables.
    pub fn add_constraint(
        &mut self,
        constraint: impl Constraint + 'static,
    ) -> Result<(), ModelError> {
        if self.watches_built {
            return Err(ModelError::Frozen);
        }
        for &var in constraint.variables() {
            self.check_var(var)?;
        }
        self.constraints.push(Box::new(constraint));
        Ok(())
    }

    /// Builds the per-variable watcher lists from every constraint's subscription set and
    /// freezes the model. Idempotent; required once before solving.
    pub fn build_constraint_watch_list(&mut self) {
        if self.watches_built {
            return;
        }
        self.watch_list.clear();
        for (index, constraint) in self.constraints.iter().enumerate() {
            let events = constraint.subscriptions();
            for (slot, &var) in constraint.variables().iter().enumerate() {
                self.watch_list.watch(
                    var,
                    WatcherId {
                        constraint: ConstraintId(index as u32),
                        slot,
                    },
                    events,
                );
            }
        }
        self.watches_built = true;
    }

    fn check_var(&self, var: VariableId) -> Result<(), ModelError> {
        if var.index() >= self.assignments.num_variables() {
            return Err(ModelError::UnknownVariable(var.to_string()));
        }
        Ok(())
    }

    /// Resolves a variable name or alias.
    pub fn variable_id(&self, name: &str) -> Option<VariableId> {
        self.name_to_id
            .get(name)
            .or_else(|| self.aliases.get(name))
            .copied()
    }

    /// The name under which the variable was created.
    pub fn variable_name(&self, var: VariableId) -> &str {
        self.assignments.name(var)
    }

    pub fn num_variables(&self) -> usize {
        self.assignments.num_variables()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Read access to the variable store.
    pub fn assignments(&self) -> &Assignments {
        &self.assignments
    }

    pub fn lower_bound(&self, var: VariableId) -> i64 {
        self.assignments.lower_bound(var)
    }

    pub fn upper_bound(&self, var: VariableId) -> i64 {
        self.assignments.upper_bound(var)
    }

    pub fn is_instantiated(&self, var: VariableId) -> bool {
        self.assignments.is_instantiated(var)
    }

    /// Runs `operation` for the constraint at `index` with a context attributing trail writes to
    /// it.
    pub(crate) fn with_constraint<R>(
        &mut self,
        index: usize,
        operation: impl FnOnce(&mut dyn Constraint, &mut PropagationContext<'_>) -> R,
    ) -> R {
        let Model {
            assignments,
            constraints,
            ..
        } = self;
        let mut ctx = PropagationContext::new(assignments, ConstraintId(index as u32));
        operation(constraints[index].as_mut(), &mut ctx)
    }

    /// Restores all state strictly above `save_point`: the variable deltas, the constraint-state
    /// snapshots (routed back to their owners newest-first), and finally the dirty constraints'
    /// level bookkeeping.
    pub(crate) fn backtrack(&mut self, save_point: DecisionLevel) {
        let Model {
            assignments,
            constraints,
            ..
        } = self;
        assignments.rewind_var_trail(save_point);
        while let Some(entry) = assignments.pop_constraint_state_above(save_point) {
            constraints[entry.constraint.index()].restore_state(entry.state);
        }
        while let Some(constraint) = assignments.pop_dirty_above(save_point) {
            constraints[constraint.index()].rewind_to(save_point);
        }
    }

    /// Collects the instantiated variables (and their aliases) into a solution.
    pub(crate) fn extract_solution(&self) -> Solution {
        let mut solution = Solution::new();
        for index in 0..self.assignments.num_variables() {
            let var = VariableId(index as u32);
            if self.assignments.is_instantiated(var) {
                solution.insert(self.assignments.name(var), self.assignments.value(var));
            }
        }
        for (alias, &var) in &self.aliases {
            if self.assignments.is_instantiated(var) {
                solution.insert(alias.as_str(), self.assignments.value(var));
            }
        }
        solution
    }

    /// Checks the full assignment against every constraint.
    pub(crate) fn verify_assignment(&self) -> bool {
        for constraint in &self.constraints {
            if constraint.is_satisfied(&self.assignments) == Some(false) {
                error!(
                    "constraint {} is violated by a candidate solution",
                    constraint.name()
                );
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::Model;
    use super::ModelError;
    use crate::constraints::int_eq;

    #[test]
    fn duplicate_names_are_rejected() {
        let mut model = Model::new();
        let _ = model.create_variable("x", 0, 5).unwrap();

        assert_eq!(
            model.create_variable("x", 0, 9),
            Err(ModelError::DuplicateName("x".to_owned()))
        );
    }

    #[test]
    fn aliases_resolve_to_the_original_variable() {
        let mut model = Model::new();
        let x = model.create_variable("x", 0, 5).unwrap();
        model.add_variable_alias("first", x).unwrap();

        assert_eq!(model.variable_id("x"), Some(x));
        assert_eq!(model.variable_id("first"), Some(x));
        assert_eq!(model.variable_id("other"), None);

        assert_eq!(
            model.add_variable_alias("x", x),
            Err(ModelError::DuplicateName("x".to_owned()))
        );
    }

    #[test]
    fn the_model_freezes_once_watches_are_built() {
        let mut model = Model::new();
        let x = model.create_variable("x", 0, 5).unwrap();
        let y = model.create_variable("y", 0, 5).unwrap();
        model.add_constraint(int_eq(x, y)).unwrap();

        model.build_constraint_watch_list();

        assert!(matches!(
            model.create_variable("z", 0, 1),
            Err(ModelError::Frozen)
        ));
        assert!(matches!(
            model.add_constraint(int_eq(x, y)),
            Err(ModelError::Frozen)
        ));
    }

    #[test]
    fn empty_and_reversed_domains_are_invalid() {
        let mut model = Model::new();
        assert!(matches!(
            model.create_variable("x", 3, 1),
            Err(ModelError::InvalidDomain { .. })
        ));
        assert!(matches!(
            model.create_variable_from_values("y", &[]),
            Err(ModelError::InvalidDomain { .. })
        ));
    }
}
