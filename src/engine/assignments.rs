//! The variable store: domains, their cached struct-of-arrays mirror, the trails that make
//! backtracking O(delta), and the pending-update FIFO driven by the propagation loop.

use std::collections::VecDeque;

use crate::basic_types::KeyedVec;
use crate::constraints::ConstraintState;
use crate::engine::domains::Domain;
use crate::engine::domains::DomainValueIter;
use crate::engine::variables::ConstraintId;
use crate::engine::variables::DecisionLevel;
use crate::engine::variables::VariableId;
use crate::engine::variables::NO_SAVED_LEVEL;
use crate::kabocha_assert_moderate;
use crate::kabocha_assert_simple;

/// Cached per-variable state, kept bit-identical with the owning [`Domain`].
#[derive(Debug, Clone)]
pub(crate) struct VarData {
    pub(crate) min: i64,
    pub(crate) max: i64,
    pub(crate) size: usize,
    pub(crate) initial_range: u64,
    /// A witness value known to be in the current domain.
    pub(crate) support_value: i64,
    /// The decision level of the most recent trail entry for this variable; used to record at
    /// most one delta per (variable, level).
    pub(crate) last_saved_level: DecisionLevel,
    /// Defined variables are functionally determined by others and deprioritised in branching.
    pub(crate) is_defined_var: bool,
}

/// Pre-state of one variable, recorded on the first mutation per decision level.
#[derive(Debug, Clone)]
struct VarTrailEntry {
    level: DecisionLevel,
    var: VariableId,
    old_min: i64,
    old_max: i64,
    old_size: usize,
    old_support: i64,
    /// Removal-log length for bounds-interval domains, zero for sparse sets.
    old_trail_data: usize,
}

/// A propagator state snapshot owned by `constraint`, flowing through the central trail.
#[derive(Debug)]
pub(crate) struct ConstraintTrailEntry {
    pub(crate) level: DecisionLevel,
    pub(crate) constraint: ConstraintId,
    pub(crate) state: ConstraintState,
}

#[derive(Debug, Clone, Copy)]
struct DirtyEntry {
    level: DecisionLevel,
    constraint: ConstraintId,
}

/// The kind of a queued domain update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateKind {
    Instantiate,
    SetMin,
    SetMax,
    RemoveValue,
}

/// A domain update enqueued by a propagator, applied later by the propagation loop.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingUpdate {
    pub(crate) kind: UpdateKind,
    pub(crate) var: VariableId,
    pub(crate) value: i64,
}

/// Owns every variable together with the three trails and the pending-update FIFO.
///
/// All four mutators share one shape: short-circuit when the request is already satisfied, detect
/// failure before writing any delta, then save the pre-state once per (variable, level), mutate
/// the domain, and refresh the cached row. `false` signals inconsistency and leaves no delta
/// behind.
#[derive(Debug, Default)]
pub struct Assignments {
    names: KeyedVec<VariableId, String>,
    domains: KeyedVec<VariableId, Domain>,
    var_data: KeyedVec<VariableId, VarData>,
    var_trail: Vec<VarTrailEntry>,
    constraint_trail: Vec<ConstraintTrailEntry>,
    dirty_trail: Vec<DirtyEntry>,
    pending: VecDeque<PendingUpdate>,
    num_instantiated: usize,
}

impl Assignments {
    pub(crate) fn grow(&mut self, name: String, domain: Domain) -> VariableId {
        let data = VarData {
            min: domain.min(),
            max: domain.max(),
            size: domain.len(),
            initial_range: domain.initial_range(),
            support_value: domain.support_candidate(),
            last_saved_level: NO_SAVED_LEVEL,
            is_defined_var: false,
        };
        if data.size == 1 {
            self.num_instantiated += 1;
        }
        let _ = self.names.push(name);
        let _ = self.var_data.push(data);
        self.domains.push(domain)
    }

    /// The number of registered variables.
    pub fn num_variables(&self) -> usize {
        self.domains.len()
    }

    /// The number of variables currently collapsed to a single value, maintained as a running
    /// delta across mutations and rewinds.
    pub fn num_instantiated(&self) -> usize {
        self.num_instantiated
    }

    pub fn name(&self, var: VariableId) -> &str {
        &self.names[var]
    }

    pub fn lower_bound(&self, var: VariableId) -> i64 {
        self.var_data[var].min
    }

    pub fn upper_bound(&self, var: VariableId) -> i64 {
        self.var_data[var].max
    }

    pub fn size(&self, var: VariableId) -> usize {
        self.var_data[var].size
    }

    pub fn initial_range(&self, var: VariableId) -> u64 {
        self.var_data[var].initial_range
    }

    pub fn is_instantiated(&self, var: VariableId) -> bool {
        self.var_data[var].size == 1
    }

    /// The assigned value of an instantiated variable.
    pub fn value(&self, var: VariableId) -> i64 {
        kabocha_assert_moderate!(self.is_instantiated(var));
        self.var_data[var].min
    }

    pub fn contains(&self, var: VariableId, value: i64) -> bool {
        let data = &self.var_data[var];
        if value < data.min || value > data.max {
            return false;
        }
        self.domains[var].contains(value)
    }

    /// The live values of the variable's domain in domain-internal order.
    pub fn iter_values(&self, var: VariableId) -> DomainValueIter<'_> {
        self.domains[var].iter()
    }

    /// Materializes the live values of the variable's domain.
    pub fn values_of(&self, var: VariableId) -> Vec<i64> {
        self.domains[var].iter().collect()
    }

    pub fn is_defined(&self, var: VariableId) -> bool {
        self.var_data[var].is_defined_var
    }

    pub(crate) fn set_defined(&mut self, var: VariableId) {
        self.var_data[var].is_defined_var = true;
    }

    // ===== Trailed domain mutations =====

    /// Records the pre-state of `var` unless it was already recorded at this level.
    pub(crate) fn save_var_state(&mut self, level: DecisionLevel, var: VariableId) {
        if self.var_data[var].last_saved_level == level {
            return;
        }
        let trail_data = self.domains[var].trail_data();
        let data = &mut self.var_data[var];
        data.last_saved_level = level;
        self.var_trail.push(VarTrailEntry {
            level,
            var,
            old_min: data.min,
            old_max: data.max,
            old_size: data.size,
            old_support: data.support_value,
            old_trail_data: trail_data,
        });
    }

    /// Tightens the lower bound of `var` to at least `new_min`.
    pub(crate) fn set_min(&mut self, level: DecisionLevel, var: VariableId, new_min: i64) -> bool {
        let data = &self.var_data[var];
        if new_min <= data.min {
            return true;
        }
        if new_min > data.max {
            return false;
        }
        // The exact upper bound is a live witness, so the removal below cannot empty the domain.
        self.save_var_state(level, var);

        let domain = &mut self.domains[var];
        domain.remove_below(new_min);
        let (actual_min, new_size) = (domain.min(), domain.len());

        let data = &mut self.var_data[var];
        data.min = actual_min;
        data.size = new_size;
        if data.support_value < actual_min {
            data.support_value = actual_min;
        }
        if new_size == 1 {
            data.support_value = actual_min;
            self.num_instantiated += 1;
        }
        true
    }

    /// Tightens the upper bound of `var` to at most `new_max`.
    pub(crate) fn set_max(&mut self, level: DecisionLevel, var: VariableId, new_max: i64) -> bool {
        let data = &self.var_data[var];
        if new_max >= data.max {
            return true;
        }
        if new_max < data.min {
            return false;
        }
        self.save_var_state(level, var);

        let domain = &mut self.domains[var];
        domain.remove_above(new_max);
        let (actual_max, new_size) = (domain.max(), domain.len());

        let data = &mut self.var_data[var];
        data.max = actual_max;
        data.size = new_size;
        if data.support_value > actual_max {
            data.support_value = actual_max;
        }
        if new_size == 1 {
            data.support_value = actual_max;
            self.num_instantiated += 1;
        }
        true
    }

    /// Removes `value` from the domain of `var`.
    pub(crate) fn remove_value(
        &mut self,
        level: DecisionLevel,
        var: VariableId,
        value: i64,
    ) -> bool {
        if !self.contains(var, value) {
            return true;
        }
        if self.var_data[var].size == 1 {
            // Removing the only value empties the domain; detected before any delta.
            return false;
        }
        self.save_var_state(level, var);

        let domain = &mut self.domains[var];
        let removed = domain.remove(value);
        kabocha_assert_moderate!(removed, "removal cannot fail with more than one value left");
        let (new_min, new_max, new_size) = (domain.min(), domain.max(), domain.len());

        let data = &mut self.var_data[var];
        data.min = new_min;
        data.max = new_max;
        data.size = new_size;
        if data.support_value == value {
            data.support_value = new_min;
        }
        if new_size == 1 {
            data.support_value = new_min;
            self.num_instantiated += 1;
        }
        true
    }

    /// Collapses the domain of `var` to `value`.
    pub(crate) fn instantiate(
        &mut self,
        level: DecisionLevel,
        var: VariableId,
        value: i64,
    ) -> bool {
        if !self.contains(var, value) {
            return false;
        }
        if self.var_data[var].size == 1 {
            // Already instantiated to this value.
            return true;
        }
        self.save_var_state(level, var);

        self.domains[var].instantiate(value);
        let data = &mut self.var_data[var];
        data.min = value;
        data.max = value;
        data.size = 1;
        data.support_value = value;
        self.num_instantiated += 1;
        true
    }

    // ===== Rewinding =====

    /// Undoes every variable delta recorded strictly above `save_point`.
    pub(crate) fn rewind_var_trail(&mut self, save_point: DecisionLevel) {
        while self
            .var_trail
            .last()
            .is_some_and(|top| top.level > save_point)
        {
            let entry = self.var_trail.pop().expect("checked non-empty");
            let data = &mut self.var_data[entry.var];

            let was_instantiated = data.size == 1;
            let will_be_instantiated = entry.old_size == 1;
            if was_instantiated && !will_be_instantiated {
                self.num_instantiated -= 1;
            } else if !was_instantiated && will_be_instantiated {
                self.num_instantiated += 1;
            }

            data.min = entry.old_min;
            data.max = entry.old_max;
            data.size = entry.old_size;
            data.support_value = entry.old_support;
            data.last_saved_level = NO_SAVED_LEVEL;

            self.domains[entry.var].restore(
                entry.old_size,
                entry.old_min,
                entry.old_max,
                entry.old_trail_data,
            );
        }
    }

    pub(crate) fn push_constraint_state(
        &mut self,
        level: DecisionLevel,
        constraint: ConstraintId,
        state: ConstraintState,
    ) {
        self.constraint_trail.push(ConstraintTrailEntry {
            level,
            constraint,
            state,
        });
    }

    /// Pops the newest constraint snapshot above `save_point`, if any.
    pub(crate) fn pop_constraint_state_above(
        &mut self,
        save_point: DecisionLevel,
    ) -> Option<ConstraintTrailEntry> {
        if self
            .constraint_trail
            .last()
            .is_some_and(|top| top.level > save_point)
        {
            self.constraint_trail.pop()
        } else {
            None
        }
    }

    pub(crate) fn mark_constraint_dirty(
        &mut self,
        level: DecisionLevel,
        constraint: ConstraintId,
    ) {
        self.dirty_trail.push(DirtyEntry { level, constraint });
    }

    /// Pops the newest dirty entry above `save_point`, if any.
    pub(crate) fn pop_dirty_above(&mut self, save_point: DecisionLevel) -> Option<ConstraintId> {
        if self
            .dirty_trail
            .last()
            .is_some_and(|top| top.level > save_point)
        {
            self.dirty_trail.pop().map(|entry| entry.constraint)
        } else {
            None
        }
    }

    pub(crate) fn var_trail_len(&self) -> usize {
        self.var_trail.len()
    }

    /// Rebuilds every cached row (and the instantiated count) from the domains, re-centering the
    /// support witnesses. Called between presolve and propagation preparation.
    pub(crate) fn sync_from_domains(&mut self) {
        self.num_instantiated = 0;
        for var in self.domains.keys() {
            let domain = &self.domains[var];
            let data = &mut self.var_data[var];
            data.min = domain.min();
            data.max = domain.max();
            data.size = domain.len();
            data.support_value = domain.support_candidate();
            if data.size == 1 {
                self.num_instantiated += 1;
            }
        }
    }

    // ===== Pending updates =====

    /// Enqueues an instantiation; propagators use this instead of mutating domains.
    pub fn enqueue_instantiate(&mut self, var: VariableId, value: i64) {
        self.pending.push_back(PendingUpdate {
            kind: UpdateKind::Instantiate,
            var,
            value,
        });
    }

    pub fn enqueue_set_min(&mut self, var: VariableId, new_min: i64) {
        self.pending.push_back(PendingUpdate {
            kind: UpdateKind::SetMin,
            var,
            value: new_min,
        });
    }

    pub fn enqueue_set_max(&mut self, var: VariableId, new_max: i64) {
        self.pending.push_back(PendingUpdate {
            kind: UpdateKind::SetMax,
            var,
            value: new_max,
        });
    }

    pub fn enqueue_remove_value(&mut self, var: VariableId, value: i64) {
        self.pending.push_back(PendingUpdate {
            kind: UpdateKind::RemoveValue,
            var,
            value,
        });
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub(crate) fn pop_pending(&mut self) -> Option<PendingUpdate> {
        self.pending.pop_front()
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Checks the size cache of every variable against its domain; only used by debug assertions.
    pub(crate) fn debug_check_consistency(&self) -> bool {
        for var in self.domains.keys() {
            let data = &self.var_data[var];
            let domain = &self.domains[var];
            kabocha_assert_simple!(data.size == domain.len());
            kabocha_assert_simple!(data.min == domain.min() && data.max == domain.max());
            kabocha_assert_simple!(domain.contains(data.support_value));
            kabocha_assert_simple!((data.min == data.max) == (data.size == 1));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::Assignments;
    use crate::engine::domains::Domain;

    fn store_with_var(min: i64, max: i64) -> (Assignments, crate::engine::variables::VariableId) {
        let mut assignments = Assignments::default();
        let var = assignments.grow("x".to_owned(), Domain::interval(min, max));
        (assignments, var)
    }

    #[test]
    fn instantiate_then_rewind_restores_the_domain_exactly() {
        let (mut assignments, x) = store_with_var(1, 5);

        assert!(assignments.instantiate(1, x, 3));
        assert!(assignments.is_instantiated(x));
        assert_eq!(assignments.num_instantiated(), 1);

        assignments.rewind_var_trail(0);
        assert_eq!(assignments.size(x), 5);
        assert_eq!(assignments.lower_bound(x), 1);
        assert_eq!(assignments.upper_bound(x), 5);
        assert_eq!(assignments.num_instantiated(), 0);
        assert!((1..=5).all(|v| assignments.contains(x, v)));
        assert!(assignments.debug_check_consistency());
    }

    #[test]
    fn repeated_set_min_makes_no_additional_trail_entry() {
        let (mut assignments, x) = store_with_var(1, 9);

        assert!(assignments.set_min(1, x, 4));
        let entries = assignments.var_trail_len();
        assert!(assignments.set_min(1, x, 4));
        assert_eq!(assignments.var_trail_len(), entries);

        // Tightening further at the same level coalesces into the same delta.
        assert!(assignments.set_min(1, x, 6));
        assert_eq!(assignments.var_trail_len(), entries);

        assignments.rewind_var_trail(0);
        assert_eq!(assignments.lower_bound(x), 1);
        assert_eq!(assignments.size(x), 9);
    }

    #[test]
    fn mutations_at_distinct_levels_each_record_a_delta() {
        let (mut assignments, x) = store_with_var(1, 9);

        assert!(assignments.set_min(1, x, 3));
        assert!(assignments.set_max(2, x, 7));
        assert_eq!(assignments.var_trail_len(), 2);

        assignments.rewind_var_trail(1);
        assert_eq!(assignments.lower_bound(x), 3);
        assert_eq!(assignments.upper_bound(x), 9);

        assignments.rewind_var_trail(0);
        assert_eq!(assignments.lower_bound(x), 1);
    }

    #[test]
    fn failure_is_detected_before_any_delta_is_written() {
        let (mut assignments, x) = store_with_var(1, 5);

        assert!(!assignments.set_min(1, x, 6));
        assert!(!assignments.set_max(1, x, 0));
        assert_eq!(assignments.var_trail_len(), 0);
        assert_eq!(assignments.size(x), 5);

        assert!(assignments.instantiate(1, x, 2));
        assert!(!assignments.remove_value(1, x, 2));
        assert!(assignments.is_instantiated(x));
    }

    #[test]
    fn instantiated_count_transitions_exactly_once() {
        let (mut assignments, x) = store_with_var(1, 3);

        // Collapse through bound moves: only the transition to size one counts.
        assert!(assignments.set_min(1, x, 2));
        assert_eq!(assignments.num_instantiated(), 0);
        assert!(assignments.set_max(1, x, 2));
        assert_eq!(assignments.num_instantiated(), 1);

        // Instantiating an instantiated variable changes nothing.
        assert!(assignments.instantiate(1, x, 2));
        assert_eq!(assignments.num_instantiated(), 1);

        assignments.rewind_var_trail(0);
        assert_eq!(assignments.num_instantiated(), 0);
    }

    #[test]
    fn removal_of_a_boundary_value_moves_the_bound() {
        let (mut assignments, x) = store_with_var(1, 4);

        assert!(assignments.remove_value(1, x, 1));
        assert_eq!(assignments.lower_bound(x), 2);
        assert!(assignments.remove_value(1, x, 3));
        assert!(assignments.remove_value(1, x, 4));
        assert!(assignments.is_instantiated(x));
        assert_eq!(assignments.value(x), 2);
    }

    #[test]
    fn wide_domains_share_the_same_contract() {
        let (mut assignments, x) = store_with_var(0, 1 << 20);

        assert!(assignments.remove_value(1, x, 100));
        assert!(assignments.set_min(2, x, 50));
        assert_eq!(assignments.lower_bound(x), 50);
        assert!(!assignments.contains(x, 100));

        assignments.rewind_var_trail(1);
        assert_eq!(assignments.lower_bound(x), 0);
        assert!(!assignments.contains(x, 100));

        assignments.rewind_var_trail(0);
        assert!(assignments.contains(x, 100));
        assert!(assignments.debug_check_consistency());
    }
}
