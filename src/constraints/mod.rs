//! The constraint protocol and the built-in propagators.
//!
//! A constraint is a set of event hooks over the variables it mentions. During search, hooks react
//! to domain events by *enqueueing* further domain updates on the pending queue; they must never
//! mutate domains directly from an event hook, since the propagation loop is the single point
//! where updates are applied and fanned out (direct mutation would bypass NoGood watching and the
//! event dispatch). Direct pruning is allowed only from [`Constraint::presolve`].
//!
//! Stateful propagators snapshot their incremental state through
//! [`PropagationContext::save_state`] on the first mutation per decision level and mark themselves
//! dirty so that backtracking is routed to them.

mod all_different;
mod boolean;
mod circuit;
mod comparison;
mod element;
mod linear;

pub use all_different::all_different;
pub use all_different::AllDifferent;
pub use boolean::array_bool_and;
pub use boolean::array_bool_or;
pub use boolean::bool_clause;
pub use boolean::ArrayBoolAnd;
pub use boolean::ArrayBoolOr;
pub use boolean::BoolClause;
pub use circuit::circuit;
pub use circuit::Circuit;
pub use comparison::int_eq;
pub use comparison::int_eq_reif;
pub use comparison::int_le;
pub use comparison::int_le_reif;
pub use comparison::int_lt;
pub use comparison::int_ne;
pub use comparison::int_ne_reif;
pub use comparison::IntComparison;
pub use comparison::IntComparisonReif;
pub use element::int_element;
pub use element::int_element_offset;
pub use element::IntElement;
use enumset::enum_set;
use enumset::EnumSet;

use crate::engine::assignments::Assignments;
use crate::engine::domains::DomainEvent;
use crate::engine::variables::ConstraintId;
use crate::engine::variables::DecisionLevel;
use crate::engine::variables::VariableId;

pub use linear::int_lin_eq;
pub use linear::int_lin_le;
pub use linear::int_lin_ne;
pub use linear::IntLinear;
pub use linear::IntLinearNe;

/// A propagator-defined state snapshot recorded on the central constraint trail.
///
/// Every stateful propagator family declares one variant; backtracking pops the entries above the
/// save point newest-first and hands each snapshot back to its owning constraint through
/// [`Constraint::restore_state`].
#[derive(Debug, Clone, Copy)]
pub enum ConstraintState {
    /// Value-pool propagators: live pool length and open-variable count.
    Pool { pool_len: usize, unfixed: usize },
    /// Linear propagators: the running scalars and open-variable count.
    Linear {
        fixed_sum: i64,
        min_potential: i64,
        max_potential: i64,
        unfixed: usize,
    },
    /// Watched-literal propagators: the watched position pair.
    Watches { w1: usize, w2: usize },
    /// Circuit: undo data for one path merge.
    CircuitMerge {
        path_root: usize,
        absorbed_root: usize,
        old_tail: usize,
        old_size: usize,
        old_pool_len: usize,
    },
    /// Circuit: a closure assignment only shrank the inbound pool.
    CircuitClose { old_pool_len: usize },
}

/// The mutable view handed to constraint hooks.
///
/// Wraps the variable store together with the identity of the constraint being notified, so that
/// state snapshots and dirty marks are attributed to the right owner.
#[derive(Debug)]
pub struct PropagationContext<'a> {
    assignments: &'a mut Assignments,
    constraint: ConstraintId,
}

impl<'a> PropagationContext<'a> {
    pub(crate) fn new(assignments: &'a mut Assignments, constraint: ConstraintId) -> Self {
        PropagationContext {
            assignments,
            constraint,
        }
    }

    pub fn lower_bound(&self, var: VariableId) -> i64 {
        self.assignments.lower_bound(var)
    }

    pub fn upper_bound(&self, var: VariableId) -> i64 {
        self.assignments.upper_bound(var)
    }

    pub fn size(&self, var: VariableId) -> usize {
        self.assignments.size(var)
    }

    pub fn is_instantiated(&self, var: VariableId) -> bool {
        self.assignments.is_instantiated(var)
    }

    /// The assigned value of an instantiated variable.
    pub fn value(&self, var: VariableId) -> i64 {
        self.assignments.value(var)
    }

    pub fn contains(&self, var: VariableId, value: i64) -> bool {
        self.assignments.contains(var, value)
    }

    /// Materializes the live values of the variable's domain.
    pub fn values_of(&self, var: VariableId) -> Vec<i64> {
        self.assignments.values_of(var)
    }

    /// Read access to the underlying store, e.g. for shared `is_satisfied` logic.
    pub fn assignments(&self) -> &Assignments {
        self.assignments
    }

    pub fn enqueue_instantiate(&mut self, var: VariableId, value: i64) {
        self.assignments.enqueue_instantiate(var, value);
    }

    pub fn enqueue_set_min(&mut self, var: VariableId, new_min: i64) {
        self.assignments.enqueue_set_min(var, new_min);
    }

    pub fn enqueue_set_max(&mut self, var: VariableId, new_max: i64) {
        self.assignments.enqueue_set_max(var, new_max);
    }

    pub fn enqueue_remove_value(&mut self, var: VariableId, value: i64) {
        self.assignments.enqueue_remove_value(var, value);
    }

    /// Directly tightens a lower bound; only valid from `presolve`.
    pub fn set_min(&mut self, level: DecisionLevel, var: VariableId, new_min: i64) -> bool {
        self.assignments.set_min(level, var, new_min)
    }

    /// Directly tightens an upper bound; only valid from `presolve`.
    pub fn set_max(&mut self, level: DecisionLevel, var: VariableId, new_max: i64) -> bool {
        self.assignments.set_max(level, var, new_max)
    }

    /// Directly removes a value; only valid from `presolve`.
    pub fn remove_value(&mut self, level: DecisionLevel, var: VariableId, value: i64) -> bool {
        self.assignments.remove_value(level, var, value)
    }

    /// Directly instantiates a variable; only valid from `presolve`.
    pub fn instantiate(&mut self, level: DecisionLevel, var: VariableId, value: i64) -> bool {
        self.assignments.instantiate(level, var, value)
    }

    /// Records a state snapshot for the owning constraint at the given level.
    pub fn save_state(&mut self, level: DecisionLevel, state: ConstraintState) {
        self.assignments
            .push_constraint_state(level, self.constraint, state);
    }

    /// Routes the next rewind past `level` to the owning constraint.
    pub fn mark_dirty(&mut self, level: DecisionLevel) {
        self.assignments.mark_constraint_dirty(level, self.constraint);
    }
}

/// The capability set every constraint implements.
///
/// All hooks return `false` to signal inconsistency; inconsistency is never an error or a panic.
/// Hooks that a constraint does not care about keep their default no-op implementation, and the
/// subscription set restricts which events are dispatched to it at all.
pub trait Constraint {
    /// A short display name used in logs.
    fn name(&self) -> &str;

    /// The variables this constraint mentions; a variable's index in this slice is the `slot`
    /// passed back into the event hooks.
    fn variables(&self) -> &[VariableId];

    /// The domain events this constraint wants to observe.
    fn subscriptions(&self) -> EnumSet<DomainEvent> {
        enum_set!(
            DomainEvent::Instantiate
                | DomainEvent::LowerBound
                | DomainEvent::UpperBound
                | DomainEvent::Removal
        )
    }

    /// Root pruning, called repeatedly until a fixpoint over all constraints is reached. May
    /// mutate domains directly (at level 0) or enqueue updates; enqueued updates are applied
    /// after `prepare_propagation`.
    fn presolve(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        let _ = ctx;
        true
    }

    /// One-time initialisation of internal indices against the post-presolve domains.
    fn prepare_propagation(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        let _ = ctx;
        true
    }

    /// The watched variable at `slot` collapsed to `value`.
    #[allow(clippy::too_many_arguments, reason = "mirrors the event payload")]
    fn on_instantiate(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        level: DecisionLevel,
        var: VariableId,
        slot: usize,
        value: i64,
        prev_min: i64,
        prev_max: i64,
    ) -> bool {
        let _ = (ctx, level, var, slot, value, prev_min, prev_max);
        true
    }

    /// The watched variable at `slot` tightened its lower bound without instantiating.
    fn on_set_min(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        level: DecisionLevel,
        var: VariableId,
        slot: usize,
        new_min: i64,
        prev_min: i64,
    ) -> bool {
        let _ = (ctx, level, var, slot, new_min, prev_min);
        true
    }

    /// The watched variable at `slot` tightened its upper bound without instantiating.
    fn on_set_max(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        level: DecisionLevel,
        var: VariableId,
        slot: usize,
        new_max: i64,
        prev_max: i64,
    ) -> bool {
        let _ = (ctx, level, var, slot, new_max, prev_max);
        true
    }

    /// The watched variable at `slot` lost an inner value.
    fn on_remove_value(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        level: DecisionLevel,
        var: VariableId,
        slot: usize,
        value: i64,
    ) -> bool {
        let _ = (ctx, level, var, slot, value);
        true
    }

    /// Exactly one variable of the constraint is still open and a closed-form completion may be
    /// possible. Triggered by the owning propagator when its open-variable count reaches one.
    fn on_last_uninstantiated(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        level: DecisionLevel,
        last_slot: usize,
    ) -> bool {
        let _ = (ctx, level, last_slot);
        true
    }

    /// All variables are assigned; returns whether the constraint holds.
    fn on_final_instantiate(&mut self, assignments: &Assignments) -> bool {
        self.is_satisfied(assignments) != Some(false)
    }

    /// Pure check used for solution verification: `Some(true)` if satisfied, `Some(false)` if
    /// violated, `None` if not yet determined.
    fn is_satisfied(&self, assignments: &Assignments) -> Option<bool>;

    /// Applies a snapshot popped from the constraint trail. Snapshots are handed back
    /// newest-first, so applying each one in turn ends at the state before the rewound levels.
    fn restore_state(&mut self, state: ConstraintState) {
        let _ = state;
    }

    /// Called through the dirty trail after the snapshots above `save_point` were restored;
    /// resets per-level bookkeeping such as the last-saved-level marker.
    fn rewind_to(&mut self, save_point: DecisionLevel) {
        let _ = save_point;
    }
}

/// Floor division on `i64`, correct for negative operands.
pub(crate) fn div_floor(a: i64, b: i64) -> i64 {
    let quotient = a / b;
    if a % b != 0 && (a < 0) != (b < 0) {
        quotient - 1
    } else {
        quotient
    }
}

/// Ceiling division on `i64`, correct for negative operands.
pub(crate) fn div_ceil(a: i64, b: i64) -> i64 {
    let quotient = a / b;
    if a % b != 0 && (a < 0) == (b < 0) {
        quotient + 1
    } else {
        quotient
    }
}

#[cfg(test)]
mod tests {
    use super::div_ceil;
    use super::div_floor;

    #[test]
    fn signed_division_rounds_towards_the_right_direction() {
        assert_eq!(div_floor(7, 2), 3);
        assert_eq!(div_floor(-7, 2), -4);
        assert_eq!(div_floor(7, -2), -4);
        assert_eq!(div_floor(-7, -2), 3);
        assert_eq!(div_floor(6, 3), 2);

        assert_eq!(div_ceil(7, 2), 4);
        assert_eq!(div_ceil(-7, 2), -3);
        assert_eq!(div_ceil(7, -2), -3);
        assert_eq!(div_ceil(-7, -2), 4);
        assert_eq!(div_ceil(6, 3), 2);
    }
}
