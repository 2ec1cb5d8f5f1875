//! The all-different constraint.
//!
//! Keeps a sparse-set pool of the values still available across the constraint's variables. An
//! instantiation consumes its value from the pool (failing if another variable already took it),
//! forward-checks the value out of the open peers, and once a single variable remains its domain
//! is intersected with the pool. Restoring is O(1): the pool length and the open-variable count
//! are the whole state.

use enumset::enum_set;
use enumset::EnumSet;

use super::Constraint;
use super::ConstraintState;
use super::PropagationContext;
use crate::basic_types::HashMap;
use crate::basic_types::HashSet;
use crate::engine::assignments::Assignments;
use crate::engine::domains::DomainEvent;
use crate::engine::variables::DecisionLevel;
use crate::engine::variables::VariableId;
use crate::engine::variables::NO_SAVED_LEVEL;
use crate::kabocha_assert_moderate;

/// `all_different(vars)`: every variable takes a distinct value.
#[derive(Debug)]
pub struct AllDifferent {
    vars: Vec<VariableId>,

    /// Dense pool storage; `pool_values[0..pool_len]` are the free values.
    pool_values: Vec<i64>,
    /// Value to dense-slot map; a slot `>= pool_len` means the value is consumed.
    pool_slots: HashMap<i64, usize>,
    pool_len: usize,
    unfixed: usize,
    last_saved_level: DecisionLevel,
}

/// Creates the constraint that all of `vars` take pairwise distinct values.
pub fn all_different(vars: Vec<VariableId>) -> AllDifferent {
    AllDifferent {
        vars,
        pool_values: Vec::new(),
        pool_slots: HashMap::default(),
        pool_len: 0,
        unfixed: 0,
        last_saved_level: NO_SAVED_LEVEL,
    }
}

impl AllDifferent {
    fn pool_contains(&self, value: i64) -> bool {
        self.pool_slots
            .get(&value)
            .is_some_and(|&slot| slot < self.pool_len)
    }

    /// Swaps the value past the live region; `false` if it was already consumed or never free.
    fn pool_remove(&mut self, value: i64) -> bool {
        let Some(&slot) = self.pool_slots.get(&value) else {
            return false;
        };
        if slot >= self.pool_len {
            return false;
        }
        let last = self.pool_len - 1;
        let moved = self.pool_values[last];
        self.pool_values.swap(slot, last);
        let _ = self.pool_slots.insert(moved, slot);
        let _ = self.pool_slots.insert(value, last);
        self.pool_len = last;
        true
    }

    fn save_once(&mut self, ctx: &mut PropagationContext<'_>, level: DecisionLevel) {
        if self.last_saved_level == level {
            return;
        }
        self.last_saved_level = level;
        ctx.save_state(
            level,
            ConstraintState::Pool {
                pool_len: self.pool_len,
                unfixed: self.unfixed,
            },
        );
        ctx.mark_dirty(level);
    }

    fn open_slot(&self, assignments: &Assignments) -> usize {
        self.vars
            .iter()
            .position(|&var| !assignments.is_instantiated(var))
            .expect("an open slot exists while unfixed > 0")
    }
}

impl Constraint for AllDifferent {
    fn name(&self) -> &str {
        "all_different"
    }

    fn variables(&self) -> &[VariableId] {
        &self.vars
    }

    fn subscriptions(&self) -> EnumSet<DomainEvent> {
        enum_set!(DomainEvent::Instantiate)
    }

    fn presolve(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        // The same variable listed twice can never take two distinct values.
        let mut seen_vars = HashSet::default();
        if !self.vars.iter().all(|&var| seen_vars.insert(var)) {
            return false;
        }

        // Values of instantiated variables disappear from every other domain.
        for slot in 0..self.vars.len() {
            let var = self.vars[slot];
            if !ctx.is_instantiated(var) {
                continue;
            }
            let value = ctx.value(var);
            for other_slot in 0..self.vars.len() {
                if other_slot == slot {
                    continue;
                }
                if !ctx.remove_value(0, self.vars[other_slot], value) {
                    return false;
                }
            }
        }

        // Pigeonhole: fewer distinct values than variables is infeasible.
        let mut union: HashSet<i64> = HashSet::default();
        for &var in &self.vars {
            union.extend(ctx.assignments().iter_values(var));
        }
        union.len() >= self.vars.len()
    }

    fn prepare_propagation(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        self.last_saved_level = NO_SAVED_LEVEL;
        self.pool_values.clear();
        self.pool_slots.clear();
        self.unfixed = 0;

        let mut taken: Vec<i64> = Vec::new();
        let mut free: HashSet<i64> = HashSet::default();
        for &var in &self.vars {
            if ctx.is_instantiated(var) {
                taken.push(ctx.value(var));
            } else {
                free.extend(ctx.assignments().iter_values(var));
                self.unfixed += 1;
            }
        }
        for &value in &taken {
            let _ = free.remove(&value);
        }

        self.pool_values.extend(free.iter().copied());
        self.pool_values.sort_unstable();
        for (slot, &value) in self.pool_values.iter().enumerate() {
            let _ = self.pool_slots.insert(value, slot);
        }
        self.pool_len = self.pool_values.len();

        // Two variables fixed to the same value is a root conflict.
        let mut seen = HashSet::default();
        taken.iter().all(|&value| seen.insert(value))
    }

    fn on_instantiate(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        level: DecisionLevel,
        _var: VariableId,
        slot: usize,
        value: i64,
        _prev_min: i64,
        _prev_max: i64,
    ) -> bool {
        self.save_once(ctx, level);

        if !self.pool_remove(value) {
            // Another variable already consumed this value.
            return false;
        }
        kabocha_assert_moderate!(self.unfixed > 0);
        self.unfixed -= 1;

        for other_slot in 0..self.vars.len() {
            if other_slot == slot {
                continue;
            }
            let other = self.vars[other_slot];
            if !ctx.is_instantiated(other) {
                ctx.enqueue_remove_value(other, value);
            }
        }

        if self.unfixed == 1 {
            let open = self.open_slot(ctx.assignments());
            return self.on_last_uninstantiated(ctx, level, open);
        }
        true
    }

    fn on_last_uninstantiated(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        _level: DecisionLevel,
        last_slot: usize,
    ) -> bool {
        // Intersect the last open domain with the pool.
        let var = self.vars[last_slot];
        for value in ctx.values_of(var) {
            if !self.pool_contains(value) {
                ctx.enqueue_remove_value(var, value);
            }
        }
        true
    }

    fn is_satisfied(&self, assignments: &Assignments) -> Option<bool> {
        let mut seen = HashSet::default();
        let mut all_fixed = true;
        for &var in &self.vars {
            if assignments.is_instantiated(var) {
                if !seen.insert(assignments.value(var)) {
                    return Some(false);
                }
            } else {
                all_fixed = false;
            }
        }
        if all_fixed {
            Some(true)
        } else {
            None
        }
    }

    fn restore_state(&mut self, state: ConstraintState) {
        if let ConstraintState::Pool { pool_len, unfixed } = state {
            self.pool_len = pool_len;
            self.unfixed = unfixed;
        }
    }

    fn rewind_to(&mut self, _save_point: DecisionLevel) {
        self.last_saved_level = NO_SAVED_LEVEL;
    }
}

#[cfg(test)]
mod tests {
    use crate::constraints::all_different;
    use crate::engine::test_helper::TestHarness;

    #[test]
    fn instantiation_forward_checks_the_value() {
        let mut harness = TestHarness::new();
        let a = harness.new_variable(1, 3);
        let b = harness.new_variable(1, 3);
        let c = harness.new_variable(1, 3);
        harness.post(all_different(vec![a, b, c]));

        assert!(harness.prepare());
        assert!(harness.decide(a, 2));
        assert!(!harness.contains(b, 2));
        assert!(!harness.contains(c, 2));
    }

    #[test]
    fn forced_chain_instantiates_the_last_variable() {
        let mut harness = TestHarness::new();
        let a = harness.new_variable(1, 3);
        let b = harness.new_variable(1, 3);
        let c = harness.new_variable(1, 3);
        harness.post(all_different(vec![a, b, c]));

        assert!(harness.prepare());
        assert!(harness.decide(a, 1));
        assert!(harness.decide(b, 2));
        // b and a consumed 1 and 2, so c collapsed to 3 through forward checking.
        assert_eq!(harness.value(c), Some(3));
    }

    #[test]
    fn pigeonhole_is_detected_in_presolve() {
        let mut harness = TestHarness::new();
        let a = harness.new_variable(1, 2);
        let b = harness.new_variable(1, 2);
        let c = harness.new_variable(1, 2);
        harness.post(all_different(vec![a, b, c]));

        assert!(!harness.prepare());
    }

    #[test]
    fn backtracking_restores_the_pool() {
        let mut harness = TestHarness::new();
        let a = harness.new_variable(1, 3);
        let b = harness.new_variable(1, 3);
        let c = harness.new_variable(1, 3);
        harness.post(all_different(vec![a, b, c]));

        assert!(harness.prepare());
        assert!(harness.decide(a, 1));
        harness.backtrack_to(0);

        // The value is available again after the rewind.
        assert!(harness.decide(b, 1));
        assert!(!harness.contains(a, 1));
        assert!(!harness.contains(c, 1));
    }

    #[test]
    fn repeated_variable_is_infeasible() {
        let mut harness = TestHarness::new();
        let a = harness.new_variable(1, 3);
        harness.post(all_different(vec![a, a]));

        assert!(!harness.prepare());
    }
}
