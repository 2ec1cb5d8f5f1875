//! Boolean constraints over 0/1 integer variables: `array_bool_and`, `array_bool_or` and
//! `bool_clause`.
//!
//! All three watch two positions among the literals that can still satisfy their obligation.
//! Only when a watched position is falsified does any work happen: the watch moves to another
//! candidate, or the remaining candidate is propagated as a unit, or the constraint reports
//! failure. The watched pair is the only trailed state.

use enumset::enum_set;
use enumset::EnumSet;

use super::Constraint;
use super::ConstraintState;
use super::PropagationContext;
use crate::engine::assignments::Assignments;
use crate::engine::domains::DomainEvent;
use crate::engine::variables::DecisionLevel;
use crate::engine::variables::VariableId;
use crate::engine::variables::NO_SAVED_LEVEL;

/// The trailed watch pair shared by the boolean propagators.
#[derive(Debug)]
struct WatchPair {
    w1: usize,
    w2: usize,
    last_saved_level: DecisionLevel,
}

impl WatchPair {
    fn new() -> Self {
        WatchPair {
            w1: 0,
            w2: 0,
            last_saved_level: NO_SAVED_LEVEL,
        }
    }

    fn save_once(&mut self, ctx: &mut PropagationContext<'_>, level: DecisionLevel) {
        if self.last_saved_level == level {
            return;
        }
        self.last_saved_level = level;
        ctx.save_state(
            level,
            ConstraintState::Watches {
                w1: self.w1,
                w2: self.w2,
            },
        );
        ctx.mark_dirty(level);
    }

    fn restore(&mut self, state: ConstraintState) {
        if let ConstraintState::Watches { w1, w2 } = state {
            self.w1 = w1;
            self.w2 = w2;
        }
    }

    fn reset(&mut self) {
        self.w1 = 0;
        self.w2 = 0;
        self.last_saved_level = NO_SAVED_LEVEL;
    }

    fn is_watched(&self, position: usize) -> bool {
        self.w1 == position || self.w2 == position
    }
}

/// `r = b[0] /\ ... /\ b[n-1]` over 0/1 variables.
#[derive(Debug)]
pub struct ArrayBoolAnd {
    /// The conjuncts followed by `r`.
    vars: Vec<VariableId>,
    watches: WatchPair,
}

/// Creates the constraint `r = and(bools)`.
pub fn array_bool_and(bools: Vec<VariableId>, r: VariableId) -> ArrayBoolAnd {
    let mut vars = bools;
    vars.push(r);
    ArrayBoolAnd {
        vars,
        watches: WatchPair::new(),
    }
}

impl ArrayBoolAnd {
    fn num_bools(&self) -> usize {
        self.vars.len() - 1
    }

    fn r(&self) -> VariableId {
        self.vars[self.num_bools()]
    }

    fn can_be_zero(&self, ctx: &PropagationContext<'_>, position: usize) -> bool {
        ctx.contains(self.vars[position], 0)
    }

    /// Restores the watch invariant over zero-capable conjuncts and draws the conclusions that
    /// follow when fewer than two remain.
    fn refresh_watches(&mut self, ctx: &mut PropagationContext<'_>, level: DecisionLevel) {
        let n = self.num_bools();
        if n == 0 {
            ctx.enqueue_instantiate(self.r(), 1);
            return;
        }

        if !self.can_be_zero(ctx, self.watches.w1) {
            let other = self.watches.w2;
            if let Some(new_w1) = (0..n).find(|&i| i != other && self.can_be_zero(ctx, i)) {
                self.watches.save_once(ctx, level);
                self.watches.w1 = new_w1;
            }
        }
        if !self.can_be_zero(ctx, self.watches.w2) {
            let other = self.watches.w1;
            if let Some(new_w2) = (0..n).find(|&i| i != other && self.can_be_zero(ctx, i)) {
                self.watches.save_once(ctx, level);
                self.watches.w2 = new_w2;
            }
        }

        let w1_ok = self.can_be_zero(ctx, self.watches.w1);
        let w2_ok = self.can_be_zero(ctx, self.watches.w2);
        if !w1_ok && !w2_ok {
            // Every conjunct is one.
            ctx.enqueue_instantiate(self.r(), 1);
        } else if self.watches.w1 == self.watches.w2 || !w1_ok || !w2_ok {
            // A single candidate is left; with r = 0 it must be the zero.
            let r = self.r();
            if ctx.is_instantiated(r) && ctx.value(r) == 0 {
                let unit = if w1_ok { self.watches.w1 } else { self.watches.w2 };
                ctx.enqueue_instantiate(self.vars[unit], 0);
            }
        }
    }
}

impl Constraint for ArrayBoolAnd {
    fn name(&self) -> &str {
        "array_bool_and"
    }

    fn variables(&self) -> &[VariableId] {
        &self.vars
    }

    fn subscriptions(&self) -> EnumSet<DomainEvent> {
        enum_set!(DomainEvent::Instantiate)
    }

    fn presolve(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        self.vars
            .iter()
            .all(|&var| ctx.set_min(0, var, 0) && ctx.set_max(0, var, 1))
    }

    fn prepare_propagation(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        self.watches.reset();
        let n = self.num_bools();
        self.watches.w1 = (0..n).find(|&i| self.can_be_zero(ctx, i)).unwrap_or(0);
        self.watches.w2 = (self.watches.w1 + 1..n)
            .find(|&i| self.can_be_zero(ctx, i))
            .unwrap_or(self.watches.w1);

        let r = self.r();
        if ctx.is_instantiated(r) && ctx.value(r) == 1 {
            for position in 0..n {
                ctx.enqueue_instantiate(self.vars[position], 1);
            }
        }
        if (0..n).any(|i| ctx.is_instantiated(self.vars[i]) && ctx.value(self.vars[i]) == 0) {
            ctx.enqueue_instantiate(r, 0);
        }
        self.refresh_watches(ctx, 0);
        true
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
        if slot == self.num_bools() {
            if value == 1 {
                for position in 0..self.num_bools() {
                    ctx.enqueue_instantiate(self.vars[position], 1);
                }
            } else {
                self.refresh_watches(ctx, level);
            }
        } else if value == 0 {
            ctx.enqueue_instantiate(self.r(), 0);
        } else if self.watches.is_watched(slot) {
            self.refresh_watches(ctx, level);
        }
        true
    }

    fn is_satisfied(&self, assignments: &Assignments) -> Option<bool> {
        let n = self.num_bools();
        let mut any_zero = false;
        let mut all_ones = true;
        for position in 0..n {
            let var = self.vars[position];
            if assignments.is_instantiated(var) {
                if assignments.value(var) == 0 {
                    any_zero = true;
                }
            } else {
                all_ones = false;
            }
        }
        let conjunction = if any_zero {
            Some(0)
        } else if all_ones {
            Some(1)
        } else {
            None
        };
        let r = self.r();
        match (conjunction, assignments.is_instantiated(r)) {
            (Some(value), true) => Some(value == assignments.value(r)),
            _ => None,
        }
    }

    fn restore_state(&mut self, state: ConstraintState) {
        self.watches.restore(state);
    }

    fn rewind_to(&mut self, _save_point: DecisionLevel) {
        self.watches.last_saved_level = NO_SAVED_LEVEL;
    }
}

/// `r = b[0] \/ ... \/ b[n-1]` over 0/1 variables.
#[derive(Debug)]
pub struct ArrayBoolOr {
    /// The disjuncts followed by `r`.
    vars: Vec<VariableId>,
    watches: WatchPair,
}

/// Creates the constraint `r = or(bools)`.
pub fn array_bool_or(bools: Vec<VariableId>, r: VariableId) -> ArrayBoolOr {
    let mut vars = bools;
    vars.push(r);
    ArrayBoolOr {
        vars,
        watches: WatchPair::new(),
    }
}

impl ArrayBoolOr {
    fn num_bools(&self) -> usize {
        self.vars.len() - 1
    }

    fn r(&self) -> VariableId {
        self.vars[self.num_bools()]
    }

    fn can_be_one(&self, ctx: &PropagationContext<'_>, position: usize) -> bool {
        ctx.contains(self.vars[position], 1)
    }

    fn refresh_watches(&mut self, ctx: &mut PropagationContext<'_>, level: DecisionLevel) {
        let n = self.num_bools();
        if n == 0 {
            ctx.enqueue_instantiate(self.r(), 0);
            return;
        }

        if !self.can_be_one(ctx, self.watches.w1) {
            let other = self.watches.w2;
            if let Some(new_w1) = (0..n).find(|&i| i != other && self.can_be_one(ctx, i)) {
                self.watches.save_once(ctx, level);
                self.watches.w1 = new_w1;
            }
        }
        if !self.can_be_one(ctx, self.watches.w2) {
            let other = self.watches.w1;
            if let Some(new_w2) = (0..n).find(|&i| i != other && self.can_be_one(ctx, i)) {
                self.watches.save_once(ctx, level);
                self.watches.w2 = new_w2;
            }
        }

        let w1_ok = self.can_be_one(ctx, self.watches.w1);
        let w2_ok = self.can_be_one(ctx, self.watches.w2);
        if !w1_ok && !w2_ok {
            // Every disjunct is zero.
            ctx.enqueue_instantiate(self.r(), 0);
        } else if self.watches.w1 == self.watches.w2 || !w1_ok || !w2_ok {
            let r = self.r();
            if ctx.is_instantiated(r) && ctx.value(r) == 1 {
                let unit = if w1_ok { self.watches.w1 } else { self.watches.w2 };
                ctx.enqueue_instantiate(self.vars[unit], 1);
            }
        }
    }
}

impl Constraint for ArrayBoolOr {
    fn name(&self) -> &str {
        "array_bool_or"
    }

    fn variables(&self) -> &[VariableId] {
        &self.vars
    }

    fn subscriptions(&self) -> EnumSet<DomainEvent> {
        enum_set!(DomainEvent::Instantiate)
    }

    fn presolve(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        self.vars
            .iter()
            .all(|&var| ctx.set_min(0, var, 0) && ctx.set_max(0, var, 1))
    }

    fn prepare_propagation(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        self.watches.reset();
        let n = self.num_bools();
        self.watches.w1 = (0..n).find(|&i| self.can_be_one(ctx, i)).unwrap_or(0);
        self.watches.w2 = (self.watches.w1 + 1..n)
            .find(|&i| self.can_be_one(ctx, i))
            .unwrap_or(self.watches.w1);

        let r = self.r();
        if ctx.is_instantiated(r) && ctx.value(r) == 0 {
            for position in 0..n {
                ctx.enqueue_instantiate(self.vars[position], 0);
            }
        }
        if (0..n).any(|i| ctx.is_instantiated(self.vars[i]) && ctx.value(self.vars[i]) == 1) {
            ctx.enqueue_instantiate(r, 1);
        }
        self.refresh_watches(ctx, 0);
        true
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
        if slot == self.num_bools() {
            if value == 0 {
                for position in 0..self.num_bools() {
                    ctx.enqueue_instantiate(self.vars[position], 0);
                }
            } else {
                self.refresh_watches(ctx, level);
            }
        } else if value == 1 {
            ctx.enqueue_instantiate(self.r(), 1);
        } else if self.watches.is_watched(slot) {
            self.refresh_watches(ctx, level);
        }
        true
    }

    fn is_satisfied(&self, assignments: &Assignments) -> Option<bool> {
        let n = self.num_bools();
        let mut any_one = false;
        let mut all_zeros = true;
        for position in 0..n {
            let var = self.vars[position];
            if assignments.is_instantiated(var) {
                if assignments.value(var) == 1 {
                    any_one = true;
                }
            } else {
                all_zeros = false;
            }
        }
        let disjunction = if any_one {
            Some(1)
        } else if all_zeros {
            Some(0)
        } else {
            None
        };
        let r = self.r();
        match (disjunction, assignments.is_instantiated(r)) {
            (Some(value), true) => Some(value == assignments.value(r)),
            _ => None,
        }
    }

    fn restore_state(&mut self, state: ConstraintState) {
        self.watches.restore(state);
    }

    fn rewind_to(&mut self, _save_point: DecisionLevel) {
        self.watches.last_saved_level = NO_SAVED_LEVEL;
    }
}

/// The clause `pos[0] \/ ... \/ pos[m] \/ !neg[0] \/ ... \/ !neg[k]`.
#[derive(Debug)]
pub struct BoolClause {
    /// Positive literals followed by negative literals.
    vars: Vec<VariableId>,
    num_pos: usize,
    watches: WatchPair,
    /// Set when a variable occurs both positively and negatively.
    entailed_at_root: bool,
}

/// Creates the clause "some `pos` is true or some `neg` is false".
pub fn bool_clause(pos: Vec<VariableId>, neg: Vec<VariableId>) -> BoolClause {
    let num_pos = pos.len();
    let mut vars = pos;
    vars.extend(neg);
    BoolClause {
        vars,
        num_pos,
        watches: WatchPair::new(),
        entailed_at_root: false,
    }
}

impl BoolClause {
    /// The value of the literal's variable that satisfies the clause.
    fn satisfying_value(&self, position: usize) -> i64 {
        if position < self.num_pos {
            1
        } else {
            0
        }
    }

    fn can_satisfy(&self, ctx: &PropagationContext<'_>, position: usize) -> bool {
        ctx.contains(self.vars[position], self.satisfying_value(position))
    }

    fn is_satisfied_by(&self, ctx: &PropagationContext<'_>, position: usize) -> bool {
        let var = self.vars[position];
        ctx.is_instantiated(var) && ctx.value(var) == self.satisfying_value(position)
    }

    fn refresh_watches(&mut self, ctx: &mut PropagationContext<'_>, level: DecisionLevel) -> bool {
        if !self.can_satisfy(ctx, self.watches.w1) {
            let other = self.watches.w2;
            if let Some(new_w1) =
                (0..self.vars.len()).find(|&i| i != other && self.can_satisfy(ctx, i))
            {
                self.watches.save_once(ctx, level);
                self.watches.w1 = new_w1;
            }
        }
        if !self.can_satisfy(ctx, self.watches.w2) {
            let other = self.watches.w1;
            if let Some(new_w2) =
                (0..self.vars.len()).find(|&i| i != other && self.can_satisfy(ctx, i))
            {
                self.watches.save_once(ctx, level);
                self.watches.w2 = new_w2;
            }
        }

        let w1_ok = self.can_satisfy(ctx, self.watches.w1);
        let w2_ok = self.can_satisfy(ctx, self.watches.w2);
        if !w1_ok && !w2_ok {
            // Every literal is falsified.
            return false;
        }
        if self.watches.w1 == self.watches.w2 || !w1_ok || !w2_ok {
            // Exactly one literal can still satisfy the clause.
            let unit = if w1_ok { self.watches.w1 } else { self.watches.w2 };
            ctx.enqueue_instantiate(self.vars[unit], self.satisfying_value(unit));
        }
        true
    }
}

impl Constraint for BoolClause {
    fn name(&self) -> &str {
        "bool_clause"
    }

    fn variables(&self) -> &[VariableId] {
        &self.vars
    }

    fn subscriptions(&self) -> EnumSet<DomainEvent> {
        enum_set!(DomainEvent::Instantiate)
    }

    fn presolve(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        if !self
            .vars
            .iter()
            .all(|&var| ctx.set_min(0, var, 0) && ctx.set_max(0, var, 1))
        {
            return false;
        }
        // A variable on both sides satisfies the clause whatever its value.
        let (pos, neg) = self.vars.split_at(self.num_pos);
        self.entailed_at_root = pos.iter().any(|var| neg.contains(var));
        true
    }

    fn prepare_propagation(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        if self.entailed_at_root {
            return true;
        }
        if self.vars.is_empty() {
            return false;
        }
        self.watches.reset();
        let count = self.vars.len();
        self.watches.w1 = (0..count).find(|&i| self.can_satisfy(ctx, i)).unwrap_or(0);
        self.watches.w2 = (self.watches.w1 + 1..count)
            .find(|&i| self.can_satisfy(ctx, i))
            .unwrap_or(self.watches.w1);
        self.refresh_watches(ctx, 0)
    }

    fn on_instantiate(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        level: DecisionLevel,
        _var: VariableId,
        slot: usize,
        _value: i64,
        _prev_min: i64,
        _prev_max: i64,
    ) -> bool {
        if self.entailed_at_root || self.is_satisfied_by(ctx, slot) {
            return true;
        }
        if self.watches.is_watched(slot) {
            return self.refresh_watches(ctx, level);
        }
        true
    }

    fn is_satisfied(&self, assignments: &Assignments) -> Option<bool> {
        if self.entailed_at_root {
            return Some(true);
        }
        let mut all_falsified = true;
        for position in 0..self.vars.len() {
            let var = self.vars[position];
            if assignments.is_instantiated(var) {
                if assignments.value(var) == self.satisfying_value(position) {
                    return Some(true);
                }
            } else {
                all_falsified = false;
            }
        }
        if all_falsified {
            Some(false)
        } else {
            None
        }
    }

    fn restore_state(&mut self, state: ConstraintState) {
        self.watches.restore(state);
    }

    fn rewind_to(&mut self, _save_point: DecisionLevel) {
        self.watches.last_saved_level = NO_SAVED_LEVEL;
    }
}

#[cfg(test)]
mod tests {
    use crate::constraints::array_bool_and;
    use crate::constraints::array_bool_or;
    use crate::constraints::bool_clause;
    use crate::engine::test_helper::TestHarness;

    #[test]
    fn conjunction_forces_all_ones_when_result_is_true() {
        let mut harness = TestHarness::new();
        let a = harness.new_variable(0, 1);
        let b = harness.new_variable(0, 1);
        let r = harness.new_variable(0, 1);
        harness.post(array_bool_and(vec![a, b], r));

        assert!(harness.prepare());
        assert!(harness.decide(r, 1));
        assert_eq!(harness.value(a), Some(1));
        assert_eq!(harness.value(b), Some(1));
    }

    #[test]
    fn conjunction_with_false_result_propagates_the_last_candidate() {
        let mut harness = TestHarness::new();
        let a = harness.new_variable(0, 1);
        let b = harness.new_variable(0, 1);
        let r = harness.new_variable(0, 0);
        harness.post(array_bool_and(vec![a, b], r));

        assert!(harness.prepare());
        assert!(harness.decide(a, 1));
        // a = 1 leaves b as the only conjunct that can be zero.
        assert_eq!(harness.value(b), Some(0));
    }

    #[test]
    fn all_ones_fix_the_conjunction_result() {
        let mut harness = TestHarness::new();
        let a = harness.new_variable(0, 1);
        let b = harness.new_variable(0, 1);
        let r = harness.new_variable(0, 1);
        harness.post(array_bool_and(vec![a, b], r));

        assert!(harness.prepare());
        assert!(harness.decide(a, 1));
        assert!(harness.decide(b, 1));
        assert_eq!(harness.value(r), Some(1));
    }

    #[test]
    fn disjunction_mirrors_the_conjunction() {
        let mut harness = TestHarness::new();
        let a = harness.new_variable(0, 1);
        let b = harness.new_variable(0, 1);
        let r = harness.new_variable(0, 1);
        harness.post(array_bool_or(vec![a, b], r));

        assert!(harness.prepare());
        assert!(harness.decide(a, 0));
        assert!(harness.decide(b, 0));
        assert_eq!(harness.value(r), Some(0));
    }

    #[test]
    fn clause_propagates_its_last_literal() {
        let mut harness = TestHarness::new();
        let a = harness.new_variable(0, 1);
        let b = harness.new_variable(0, 1);
        let c = harness.new_variable(0, 1);
        // a \/ b \/ !c
        harness.post(bool_clause(vec![a, b], vec![c]));

        assert!(harness.prepare());
        assert!(harness.decide(a, 0));
        assert!(harness.decide(b, 0));
        // Only !c can satisfy the clause.
        assert_eq!(harness.value(c), Some(0));
    }

    #[test]
    fn tautological_clause_never_propagates() {
        let mut harness = TestHarness::new();
        let a = harness.new_variable(0, 1);
        let b = harness.new_variable(0, 1);
        harness.post(bool_clause(vec![a, b], vec![a]));

        assert!(harness.prepare());
        assert!(harness.decide(a, 0));
        assert!(harness.decide(b, 0));
        // a \/ b \/ !a holds whatever the assignment.
        assert!(harness.is_model_satisfied());
    }
}
