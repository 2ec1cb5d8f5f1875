//! Linear constraints over integer variables: `sum(c[i] * x[i]) <op> rhs`.
//!
//! The equality and inequality forms keep three running scalars that are updated in O(1) per
//! event: the sum over instantiated terms, and the minimal/maximal achievable contribution of the
//! still-open terms. Bound derivations for each open variable follow from those scalars. The
//! scalars are snapshotted on the first change per decision level.

use enumset::enum_set;
use enumset::EnumSet;

use super::div_ceil;
use super::div_floor;
use super::Constraint;
use super::ConstraintState;
use super::PropagationContext;
use crate::engine::assignments::Assignments;
use crate::engine::domains::DomainEvent;
use crate::engine::variables::DecisionLevel;
use crate::engine::variables::VariableId;
use crate::engine::variables::NO_SAVED_LEVEL;
use crate::kabocha_assert_moderate;
use crate::kabocha_assert_simple;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinearOp {
    /// `sum == rhs`
    Eq,
    /// `sum <= rhs`
    Le,
}

/// `sum(c[i] * x[i]) == rhs` or `sum(c[i] * x[i]) <= rhs`.
#[derive(Debug)]
pub struct IntLinear {
    op: LinearOp,
    coefficients: Vec<i64>,
    vars: Vec<VariableId>,
    rhs: i64,

    /// Sum of `c[i] * value(x[i])` over instantiated slots.
    fixed_sum: i64,
    /// Smallest achievable sum of the open slots' contributions.
    min_potential: i64,
    /// Largest achievable sum of the open slots' contributions.
    max_potential: i64,
    /// Number of slots whose variable is not yet instantiated.
    unfixed: usize,
    last_saved_level: DecisionLevel,
}

/// Creates the constraint `sum(coefficients[i] * vars[i]) == rhs`.
pub fn int_lin_eq(coefficients: Vec<i64>, vars: Vec<VariableId>, rhs: i64) -> IntLinear {
    IntLinear::new(LinearOp::Eq, coefficients, vars, rhs)
}

/// Creates the constraint `sum(coefficients[i] * vars[i]) <= rhs`.
pub fn int_lin_le(coefficients: Vec<i64>, vars: Vec<VariableId>, rhs: i64) -> IntLinear {
    IntLinear::new(LinearOp::Le, coefficients, vars, rhs)
}

impl IntLinear {
    fn new(op: LinearOp, coefficients: Vec<i64>, vars: Vec<VariableId>, rhs: i64) -> Self {
        kabocha_assert_simple!(
            coefficients.len() == vars.len(),
            "every variable needs a coefficient"
        );
        kabocha_assert_simple!(coefficients.iter().all(|&c| c != 0), "zero coefficients are not allowed");

        IntLinear {
            op,
            coefficients,
            vars,
            rhs,
            fixed_sum: 0,
            min_potential: 0,
            max_potential: 0,
            unfixed: 0,
            last_saved_level: NO_SAVED_LEVEL,
        }
    }

    /// Smallest contribution slot `i` can make given the current bounds of its variable.
    fn min_contribution(&self, assignments: &Assignments, slot: usize) -> i64 {
        let c = self.coefficients[slot];
        if c >= 0 {
            c * assignments.lower_bound(self.vars[slot])
        } else {
            c * assignments.upper_bound(self.vars[slot])
        }
    }

    fn max_contribution(&self, assignments: &Assignments, slot: usize) -> i64 {
        let c = self.coefficients[slot];
        if c >= 0 {
            c * assignments.upper_bound(self.vars[slot])
        } else {
            c * assignments.lower_bound(self.vars[slot])
        }
    }

    fn recompute(&mut self, assignments: &Assignments) {
        self.fixed_sum = 0;
        self.min_potential = 0;
        self.max_potential = 0;
        self.unfixed = 0;
        for slot in 0..self.vars.len() {
            if assignments.is_instantiated(self.vars[slot]) {
                self.fixed_sum += self.coefficients[slot] * assignments.value(self.vars[slot]);
            } else {
                self.min_potential += self.min_contribution(assignments, slot);
                self.max_potential += self.max_contribution(assignments, slot);
                self.unfixed += 1;
            }
        }
    }

    fn is_feasible(&self) -> bool {
        let reachable_min = self.fixed_sum + self.min_potential;
        match self.op {
            LinearOp::Eq => reachable_min <= self.rhs && self.rhs <= self.fixed_sum + self.max_potential,
            LinearOp::Le => reachable_min <= self.rhs,
        }
    }

    fn save_once(&mut self, ctx: &mut PropagationContext<'_>, level: DecisionLevel) {
        if self.last_saved_level == level {
            return;
        }
        self.last_saved_level = level;
        ctx.save_state(
            level,
            ConstraintState::Linear {
                fixed_sum: self.fixed_sum,
                min_potential: self.min_potential,
                max_potential: self.max_potential,
                unfixed: self.unfixed,
            },
        );
        ctx.mark_dirty(level);
    }

    /// Enqueues bound updates for every open slot from the current scalars.
    fn prune_open_slots(&self, ctx: &mut PropagationContext<'_>) {
        for slot in 0..self.vars.len() {
            let var = self.vars[slot];
            if ctx.is_instantiated(var) {
                continue;
            }
            let c = self.coefficients[slot];
            let rest_min = self.min_potential - self.min_contribution(ctx.assignments(), slot);
            // The contribution of this slot must fit in [low, high].
            let high = self.rhs - self.fixed_sum - rest_min;
            match self.op {
                LinearOp::Eq => {
                    let rest_max =
                        self.max_potential - self.max_contribution(ctx.assignments(), slot);
                    let low = self.rhs - self.fixed_sum - rest_max;
                    if c > 0 {
                        ctx.enqueue_set_min(var, div_ceil(low, c));
                        ctx.enqueue_set_max(var, div_floor(high, c));
                    } else {
                        ctx.enqueue_set_min(var, div_ceil(high, c));
                        ctx.enqueue_set_max(var, div_floor(low, c));
                    }
                }
                LinearOp::Le => {
                    if c > 0 {
                        ctx.enqueue_set_max(var, div_floor(high, c));
                    } else {
                        ctx.enqueue_set_min(var, div_ceil(high, c));
                    }
                }
            }
        }
    }

    fn open_slot(&self, assignments: &Assignments) -> usize {
        self.vars
            .iter()
            .position(|&var| !assignments.is_instantiated(var))
            .expect("an open slot exists while unfixed > 0")
    }
}

impl Constraint for IntLinear {
    fn name(&self) -> &str {
        match self.op {
            LinearOp::Eq => "int_lin_eq",
            LinearOp::Le => "int_lin_le",
        }
    }

    fn variables(&self) -> &[VariableId] {
        &self.vars
    }

    fn subscriptions(&self) -> EnumSet<DomainEvent> {
        enum_set!(DomainEvent::Instantiate | DomainEvent::LowerBound | DomainEvent::UpperBound)
    }

    fn presolve(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        // Direct bounds-consistency pass; the scalars are rebuilt from scratch because the
        // incremental state only becomes live in `prepare_propagation`.
        self.recompute(ctx.assignments());
        if !self.is_feasible() {
            return false;
        }
        for slot in 0..self.vars.len() {
            let var = self.vars[slot];
            if ctx.is_instantiated(var) {
                continue;
            }
            let c = self.coefficients[slot];
            let rest_min = self.min_potential - self.min_contribution(ctx.assignments(), slot);
            let high = self.rhs - self.fixed_sum - rest_min;
            let ok = match self.op {
                LinearOp::Eq => {
                    let rest_max =
                        self.max_potential - self.max_contribution(ctx.assignments(), slot);
                    let low = self.rhs - self.fixed_sum - rest_max;
                    if c > 0 {
                        ctx.set_min(0, var, div_ceil(low, c)) && ctx.set_max(0, var, div_floor(high, c))
                    } else {
                        ctx.set_min(0, var, div_ceil(high, c)) && ctx.set_max(0, var, div_floor(low, c))
                    }
                }
                LinearOp::Le => {
                    if c > 0 {
                        ctx.set_max(0, var, div_floor(high, c))
                    } else {
                        ctx.set_min(0, var, div_ceil(high, c))
                    }
                }
            };
            if !ok {
                return false;
            }
            // The pruning may have shifted this slot's own potential.
            self.recompute(ctx.assignments());
        }
        true
    }

    fn prepare_propagation(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        self.last_saved_level = NO_SAVED_LEVEL;
        self.recompute(ctx.assignments());
        if !self.is_feasible() {
            return false;
        }
        if self.unfixed == 1 {
            let slot = self.open_slot(ctx.assignments());
            return self.on_last_uninstantiated(ctx, 0, slot);
        }
        self.prune_open_slots(ctx);
        true
    }

    fn on_instantiate(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        level: DecisionLevel,
        _var: VariableId,
        slot: usize,
        value: i64,
        prev_min: i64,
        prev_max: i64,
    ) -> bool {
        self.save_once(ctx, level);

        let c = self.coefficients[slot];
        self.fixed_sum += c * value;
        if c >= 0 {
            self.min_potential -= c * prev_min;
            self.max_potential -= c * prev_max;
        } else {
            self.min_potential -= c * prev_max;
            self.max_potential -= c * prev_min;
        }
        kabocha_assert_moderate!(self.unfixed > 0);
        self.unfixed -= 1;

        if !self.is_feasible() {
            return false;
        }
        match self.unfixed {
            0 => self.on_final_instantiate(ctx.assignments()),
            1 => {
                let open = self.open_slot(ctx.assignments());
                self.on_last_uninstantiated(ctx, level, open)
            }
            _ => {
                self.prune_open_slots(ctx);
                true
            }
        }
    }

    fn on_set_min(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        level: DecisionLevel,
        _var: VariableId,
        slot: usize,
        new_min: i64,
        prev_min: i64,
    ) -> bool {
        self.save_once(ctx, level);

        let c = self.coefficients[slot];
        if c >= 0 {
            self.min_potential += c * (new_min - prev_min);
        } else {
            self.max_potential += c * (new_min - prev_min);
        }
        if !self.is_feasible() {
            return false;
        }
        self.prune_open_slots(ctx);
        true
    }

    fn on_set_max(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        level: DecisionLevel,
        _var: VariableId,
        slot: usize,
        new_max: i64,
        prev_max: i64,
    ) -> bool {
        self.save_once(ctx, level);

        let c = self.coefficients[slot];
        if c >= 0 {
            self.max_potential += c * (new_max - prev_max);
        } else {
            self.min_potential += c * (new_max - prev_max);
        }
        if !self.is_feasible() {
            return false;
        }
        self.prune_open_slots(ctx);
        true
    }

    fn on_last_uninstantiated(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        _level: DecisionLevel,
        last_slot: usize,
    ) -> bool {
        let var = self.vars[last_slot];
        let c = self.coefficients[last_slot];
        let remaining = self.rhs - self.fixed_sum;
        match self.op {
            LinearOp::Eq => {
                // The last term is solved exactly.
                if remaining % c != 0 {
                    return false;
                }
                let value = remaining / c;
                if !ctx.contains(var, value) {
                    return false;
                }
                ctx.enqueue_instantiate(var, value);
                true
            }
            LinearOp::Le => {
                if c > 0 {
                    ctx.enqueue_set_max(var, div_floor(remaining, c));
                } else {
                    ctx.enqueue_set_min(var, div_ceil(remaining, c));
                }
                true
            }
        }
    }

    fn on_final_instantiate(&mut self, _assignments: &Assignments) -> bool {
        match self.op {
            LinearOp::Eq => self.fixed_sum == self.rhs,
            LinearOp::Le => self.fixed_sum <= self.rhs,
        }
    }

    fn is_satisfied(&self, assignments: &Assignments) -> Option<bool> {
        let mut total_min = 0;
        let mut total_max = 0;
        for slot in 0..self.vars.len() {
            total_min += self.min_contribution(assignments, slot);
            total_max += self.max_contribution(assignments, slot);
        }
        match self.op {
            LinearOp::Eq => {
                if total_min == total_max {
                    Some(total_min == self.rhs)
                } else if self.rhs < total_min || self.rhs > total_max {
                    Some(false)
                } else {
                    None
                }
            }
            LinearOp::Le => {
                if total_max <= self.rhs {
                    Some(true)
                } else if total_min > self.rhs {
                    Some(false)
                } else {
                    None
                }
            }
        }
    }

    fn restore_state(&mut self, state: ConstraintState) {
        if let ConstraintState::Linear {
            fixed_sum,
            min_potential,
            max_potential,
            unfixed,
        } = state
        {
            self.fixed_sum = fixed_sum;
            self.min_potential = min_potential;
            self.max_potential = max_potential;
            self.unfixed = unfixed;
        }
    }

    fn rewind_to(&mut self, _save_point: DecisionLevel) {
        self.last_saved_level = NO_SAVED_LEVEL;
    }
}

/// `sum(c[i] * x[i]) != rhs`; only propagates once a single term is open.
#[derive(Debug)]
pub struct IntLinearNe {
    coefficients: Vec<i64>,
    vars: Vec<VariableId>,
    rhs: i64,
    fixed_sum: i64,
    unfixed: usize,
    last_saved_level: DecisionLevel,
}

/// Creates the constraint `sum(coefficients[i] * vars[i]) != rhs`.
pub fn int_lin_ne(coefficients: Vec<i64>, vars: Vec<VariableId>, rhs: i64) -> IntLinearNe {
    kabocha_assert_simple!(coefficients.len() == vars.len());
    kabocha_assert_simple!(coefficients.iter().all(|&c| c != 0));

    IntLinearNe {
        coefficients,
        vars,
        rhs,
        fixed_sum: 0,
        unfixed: 0,
        last_saved_level: NO_SAVED_LEVEL,
    }
}

impl IntLinearNe {
    fn recompute(&mut self, assignments: &Assignments) {
        self.fixed_sum = 0;
        self.unfixed = 0;
        for slot in 0..self.vars.len() {
            if assignments.is_instantiated(self.vars[slot]) {
                self.fixed_sum += self.coefficients[slot] * assignments.value(self.vars[slot]);
            } else {
                self.unfixed += 1;
            }
        }
    }

    /// With one open term, the forbidden value (if integral) is removed from its domain.
    fn exclude_forbidden_value(&self, ctx: &mut PropagationContext<'_>) {
        let slot = self
            .vars
            .iter()
            .position(|&var| !ctx.is_instantiated(var))
            .expect("an open slot exists while unfixed == 1");
        let c = self.coefficients[slot];
        let remaining = self.rhs - self.fixed_sum;
        if remaining % c == 0 {
            ctx.enqueue_remove_value(self.vars[slot], remaining / c);
        }
    }
}

impl Constraint for IntLinearNe {
    fn name(&self) -> &str {
        "int_lin_ne"
    }

    fn variables(&self) -> &[VariableId] {
        &self.vars
    }

    fn subscriptions(&self) -> EnumSet<DomainEvent> {
        enum_set!(DomainEvent::Instantiate)
    }

    fn presolve(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        self.recompute(ctx.assignments());
        if self.unfixed == 0 {
            return self.fixed_sum != self.rhs;
        }
        if self.unfixed == 1 {
            let slot = self
                .vars
                .iter()
                .position(|&var| !ctx.is_instantiated(var))
                .expect("checked unfixed == 1");
            let c = self.coefficients[slot];
            let remaining = self.rhs - self.fixed_sum;
            if remaining % c == 0 {
                return ctx.remove_value(0, self.vars[slot], remaining / c);
            }
        }
        true
    }

    fn prepare_propagation(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        self.last_saved_level = NO_SAVED_LEVEL;
        self.recompute(ctx.assignments());
        if self.unfixed == 0 {
            return self.fixed_sum != self.rhs;
        }
        if self.unfixed == 1 {
            self.exclude_forbidden_value(ctx);
        }
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
        if self.last_saved_level != level {
            self.last_saved_level = level;
            ctx.save_state(
                level,
                ConstraintState::Linear {
                    fixed_sum: self.fixed_sum,
                    min_potential: 0,
                    max_potential: 0,
                    unfixed: self.unfixed,
                },
            );
            ctx.mark_dirty(level);
        }

        self.fixed_sum += self.coefficients[slot] * value;
        kabocha_assert_moderate!(self.unfixed > 0);
        self.unfixed -= 1;

        match self.unfixed {
            0 => self.fixed_sum != self.rhs,
            1 => {
                self.exclude_forbidden_value(ctx);
                true
            }
            _ => true,
        }
    }

    fn is_satisfied(&self, assignments: &Assignments) -> Option<bool> {
        let mut total_min = 0;
        let mut total_max = 0;
        for slot in 0..self.vars.len() {
            let c = self.coefficients[slot];
            let (low, high) = (
                assignments.lower_bound(self.vars[slot]),
                assignments.upper_bound(self.vars[slot]),
            );
            if c >= 0 {
                total_min += c * low;
                total_max += c * high;
            } else {
                total_min += c * high;
                total_max += c * low;
            }
        }
        if total_min == total_max {
            Some(total_min != self.rhs)
        } else if self.rhs < total_min || self.rhs > total_max {
            Some(true)
        } else {
            None
        }
    }

    fn restore_state(&mut self, state: ConstraintState) {
        if let ConstraintState::Linear {
            fixed_sum, unfixed, ..
        } = state
        {
            self.fixed_sum = fixed_sum;
            self.unfixed = unfixed;
        }
    }

    fn rewind_to(&mut self, _save_point: DecisionLevel) {
        self.last_saved_level = NO_SAVED_LEVEL;
    }
}

#[cfg(test)]
mod tests {
    use crate::constraints::int_lin_eq;
    use crate::constraints::int_lin_le;
    use crate::constraints::int_lin_ne;
    use crate::engine::test_helper::TestHarness;

    #[test]
    fn equality_tightens_bounds_at_the_root() {
        let mut harness = TestHarness::new();
        let x = harness.new_variable(0, 9);
        let y = harness.new_variable(0, 9);
        harness.post(int_lin_eq(vec![1, 1], vec![x, y], 3));

        assert!(harness.prepare());
        harness.assert_bounds(x, 0, 3);
        harness.assert_bounds(y, 0, 3);
    }

    #[test]
    fn fixing_all_but_one_variable_solves_the_last_exactly() {
        let mut harness = TestHarness::new();
        let x = harness.new_variable(0, 9);
        let y = harness.new_variable(0, 9);
        let z = harness.new_variable(0, 9);
        harness.post(int_lin_eq(vec![1, 1, 1], vec![x, y, z], 5));

        assert!(harness.prepare());
        assert!(harness.decide(x, 0));
        assert!(harness.decide(y, 0));
        assert_eq!(harness.value(z), Some(5));
    }

    #[test]
    fn unreachable_target_fails() {
        let mut harness = TestHarness::new();
        let x = harness.new_variable(0, 2);
        let y = harness.new_variable(0, 2);
        harness.post(int_lin_eq(vec![1, 1], vec![x, y], 9));

        assert!(!harness.prepare());
    }

    #[test]
    fn negative_coefficients_bound_from_the_other_side() {
        let mut harness = TestHarness::new();
        let x = harness.new_variable(0, 10);
        let y = harness.new_variable(0, 10);
        // x - y <= -4, so x <= y - 4.
        harness.post(int_lin_le(vec![1, -1], vec![x, y], -4));

        assert!(harness.prepare());
        harness.assert_bounds(x, 0, 6);
        harness.assert_bounds(y, 4, 10);

        assert!(harness.decide(y, 5));
        assert_eq!(harness.upper_bound(x), 1);
    }

    #[test]
    fn disequality_excludes_the_completing_value() {
        let mut harness = TestHarness::new();
        let x = harness.new_variable(0, 5);
        let y = harness.new_variable(0, 5);
        harness.post(int_lin_ne(vec![1, 1], vec![x, y], 4));

        assert!(harness.prepare());
        assert!(harness.decide(x, 1));
        assert!(!harness.contains(y, 3));
        assert!(harness.contains(y, 2));
    }

    #[test]
    fn backtracking_restores_the_running_scalars() {
        let mut harness = TestHarness::new();
        let x = harness.new_variable(0, 9);
        let y = harness.new_variable(0, 9);
        let z = harness.new_variable(0, 9);
        harness.post(int_lin_eq(vec![1, 1, 1], vec![x, y, z], 5));

        assert!(harness.prepare());
        assert!(harness.decide(x, 5));
        assert_eq!(harness.value(y), Some(0));
        assert_eq!(harness.value(z), Some(0));

        harness.backtrack_to(0);
        // After the rewind the same deduction chain works again.
        assert!(harness.decide(x, 2));
        harness.assert_bounds(y, 0, 3);
        harness.assert_bounds(z, 0, 3);
    }
}
