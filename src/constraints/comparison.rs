//! Binary comparison constraints and their reified forms.
//!
//! All of these are stateless: every hook derives its prunings from the current bounds, so there
//! is nothing to snapshot and rewinding is free.

use enumset::enum_set;
use enumset::EnumSet;

use super::Constraint;
use super::PropagationContext;
use crate::engine::assignments::Assignments;
use crate::engine::domains::DomainEvent;
use crate::engine::variables::DecisionLevel;
use crate::engine::variables::VariableId;

/// The relation enforced by an [`IntComparison`] or decided by an [`IntComparisonReif`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
}

impl CompareOp {
    fn name(self) -> &'static str {
        match self {
            CompareOp::Eq => "int_eq",
            CompareOp::Ne => "int_ne",
            CompareOp::Lt => "int_lt",
            CompareOp::Le => "int_le",
        }
    }

    /// The offset that turns `lt`/`le` into `x + offset <= y`.
    fn strictness(self) -> i64 {
        match self {
            CompareOp::Lt => 1,
            _ => 0,
        }
    }
}

/// `x <op> y` over two integer variables.
#[derive(Debug)]
pub struct IntComparison {
    op: CompareOp,
    vars: [VariableId; 2],
}

/// Creates the constraint `x == y`.
pub fn int_eq(x: VariableId, y: VariableId) -> IntComparison {
    IntComparison {
        op: CompareOp::Eq,
        vars: [x, y],
    }
}

/// Creates the constraint `x != y`.
pub fn int_ne(x: VariableId, y: VariableId) -> IntComparison {
    IntComparison {
        op: CompareOp::Ne,
        vars: [x, y],
    }
}

/// Creates the constraint `x < y`.
pub fn int_lt(x: VariableId, y: VariableId) -> IntComparison {
    IntComparison {
        op: CompareOp::Lt,
        vars: [x, y],
    }
}

/// Creates the constraint `x <= y`.
pub fn int_le(x: VariableId, y: VariableId) -> IntComparison {
    IntComparison {
        op: CompareOp::Le,
        vars: [x, y],
    }
}

impl IntComparison {
    fn x(&self) -> VariableId {
        self.vars[0]
    }

    fn y(&self) -> VariableId {
        self.vars[1]
    }
}

/// Evaluates the relation from the current bounds: `Some` when decided either way, `None` when
/// still open. Sound but incomplete for `==`/`!=`, which only look at bounds and instantiation.
fn decide(op: CompareOp, assignments: &Assignments, x: VariableId, y: VariableId) -> Option<bool> {
    let (x_min, x_max) = (assignments.lower_bound(x), assignments.upper_bound(x));
    let (y_min, y_max) = (assignments.lower_bound(y), assignments.upper_bound(y));
    match op {
        CompareOp::Eq => {
            if x_min == x_max && y_min == y_max {
                Some(x_min == y_min)
            } else if x_max < y_min || x_min > y_max {
                Some(false)
            } else {
                None
            }
        }
        CompareOp::Ne => decide(CompareOp::Eq, assignments, x, y).map(|holds| !holds),
        CompareOp::Lt | CompareOp::Le => {
            let offset = op.strictness();
            if x_max + offset <= y_min {
                Some(true)
            } else if x_min + offset > y_max {
                Some(false)
            } else {
                None
            }
        }
    }
}

/// Enqueues the prunings that enforce the relation (or its negation) on the current bounds.
fn enforce(
    op: CompareOp,
    holds: bool,
    ctx: &mut PropagationContext<'_>,
    x: VariableId,
    y: VariableId,
) {
    let (x_min, x_max) = (ctx.lower_bound(x), ctx.upper_bound(x));
    let (y_min, y_max) = (ctx.lower_bound(y), ctx.upper_bound(y));
    match (op, holds) {
        (CompareOp::Eq, true) => {
            ctx.enqueue_set_min(y, x_min);
            ctx.enqueue_set_max(y, x_max);
            ctx.enqueue_set_min(x, y_min);
            ctx.enqueue_set_max(x, y_max);
        }
        (CompareOp::Eq, false) | (CompareOp::Ne, true) => {
            if x_min == x_max {
                ctx.enqueue_remove_value(y, x_min);
            } else if y_min == y_max {
                ctx.enqueue_remove_value(x, y_min);
            }
        }
        (CompareOp::Ne, false) => enforce(CompareOp::Eq, true, ctx, x, y),
        (CompareOp::Lt | CompareOp::Le, true) => {
            let offset = op.strictness();
            ctx.enqueue_set_min(y, x_min + offset);
            ctx.enqueue_set_max(x, y_max - offset);
        }
        (CompareOp::Lt | CompareOp::Le, false) => {
            // not (x + offset <= y) is y <= x - 1 + offset.
            let offset = op.strictness();
            ctx.enqueue_set_min(x, y_min + 1 - offset);
            ctx.enqueue_set_max(y, x_max - 1 + offset);
        }
    }
}

impl Constraint for IntComparison {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn variables(&self) -> &[VariableId] {
        &self.vars
    }

    fn subscriptions(&self) -> EnumSet<DomainEvent> {
        match self.op {
            CompareOp::Eq => enum_set!(
                DomainEvent::Instantiate
                    | DomainEvent::LowerBound
                    | DomainEvent::UpperBound
                    | DomainEvent::Removal
            ),
            CompareOp::Ne => enum_set!(DomainEvent::Instantiate),
            CompareOp::Lt | CompareOp::Le => enum_set!(
                DomainEvent::Instantiate | DomainEvent::LowerBound | DomainEvent::UpperBound
            ),
        }
    }

    fn presolve(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        let (x, y) = (self.x(), self.y());
        let (x_min, x_max) = (ctx.lower_bound(x), ctx.upper_bound(x));
        let (y_min, y_max) = (ctx.lower_bound(y), ctx.upper_bound(y));
        match self.op {
            CompareOp::Eq => {
                ctx.set_min(0, y, x_min)
                    && ctx.set_max(0, y, x_max)
                    && ctx.set_min(0, x, y_min)
                    && ctx.set_max(0, x, y_max)
            }
            CompareOp::Ne => {
                if x_min == x_max && y_min == y_max {
                    return x_min != y_min;
                }
                if x_min == x_max {
                    return ctx.remove_value(0, y, x_min);
                }
                if y_min == y_max {
                    return ctx.remove_value(0, x, y_min);
                }
                true
            }
            CompareOp::Lt | CompareOp::Le => {
                let offset = self.op.strictness();
                ctx.set_max(0, x, y_max - offset) && ctx.set_min(0, y, x_min + offset)
            }
        }
    }

    fn on_instantiate(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        _level: DecisionLevel,
        _var: VariableId,
        slot: usize,
        value: i64,
        _prev_min: i64,
        _prev_max: i64,
    ) -> bool {
        let other = self.vars[1 - slot];
        match self.op {
            CompareOp::Eq => ctx.enqueue_instantiate(other, value),
            CompareOp::Ne => ctx.enqueue_remove_value(other, value),
            CompareOp::Lt | CompareOp::Le => {
                let offset = self.op.strictness();
                if slot == 0 {
                    ctx.enqueue_set_min(other, value + offset);
                } else {
                    ctx.enqueue_set_max(other, value - offset);
                }
            }
        }
        true
    }

    fn on_set_min(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        _level: DecisionLevel,
        _var: VariableId,
        slot: usize,
        new_min: i64,
        _prev_min: i64,
    ) -> bool {
        match self.op {
            CompareOp::Eq => ctx.enqueue_set_min(self.vars[1 - slot], new_min),
            CompareOp::Ne => {}
            CompareOp::Lt | CompareOp::Le => {
                if slot == 0 {
                    ctx.enqueue_set_min(self.y(), new_min + self.op.strictness());
                }
            }
        }
        true
    }

    fn on_set_max(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        _level: DecisionLevel,
        _var: VariableId,
        slot: usize,
        new_max: i64,
        _prev_max: i64,
    ) -> bool {
        match self.op {
            CompareOp::Eq => ctx.enqueue_set_max(self.vars[1 - slot], new_max),
            CompareOp::Ne => {}
            CompareOp::Lt | CompareOp::Le => {
                if slot == 1 {
                    ctx.enqueue_set_max(self.x(), new_max - self.op.strictness());
                }
            }
        }
        true
    }

    fn on_remove_value(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        _level: DecisionLevel,
        _var: VariableId,
        slot: usize,
        value: i64,
    ) -> bool {
        if self.op == CompareOp::Eq {
            ctx.enqueue_remove_value(self.vars[1 - slot], value);
        }
        true
    }

    fn is_satisfied(&self, assignments: &Assignments) -> Option<bool> {
        decide(self.op, assignments, self.x(), self.y())
    }
}

/// `(x <op> y) <-> b` with a 0/1 variable `b`.
#[derive(Debug)]
pub struct IntComparisonReif {
    op: CompareOp,
    vars: [VariableId; 3],
}

/// Creates the constraint `(x == y) <-> b`.
pub fn int_eq_reif(x: VariableId, y: VariableId, b: VariableId) -> IntComparisonReif {
    IntComparisonReif {
        op: CompareOp::Eq,
        vars: [x, y, b],
    }
}

/// Creates the constraint `(x != y) <-> b`.
pub fn int_ne_reif(x: VariableId, y: VariableId, b: VariableId) -> IntComparisonReif {
    IntComparisonReif {
        op: CompareOp::Ne,
        vars: [x, y, b],
    }
}

/// Creates the constraint `(x <= y) <-> b`.
pub fn int_le_reif(x: VariableId, y: VariableId, b: VariableId) -> IntComparisonReif {
    IntComparisonReif {
        op: CompareOp::Le,
        vars: [x, y, b],
    }
}

impl IntComparisonReif {
    fn x(&self) -> VariableId {
        self.vars[0]
    }

    fn y(&self) -> VariableId {
        self.vars[1]
    }

    fn b(&self) -> VariableId {
        self.vars[2]
    }

    /// Propagates both directions from the current state; safe to re-run on any event. Conflicts
    /// surface when the enqueued updates are applied.
    fn propagate_now(&self, ctx: &mut PropagationContext<'_>) {
        let (x, y, b) = (self.x(), self.y(), self.b());
        if ctx.is_instantiated(b) {
            enforce(self.op, ctx.value(b) == 1, ctx, x, y);
        } else if let Some(holds) = decide(self.op, ctx.assignments(), x, y) {
            ctx.enqueue_instantiate(b, holds as i64);
        }
    }
}

impl Constraint for IntComparisonReif {
    fn name(&self) -> &str {
        match self.op {
            CompareOp::Eq => "int_eq_reif",
            CompareOp::Ne => "int_ne_reif",
            CompareOp::Lt => "int_lt_reif",
            CompareOp::Le => "int_le_reif",
        }
    }

    fn variables(&self) -> &[VariableId] {
        &self.vars
    }

    fn subscriptions(&self) -> EnumSet<DomainEvent> {
        enum_set!(DomainEvent::Instantiate | DomainEvent::LowerBound | DomainEvent::UpperBound)
    }

    fn presolve(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        ctx.set_min(0, self.b(), 0) && ctx.set_max(0, self.b(), 1)
    }

    fn prepare_propagation(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        self.propagate_now(ctx);
        true
    }

    fn on_instantiate(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        _level: DecisionLevel,
        _var: VariableId,
        _slot: usize,
        _value: i64,
        _prev_min: i64,
        _prev_max: i64,
    ) -> bool {
        self.propagate_now(ctx);
        true
    }

    fn on_set_min(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        _level: DecisionLevel,
        _var: VariableId,
        _slot: usize,
        _new_min: i64,
        _prev_min: i64,
    ) -> bool {
        self.propagate_now(ctx);
        true
    }

    fn on_set_max(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        _level: DecisionLevel,
        _var: VariableId,
        _slot: usize,
        _new_max: i64,
        _prev_max: i64,
    ) -> bool {
        self.propagate_now(ctx);
        true
    }

    fn is_satisfied(&self, assignments: &Assignments) -> Option<bool> {
        if !assignments.is_instantiated(self.b()) {
            return None;
        }
        let expected = assignments.value(self.b()) == 1;
        decide(self.op, assignments, self.x(), self.y()).map(|holds| holds == expected)
    }
}

#[cfg(test)]
mod tests {
    use crate::constraints::int_eq;
    use crate::constraints::int_eq_reif;
    use crate::constraints::int_le;
    use crate::constraints::int_lt;
    use crate::constraints::int_ne;
    use crate::engine::test_helper::TestHarness;

    #[test]
    fn less_than_tightens_both_sides() {
        let mut harness = TestHarness::new();
        let x = harness.new_variable(1, 10);
        let y = harness.new_variable(1, 10);
        harness.post(int_lt(x, y));

        assert!(harness.prepare());
        harness.assert_bounds(x, 1, 9);
        harness.assert_bounds(y, 2, 10);
    }

    #[test]
    fn equality_synchronises_domains() {
        let mut harness = TestHarness::new();
        let x = harness.new_variable(1, 5);
        let y = harness.new_variable(3, 8);
        harness.post(int_eq(x, y));

        assert!(harness.prepare());
        harness.assert_bounds(x, 3, 5);
        harness.assert_bounds(y, 3, 5);

        assert!(harness.decide(x, 4));
        assert_eq!(harness.value(y), Some(4));
    }

    #[test]
    fn disequality_prunes_on_instantiation() {
        let mut harness = TestHarness::new();
        let x = harness.new_variable(1, 3);
        let y = harness.new_variable(1, 3);
        harness.post(int_ne(x, y));

        assert!(harness.prepare());
        assert!(harness.decide(x, 2));
        assert!(!harness.contains(y, 2));
        assert!(harness.contains(y, 1));
        assert!(harness.contains(y, 3));
    }

    #[test]
    fn infeasible_inequality_fails_in_presolve() {
        let mut harness = TestHarness::new();
        let x = harness.new_variable(5, 9);
        let y = harness.new_variable(1, 4);
        harness.post(int_le(x, y));

        assert!(!harness.prepare());
    }

    #[test]
    fn reified_equality_fixes_the_control_variable() {
        let mut harness = TestHarness::new();
        let x = harness.new_variable(1, 2);
        let y = harness.new_variable(5, 6);
        let b = harness.new_variable(0, 1);
        harness.post(int_eq_reif(x, y, b));

        // Disjoint domains decide the relation, which decides b.
        assert!(harness.prepare());
        assert_eq!(harness.value(b), Some(0));
    }

    #[test]
    fn reified_equality_enforces_when_control_is_set() {
        let mut harness = TestHarness::new();
        let x = harness.new_variable(1, 5);
        let y = harness.new_variable(3, 8);
        let b = harness.new_variable(1, 1);
        harness.post(int_eq_reif(x, y, b));

        assert!(harness.prepare());
        harness.assert_bounds(x, 3, 5);
        harness.assert_bounds(y, 3, 5);
    }
}
