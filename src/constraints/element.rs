//! The element constraint `array[index] = result` over a constant array.
//!
//! Stateless: every event re-derives the mutual pruning between the index domain (small, bounded
//! by the array length after presolve) and the result domain. A reverse value-to-positions index
//! makes the result-driven direction cheap.

use enumset::enum_set;
use enumset::EnumSet;

use super::Constraint;
use super::PropagationContext;
use crate::basic_types::HashMap;
use crate::basic_types::HashSet;
use crate::engine::assignments::Assignments;
use crate::engine::domains::DomainEvent;
use crate::engine::variables::DecisionLevel;
use crate::engine::variables::VariableId;
use crate::kabocha_assert_simple;

/// `array[index] = result`, with `index` interpreted relative to `base`.
#[derive(Debug)]
pub struct IntElement {
    vars: [VariableId; 2],
    array: Vec<i64>,
    /// The index value that addresses `array[0]`.
    base: i64,
    /// Array value to the index values addressing it.
    positions: HashMap<i64, Vec<i64>>,
}

/// Creates `array[index] = result` with 1-based indexing.
pub fn int_element(index: VariableId, array: Vec<i64>, result: VariableId) -> IntElement {
    int_element_offset(index, array, result, 1)
}

/// Creates `array[index] = result` where `index == base` addresses `array[0]`.
pub fn int_element_offset(
    index: VariableId,
    array: Vec<i64>,
    result: VariableId,
    base: i64,
) -> IntElement {
    kabocha_assert_simple!(!array.is_empty(), "element requires a non-empty array");

    IntElement {
        vars: [index, result],
        array,
        base,
        positions: HashMap::default(),
    }
}

impl IntElement {
    fn index_var(&self) -> VariableId {
        self.vars[0]
    }

    fn result_var(&self) -> VariableId {
        self.vars[1]
    }

    fn array_value(&self, index_value: i64) -> Option<i64> {
        let offset = index_value - self.base;
        if offset < 0 || offset as usize >= self.array.len() {
            return None;
        }
        Some(self.array[offset as usize])
    }

    /// Re-derives both pruning directions from the current domains.
    fn prune(&self, ctx: &mut PropagationContext<'_>) {
        let index = self.index_var();
        let result = self.result_var();

        // Backward: index values whose array entry fell out of the result domain go away.
        let live_indices = ctx.values_of(index);
        let mut achievable: HashSet<i64> = HashSet::default();
        for &index_value in &live_indices {
            let value = self
                .array_value(index_value)
                .expect("presolve clamps the index domain to the array range");
            if ctx.contains(result, value) {
                let _ = achievable.insert(value);
            } else {
                ctx.enqueue_remove_value(index, index_value);
            }
        }

        if ctx.is_instantiated(index) {
            let value = self
                .array_value(ctx.value(index))
                .expect("presolve clamps the index domain to the array range");
            ctx.enqueue_instantiate(result, value);
            return;
        }

        // Forward: the result can only take achievable array entries.
        if let (Some(&low), Some(&high)) =
            (achievable.iter().min(), achievable.iter().max())
        {
            ctx.enqueue_set_min(result, low);
            ctx.enqueue_set_max(result, high);
            for value in ctx.values_of(result) {
                if value > low && value < high && !achievable.contains(&value) {
                    ctx.enqueue_remove_value(result, value);
                }
            }
        }

        // A result fixed with a single live position left fixes the index.
        if ctx.is_instantiated(result) {
            let target = ctx.value(result);
            let Some(positions) = self.positions.get(&target) else {
                return;
            };
            let mut candidates = positions
                .iter()
                .filter(|&&index_value| ctx.contains(index, index_value));
            if let (Some(&only), None) = (candidates.next(), candidates.next()) {
                ctx.enqueue_instantiate(index, only);
            }
        }
    }
}

impl Constraint for IntElement {
    fn name(&self) -> &str {
        "int_element"
    }

    fn variables(&self) -> &[VariableId] {
        &self.vars
    }

    fn subscriptions(&self) -> EnumSet<DomainEvent> {
        enum_set!(
            DomainEvent::Instantiate
                | DomainEvent::LowerBound
                | DomainEvent::UpperBound
                | DomainEvent::Removal
        )
    }

    fn presolve(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        let index = self.index_var();
        let result = self.result_var();

        if !ctx.set_min(0, index, self.base)
            || !ctx.set_max(0, index, self.base + self.array.len() as i64 - 1)
        {
            return false;
        }

        // Drop index values whose entry cannot be the result.
        for index_value in ctx.values_of(index) {
            let value = self
                .array_value(index_value)
                .expect("index domain is clamped to the array range");
            if !ctx.contains(result, value) && !ctx.remove_value(0, index, index_value) {
                return false;
            }
        }

        // Restrict the result to entries addressed by a live index value.
        let mut achievable: HashSet<i64> = HashSet::default();
        for index_value in ctx.values_of(index) {
            if let Some(value) = self.array_value(index_value) {
                let _ = achievable.insert(value);
            }
        }
        let Some(&low) = achievable.iter().min() else {
            return false;
        };
        let &high = achievable.iter().max().expect("non-empty achievable set");
        if !ctx.set_min(0, result, low) || !ctx.set_max(0, result, high) {
            return false;
        }
        for value in ctx.values_of(result) {
            if !achievable.contains(&value) && !ctx.remove_value(0, result, value) {
                return false;
            }
        }
        true
    }

    fn prepare_propagation(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        self.positions.clear();
        for (offset, &value) in self.array.iter().enumerate() {
            self.positions
                .entry(value)
                .or_default()
                .push(self.base + offset as i64);
        }
        self.prune(ctx);
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
        self.prune(ctx);
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
        self.prune(ctx);
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
        self.prune(ctx);
        true
    }

    fn on_remove_value(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        _level: DecisionLevel,
        _var: VariableId,
        _slot: usize,
        _value: i64,
    ) -> bool {
        self.prune(ctx);
        true
    }

    fn is_satisfied(&self, assignments: &Assignments) -> Option<bool> {
        let (index, result) = (self.index_var(), self.result_var());
        if !assignments.is_instantiated(index) || !assignments.is_instantiated(result) {
            return None;
        }
        match self.array_value(assignments.value(index)) {
            Some(value) => Some(value == assignments.value(result)),
            None => Some(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::constraints::int_element;
    use crate::constraints::int_element_offset;
    use crate::engine::test_helper::TestHarness;

    #[test]
    fn index_domain_is_clamped_to_the_array() {
        let mut harness = TestHarness::new();
        let index = harness.new_variable(-3, 99);
        let result = harness.new_variable(0, 100);
        harness.post(int_element(index, vec![10, 20, 30, 40], result));

        assert!(harness.prepare());
        harness.assert_bounds(index, 1, 4);
        harness.assert_bounds(result, 10, 40);
    }

    #[test]
    fn fixing_the_result_fixes_a_unique_index() {
        let mut harness = TestHarness::new();
        let index = harness.new_variable(1, 4);
        let result = harness.new_variable(0, 100);
        harness.post(int_element(index, vec![10, 20, 30, 40], result));

        assert!(harness.prepare());
        assert!(harness.decide(result, 30));
        assert_eq!(harness.value(index), Some(3));
    }

    #[test]
    fn restricting_the_index_restricts_the_result() {
        let mut harness = TestHarness::new();
        let index = harness.new_variable(1, 4);
        let result = harness.new_variable(0, 100);
        harness.post(int_element(index, vec![10, 20, 30, 40], result));

        assert!(harness.prepare());
        assert!(harness.remove(index, 1));
        assert!(harness.remove(index, 3));
        assert!(harness.propagate());

        assert!(harness.contains(result, 20));
        assert!(harness.contains(result, 40));
        assert!(!harness.contains(result, 10));
        assert!(!harness.contains(result, 30));
    }

    #[test]
    fn zero_based_indexing_addresses_the_first_entry() {
        let mut harness = TestHarness::new();
        let index = harness.new_variable(0, 3);
        let result = harness.new_variable(0, 100);
        harness.post(int_element_offset(index, vec![7, 8, 9, 10], result, 0));

        assert!(harness.prepare());
        assert!(harness.decide(index, 0));
        assert_eq!(harness.value(result), Some(7));
    }

    #[test]
    fn sparse_index_domain_restricts_the_result() {
        let mut harness = TestHarness::new();
        let index = harness.new_sparse_variable(&[1, 3]);
        let result = harness.new_variable(0, 100);
        harness.post(int_element(index, vec![5, 6, 7, 8], result));

        assert!(harness.prepare());
        assert!(harness.contains(result, 5));
        assert!(harness.contains(result, 7));
        assert!(!harness.contains(result, 6));
        assert!(!harness.contains(result, 8));
    }

    #[test]
    fn duplicate_entries_keep_all_matching_indices() {
        let mut harness = TestHarness::new();
        let index = harness.new_variable(1, 4);
        let result = harness.new_variable(0, 100);
        harness.post(int_element(index, vec![5, 6, 5, 7], result));

        assert!(harness.prepare());
        assert!(harness.decide(result, 5));
        // Two positions map to 5, so the index stays open.
        assert!(harness.contains(index, 1));
        assert!(harness.contains(index, 3));
        assert!(!harness.contains(index, 2));
        assert!(!harness.contains(index, 4));
    }
}
