//! The circuit constraint: successor variables `x[0..n)` must form a single Hamiltonian cycle,
//! where `x[i] = j` means node `j` follows node `i`.
//!
//! Assigned edges are tracked as disjoint paths in a union-find shape: `head[i]` points towards
//! the first node of the path containing `i`, and the root stores the path's tail and length.
//! Assigning `x[i] = j` consumes `j` from the inbound pool (no two edges may enter one node),
//! rejects closing a path shorter than `n`, merges the two paths otherwise, and forbids the edge
//! that would close the merged path early; once the path covers all nodes, closing it is forced.
//! Each merge records its own undo entry, so rewinding unwinds them newest-first.

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

/// `circuit(vars)` over 0-based successor values.
#[derive(Debug)]
pub struct Circuit {
    vars: Vec<VariableId>,
    n: usize,

    /// Parent pointers towards the first node of each path; `head[i] == i` marks a path root.
    head: Vec<usize>,
    /// `tail[root]` is the last node of the root's path.
    tail: Vec<usize>,
    /// `size[root]` is the number of nodes on the root's path.
    size: Vec<usize>,

    /// Sparse pool of the nodes that still have no inbound edge.
    pool_values: Vec<i64>,
    pool_slots: HashMap<i64, usize>,
    pool_len: usize,

    last_dirty_level: DecisionLevel,
}

/// Creates the constraint that `vars` encode one Hamiltonian cycle over nodes `0..vars.len()`.
pub fn circuit(vars: Vec<VariableId>) -> Circuit {
    let n = vars.len();
    Circuit {
        vars,
        n,
        head: Vec::new(),
        tail: Vec::new(),
        size: Vec::new(),
        pool_values: Vec::new(),
        pool_slots: HashMap::default(),
        pool_len: 0,
        last_dirty_level: NO_SAVED_LEVEL,
    }
}

impl Circuit {
    fn find(&self, mut node: usize) -> usize {
        while self.head[node] != node {
            node = self.head[node];
        }
        node
    }

    fn pool_contains(&self, value: i64) -> bool {
        self.pool_slots
            .get(&value)
            .is_some_and(|&slot| slot < self.pool_len)
    }

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

    fn mark_dirty_once(&mut self, ctx: &mut PropagationContext<'_>, level: DecisionLevel) {
        if self.last_dirty_level != level {
            self.last_dirty_level = level;
            ctx.mark_dirty(level);
        }
    }

    /// Integrates the assigned edge `successor(from) = to` into the path bookkeeping.
    fn apply_edge(
        &mut self,
        ctx: &mut PropagationContext<'_>,
        level: DecisionLevel,
        from: usize,
        to_value: i64,
    ) -> bool {
        if to_value < 0 || to_value as usize >= self.n {
            return false;
        }
        let to = to_value as usize;
        if self.n > 1 && to == from {
            return false;
        }

        self.mark_dirty_once(ctx, level);

        if !self.pool_contains(to_value) {
            // Some other node already feeds into `to`.
            return false;
        }

        let from_root = self.find(from);
        let to_root = self.find(to);

        if from_root == to_root {
            // Closing a path is only allowed when it spans every node.
            if self.size[from_root] != self.n {
                return false;
            }
            ctx.save_state(
                level,
                ConstraintState::CircuitClose {
                    old_pool_len: self.pool_len,
                },
            );
            let removed = self.pool_remove(to_value);
            kabocha_assert_moderate!(removed);
            return true;
        }

        // `to` has no inbound edge yet, so it is the first node of its path.
        kabocha_assert_moderate!(to_root == to);
        ctx.save_state(
            level,
            ConstraintState::CircuitMerge {
                path_root: from_root,
                absorbed_root: to_root,
                old_tail: self.tail[from_root],
                old_size: self.size[from_root],
                old_pool_len: self.pool_len,
            },
        );
        let removed = self.pool_remove(to_value);
        kabocha_assert_moderate!(removed);

        self.head[to_root] = from_root;
        self.tail[from_root] = self.tail[to_root];
        self.size[from_root] += self.size[to_root];

        let new_tail = self.tail[from_root];
        if self.size[from_root] == self.n {
            // All nodes are on one path; the tour must close.
            ctx.enqueue_instantiate(self.vars[new_tail], from_root as i64);
        } else {
            // The tail looping back onto the head would form a short subtour.
            ctx.enqueue_remove_value(self.vars[new_tail], from_root as i64);
        }
        true
    }
}

impl Constraint for Circuit {
    fn name(&self) -> &str {
        "circuit"
    }

    fn variables(&self) -> &[VariableId] {
        &self.vars
    }

    fn subscriptions(&self) -> EnumSet<DomainEvent> {
        enum_set!(DomainEvent::Instantiate)
    }

    fn presolve(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        let mut seen = HashSet::default();
        if !self.vars.iter().all(|&var| seen.insert(var)) {
            return false;
        }

        if self.n == 1 {
            return ctx.instantiate(0, self.vars[0], 0);
        }
        for node in 0..self.n {
            let var = self.vars[node];
            if !ctx.set_min(0, var, 0) || !ctx.set_max(0, var, self.n as i64 - 1) {
                return false;
            }
            if !ctx.remove_value(0, var, node as i64) {
                return false;
            }
        }
        true
    }

    fn prepare_propagation(&mut self, ctx: &mut PropagationContext<'_>) -> bool {
        self.last_dirty_level = NO_SAVED_LEVEL;
        self.head = (0..self.n).collect();
        self.tail = (0..self.n).collect();
        self.size = vec![1; self.n];
        self.pool_values = (0..self.n as i64).collect();
        self.pool_slots = self
            .pool_values
            .iter()
            .enumerate()
            .map(|(slot, &value)| (value, slot))
            .collect();
        self.pool_len = self.n;

        // Replay edges fixed during presolve.
        for node in 0..self.n {
            let var = self.vars[node];
            if ctx.is_instantiated(var) {
                let value = ctx.value(var);
                if !self.apply_edge(ctx, 0, node, value) {
                    return false;
                }
            }
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
        if !self.apply_edge(ctx, level, slot, value) {
            return false;
        }
        // No other node may enter the same successor.
        for other_slot in 0..self.n {
            if other_slot == slot {
                continue;
            }
            let other = self.vars[other_slot];
            if !ctx.is_instantiated(other) {
                ctx.enqueue_remove_value(other, value);
            }
        }
        true
    }

    fn is_satisfied(&self, assignments: &Assignments) -> Option<bool> {
        if self
            .vars
            .iter()
            .any(|&var| !assignments.is_instantiated(var))
        {
            return None;
        }
        // Walk the successors from node 0; a tour visits every node once and returns.
        let mut visited = vec![false; self.n];
        let mut node = 0usize;
        for _ in 0..self.n {
            if visited[node] {
                return Some(false);
            }
            visited[node] = true;
            let next = assignments.value(self.vars[node]);
            if next < 0 || next as usize >= self.n {
                return Some(false);
            }
            node = next as usize;
        }
        Some(node == 0)
    }

    fn restore_state(&mut self, state: ConstraintState) {
        match state {
            ConstraintState::CircuitMerge {
                path_root,
                absorbed_root,
                old_tail,
                old_size,
                old_pool_len,
            } => {
                self.head[absorbed_root] = absorbed_root;
                self.tail[path_root] = old_tail;
                self.size[path_root] = old_size;
                self.pool_len = old_pool_len;
            }
            ConstraintState::CircuitClose { old_pool_len } => {
                self.pool_len = old_pool_len;
            }
            _ => {}
        }
    }

    fn rewind_to(&mut self, _save_point: DecisionLevel) {
        self.last_dirty_level = NO_SAVED_LEVEL;
    }
}

#[cfg(test)]
mod tests {
    use crate::constraints::circuit;
    use crate::engine::test_helper::TestHarness;

    fn harness_with_circuit(n: i64) -> (TestHarness, Vec<crate::VariableId>) {
        let mut harness = TestHarness::new();
        let vars: Vec<_> = (0..n).map(|_| harness.new_variable(0, n - 1)).collect();
        harness.post(circuit(vars.clone()));
        (harness, vars)
    }

    #[test]
    fn self_loops_are_removed_at_the_root() {
        let (mut harness, vars) = harness_with_circuit(4);

        assert!(harness.prepare());
        for (node, &var) in vars.iter().enumerate() {
            assert!(!harness.contains(var, node as i64));
        }
    }

    #[test]
    fn short_subtours_are_forbidden() {
        let (mut harness, vars) = harness_with_circuit(4);

        assert!(harness.prepare());
        assert!(harness.decide(vars[0], 1));
        // Closing 0 -> 1 -> 0 would leave nodes 2 and 3 out.
        assert!(!harness.contains(vars[1], 0));
    }

    #[test]
    fn completing_path_forces_the_closing_edge() {
        let (mut harness, vars) = harness_with_circuit(4);

        assert!(harness.prepare());
        assert!(harness.decide(vars[0], 1));
        assert!(harness.decide(vars[1], 2));
        // The path 0 -> 1 -> 2 -> 3 covers all nodes, so 3 -> 0 is forced.
        assert!(harness.decide(vars[2], 3));
        assert_eq!(harness.value(vars[3]), Some(0));
    }

    #[test]
    fn duplicate_successor_is_rejected() {
        let (mut harness, vars) = harness_with_circuit(4);

        assert!(harness.prepare());
        assert!(harness.decide(vars[0], 2));
        // Forward checking removed 2 from every other successor domain.
        assert!(!harness.contains(vars[1], 2));
        assert!(!harness.contains(vars[3], 2));
    }

    #[test]
    fn backtracking_unwinds_path_merges() {
        let (mut harness, vars) = harness_with_circuit(4);

        assert!(harness.prepare());
        assert!(harness.decide(vars[0], 1));
        assert!(harness.decide(vars[1], 2));
        harness.backtrack_to(0);

        // The merges were unwound, so a different tour is accepted end to end.
        assert!(harness.decide(vars[0], 3));
        assert!(harness.decide(vars[3], 1));
        assert!(harness.decide(vars[1], 2));
        assert_eq!(harness.value(vars[2]), Some(0));
    }
}
