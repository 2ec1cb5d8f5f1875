//! Learned NoGoods and their two-watched-literal propagation.
//!
//! A NoGood is a conjunction of `(variable = value)` literals that cannot all hold at once. Two of
//! the literals are watched: only when a watched literal becomes true does the pool do any work,
//! either relocating the watch to a literal that is not yet satisfied, detecting that the clause
//! is fully entailed (a conflict), or enqueueing the removal that falsifies the one remaining
//! literal.

use crate::basic_types::HashMap;
use crate::engine::assignments::Assignments;
use crate::engine::variables::VariableId;
use crate::kabocha_assert_moderate;
use crate::statistics::SolverStats;

/// The pool never grows past this many NoGoods; overflow is evicted by recency on restart.
pub(crate) const MAX_NOGOODS: usize = 100_000;

/// One `(variable = value)` literal of a NoGood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Literal {
    pub(crate) var: VariableId,
    pub(crate) value: i64,
}

#[derive(Debug)]
struct NoGood {
    literals: Vec<Literal>,
    w1: usize,
    w2: usize,
    /// Value of the use counter when this NoGood last caused a conflict.
    last_active: u64,
    /// Permanent NoGoods (solution blockers) survive eviction.
    permanent: bool,
}

/// A literal keyed by variable name, used to carry NoGoods across models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedLiteral {
    pub var_name: String,
    pub value: i64,
}

/// A NoGood keyed by variable names, used to carry learned clauses across models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedNoGood {
    pub literals: Vec<NamedLiteral>,
}

type WatchBuckets = HashMap<VariableId, HashMap<i64, Vec<usize>>>;

/// The NoGood pool together with its `(variable, value)` watch index.
///
/// NoGoods are stored in a plain vector; during search removals only happen at the back (child
/// NoGoods dropped when a frame exhausts), which keeps the indices stored in the watch buckets
/// stable. The restart-time sort reorders everything and therefore rebuilds the buckets.
#[derive(Debug, Default)]
pub(crate) struct NoGoodStore {
    nogoods: Vec<NoGood>,
    watches: WatchBuckets,
    use_counter: u64,
}

impl NoGoodStore {
    pub(crate) fn len(&self) -> usize {
        self.nogoods.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nogoods.is_empty()
    }

    /// Records a new NoGood; positions 0 and 1 become the watched literals.
    pub(crate) fn add(&mut self, literals: Vec<Literal>) {
        kabocha_assert_moderate!(!literals.is_empty());

        let index = self.nogoods.len();
        let w1 = 0;
        let w2 = if literals.len() > 1 { 1 } else { 0 };

        register(&mut self.watches, literals[w1], index);
        if w2 != w1 {
            register(&mut self.watches, literals[w2], index);
        }

        self.nogoods.push(NoGood {
            literals,
            w1,
            w2,
            last_active: 0,
            permanent: false,
        });
    }

    /// Marks the most recently added NoGood as surviving eviction.
    pub(crate) fn make_last_permanent(&mut self) {
        if let Some(nogood) = self.nogoods.last_mut() {
            nogood.permanent = true;
        }
    }

    /// Drops NoGoods from the back until at most `len` remain.
    pub(crate) fn truncate(&mut self, len: usize) {
        while self.nogoods.len() > len {
            let nogood = self.nogoods.pop().expect("checked non-empty");
            kabocha_assert_moderate!(!nogood.permanent, "permanent NoGoods are never truncated");
            let index = self.nogoods.len();
            unregister(&mut self.watches, nogood.literals[nogood.w1], index);
            if nogood.w2 != nogood.w1 {
                unregister(&mut self.watches, nogood.literals[nogood.w2], index);
            }
        }
    }

    /// Restart maintenance: stable-sorts by `(permanent, last_active)` descending, evicts the cold
    /// tail past the capacity, and rebuilds the watch index for the new positions.
    pub(crate) fn sort_and_evict(&mut self) {
        self.nogoods.sort_by(|a, b| {
            b.permanent
                .cmp(&a.permanent)
                .then(b.last_active.cmp(&a.last_active))
        });

        while self.nogoods.len() > MAX_NOGOODS {
            if self.nogoods.last().is_some_and(|nogood| nogood.permanent) {
                break;
            }
            let _ = self.nogoods.pop();
        }

        self.watches.clear();
        for (index, nogood) in self.nogoods.iter().enumerate() {
            register(&mut self.watches, nogood.literals[nogood.w1], index);
            if nogood.w2 != nogood.w1 {
                register(&mut self.watches, nogood.literals[nogood.w2], index);
            }
        }
    }

    /// The NoGoods currently watching `(var = value)`.
    pub(crate) fn watching(&self, var: VariableId, value: i64) -> Vec<usize> {
        self.watches
            .get(&var)
            .and_then(|by_value| by_value.get(&value))
            .cloned()
            .unwrap_or_default()
    }

    /// Reacts to the watched literal `triggered` having become true.
    ///
    /// Returns `false` iff the NoGood is fully entailed by the current assignment. Otherwise the
    /// watch is relocated to a not-yet-satisfied literal, or, when none exists, the remaining
    /// watched literal is falsified by enqueueing the corresponding removal.
    pub(crate) fn propagate(
        &mut self,
        assignments: &mut Assignments,
        index: usize,
        triggered: Literal,
        stats: &mut SolverStats,
    ) -> bool {
        let (w1, w2) = (self.nogoods[index].w1, self.nogoods[index].w2);
        let triggered_is_w1 = self.nogoods[index].literals[w1] == triggered;
        let other_position = if triggered_is_w1 { w2 } else { w1 };

        for i in 0..self.nogoods[index].literals.len() {
            if i == w1 || i == w2 {
                continue;
            }
            let literal = self.nogoods[index].literals[i];
            let satisfied = assignments.is_instantiated(literal.var)
                && assignments.value(literal.var) == literal.value;
            if !satisfied {
                unregister(&mut self.watches, triggered, index);
                let nogood = &mut self.nogoods[index];
                if triggered_is_w1 {
                    nogood.w1 = i;
                } else {
                    nogood.w2 = i;
                }
                register(&mut self.watches, literal, index);
                return true;
            }
        }

        // No relocation possible; every literal except possibly `other` is satisfied.
        let other = self.nogoods[index].literals[other_position];
        if assignments.is_instantiated(other.var) && assignments.value(other.var) == other.value {
            return false;
        }

        stats.nogood_domain_count += 1;
        if assignments.size(other.var) == 2 {
            stats.nogood_instantiate_count += 1;
        }
        assignments.enqueue_remove_value(other.var, other.value);
        true
    }

    /// Bumps the recency stamp of a NoGood that just caused a conflict.
    pub(crate) fn note_conflict(&mut self, index: usize) {
        self.use_counter += 1;
        self.nogoods[index].last_active = self.use_counter;
    }

    /// Exports up to `max_count` NoGoods keyed by variable name (`0` meaning all).
    pub(crate) fn export(&self, assignments: &Assignments, max_count: usize) -> Vec<NamedNoGood> {
        let mut result = Vec::new();
        for nogood in &self.nogoods {
            if max_count > 0 && result.len() >= max_count {
                break;
            }
            let literals: Vec<NamedLiteral> = nogood
                .literals
                .iter()
                .map(|literal| NamedLiteral {
                    var_name: assignments.name(literal.var).to_owned(),
                    value: literal.value,
                })
                .collect();
            if !literals.is_empty() {
                result.push(NamedNoGood { literals });
            }
        }
        result
    }

    /// Imports name-keyed NoGoods, skipping any that mention unknown variables; returns the
    /// number added.
    pub(crate) fn import(
        &mut self,
        nogoods: &[NamedNoGood],
        mut resolve: impl FnMut(&str) -> Option<VariableId>,
    ) -> usize {
        let mut added = 0;
        for named in nogoods {
            let literals: Option<Vec<Literal>> = named
                .literals
                .iter()
                .map(|literal| {
                    resolve(&literal.var_name).map(|var| Literal {
                        var,
                        value: literal.value,
                    })
                })
                .collect();
            if let Some(literals) = literals {
                if !literals.is_empty() {
                    self.add(literals);
                    added += 1;
                }
            }
        }
        added
    }
}

fn register(watches: &mut WatchBuckets, literal: Literal, index: usize) {
    watches
        .entry(literal.var)
        .or_default()
        .entry(literal.value)
        .or_default()
        .push(index);
}

fn unregister(watches: &mut WatchBuckets, literal: Literal, index: usize) {
    if let Some(bucket) = watches
        .get_mut(&literal.var)
        .and_then(|by_value| by_value.get_mut(&literal.value))
    {
        bucket.retain(|&watching| watching != index);
    }
}

#[cfg(test)]
mod tests {
    use super::Literal;
    use super::NoGoodStore;
    use crate::engine::assignments::Assignments;
    use crate::engine::domains::Domain;
    use crate::statistics::SolverStats;

    fn three_vars() -> (Assignments, Vec<crate::engine::variables::VariableId>) {
        let mut assignments = Assignments::default();
        let vars = ["a", "b", "c"]
            .iter()
            .map(|name| assignments.grow((*name).to_owned(), Domain::interval(1, 3)))
            .collect();
        (assignments, vars)
    }

    #[test]
    fn watch_relocates_to_an_unsatisfied_literal() {
        let (mut assignments, vars) = three_vars();
        let mut store = NoGoodStore::default();
        let mut stats = SolverStats::default();

        let literals: Vec<Literal> = vars.iter().map(|&var| Literal { var, value: 1 }).collect();
        store.add(literals);

        assert!(assignments.instantiate(1, vars[0], 1));
        let watching = store.watching(vars[0], 1);
        assert_eq!(watching.len(), 1);
        assert!(store.propagate(&mut assignments, watching[0], Literal { var: vars[0], value: 1 }, &mut stats));

        // The watch moved off (a = 1) onto (c = 1).
        assert!(store.watching(vars[0], 1).is_empty());
        assert_eq!(store.watching(vars[2], 1).len(), 1);
    }

    #[test]
    fn unit_nogood_enqueues_the_blocking_removal() {
        let (mut assignments, vars) = three_vars();
        let mut store = NoGoodStore::default();
        let mut stats = SolverStats::default();

        store.add(vec![
            Literal { var: vars[0], value: 1 },
            Literal { var: vars[1], value: 2 },
        ]);

        assert!(assignments.instantiate(1, vars[0], 1));
        let watching = store.watching(vars[0], 1);
        assert!(store.propagate(&mut assignments, watching[0], Literal { var: vars[0], value: 1 }, &mut stats));

        // No third literal to move to: (b = 2) must be removed.
        assert_eq!(stats.nogood_domain_count, 1);
        let update = assignments.pop_pending().expect("a removal was enqueued");
        assert_eq!(update.var, vars[1]);
        assert_eq!(update.value, 2);
    }

    #[test]
    fn fully_entailed_nogood_is_a_conflict() {
        let (mut assignments, vars) = three_vars();
        let mut store = NoGoodStore::default();
        let mut stats = SolverStats::default();

        store.add(vec![
            Literal { var: vars[0], value: 1 },
            Literal { var: vars[1], value: 2 },
        ]);

        assert!(assignments.instantiate(1, vars[1], 2));
        assert!(assignments.instantiate(2, vars[0], 1));
        let watching = store.watching(vars[0], 1);
        assert!(!store.propagate(&mut assignments, watching[0], Literal { var: vars[0], value: 1 }, &mut stats));
    }

    #[test]
    fn truncate_unregisters_watches() {
        let (_, vars) = three_vars();
        let mut store = NoGoodStore::default();

        store.add(vec![Literal { var: vars[0], value: 1 }, Literal { var: vars[1], value: 1 }]);
        store.add(vec![Literal { var: vars[0], value: 2 }, Literal { var: vars[2], value: 2 }]);

        store.truncate(1);
        assert_eq!(store.len(), 1);
        assert!(store.watching(vars[0], 2).is_empty());
        assert!(store.watching(vars[2], 2).is_empty());
        assert_eq!(store.watching(vars[0], 1).len(), 1);
    }
}
