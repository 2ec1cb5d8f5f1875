use std::collections::btree_map;
use std::collections::BTreeMap;

/// A full assignment reported by the solver.
///
/// Maps variable names (and registered aliases) to their assigned values; only instantiated
/// variables appear. The map is ordered by name so that printing a solution is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Solution {
    assignments: BTreeMap<String, i64>,
}

impl Solution {
    pub(crate) fn new() -> Self {
        Solution::default()
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: i64) {
        let _ = self.assignments.insert(name.into(), value);
    }

    /// Returns the value assigned to the variable (or alias) with the given name.
    pub fn value(&self, name: &str) -> Option<i64> {
        self.assignments.get(name).copied()
    }

    /// The number of named entries in the solution.
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.assignments.iter().map(|(name, &value)| (name.as_str(), value))
    }
}

impl<'a> IntoIterator for &'a Solution {
    type Item = (&'a String, &'a i64);
    type IntoIter = btree_map::Iter<'a, String, i64>;

    fn into_iter(self) -> Self::IntoIter {
        self.assignments.iter()
    }
}

impl FromIterator<(String, i64)> for Solution {
    fn from_iter<T: IntoIterator<Item = (String, i64)>>(iter: T) -> Self {
        Solution {
            assignments: iter.into_iter().collect(),
        }
    }
}
