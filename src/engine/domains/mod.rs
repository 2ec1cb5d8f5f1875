//! Integer set representations behind a single contract: a sparse set for small initial ranges
//! and a bounds-plus-holes interval for wide ones. The shape is fixed when the variable is
//! created and never changes afterwards.

mod bounds_interval;
mod sparse_set;

pub(crate) use bounds_interval::BoundsIntervalDomain;
use enumset::EnumSetType;
pub(crate) use sparse_set::SparseSetDomain;

/// Initial ranges up to this size use the sparse set; anything wider falls back to the
/// bounds-interval representation to avoid allocating range-sized arrays.
pub(crate) const BOUNDS_ONLY_THRESHOLD: u64 = 1 << 16;

/// The kinds of events that can happen on a variable domain.
#[derive(Debug, EnumSetType)]
pub enum DomainEvent {
    /// The domain collapsed to a single value.
    Instantiate,
    /// The lower bound was tightened without instantiating the variable.
    LowerBound,
    /// The upper bound was tightened without instantiating the variable.
    UpperBound,
    /// An inner value was removed without moving either bound.
    Removal,
}

/// An integer domain in one of the two supported shapes.
#[derive(Debug, Clone)]
pub(crate) enum Domain {
    SparseSet(SparseSetDomain),
    BoundsInterval(BoundsIntervalDomain),
}

impl Domain {
    /// Creates an interval domain, selecting the shape from the range width.
    pub(crate) fn interval(min: i64, max: i64) -> Self {
        let range = (max as i128 - min as i128 + 1) as u64;
        if range > BOUNDS_ONLY_THRESHOLD {
            Domain::BoundsInterval(BoundsIntervalDomain::interval(min, max))
        } else {
            Domain::SparseSet(SparseSetDomain::interval(min, max))
        }
    }

    /// Creates a domain holding exactly the given values; always sparse.
    pub(crate) fn from_values(values: Vec<i64>) -> Self {
        Domain::SparseSet(SparseSetDomain::from_values(values))
    }

    pub(crate) fn is_bounds_only(&self) -> bool {
        matches!(self, Domain::BoundsInterval(_))
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Domain::SparseSet(d) => d.len(),
            Domain::BoundsInterval(d) => d.len(),
        }
    }

    pub(crate) fn min(&self) -> i64 {
        match self {
            Domain::SparseSet(d) => d.min(),
            Domain::BoundsInterval(d) => d.min(),
        }
    }

    pub(crate) fn max(&self) -> i64 {
        match self {
            Domain::SparseSet(d) => d.max(),
            Domain::BoundsInterval(d) => d.max(),
        }
    }

    pub(crate) fn initial_range(&self) -> u64 {
        match self {
            Domain::SparseSet(d) => d.initial_range(),
            Domain::BoundsInterval(d) => d.initial_range(),
        }
    }

    pub(crate) fn contains(&self, value: i64) -> bool {
        match self {
            Domain::SparseSet(d) => d.contains(value),
            Domain::BoundsInterval(d) => d.contains(value),
        }
    }

    /// See [`SparseSetDomain::remove`]; `false` means the removal would have emptied the domain.
    pub(crate) fn remove(&mut self, value: i64) -> bool {
        match self {
            Domain::SparseSet(d) => d.remove(value),
            Domain::BoundsInterval(d) => d.remove(value),
        }
    }

    pub(crate) fn remove_below(&mut self, threshold: i64) {
        match self {
            Domain::SparseSet(d) => d.remove_below(threshold),
            Domain::BoundsInterval(d) => d.remove_below(threshold),
        }
    }

    pub(crate) fn remove_above(&mut self, threshold: i64) {
        match self {
            Domain::SparseSet(d) => d.remove_above(threshold),
            Domain::BoundsInterval(d) => d.remove_above(threshold),
        }
    }

    pub(crate) fn instantiate(&mut self, value: i64) {
        match self {
            Domain::SparseSet(d) => d.instantiate(value),
            Domain::BoundsInterval(d) => d.instantiate(value),
        }
    }

    /// The live values in domain-internal order (dense order for sparse sets, ascending for
    /// intervals). The iterator is finite and not restartable.
    pub(crate) fn iter(&self) -> DomainValueIter<'_> {
        match self {
            Domain::SparseSet(d) => DomainValueIter::SparseSet(d.iter()),
            Domain::BoundsInterval(d) => DomainValueIter::BoundsInterval(d.iter()),
        }
    }

    /// A live value suitable as the initial support witness.
    pub(crate) fn support_candidate(&self) -> i64 {
        match self {
            Domain::SparseSet(d) => d.median_value(),
            Domain::BoundsInterval(d) => d.midpoint(),
        }
    }

    /// Shape-specific data that has to be recorded on the trail (the removal-log length for
    /// bounds-interval domains, zero for sparse sets).
    pub(crate) fn trail_data(&self) -> usize {
        match self {
            Domain::SparseSet(_) => 0,
            Domain::BoundsInterval(d) => d.trail_data(),
        }
    }

    /// Pure rewinder driven by the variable trail.
    pub(crate) fn restore(&mut self, n: usize, min: i64, max: i64, trail_data: usize) {
        match self {
            Domain::SparseSet(d) => d.restore(n, min, max),
            Domain::BoundsInterval(d) => d.restore(n, min, max, trail_data),
        }
    }
}

/// Iterator over the live values of a [`Domain`].
#[derive(Debug)]
pub(crate) enum DomainValueIter<'a> {
    SparseSet(std::iter::Copied<std::slice::Iter<'a, i64>>),
    BoundsInterval(bounds_interval::BoundsValueIter<'a>),
}

impl Iterator for DomainValueIter<'_> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        match self {
            DomainValueIter::SparseSet(iter) => iter.next(),
            DomainValueIter::BoundsInterval(iter) => iter.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Domain;
    use super::BOUNDS_ONLY_THRESHOLD;

    #[test]
    fn shape_selection_follows_the_range_threshold() {
        let small = Domain::interval(0, BOUNDS_ONLY_THRESHOLD as i64 - 1);
        let wide = Domain::interval(0, BOUNDS_ONLY_THRESHOLD as i64);

        assert!(!small.is_bounds_only());
        assert!(wide.is_bounds_only());
    }

    #[test]
    fn both_shapes_agree_on_the_contract() {
        let mut sparse = Domain::interval(0, 10);
        let mut wide = Domain::interval(0, 1 << 20);

        for domain in [&mut sparse, &mut wide] {
            assert!(domain.remove(5));
            domain.remove_below(2);
            domain.remove_above(8);

            assert_eq!(domain.min(), 2);
            assert_eq!(domain.max(), 8);
            assert_eq!(domain.len(), 6);
            assert!(!domain.contains(5));
            assert!(domain.contains(6));
        }
    }
}
