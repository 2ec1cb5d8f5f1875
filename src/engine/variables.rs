use std::fmt::Display;
use std::fmt::Formatter;

use crate::basic_types::StorageKey;

/// Identifies a variable registered in a [`Model`](crate::Model).
///
/// Ids are dense and assigned in registration order, so they double as indices into the
/// per-variable storage of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub(crate) u32);

impl Display for VariableId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl StorageKey for VariableId {
    fn index(&self) -> usize {
        self.0 as usize
    }

    fn create_from_index(index: usize) -> Self {
        VariableId(index as u32)
    }
}

/// Identifies a constraint registered in a [`Model`](crate::Model), in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintId(pub(crate) u32);

impl StorageKey for ConstraintId {
    fn index(&self) -> usize {
        self.0 as usize
    }

    fn create_from_index(index: usize) -> Self {
        ConstraintId(index as u32)
    }
}

/// A decision level; the root is level 0 and branching increments it.
pub type DecisionLevel = i32;

/// Sentinel for "no state was saved yet" in per-level delta coalescing.
pub(crate) const NO_SAVED_LEVEL: DecisionLevel = -1;
