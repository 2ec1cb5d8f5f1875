use enumset::EnumSet;

use crate::basic_types::KeyedVec;
use crate::engine::domains::DomainEvent;
use crate::engine::variables::ConstraintId;
use crate::engine::variables::VariableId;

/// Identifies a constraint together with the constraint-local slot of the watched variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WatcherId {
    pub(crate) constraint: ConstraintId,
    /// The index of the variable in the constraint's argument list.
    pub(crate) slot: usize,
}

/// Per-variable lists of the constraints watching each kind of domain event.
#[derive(Debug, Default)]
pub(crate) struct WatchList {
    watchers: KeyedVec<VariableId, VariableWatcher>,
}

#[derive(Debug, Default)]
struct VariableWatcher {
    instantiate_watchers: Vec<WatcherId>,
    lower_bound_watchers: Vec<WatcherId>,
    upper_bound_watchers: Vec<WatcherId>,
    removal_watchers: Vec<WatcherId>,
}

impl WatchList {
    pub(crate) fn grow(&mut self) {
        let _ = self.watchers.push(VariableWatcher::default());
    }

    pub(crate) fn clear(&mut self) {
        for watcher in self.watchers.iter_mut() {
            watcher.instantiate_watchers.clear();
            watcher.lower_bound_watchers.clear();
            watcher.upper_bound_watchers.clear();
            watcher.removal_watchers.clear();
        }
    }

    /// Subscribes `watcher` to the given events of `var`.
    pub(crate) fn watch(
        &mut self,
        var: VariableId,
        watcher: WatcherId,
        events: EnumSet<DomainEvent>,
    ) {
        let entry = &mut self.watchers[var];
        for event in events {
            let event_watchers = match event {
                DomainEvent::Instantiate => &mut entry.instantiate_watchers,
                DomainEvent::LowerBound => &mut entry.lower_bound_watchers,
                DomainEvent::UpperBound => &mut entry.upper_bound_watchers,
                DomainEvent::Removal => &mut entry.removal_watchers,
            };
            if !event_watchers.contains(&watcher) {
                event_watchers.push(watcher);
            }
        }
    }

    pub(crate) fn num_watchers(&self, event: DomainEvent, var: VariableId) -> usize {
        self.watchers_for(event, var).len()
    }

    pub(crate) fn watcher(&self, event: DomainEvent, var: VariableId, index: usize) -> WatcherId {
        self.watchers_for(event, var)[index]
    }

    fn watchers_for(&self, event: DomainEvent, var: VariableId) -> &[WatcherId] {
        let entry = &self.watchers[var];
        match event {
            DomainEvent::Instantiate => &entry.instantiate_watchers,
            DomainEvent::LowerBound => &entry.lower_bound_watchers,
            DomainEvent::UpperBound => &entry.upper_bound_watchers,
            DomainEvent::Removal => &entry.removal_watchers,
        }
    }
}
