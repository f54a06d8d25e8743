// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use syncdash_app::{CollectionKind, Mutation, Store, Subscription};

/// The part of the state one view renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slice {
    Collection(CollectionKind),
    Stats,
}

impl Slice {
    pub fn affected_by(self, mutation: Mutation) -> bool {
        match (self, mutation) {
            (_, Mutation::Cleared | Mutation::Hydrated) => true,
            (Self::Collection(kind), Mutation::Collection(changed) | Mutation::Loading(changed)) => {
                kind == changed
            }
            (Self::Collection(_), _) => false,
            (Self::Stats, Mutation::Loading(_)) => false,
            (Self::Stats, _) => true,
        }
    }
}

/// Counts store writes that touched one slice, so a view can tell whether
/// it needs to re-render. Recorded full syncs are counted apart, whatever
/// the slice.
pub struct SliceWatch {
    slice: Slice,
    changes: Rc<Cell<u64>>,
    seen: u64,
    syncs: Rc<Cell<u64>>,
    seen_syncs: u64,
    _subscription: Subscription,
}

impl fmt::Debug for SliceWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceWatch")
            .field("slice", &self.slice)
            .field("changes", &self.changes.get())
            .field("seen", &self.seen)
            .field("syncs", &self.syncs.get())
            .finish()
    }
}

impl SliceWatch {
    pub fn new(store: &Store, slice: Slice) -> Self {
        let changes = Rc::new(Cell::new(0));
        let syncs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&changes);
        let sync_counter = Rc::clone(&syncs);
        let subscription = store.subscribe(move |mutation, _| {
            if slice.affected_by(mutation) {
                counter.set(counter.get() + 1);
            }
            if mutation == Mutation::SyncTime {
                sync_counter.set(sync_counter.get() + 1);
            }
        });
        Self {
            slice,
            changes,
            seen: 0,
            syncs,
            seen_syncs: 0,
            _subscription: subscription,
        }
    }

    pub fn slice(&self) -> Slice {
        self.slice
    }

    /// True if the slice changed since the previous call.
    pub fn take_changed(&mut self) -> bool {
        let current = self.changes.get();
        let changed = current != self.seen;
        self.seen = current;
        changed
    }

    /// True if a sync time was recorded since the last [`Self::take_synced`].
    pub fn sync_pending(&self) -> bool {
        self.syncs.get() != self.seen_syncs
    }

    pub fn take_synced(&mut self) -> bool {
        let pending = self.sync_pending();
        self.seen_syncs = self.syncs.get();
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::{Slice, SliceWatch};
    use syncdash_app::{CollectionKind, StatsPatch, Store};
    use syncdash_testkit::fixtures;
    use time::macros::datetime;

    #[test]
    fn watch_only_counts_its_own_slice() {
        let store = Store::new();
        let mut users = SliceWatch::new(&store, Slice::Collection(CollectionKind::Users));
        let mut stats = SliceWatch::new(&store, Slice::Stats);

        store.set_projects(fixtures::projects(1));
        assert!(!users.take_changed());
        assert!(stats.take_changed());

        store.set_loading(CollectionKind::Users, true);
        assert!(users.take_changed());
        assert!(!users.take_changed());
        assert!(!stats.take_changed());

        store.update_stats(StatsPatch::default());
        assert!(!users.take_changed());
        assert!(stats.take_changed());

        store.clear();
        assert!(users.take_changed());
        assert!(stats.take_changed());
    }

    #[test]
    fn sync_time_is_counted_for_every_slice() {
        let store = Store::new();
        let mut tickets = SliceWatch::new(&store, Slice::Collection(CollectionKind::Tickets));
        assert!(!tickets.sync_pending());

        store.set_sync_time(datetime!(2026-02-19 12:00 UTC));
        store.set_sync_time(datetime!(2026-02-19 12:05 UTC));
        assert!(tickets.sync_pending());
        assert!(!tickets.take_changed());
        assert!(tickets.take_synced());
        assert!(!tickets.take_synced());
    }

    #[test]
    fn dropping_the_watch_unsubscribes() {
        let store = Store::new();
        let watch = SliceWatch::new(&store, Slice::Stats);
        assert_eq!(store.subscriber_count(), 1);
        drop(watch);
        assert_eq!(store.subscriber_count(), 0);
    }
}
