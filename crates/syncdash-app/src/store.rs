// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! The single in-memory snapshot every view reads from.
//!
//! Writes build a new [`ApplicationState`] from the current one and swap it
//! in, so a [`Snapshot`] handed out earlier never changes underneath its
//! holder. Every write notifies subscribers synchronously, before the write
//! call returns.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use time::OffsetDateTime;

use crate::{
    ApplicationState, CollectionKind, CollectionUpdate, Project, ProjectId, StatsPatch, Table,
    TableId, Ticket, WorkspaceUser,
};

pub type Snapshot = Rc<ApplicationState>;

/// What a write changed. Delivered with every notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Collection(CollectionKind),
    Loading(CollectionKind),
    StatsOverride,
    SyncTime,
    Cleared,
    /// The whole state was replaced from persisted storage.
    Hydrated,
}

type Listener = dyn Fn(Mutation, &Snapshot);

struct StoreInner {
    state: RefCell<Snapshot>,
    revision: Cell<u64>,
    listeners: RefCell<Vec<(u64, Rc<Listener>)>>,
    next_listener: Cell<u64>,
    in_flight: RefCell<BTreeMap<CollectionKind, usize>>,
}

/// Cheap-to-clone handle; all clones share one state.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("revision", &self.inner.revision.get())
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::with_state(ApplicationState::default())
    }

    pub fn with_state(state: ApplicationState) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                state: RefCell::new(Rc::new(state)),
                revision: Cell::new(0),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
                in_flight: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    pub fn current_snapshot(&self) -> Snapshot {
        Rc::clone(&self.inner.state.borrow())
    }

    /// Number of writes applied so far.
    pub fn revision(&self) -> u64 {
        self.inner.revision.get()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(Mutation, &Snapshot) + 'static,
    {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));
        Subscription {
            store: Rc::downgrade(&self.inner),
            id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    pub fn set_collection(&self, update: CollectionUpdate) {
        let kind = update.kind();
        self.commit(Mutation::Collection(kind), |state| {
            state.apply_collection(update)
        });
    }

    pub fn set_projects(&self, projects: Vec<Project>) {
        self.set_collection(CollectionUpdate::Projects(projects));
    }

    pub fn set_tables(&self, project_id: ProjectId, tables: Vec<Table>) {
        self.set_collection(CollectionUpdate::Tables { project_id, tables });
    }

    pub fn set_tickets(&self, table_id: TableId, tickets: Vec<Ticket>) {
        self.set_collection(CollectionUpdate::Tickets { table_id, tickets });
    }

    pub fn set_users(&self, users: Vec<WorkspaceUser>) {
        self.set_collection(CollectionUpdate::Users(users));
    }

    pub fn set_loading(&self, kind: CollectionKind, loading: bool) {
        self.commit(Mutation::Loading(kind), |state| {
            state.loading.set(kind, loading)
        });
    }

    /// Counts one more outstanding request for `kind` and raises its
    /// loading flag. Every binding fetching `kind` shares this count, so the
    /// flag only drops once the last of them calls [`Store::finish_load`].
    pub fn begin_load(&self, kind: CollectionKind) {
        *self.inner.in_flight.borrow_mut().entry(kind).or_default() += 1;
        self.set_loading(kind, true);
    }

    pub fn finish_load(&self, kind: CollectionKind) {
        let remaining = {
            let mut in_flight = self.inner.in_flight.borrow_mut();
            let count = in_flight.entry(kind).or_default();
            *count = count.saturating_sub(1);
            *count
        };
        self.set_loading(kind, remaining > 0);
    }

    /// Requests begun for `kind` that have not finished.
    pub fn loads_in_flight(&self, kind: CollectionKind) -> usize {
        self.inner
            .in_flight
            .borrow()
            .get(&kind)
            .copied()
            .unwrap_or_default()
    }

    /// Merges server-reported counts without touching the collections.
    ///
    /// This is a temporary override: the next `set_collection` for a kind
    /// recomputes that kind's count from the cached items, and until then
    /// `stats` may disagree with what the collections hold.
    pub fn update_stats(&self, patch: StatsPatch) {
        self.commit(Mutation::StatsOverride, |state| state.stats.merge(patch));
    }

    pub fn set_sync_time(&self, time: OffsetDateTime) {
        self.commit(Mutation::SyncTime, |state| {
            state.last_sync_time = Some(time)
        });
    }

    pub fn clear(&self) {
        self.commit(Mutation::Cleared, |state| {
            *state = ApplicationState::default()
        });
    }

    /// Replaces the state with one restored from storage. Loading flags are
    /// runtime-only, so the live ones survive.
    pub fn hydrate(&self, restored: ApplicationState) {
        self.commit(Mutation::Hydrated, |state| {
            let loading = state.loading;
            *state = restored;
            state.loading = loading;
        });
    }

    fn commit(&self, mutation: Mutation, update: impl FnOnce(&mut ApplicationState)) {
        let next = {
            let current = self.inner.state.borrow();
            let mut next = ApplicationState::clone(&current);
            update(&mut next);
            Rc::new(next)
        };
        *self.inner.state.borrow_mut() = Rc::clone(&next);
        let revision = self.inner.revision.get() + 1;
        self.inner.revision.set(revision);
        self.notify(revision, mutation, &next);
    }

    fn notify(&self, revision: u64, mutation: Mutation, snapshot: &Snapshot) {
        let listeners: Vec<(u64, Rc<Listener>)> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(id, listener)| (*id, Rc::clone(listener)))
            .collect();

        for (id, listener) in listeners {
            // A listener wrote through the store; that nested round already
            // delivered a newer snapshot to everyone.
            if self.inner.revision.get() != revision {
                log::trace!("notification round {revision} superseded");
                return;
            }
            if !self.is_subscribed(id) {
                continue;
            }
            listener(mutation, snapshot);
        }
    }

    fn is_subscribed(&self, id: u64) -> bool {
        self.inner
            .listeners
            .borrow()
            .iter()
            .any(|(listener_id, _)| *listener_id == id)
    }
}

/// Removes its listener when dropped or explicitly unsubscribed.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    store: Weak<StoreInner>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            inner
                .listeners
                .borrow_mut()
                .retain(|(listener_id, _)| *listener_id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Mutation, Store};
    use crate::{
        CollectionKind, Project, ProjectId, StatsPatch, Table, TableId, Ticket, TicketId,
    };
    use std::cell::RefCell;
    use std::rc::Rc;
    use time::macros::datetime;

    fn project(id: &str) -> Project {
        Project {
            id: ProjectId::from(id),
            name: format!("Project {id}"),
            permission_level: "read".to_owned(),
        }
    }

    fn table(id: &str) -> Table {
        Table {
            id: TableId::from(id),
            name: id.to_owned(),
            description: None,
            fields: Vec::new(),
        }
    }

    fn ticket(id: &str) -> Ticket {
        Ticket {
            id: TicketId::from(id),
            fields: serde_json::Map::new(),
            created_time: None,
            row_id: None,
        }
    }

    #[test]
    fn tables_across_projects_sum_to_three() {
        let store = Store::new();
        store.set_tables(ProjectId::from("proj1"), vec![table("T1"), table("T2")]);
        store.set_tables(ProjectId::from("proj2"), vec![table("T3")]);
        assert_eq!(store.current_snapshot().stats.tables, 3);
    }

    #[test]
    fn stats_track_every_collection_write() {
        let store = Store::new();
        store.set_projects(vec![project("a"), project("b")]);
        store.set_tickets(TableId::from("t1"), vec![ticket("r1"), ticket("r2")]);
        store.set_tickets(TableId::from("t2"), vec![ticket("r3")]);
        store.set_tickets(TableId::from("t1"), vec![ticket("r4")]);

        let snapshot = store.current_snapshot();
        assert_eq!(snapshot.stats.projects, 2);
        assert_eq!(snapshot.stats.tickets, 2);
        assert_eq!(snapshot.stats, snapshot.derived_stats());
    }

    #[test]
    fn repeated_collection_write_is_idempotent() {
        let store = Store::new();
        store.set_projects(vec![project("a"), project("b")]);
        let once = store.current_snapshot();
        store.set_projects(vec![project("a"), project("b")]);
        assert_eq!(*store.current_snapshot(), *once);
    }

    #[test]
    fn old_snapshots_never_change() {
        let store = Store::new();
        store.set_projects(vec![project("a")]);
        let before = store.current_snapshot();

        store.set_projects(vec![project("a"), project("b")]);
        store.set_loading(CollectionKind::Projects, true);

        assert_eq!(before.projects.len(), 1);
        assert!(!before.loading.projects);
        assert_eq!(store.current_snapshot().projects.len(), 2);
    }

    #[test]
    fn loading_flag_leaves_stats_alone() {
        let store = Store::new();
        store.set_projects(vec![project("a")]);
        store.set_loading(CollectionKind::Projects, true);
        let snapshot = store.current_snapshot();
        assert!(snapshot.loading.projects);
        assert_eq!(snapshot.stats.projects, 1);
    }

    #[test]
    fn stats_override_lasts_until_next_collection_write() {
        let store = Store::new();
        store.set_projects(vec![project("a")]);
        store.update_stats(StatsPatch {
            projects: Some(40),
            revisions: Some(7),
            ..StatsPatch::default()
        });
        let overridden = store.current_snapshot();
        assert_eq!(overridden.stats.projects, 40);
        assert_eq!(overridden.projects.len(), 1);
        assert!(!overridden.stats_are_derived());

        store.set_projects(vec![project("a"), project("b")]);
        let refreshed = store.current_snapshot();
        assert_eq!(refreshed.stats.projects, 2);
        assert_eq!(refreshed.stats.revisions, 7);
        assert!(refreshed.stats_are_derived());
    }

    #[test]
    fn subscribers_see_the_write_before_it_returns() {
        let store = Store::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _subscription = store.subscribe(move |mutation, snapshot| {
            sink.borrow_mut().push((mutation, snapshot.projects.len()));
        });

        store.set_projects(vec![project("a")]);
        assert_eq!(
            *seen.borrow(),
            vec![(Mutation::Collection(CollectionKind::Projects), 1)]
        );

        store.set_sync_time(datetime!(2025-01-01 00:00 UTC));
        store.clear();
        assert_eq!(
            seen.borrow()[1..],
            [(Mutation::SyncTime, 1), (Mutation::Cleared, 0)]
        );
    }

    #[test]
    fn dropped_subscription_stops_notifications() {
        let store = Store::new();
        let count = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&count);
        let subscription = store.subscribe(move |_, _| *counter.borrow_mut() += 1);
        store.set_projects(vec![project("a")]);
        subscription.unsubscribe();
        store.set_projects(vec![project("b")]);
        assert_eq!(*count.borrow(), 1);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn nested_write_is_never_followed_by_a_stale_snapshot() {
        let store = Store::new();
        let writer_store = store.clone();
        let _writer = store.subscribe(move |mutation, snapshot| {
            if mutation == Mutation::Collection(CollectionKind::Projects)
                && !snapshot.loading.projects
                && snapshot.projects.len() == 1
            {
                writer_store.set_loading(CollectionKind::Projects, true);
            }
        });

        let observed = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&observed);
        let _reader = store.subscribe(move |_, snapshot| {
            sink.borrow_mut()
                .push((snapshot.projects.len(), snapshot.loading.projects));
        });

        store.set_projects(vec![project("a")]);

        // The reader only ever sees the post-nested-write state.
        assert_eq!(*observed.borrow(), vec![(1, true)]);
        assert!(store.current_snapshot().loading.projects);
    }

    #[test]
    fn hydrate_keeps_live_loading_flags() {
        let store = Store::new();
        store.set_loading(CollectionKind::Users, true);
        let mut restored = crate::ApplicationState::default();
        restored.apply_collection(crate::CollectionUpdate::Projects(vec![project("x")]));
        store.hydrate(restored);

        let snapshot = store.current_snapshot();
        assert!(snapshot.loading.users);
        assert_eq!(snapshot.stats.projects, 1);
    }

    #[test]
    fn loading_stays_set_until_the_last_request_finishes() {
        let store = Store::new();
        store.begin_load(CollectionKind::Projects);
        store.begin_load(CollectionKind::Projects);
        store.begin_load(CollectionKind::Users);

        store.finish_load(CollectionKind::Projects);
        let snapshot = store.current_snapshot();
        assert!(snapshot.loading.projects);
        assert_eq!(store.loads_in_flight(CollectionKind::Projects), 1);

        store.finish_load(CollectionKind::Projects);
        store.finish_load(CollectionKind::Projects);
        let snapshot = store.current_snapshot();
        assert!(!snapshot.loading.projects);
        assert!(snapshot.loading.users);
        assert_eq!(store.loads_in_flight(CollectionKind::Projects), 0);
    }

    #[test]
    fn writes_share_the_slices_they_leave_alone() {
        let store = Store::new();
        store.set_projects(vec![project("a")]);
        store.set_tickets(TableId::from("t1"), vec![ticket("r1")]);
        let before = store.current_snapshot();

        store.set_loading(CollectionKind::Tickets, true);
        store.set_tickets(TableId::from("t2"), vec![ticket("r2")]);
        let after = store.current_snapshot();

        assert!(Rc::ptr_eq(&before.projects, &after.projects));
        assert!(Rc::ptr_eq(
            &before.tickets_by_table[&TableId::from("t1")],
            &after.tickets_by_table[&TableId::from("t1")],
        ));
        assert!(!before.tickets_by_table.contains_key(&TableId::from("t2")));
    }

    #[test]
    fn clear_resets_to_defaults() {
        let store = Store::new();
        store.set_projects(vec![project("a")]);
        store.set_sync_time(datetime!(2025-01-01 00:00 UTC));
        store.clear();
        assert_eq!(*store.current_snapshot(), crate::ApplicationState::default());
    }
}
