// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use syncdash_app::{CollectionKind, Store, WorkspaceUser};

use crate::{LoadOutcome, Slice, SliceWatch, SyncRuntime};

#[derive(Debug)]
#[must_use = "a UsersTicket must be applied to clear the loading flag"]
pub struct UsersTicket {
    generation: u64,
}

/// Workspace members. The endpoint is not paginated, so every load
/// replaces the whole list.
#[derive(Debug)]
pub struct UsersView {
    store: Store,
    generation: u64,
    last_error: Option<String>,
    watch: SliceWatch,
}

impl UsersView {
    pub fn new(store: Store) -> Self {
        let watch = SliceWatch::new(&store, Slice::Collection(CollectionKind::Users));
        Self {
            store,
            generation: 0,
            last_error: None,
            watch,
        }
    }

    pub fn users(&self) -> Vec<WorkspaceUser> {
        self.store.current_snapshot().users.to_vec()
    }

    pub fn active_count(&self) -> usize {
        self.store
            .current_snapshot()
            .users
            .iter()
            .filter(|user| user.state.as_deref() == Some("active"))
            .count()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn take_changed(&mut self) -> bool {
        self.watch.take_changed()
    }

    /// Responses to requests issued before this call are ignored.
    pub fn invalidate(&mut self) {
        self.generation += 1;
    }

    pub fn request(&mut self) -> UsersTicket {
        self.store.begin_load(CollectionKind::Users);
        UsersTicket {
            generation: self.generation,
        }
    }

    pub fn apply(&mut self, ticket: UsersTicket, outcome: Result<Vec<WorkspaceUser>>) -> LoadOutcome {
        let outcome = if ticket.generation != self.generation {
            log::debug!("ignoring stale users response");
            LoadOutcome::Ignored
        } else {
            match outcome {
                Ok(users) => {
                    let received = users.len();
                    self.store.set_users(users);
                    self.last_error = None;
                    LoadOutcome::Applied(received)
                }
                Err(error) => {
                    log::warn!("users load failed: {error:#}");
                    let outcome = LoadOutcome::failed(&error);
                    self.last_error = outcome.failure().map(str::to_owned);
                    outcome
                }
            }
        };
        self.store.finish_load(CollectionKind::Users);
        outcome
    }

    pub fn load<R: SyncRuntime + ?Sized>(&mut self, runtime: &mut R) -> LoadOutcome {
        let ticket = self.request();
        let outcome = runtime.load_users();
        self.apply(ticket, outcome)
    }
}
