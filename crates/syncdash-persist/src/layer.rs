// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Keeps the [`Store`] and one key of shared storage in step, in both
//! directions.
//!
//! Failures on this path are logged and swallowed. A tab whose storage is
//! full or corrupt keeps working from memory.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use syncdash_app::{ApplicationState, Mutation, Snapshot, Store, Subscription};

use crate::snapshot::{decode_state, encode_state};
use crate::storage::{KeyValueStorage, StorageEvent, StorageWatch};

pub const APP_STATE_KEY: &str = "syncdash-app-state";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabPhase {
    Uninitialized,
    /// Restored from storage (or defaults), nothing written yet.
    Hydrated,
    Live,
    /// Logged out here or in another tab.
    Cleared,
}

impl TabPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Hydrated => "hydrated",
            Self::Live => "live",
            Self::Cleared => "cleared",
        }
    }
}

struct LayerInner {
    store: Store,
    storage: Rc<dyn KeyValueStorage>,
    key: String,
    phase: Cell<TabPhase>,
    last_written: RefCell<Option<String>>,
}

impl LayerInner {
    fn load(&self) {
        let raw = match self.storage.get(&self.key) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("cannot read {}: {err:#}; keeping current state", self.key);
                return;
            }
        };
        if let Some(raw) = raw {
            self.restore(raw);
        }
    }

    fn restore(&self, raw: String) -> bool {
        match decode_state(&raw) {
            Ok(state) => {
                log::debug!("restoring state from {}", self.key);
                *self.last_written.borrow_mut() = Some(raw);
                self.store.hydrate(state);
                true
            }
            Err(err) => {
                log::warn!("ignoring stored {}: {err:#}", self.key);
                false
            }
        }
    }

    fn on_mutation(&self, mutation: Mutation, snapshot: &Snapshot) {
        match mutation {
            // Loading flags are never stored, so they neither write nor
            // bring a cleared tab back to life.
            Mutation::Hydrated | Mutation::Loading(_) => {}
            Mutation::Cleared => {
                *self.last_written.borrow_mut() = None;
                self.phase.set(TabPhase::Cleared);
                if let Err(err) = self.storage.remove(&self.key) {
                    log::warn!("cannot remove {}: {err:#}", self.key);
                }
            }
            _ => {
                self.phase.set(TabPhase::Live);
                self.persist(snapshot);
            }
        }
    }

    fn persist(&self, state: &ApplicationState) {
        let raw = match encode_state(state) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("cannot serialize state for {}: {err:#}", self.key);
                return;
            }
        };
        if self.last_written.borrow().as_deref() == Some(raw.as_str()) {
            return;
        }
        match self.storage.set(&self.key, &raw) {
            Ok(()) => *self.last_written.borrow_mut() = Some(raw),
            Err(err) => log::warn!("cannot persist {}: {err:#}", self.key),
        }
    }

    fn on_storage_event(&self, event: &StorageEvent) {
        if event.key != self.key {
            return;
        }
        match &event.new_value {
            Some(raw) => {
                if self.restore(raw.clone()) {
                    self.phase.set(TabPhase::Live);
                }
            }
            None => {
                log::info!("{} removed by another tab; resetting", self.key);
                *self.last_written.borrow_mut() = None;
                self.store.hydrate(ApplicationState::default());
                self.phase.set(TabPhase::Cleared);
            }
        }
    }
}

/// Attached for as long as it is alive; dropping it detaches both
/// directions.
pub struct PersistenceLayer {
    inner: Rc<LayerInner>,
    _subscription: Subscription,
    _watch: StorageWatch,
}

impl fmt::Debug for PersistenceLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceLayer")
            .field("key", &self.inner.key)
            .field("phase", &self.inner.phase.get())
            .finish()
    }
}

impl PersistenceLayer {
    pub fn attach(store: Store, storage: Rc<dyn KeyValueStorage>) -> Self {
        Self::attach_with_key(store, storage, APP_STATE_KEY)
    }

    /// Hydrates `store` from `key`, then starts mirroring in both
    /// directions.
    pub fn attach_with_key(store: Store, storage: Rc<dyn KeyValueStorage>, key: &str) -> Self {
        let inner = Rc::new(LayerInner {
            store: store.clone(),
            storage: Rc::clone(&storage),
            key: key.to_owned(),
            phase: Cell::new(TabPhase::Uninitialized),
            last_written: RefCell::new(None),
        });

        inner.load();
        inner.phase.set(TabPhase::Hydrated);

        let weak: Weak<LayerInner> = Rc::downgrade(&inner);
        let subscription = store.subscribe(move |mutation, snapshot| {
            if let Some(inner) = weak.upgrade() {
                inner.on_mutation(mutation, snapshot);
            }
        });

        let weak: Weak<LayerInner> = Rc::downgrade(&inner);
        let watch = storage.watch(Box::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_storage_event(event);
            }
        }));

        Self {
            inner,
            _subscription: subscription,
            _watch: watch,
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn phase(&self) -> TabPhase {
        self.inner.phase.get()
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// Resets the store, which removes the persisted key.
    pub fn clear(&self) {
        self.inner.store.clear();
    }
}
