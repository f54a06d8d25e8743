// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// A write to a key made through some other handle on the same storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub old_value: Option<String>,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
}

pub type StorageListener = Box<dyn Fn(&StorageEvent)>;

/// Shared key-value storage, one handle per tab or process.
///
/// Change notifications only report writes made through *other* handles.
/// They are queued until the host calls [`dispatch_external_changes`] from
/// its event loop.
///
/// [`dispatch_external_changes`]: KeyValueStorage::dispatch_external_changes
pub trait KeyValueStorage {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn watch(&self, listener: StorageListener) -> StorageWatch;
    /// Delivers pending notifications to this handle's watchers and returns
    /// how many events were delivered.
    fn dispatch_external_changes(&self) -> Result<usize>;
}

type SharedListener = Rc<dyn Fn(&StorageEvent)>;

#[derive(Default)]
struct Registry {
    listeners: RefCell<Vec<(u64, SharedListener)>>,
    next_id: Cell<u64>,
}

/// Watchers registered on one storage handle.
#[derive(Clone, Default)]
pub struct ListenerSet {
    registry: Rc<Registry>,
}

impl ListenerSet {
    pub fn add(&self, listener: StorageListener) -> StorageWatch {
        let id = self.registry.next_id.get();
        self.registry.next_id.set(id + 1);
        self.registry
            .listeners
            .borrow_mut()
            .push((id, Rc::from(listener)));
        StorageWatch {
            registry: Rc::downgrade(&self.registry),
            id,
        }
    }

    pub fn emit(&self, event: &StorageEvent) {
        let listeners: Vec<SharedListener> = self
            .registry
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.registry.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Unregisters its watcher when dropped.
#[must_use = "dropping a StorageWatch stops notifications immediately"]
pub struct StorageWatch {
    registry: Weak<Registry>,
    id: u64,
}

impl fmt::Debug for StorageWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageWatch").field("id", &self.id).finish()
    }
}

impl Drop for StorageWatch {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .listeners
                .borrow_mut()
                .retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ListenerSet, StorageEvent};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn dropped_watch_stops_delivery() {
        let set = ListenerSet::default();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let watch = set.add(Box::new(move |event: &StorageEvent| {
            sink.borrow_mut().push(event.key.clone())
        }));

        let event = StorageEvent {
            key: "k".to_owned(),
            old_value: None,
            new_value: Some("1".to_owned()),
        };
        set.emit(&event);
        drop(watch);
        set.emit(&event);

        assert_eq!(*seen.borrow(), vec!["k".to_owned()]);
        assert!(set.is_empty());
    }
}
