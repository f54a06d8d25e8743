// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::storage::{KeyValueStorage, ListenerSet, StorageEvent, StorageListener, StorageWatch};

struct AreaInner {
    values: RefCell<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
    handles: RefCell<Vec<Weak<HandleInner>>>,
    next_handle: Cell<u64>,
}

#[derive(Default)]
struct HandleInner {
    id: u64,
    inbox: RefCell<VecDeque<StorageEvent>>,
    listeners: ListenerSet,
}

/// One shared storage area, the in-process stand-in for browser local
/// storage. Each [`MemoryStorage`] handle from [`connect`](Self::connect)
/// plays the part of one tab.
#[derive(Clone)]
pub struct MemoryArea {
    inner: Rc<AreaInner>,
}

impl Default for MemoryArea {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryArea")
            .field("keys", &self.inner.values.borrow().len())
            .field("quota_bytes", &self.inner.quota_bytes)
            .finish()
    }
}

impl MemoryArea {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Writes fail once keys plus values would exceed `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self::build(Some(quota_bytes))
    }

    fn build(quota_bytes: Option<usize>) -> Self {
        Self {
            inner: Rc::new(AreaInner {
                values: RefCell::new(BTreeMap::new()),
                quota_bytes,
                handles: RefCell::new(Vec::new()),
                next_handle: Cell::new(0),
            }),
        }
    }

    pub fn connect(&self) -> MemoryStorage {
        let id = self.inner.next_handle.get();
        self.inner.next_handle.set(id + 1);
        let handle = Rc::new(HandleInner {
            id,
            ..HandleInner::default()
        });
        let mut handles = self.inner.handles.borrow_mut();
        handles.retain(|existing| existing.strong_count() > 0);
        handles.push(Rc::downgrade(&handle));
        MemoryStorage {
            area: Rc::clone(&self.inner),
            handle,
        }
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner.values.borrow().get(key).cloned()
    }
}

fn used_bytes(values: &BTreeMap<String, String>) -> usize {
    values
        .iter()
        .map(|(key, value)| key.len() + value.len())
        .sum()
}

/// A handle onto a [`MemoryArea`]. Clones share one inbox and watcher set.
#[derive(Clone)]
pub struct MemoryStorage {
    area: Rc<AreaInner>,
    handle: Rc<HandleInner>,
}

impl fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("handle", &self.handle.id)
            .field("pending", &self.pending_changes())
            .finish()
    }
}

impl MemoryStorage {
    pub fn pending_changes(&self) -> usize {
        self.handle.inbox.borrow().len()
    }

    fn broadcast(&self, event: StorageEvent) {
        for other in self.area.handles.borrow().iter().filter_map(Weak::upgrade) {
            if other.id != self.handle.id {
                other.inbox.borrow_mut().push_back(event.clone());
            }
        }
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.area.values.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let old_value = {
            let mut values = self.area.values.borrow_mut();
            let old_value = values.get(key).cloned();
            if old_value.as_deref() == Some(value) {
                return Ok(());
            }
            if let Some(quota) = self.area.quota_bytes {
                let old_len = old_value.as_ref().map_or(0, |old| key.len() + old.len());
                let needed = used_bytes(&values) - old_len + key.len() + value.len();
                if needed > quota {
                    bail!(
                        "storage quota exceeded writing {key:?}: {needed} bytes needed, {quota} allowed"
                    );
                }
            }
            values.insert(key.to_owned(), value.to_owned());
            old_value
        };
        self.broadcast(StorageEvent {
            key: key.to_owned(),
            old_value,
            new_value: Some(value.to_owned()),
        });
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let old_value = self.area.values.borrow_mut().remove(key);
        if old_value.is_some() {
            self.broadcast(StorageEvent {
                key: key.to_owned(),
                old_value,
                new_value: None,
            });
        }
        Ok(())
    }

    fn watch(&self, listener: StorageListener) -> StorageWatch {
        self.handle.listeners.add(listener)
    }

    fn dispatch_external_changes(&self) -> Result<usize> {
        let mut delivered = 0;
        loop {
            // Listeners may write, which only ever queues on other handles.
            let next = self.handle.inbox.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            self.handle.listeners.emit(&event);
            delivered += 1;
        }
        Ok(delivered)
    }
}
