//! Handler lists for one scope, keyed by event kind.

use crate::error::{constants, ProtocolError, Result};
use crate::events::{EventArgs, EventKind, SubjectId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Callback signature for event handlers.
pub type EventCallback = dyn Fn(&EventKind, Option<SubjectId>, &EventArgs) -> Result<()> + Send + Sync;

/// Shared handle to an event handler.
pub type EventHandler = Arc<EventCallback>;

/// Wrap a closure as an [`EventHandler`].
pub fn handler<F>(f: F) -> EventHandler
where
    F: Fn(&EventKind, Option<SubjectId>, &EventArgs) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
pub(crate) enum HandlerRef {
    Strong(EventHandler),
    Weak(Weak<EventCallback>),
}

impl HandlerRef {
    fn addr(&self) -> *const () {
        match self {
            HandlerRef::Strong(h) => Arc::as_ptr(h) as *const (),
            HandlerRef::Weak(w) => w.as_ptr() as *const (),
        }
    }

    fn upgrade(&self) -> Option<EventHandler> {
        match self {
            HandlerRef::Strong(h) => Some(Arc::clone(h)),
            HandlerRef::Weak(w) => w.upgrade(),
        }
    }

    fn is_dead(&self) -> bool {
        matches!(self, HandlerRef::Weak(w) if w.strong_count() == 0)
    }
}

struct Entry {
    id: u64,
    handler: HandlerRef,
}

/// Live handlers resolved for one publish.
pub(crate) struct Snapshot {
    pub handlers: Vec<EventHandler>,
    pub dead: usize,
}

/// Per-scope multicast lists guarded by a bounded reader/writer lock.
pub struct HandlerCollection {
    handlers: RwLock<HashMap<&'static EventKind, Vec<Entry>>>,
    lock_timeout: Duration,
}

impl HandlerCollection {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            lock_timeout,
        }
    }

    /// Insert a handler, returning the id it is registered under.
    ///
    /// With `unique`, an already present handler (same allocation) keeps its
    /// existing id and nothing is inserted.
    pub(crate) fn add(
        &self,
        kind: &'static EventKind,
        id: u64,
        handler: HandlerRef,
        unique: bool,
    ) -> Result<u64> {
        let mut map = self
            .handlers
            .try_write_for(self.lock_timeout)
            .ok_or(ProtocolError::LockTimeout(constants::ERR_EVENT_WRITE_LOCK))?;

        let list = map.entry(kind).or_default();
        if unique {
            let addr = handler.addr();
            if let Some(existing) = list.iter().find(|e| e.handler.addr() == addr) {
                return Ok(existing.id);
            }
        }
        list.push(Entry { id, handler });
        Ok(id)
    }

    pub(crate) fn remove(&self, kind: &'static EventKind, id: u64) -> Result<bool> {
        let mut map = self
            .handlers
            .try_write_for(self.lock_timeout)
            .ok_or(ProtocolError::LockTimeout(constants::ERR_EVENT_WRITE_LOCK))?;

        let Some(list) = map.get_mut(kind) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|e| e.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            map.remove(kind);
        }
        Ok(removed)
    }

    /// Drop every handler for `kind`, or for all kinds when `None`.
    pub(crate) fn remove_all(&self, kind: Option<&'static EventKind>) -> Result<usize> {
        let mut map = self
            .handlers
            .try_write_for(self.lock_timeout)
            .ok_or(ProtocolError::LockTimeout(constants::ERR_EVENT_WRITE_LOCK))?;

        let removed = match kind {
            Some(kind) => map.remove(kind).map_or(0, |list| list.len()),
            None => {
                let total = map.values().map(Vec::len).sum();
                map.clear();
                total
            }
        };
        Ok(removed)
    }

    pub(crate) fn snapshot(&self, kind: &'static EventKind) -> Result<Snapshot> {
        let map = self
            .handlers
            .try_read_for(self.lock_timeout)
            .ok_or(ProtocolError::LockTimeout(constants::ERR_EVENT_READ_LOCK))?;

        let mut snapshot = Snapshot {
            handlers: Vec::new(),
            dead: 0,
        };
        if let Some(list) = map.get(kind) {
            snapshot.handlers.reserve(list.len());
            for entry in list {
                match entry.handler.upgrade() {
                    Some(h) => snapshot.handlers.push(h),
                    None => snapshot.dead += 1,
                }
            }
        }
        Ok(snapshot)
    }

    /// Remove weak handlers whose target has been dropped.
    pub(crate) fn prune(&self, kind: &'static EventKind) -> Result<usize> {
        let mut map = self
            .handlers
            .try_write_for(self.lock_timeout)
            .ok_or(ProtocolError::LockTimeout(constants::ERR_EVENT_WRITE_LOCK))?;

        let Some(list) = map.get_mut(kind) else {
            return Ok(0);
        };
        let before = list.len();
        list.retain(|e| !e.handler.is_dead());
        let pruned = before - list.len();
        if list.is_empty() {
            map.remove(kind);
        }
        Ok(pruned)
    }

    /// Number of registered handlers for `kind`, dead weak ones included.
    pub fn count(&self, kind: &'static EventKind) -> Result<usize> {
        let map = self
            .handlers
            .try_read_for(self.lock_timeout)
            .ok_or(ProtocolError::LockTimeout(constants::ERR_EVENT_READ_LOCK))?;
        Ok(map.get(kind).map_or(0, Vec::len))
    }

    pub fn is_empty(&self) -> bool {
        self.handlers
            .try_read_for(self.lock_timeout)
            .is_some_and(|map| map.is_empty())
    }
    /// Run `f` while this collection's write lock is held.
    #[cfg(test)]
    pub(crate) fn with_write_held<T>(&self, f: impl FnOnce() -> T) -> T {
        let _held = self.handlers.write();
        f()
    }
}
