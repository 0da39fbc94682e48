//! Two-scope publish/subscribe.

use crate::config::EVENT_LOCK_TIMEOUT;
use crate::error::{constants, ProtocolError, Result};
use crate::events::collection::{HandlerCollection, HandlerRef};
use crate::events::{EventArgs, EventHandler, EventKind, EventTag, SubjectId};
use crate::service::scripts::CodeUnit;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Where a handler is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Receives every publish of the kind
    Global,
    /// Receives only publishes naming this subject
    Subject(SubjectId),
}

/// Handle returned by [`EventBus::subscribe`]; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
    kind: &'static EventKind,
    scope: Scope,
}

impl Subscription {
    pub fn kind(&self) -> &'static EventKind {
        self.kind
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }
}

/// Global and per-subject handler collections.
///
/// Publishing snapshots the matching handlers under read locks, releases the
/// locks and then runs the handlers on the caller's thread, subject scope
/// first. A handler that fails or panics is logged; the rest still run.
pub struct EventBus {
    global: HandlerCollection,
    subjects: RwLock<HashMap<SubjectId, Arc<HandlerCollection>>>,
    lock_timeout: Duration,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_LOCK_TIMEOUT)
    }
}

impl EventBus {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            global: HandlerCollection::new(lock_timeout),
            subjects: RwLock::new(HashMap::new()),
            lock_timeout,
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe a handler, keeping it alive until unsubscribed.
    ///
    /// A [`Scope::Subject`] scope is created on first use and lives until
    /// [`release_subject`](Self::release_subject). For connections use
    /// [`Connection::subscribe`](crate::transport::Connection::subscribe),
    /// which refuses once the connection is gone.
    pub fn subscribe(
        &self,
        kind: &'static EventKind,
        handler: EventHandler,
        scope: Scope,
        unique: bool,
    ) -> Result<Subscription> {
        self.insert(kind, HandlerRef::Strong(handler), scope, unique)
    }

    /// Subscribe without keeping the handler alive.
    ///
    /// Once every other `Arc` to the handler is gone it stops firing and is
    /// pruned on the next publish of `kind`.
    pub fn subscribe_weak(
        &self,
        kind: &'static EventKind,
        handler: &EventHandler,
        scope: Scope,
        unique: bool,
    ) -> Result<Subscription> {
        self.insert(kind, HandlerRef::Weak(Arc::downgrade(handler)), scope, unique)
    }

    fn insert(
        &self,
        kind: &'static EventKind,
        handler: HandlerRef,
        scope: Scope,
        unique: bool,
    ) -> Result<Subscription> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = match scope {
            Scope::Global => self.global.add(kind, id, handler, unique)?,
            Scope::Subject(subject) => {
                let collection = self.subject_collection(subject)?;
                collection.add(kind, id, handler, unique)?
            }
        };
        debug!(event = kind.name(), ?scope, id, "Subscribed");
        Ok(Subscription { id, kind, scope })
    }

    fn subject_collection(&self, subject: SubjectId) -> Result<Arc<HandlerCollection>> {
        let mut subjects = self
            .subjects
            .try_write_for(self.lock_timeout)
            .ok_or(ProtocolError::LockTimeout(constants::ERR_EVENT_WRITE_LOCK))?;
        let timeout = self.lock_timeout;
        Ok(Arc::clone(
            subjects
                .entry(subject)
                .or_insert_with(|| Arc::new(HandlerCollection::new(timeout))),
        ))
    }

    fn find_subject(&self, subject: SubjectId) -> Result<Option<Arc<HandlerCollection>>> {
        let subjects = self
            .subjects
            .try_read_for(self.lock_timeout)
            .ok_or(ProtocolError::LockTimeout(constants::ERR_EVENT_READ_LOCK))?;
        Ok(subjects.get(&subject).cloned())
    }

    /// Remove one subscription. Returns whether it was still registered.
    pub fn unsubscribe(&self, subscription: &Subscription) -> Result<bool> {
        match subscription.scope {
            Scope::Global => self.global.remove(subscription.kind, subscription.id),
            Scope::Subject(subject) => match self.find_subject(subject)? {
                Some(collection) => collection.remove(subscription.kind, subscription.id),
                None => Ok(false),
            },
        }
    }

    /// Remove every handler of `kind` (or of every kind) in `scope`.
    pub fn unsubscribe_all(&self, kind: Option<&'static EventKind>, scope: Scope) -> Result<usize> {
        match scope {
            Scope::Global => self.global.remove_all(kind),
            Scope::Subject(subject) => match self.find_subject(subject)? {
                Some(collection) => collection.remove_all(kind),
                None => Ok(0),
            },
        }
    }

    /// Drop a subject's whole scope. Called when the subject goes away.
    pub fn release_subject(&self, subject: SubjectId) -> Result<bool> {
        let mut subjects = self
            .subjects
            .try_write_for(self.lock_timeout)
            .ok_or(ProtocolError::LockTimeout(constants::ERR_EVENT_WRITE_LOCK))?;
        Ok(subjects.remove(&subject).is_some())
    }

    /// Clear the global scope, and every subject scope when `deep`.
    pub fn clear(&self, deep: bool) -> Result<()> {
        self.global.remove_all(None)?;
        if deep {
            let mut subjects = self
                .subjects
                .try_write_for(self.lock_timeout)
                .ok_or(ProtocolError::LockTimeout(constants::ERR_EVENT_WRITE_LOCK))?;
            subjects.clear();
        }
        Ok(())
    }

    /// Publish `kind`, returning how many handlers were invoked.
    ///
    /// With no subscribers this is a no-op. Lock timeouts skip the affected
    /// scope and are logged.
    pub fn publish(
        &self,
        kind: &'static EventKind,
        subject: Option<SubjectId>,
        args: &EventArgs,
    ) -> usize {
        let mut handlers = Vec::new();
        let mut subject_scope = None;
        let mut subject_dead = 0;

        if let Some(id) = subject {
            match self.find_subject(id).and_then(|c| match c {
                Some(collection) => collection.snapshot(kind).map(|s| Some((collection, s))),
                None => Ok(None),
            }) {
                Ok(Some((collection, snapshot))) => {
                    handlers.extend(snapshot.handlers);
                    subject_dead = snapshot.dead;
                    subject_scope = Some(collection);
                }
                Ok(None) => {}
                Err(e) => warn!(event = kind.name(), subject = %id, error = %e, "Skipping subject scope"),
            }
        }

        let mut global_dead = 0;
        match self.global.snapshot(kind) {
            Ok(snapshot) => {
                handlers.extend(snapshot.handlers);
                global_dead = snapshot.dead;
            }
            Err(e) => warn!(event = kind.name(), error = %e, "Skipping global scope"),
        }

        for handler in &handlers {
            invoke(handler, kind, subject, args);
        }

        if subject_dead > 0 {
            if let Some(collection) = subject_scope {
                if let Err(e) = collection.prune(kind) {
                    debug!(event = kind.name(), error = %e, "Prune skipped");
                }
            }
        }
        if global_dead > 0 {
            if let Err(e) = self.global.prune(kind) {
                debug!(event = kind.name(), error = %e, "Prune skipped");
            }
        }

        handlers.len()
    }

    /// Subscribe every binding tagged `tag` in `units` to `kind` globally.
    ///
    /// Returns the number of bindings registered. A binding that cannot be
    /// registered is logged and skipped.
    pub fn register_tagged(
        &self,
        units: &[Arc<dyn CodeUnit>],
        tag: EventTag,
        kind: &'static EventKind,
    ) -> usize {
        self.bind_tagged(units, tag, kind).len()
    }

    /// [`register_tagged`](Self::register_tagged), returning the
    /// subscriptions so the caller can remove them again.
    pub fn bind_tagged(
        &self,
        units: &[Arc<dyn CodeUnit>],
        tag: EventTag,
        kind: &'static EventKind,
    ) -> Vec<Subscription> {
        let mut bound = Vec::new();
        for unit in units {
            for binding in unit.event_bindings().into_iter().filter(|b| b.tag == tag) {
                match self.subscribe(kind, binding.handler, Scope::Global, true) {
                    Ok(subscription) => {
                        debug!(unit = unit.name(), binding = binding.name, event = kind.name(), "Bound tagged handler");
                        bound.push(subscription);
                    }
                    Err(e) => {
                        error!(unit = unit.name(), binding = binding.name, error = %e, "Failed to bind tagged handler");
                    }
                }
            }
        }
        bound
    }

    /// Number of handlers registered for `kind` in `scope`.
    pub fn handler_count(&self, kind: &'static EventKind, scope: Scope) -> Result<usize> {
        match scope {
            Scope::Global => self.global.count(kind),
            Scope::Subject(subject) => match self.find_subject(subject)? {
                Some(collection) => collection.count(kind),
                None => Ok(0),
            },
        }
    }

    /// Number of subjects with a live scope.
    pub fn subject_count(&self) -> usize {
        self.subjects
            .try_read_for(self.lock_timeout)
            .map_or(0, |subjects| subjects.len())
    }
}

fn invoke(
    handler: &EventHandler,
    kind: &'static EventKind,
    subject: Option<SubjectId>,
    args: &EventArgs,
) {
    let result = catch_unwind(AssertUnwindSafe(|| handler(kind, subject, args)))
        .unwrap_or_else(|panic| Err(panic_error(&*panic)));
    if let Err(e) = result {
        error!(event = kind.name(), ?subject, error = %e, "Event handler failed");
    }
}

/// A caught handler panic as an error.
pub(crate) fn panic_error(payload: &(dyn std::any::Any + Send)) -> ProtocolError {
    ProtocolError::HandlerFailed(format!(
        "{}: {}",
        constants::ERR_HANDLER_PANICKED,
        panic_message(payload)
    ))
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
