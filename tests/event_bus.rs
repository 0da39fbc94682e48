//! Event bus scoping, uniqueness, weak handlers and fault isolation.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use framegate::error::ProtocolError;
use framegate::events::{handler, kinds, EventArgs, EventBus, EventHandler, EventKind, EventTag, Scope, SubjectId};
use framegate::service::scripts::{CodeUnit, EventBinding};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static PING: EventKind = EventKind::new("Test.Ping");
static OTHER: EventKind = EventKind::new("Test.Other");

fn counter(hits: &Arc<AtomicUsize>) -> EventHandler {
    let hits = hits.clone();
    handler(move |_, _, _| {
        hits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> EventHandler {
    let log = log.clone();
    handler(move |_, _, _| {
        log.lock().push(label);
        Ok(())
    })
}

// =================== Scopes ===================

#[test]
fn test_publish_reaches_global_and_matching_subject() {
    let bus = EventBus::default();
    let subject = SubjectId::new();
    let global = Arc::new(AtomicUsize::new(0));
    let scoped = Arc::new(AtomicUsize::new(0));

    bus.subscribe(&PING, counter(&global), Scope::Global, false).unwrap();
    bus.subscribe(&PING, counter(&scoped), Scope::Subject(subject), false)
        .unwrap();

    // Subject named: both fire.
    assert_eq!(bus.publish(&PING, Some(subject), &EventArgs::None), 2);
    // No subject: only global.
    assert_eq!(bus.publish(&PING, None, &EventArgs::None), 1);
    // Another subject: only global.
    assert_eq!(bus.publish(&PING, Some(SubjectId::new()), &EventArgs::None), 1);

    assert_eq!(global.load(Ordering::SeqCst), 3);
    assert_eq!(scoped.load(Ordering::SeqCst), 1);
}

#[test]
fn test_subject_handlers_run_before_global() {
    let bus = EventBus::default();
    let subject = SubjectId::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    bus.subscribe(&PING, recorder(&log, "global"), Scope::Global, false)
        .unwrap();
    bus.subscribe(&PING, recorder(&log, "subject"), Scope::Subject(subject), false)
        .unwrap();

    bus.publish(&PING, Some(subject), &EventArgs::None);
    assert_eq!(*log.lock(), vec!["subject", "global"]);
}

#[test]
fn test_publish_without_subscribers_is_noop() {
    let bus = EventBus::default();
    assert_eq!(bus.publish(&PING, None, &EventArgs::None), 0);
    assert_eq!(bus.publish(&PING, Some(SubjectId::new()), &EventArgs::None), 0);
    assert_eq!(bus.subject_count(), 0);
}

#[test]
fn test_kinds_are_independent() {
    let bus = EventBus::default();
    let hits = Arc::new(AtomicUsize::new(0));
    bus.subscribe(&PING, counter(&hits), Scope::Global, false).unwrap();

    assert_eq!(bus.publish(&OTHER, None, &EventArgs::None), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn test_handler_receives_kind_subject_and_args() {
    let bus = EventBus::default();
    let subject = SubjectId::new();
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();

    bus.subscribe(
        &PING,
        handler(move |kind, subject, args| {
            *sink.lock() = Some((kind.name(), subject, args.custom::<u32>().copied()));
            Ok(())
        }),
        Scope::Global,
        false,
    )
    .unwrap();

    bus.publish(&PING, Some(subject), &EventArgs::Custom(Arc::new(42u32)));
    assert_eq!(*seen.lock(), Some(("Test.Ping", Some(subject), Some(42))));
}

// =================== Uniqueness ===================

#[test]
fn test_unique_subscribe_keeps_single_entry() {
    let bus = EventBus::default();
    let hits = Arc::new(AtomicUsize::new(0));
    let h = counter(&hits);

    let first = bus.subscribe(&PING, h.clone(), Scope::Global, true).unwrap();
    let second = bus.subscribe(&PING, h.clone(), Scope::Global, true).unwrap();
    assert_eq!(first, second);
    assert_eq!(bus.handler_count(&PING, Scope::Global).unwrap(), 1);

    bus.publish(&PING, None, &EventArgs::None);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_non_unique_subscribe_fires_twice() {
    let bus = EventBus::default();
    let hits = Arc::new(AtomicUsize::new(0));
    let h = counter(&hits);

    bus.subscribe(&PING, h.clone(), Scope::Global, false).unwrap();
    bus.subscribe(&PING, h, Scope::Global, false).unwrap();
    assert_eq!(bus.publish(&PING, None, &EventArgs::None), 2);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

// =================== Removal ===================

#[test]
fn test_unsubscribe_removes_only_that_entry() {
    let bus = EventBus::default();
    let a = Arc::new(AtomicUsize::new(0));
    let b = Arc::new(AtomicUsize::new(0));

    let sub_a = bus.subscribe(&PING, counter(&a), Scope::Global, false).unwrap();
    bus.subscribe(&PING, counter(&b), Scope::Global, false).unwrap();

    assert!(bus.unsubscribe(&sub_a).unwrap());
    assert!(!bus.unsubscribe(&sub_a).unwrap());

    bus.publish(&PING, None, &EventArgs::None);
    assert_eq!(a.load(Ordering::SeqCst), 0);
    assert_eq!(b.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unsubscribe_all_by_kind_and_scope() {
    let bus = EventBus::default();
    let subject = SubjectId::new();
    let hits = Arc::new(AtomicUsize::new(0));

    bus.subscribe(&PING, counter(&hits), Scope::Global, false).unwrap();
    bus.subscribe(&OTHER, counter(&hits), Scope::Global, false).unwrap();
    bus.subscribe(&PING, counter(&hits), Scope::Subject(subject), false)
        .unwrap();

    assert_eq!(bus.unsubscribe_all(Some(&PING), Scope::Global).unwrap(), 1);
    assert_eq!(bus.handler_count(&OTHER, Scope::Global).unwrap(), 1);
    assert_eq!(
        bus.handler_count(&PING, Scope::Subject(subject)).unwrap(),
        1
    );

    assert_eq!(bus.unsubscribe_all(None, Scope::Global).unwrap(), 1);
    assert_eq!(bus.unsubscribe_all(None, Scope::Subject(SubjectId::new())).unwrap(), 0);
}

#[test]
fn test_release_subject_drops_scope() {
    let bus = EventBus::default();
    let subject = SubjectId::new();
    let hits = Arc::new(AtomicUsize::new(0));

    bus.subscribe(&PING, counter(&hits), Scope::Subject(subject), false)
        .unwrap();
    assert_eq!(bus.subject_count(), 1);

    assert!(bus.release_subject(subject).unwrap());
    assert!(!bus.release_subject(subject).unwrap());
    assert_eq!(bus.subject_count(), 0);
    assert_eq!(bus.publish(&PING, Some(subject), &EventArgs::None), 0);
}

#[test]
fn test_clear_shallow_and_deep() {
    let bus = EventBus::default();
    let subject = SubjectId::new();
    let hits = Arc::new(AtomicUsize::new(0));

    bus.subscribe(&PING, counter(&hits), Scope::Global, false).unwrap();
    bus.subscribe(&PING, counter(&hits), Scope::Subject(subject), false)
        .unwrap();

    bus.clear(false).unwrap();
    assert_eq!(bus.handler_count(&PING, Scope::Global).unwrap(), 0);
    assert_eq!(bus.subject_count(), 1);

    bus.clear(true).unwrap();
    assert_eq!(bus.subject_count(), 0);
}

// =================== Weak handlers ===================

#[test]
fn test_weak_handler_stops_after_drop() {
    let bus = EventBus::default();
    let hits = Arc::new(AtomicUsize::new(0));
    let h = counter(&hits);

    bus.subscribe_weak(&PING, &h, Scope::Global, false).unwrap();
    assert_eq!(bus.publish(&PING, None, &EventArgs::None), 1);

    drop(h);
    assert_eq!(bus.publish(&PING, None, &EventArgs::None), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(bus.handler_count(&PING, Scope::Global).unwrap(), 0);
}

// =================== Fault isolation ===================

#[test]
fn test_failing_and_panicking_handlers_do_not_stop_others() {
    let bus = EventBus::default();
    let hits = Arc::new(AtomicUsize::new(0));

    bus.subscribe(
        &PING,
        handler(|_, _, _| Err(ProtocolError::Custom("nope".into()))),
        Scope::Global,
        false,
    )
    .unwrap();
    bus.subscribe(&PING, handler(|_, _, _| panic!("bad handler")), Scope::Global, false)
        .unwrap();
    bus.subscribe(&PING, counter(&hits), Scope::Global, false).unwrap();

    assert_eq!(bus.publish(&PING, None, &EventArgs::None), 3);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_handler_may_subscribe_during_publish() {
    let bus = Arc::new(EventBus::default());
    let hits = Arc::new(AtomicUsize::new(0));
    let inner_bus = Arc::clone(&bus);
    let inner_hits = hits.clone();

    bus.subscribe(
        &PING,
        handler(move |_, _, _| {
            inner_bus.subscribe(&OTHER, counter(&inner_hits), Scope::Global, false)?;
            Ok(())
        }),
        Scope::Global,
        false,
    )
    .unwrap();

    bus.publish(&PING, None, &EventArgs::None);
    assert_eq!(bus.publish(&OTHER, None, &EventArgs::None), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

// =================== Tagged registration ===================

struct TaggedUnit {
    hits: Arc<AtomicUsize>,
    handler: EventHandler,
}

impl CodeUnit for TaggedUnit {
    fn name(&self) -> &str {
        "tagged"
    }

    fn event_bindings(&self) -> Vec<EventBinding> {
        vec![
            EventBinding::new(EventTag::ServerStarted, "on-start", self.handler.clone()),
            EventBinding::new(EventTag::ServerStopped, "on-stop", counter(&self.hits)),
        ]
    }
}

#[test]
fn test_register_tagged_binds_matching_handlers_once() {
    let bus = EventBus::default();
    let hits = Arc::new(AtomicUsize::new(0));
    let unit: Arc<dyn CodeUnit> = Arc::new(TaggedUnit {
        hits: hits.clone(),
        handler: counter(&hits),
    });
    let units = vec![unit];

    let kind = EventTag::ServerStarted.kind();
    assert!(std::ptr::eq(kind, &kinds::server::STARTED));
    assert_eq!(bus.register_tagged(&units, EventTag::ServerStarted, kind), 1);
    // Same allocation again: registration is unique.
    assert_eq!(bus.register_tagged(&units, EventTag::ServerStarted, kind), 1);
    assert_eq!(bus.handler_count(kind, Scope::Global).unwrap(), 1);

    bus.publish(kind, None, &EventArgs::None);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(
        bus.handler_count(&kinds::server::STOPPED, Scope::Global).unwrap(),
        0
    );
}
