//! # Event Bus
//!
//! Publish/subscribe over two scopes.
//!
//! ## Scopes
//! - **Global**: one collection that sees every publish of a kind
//! - **Subject**: a collection per [`SubjectId`] that only sees publishes
//!   naming that subject (for connections, the connection id)
//!
//! Every collection is guarded by a `parking_lot::RwLock` acquired with a
//! bounded wait (3000 ms by default). A timed-out acquisition abandons the
//! operation with [`ProtocolError::LockTimeout`](crate::error::ProtocolError)
//! and leaves state untouched.
//!
//! ## Example
//! ```rust
//! use framegate::events::{handler, kinds, EventArgs, EventBus, Scope};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let bus = EventBus::default();
//! let hits = Arc::new(AtomicUsize::new(0));
//! let seen = hits.clone();
//! let sub = bus
//!     .subscribe(
//!         &kinds::server::STARTED,
//!         handler(move |_, _, _| {
//!             seen.fetch_add(1, Ordering::SeqCst);
//!             Ok(())
//!         }),
//!         Scope::Global,
//!         false,
//!     )
//!     .unwrap();
//!
//! assert_eq!(bus.publish(&kinds::server::STARTED, None, &EventArgs::None), 1);
//! bus.unsubscribe(&sub).unwrap();
//! assert_eq!(bus.publish(&kinds::server::STARTED, None, &EventArgs::None), 0);
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! ```

mod bus;
mod collection;
mod kind;

pub use bus::{EventBus, Scope, Subscription};
pub(crate) use bus::panic_error;
pub use collection::{handler, EventCallback, EventHandler, HandlerCollection};
pub use kind::{kinds, EventArgs, EventKind, EventTag, SubjectId};
