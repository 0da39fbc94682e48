//! Event kinds, subjects and payloads.

use crate::transport::connection::{Connection, ConnectionId};
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// A named event kind.
///
/// Kinds are declared as `static` items and compared by address, so two
/// statics with the same name are still distinct kinds. Declare new kinds
/// with [`EventKind::new`]:
///
/// ```rust
/// use framegate::events::EventKind;
///
/// pub static MATCH_FOUND: EventKind = EventKind::new("Lobby.MatchFound");
/// assert_eq!(MATCH_FOUND.name(), "Lobby.MatchFound");
/// ```
pub struct EventKind {
    name: &'static str,
}

impl EventKind {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for EventKind {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for EventKind {}

impl Hash for EventKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self as *const EventKind as usize).hash(state);
    }
}

impl fmt::Debug for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventKind").field(&self.name).finish()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Built-in kinds.
pub mod kinds {
    pub mod server {
        use crate::events::EventKind;

        pub static STARTED: EventKind = EventKind::new("Server.Started");
        pub static STOPPED: EventKind = EventKind::new("Server.Stopped");
        pub static WORLD_SAVE: EventKind = EventKind::new("Server.WorldSave");
    }

    pub mod script {
        use crate::events::EventKind;

        pub static LOADED: EventKind = EventKind::new("Script.Loaded");
        pub static UNLOADED: EventKind = EventKind::new("Script.Unloaded");
    }

    pub mod client {
        use crate::events::EventKind;

        pub static CONNECTED: EventKind = EventKind::new("Client.Connected");
        pub static DISCONNECTED: EventKind = EventKind::new("Client.Disconnected");
        pub static MESSAGE_RECEIVED: EventKind = EventKind::new("Client.MessageReceived");
    }
}

/// Stable key for a per-subject handler scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectId(Uuid);

impl SubjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ConnectionId> for SubjectId {
    fn from(id: ConnectionId) -> Self {
        Self(*id.as_uuid())
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Payload delivered with an event.
#[derive(Clone, Default)]
pub enum EventArgs {
    #[default]
    None,
    Connection(Arc<Connection>),
    Message {
        connection: Arc<Connection>,
        text: String,
    },
    Custom(Arc<dyn Any + Send + Sync>),
}

impl EventArgs {
    pub fn connection(&self) -> Option<&Arc<Connection>> {
        match self {
            EventArgs::Connection(c) | EventArgs::Message { connection: c, .. } => Some(c),
            _ => None,
        }
    }

    /// Downcast a custom payload.
    pub fn custom<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            EventArgs::Custom(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for EventArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventArgs::None => f.write_str("None"),
            EventArgs::Connection(c) => f.debug_tuple("Connection").field(&c.id()).finish(),
            EventArgs::Message { connection, text } => f
                .debug_struct("Message")
                .field("connection", &connection.id())
                .field("len", &text.len())
                .finish(),
            EventArgs::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Tags a code unit attaches to its event bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    ServerStarted,
    ServerStopped,
    ScriptLoaded,
    ScriptUnloaded,
}

impl EventTag {
    /// The event a tag binds to.
    pub fn kind(self) -> &'static EventKind {
        match self {
            EventTag::ServerStarted => &kinds::server::STARTED,
            EventTag::ServerStopped => &kinds::server::STOPPED,
            EventTag::ScriptLoaded => &kinds::script::LOADED,
            EventTag::ScriptUnloaded => &kinds::script::UNLOADED,
        }
    }

    pub const ALL: [EventTag; 4] = [
        EventTag::ServerStarted,
        EventTag::ServerStopped,
        EventTag::ScriptLoaded,
        EventTag::ScriptUnloaded,
    ];
}
