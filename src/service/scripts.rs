//! Code units and the registry that holds them.
//!
//! A code unit publishes two static tables: the packet handlers it provides,
//! keyed by opcode, and the event bindings it wants attached at startup. The
//! server rebuilds packet routing from these tables whenever `Script.Loaded`
//! fires.

use crate::events::{EventHandler, EventTag};
use crate::protocol::dispatcher::PacketHandler;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// An event handler a unit wants bound under `tag`.
#[derive(Clone)]
pub struct EventBinding {
    pub tag: EventTag,
    pub name: &'static str,
    pub handler: EventHandler,
}

impl EventBinding {
    pub fn new(tag: EventTag, name: &'static str, handler: EventHandler) -> Self {
        Self { tag, name, handler }
    }
}

impl std::fmt::Debug for EventBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBinding")
            .field("tag", &self.tag)
            .field("name", &self.name)
            .finish()
    }
}

pub trait CodeUnit: Send + Sync {
    /// Unique unit name; installing a second unit with the same name is a no-op.
    fn name(&self) -> &str;

    fn packet_handlers(&self) -> Vec<(u32, Arc<dyn PacketHandler>)> {
        Vec::new()
    }

    fn event_bindings(&self) -> Vec<EventBinding> {
        Vec::new()
    }
}

/// Source of the currently loaded code units.
pub trait ScriptRegistry: Send + Sync {
    /// Snapshot of the loaded units in install order.
    fn loaded_units(&self) -> Vec<Arc<dyn CodeUnit>>;

    /// Add a unit. Returns `false` if one with the same name is present.
    fn install(&self, unit: Arc<dyn CodeUnit>) -> bool;
}

/// Registry over a fixed, in-process list of units.
#[derive(Default)]
pub struct StaticScriptRegistry {
    units: RwLock<Vec<Arc<dyn CodeUnit>>>,
}

impl StaticScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_units<I>(units: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn CodeUnit>>,
    {
        let registry = Self::new();
        for unit in units {
            registry.install(unit);
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.units.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.read().is_empty()
    }
}

impl ScriptRegistry for StaticScriptRegistry {
    fn loaded_units(&self) -> Vec<Arc<dyn CodeUnit>> {
        self.units.read().clone()
    }

    fn install(&self, unit: Arc<dyn CodeUnit>) -> bool {
        let mut units = self.units.write();
        if units.iter().any(|u| u.name() == unit.name()) {
            debug!(unit = unit.name(), "Code unit already installed");
            return false;
        }
        info!(unit = unit.name(), "Code unit installed");
        units.push(unit);
        true
    }
}
