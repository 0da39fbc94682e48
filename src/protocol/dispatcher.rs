use crate::config::SLOW_HANDLER_THRESHOLD;
use crate::error::{constants, ProtocolError, Result};
use crate::events::panic_error;
use crate::protocol::message::Message;
use crate::service::scripts::CodeUnit;
use crate::transport::connection::Connection;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Handles one opcode.
pub trait PacketHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn handle(&self, connection: &Arc<Connection>, message: &Message) -> Result<()>;
}

/// Closure-backed handler, see [`handler_fn`].
pub struct FnHandler<F> {
    name: &'static str,
    f: F,
}

impl<F> PacketHandler for FnHandler<F>
where
    F: Fn(&Arc<Connection>, &Message) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        self.name
    }

    fn handle(&self, connection: &Arc<Connection>, message: &Message) -> Result<()> {
        (self.f)(connection, message)
    }
}

/// Wrap a closure as a named packet handler.
pub fn handler_fn<F>(name: &'static str, f: F) -> Arc<dyn PacketHandler>
where
    F: Fn(&Arc<Connection>, &Message) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(FnHandler { name, f })
}

/// Result of routing one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled { elapsed: Duration, slow: bool },
    /// No handler for the opcode
    Unhandled,
    /// The handler returned an error or panicked
    Failed { slow: bool },
}

/// Opcode router. The first handler registered for an opcode wins.
pub struct PacketRouter {
    handlers: Arc<RwLock<HashMap<u32, Arc<dyn PacketHandler>>>>,
    slow_threshold: Duration,
}

impl Default for PacketRouter {
    fn default() -> Self {
        Self::new(SLOW_HANDLER_THRESHOLD)
    }
}

impl PacketRouter {
    pub fn new(slow_threshold: Duration) -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            slow_threshold,
        }
    }

    /// Register `handler` for `opcode`. Returns `false` if the opcode was
    /// already taken; the existing handler stays.
    pub fn register(&self, opcode: u32, handler: Arc<dyn PacketHandler>) -> Result<bool> {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_ROUTER_WRITE_LOCK.to_string()))?;

        if handlers.contains_key(&opcode) {
            debug!(opcode, handler = handler.name(), "Opcode already registered, ignoring");
            return Ok(false);
        }
        handlers.insert(opcode, handler);
        Ok(true)
    }

    /// Route `message` to its handler and run it on the caller's thread.
    ///
    /// Never fails: unknown opcodes, handler errors and panics are logged and
    /// reported through the outcome.
    pub fn dispatch(&self, connection: &Arc<Connection>, message: &Message) -> DispatchOutcome {
        let handler = match self.handlers.read() {
            Ok(handlers) => handlers.get(&message.opcode).cloned(),
            Err(_) => {
                error!("{}", constants::ERR_ROUTER_READ_LOCK);
                return DispatchOutcome::Failed { slow: false };
            }
        };

        let Some(handler) = handler else {
            warn!(
                opcode = message.opcode,
                peer = %connection.peer_addr(),
                "No handler registered for opcode"
            );
            return DispatchOutcome::Unhandled;
        };

        let start = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| handler.handle(connection, message)));
        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        let slow = elapsed > self.slow_threshold;

        if slow {
            warn!(
                peer = %connection.peer_addr(),
                handler = handler.name(),
                opcode = message.opcode,
                elapsed_ms,
                "Slow packet handler"
            );
        }

        match result {
            Ok(Ok(())) => DispatchOutcome::Handled { elapsed, slow },
            Ok(Err(e)) => {
                error!(
                    peer = %connection.peer_addr(),
                    handler = handler.name(),
                    opcode = message.opcode,
                    elapsed_ms,
                    error = %e,
                    "Packet handler failed"
                );
                DispatchOutcome::Failed { slow }
            }
            Err(panic) => {
                let e = panic_error(&*panic);
                error!(
                    peer = %connection.peer_addr(),
                    handler = handler.name(),
                    opcode = message.opcode,
                    elapsed_ms,
                    error = %e,
                    "Packet handler panicked"
                );
                DispatchOutcome::Failed { slow }
            }
        }
    }

    /// Rebuild the table from the handler lists of `units`.
    ///
    /// The table is cleared first, so handlers from units no longer loaded
    /// disappear. Returns the number of opcodes registered.
    pub fn discover_handlers(&self, units: &[Arc<dyn CodeUnit>]) -> Result<usize> {
        self.clear()?;

        let mut registered = 0;
        for unit in units {
            for (opcode, handler) in unit.packet_handlers() {
                if self.register(opcode, handler)? {
                    registered += 1;
                }
            }
        }
        info!(handlers = registered, units = units.len(), "Packet handlers discovered");
        Ok(registered)
    }

    pub fn clear(&self) -> Result<()> {
        self.handlers
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_ROUTER_WRITE_LOCK.to_string()))?
            .clear();
        Ok(())
    }

    pub fn is_registered(&self, opcode: u32) -> bool {
        self.handlers
            .read()
            .map(|h| h.contains_key(&opcode))
            .unwrap_or(false)
    }

    pub fn handler_name(&self, opcode: u32) -> Option<String> {
        self.handlers
            .read()
            .ok()
            .and_then(|h| h.get(&opcode).map(|handler| handler.name().to_string()))
    }

    pub fn len(&self) -> usize {
        self.handlers.read().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
