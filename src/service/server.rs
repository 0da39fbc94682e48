//! # Game Server
//!
//! The server context. It owns the event bus, the packet router, the acceptor
//! and the shared resources, and runs the startup sequence:
//!
//! 1. bind tagged event handlers of every loaded code unit
//! 2. load the language table
//! 3. attach lifecycle logging
//! 4. configure the listen socket
//! 5. publish `Script.Loaded`, which rebuilds packet routing
//! 6. start listening and publish `Server.Started`
//!
//! ## Example
//! ```rust,no_run
//! use framegate::config::Config;
//! use framegate::service::GameServer;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> framegate::error::Result<()> {
//!     let server = GameServer::with_accounts(Config::default());
//!     server.start()?;
//!     tokio::time::sleep(Duration::from_secs(60)).await;
//!     server.stop();
//!     Ok(())
//! }
//! ```

use crate::config::Config;
use crate::error::Result;
use crate::events::{handler, kinds, EventArgs, EventBus, EventTag, Scope, Subscription};
use crate::protocol::dispatcher::PacketRouter;
use crate::protocol::handlers::AccountUnit;
use crate::resources::{InMemoryUserStore, LanguageResource, UserStore};
use crate::service::scripts::{CodeUnit, EventBinding, ScriptRegistry, StaticScriptRegistry};
use crate::transport::acceptor::{AcceptorState, ConnectionAcceptor};
use crate::utils::metrics::Metrics;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Name of the built-in unit that owns handler discovery.
pub const CORE_UNIT: &str = "core";

pub struct GameServer {
    config: Config,
    bus: Arc<EventBus>,
    router: Arc<PacketRouter>,
    acceptor: ConnectionAcceptor,
    scripts: Arc<dyn ScriptRegistry>,
    users: Arc<dyn UserStore>,
    language: Arc<LanguageResource>,
    metrics: Arc<Metrics>,
    lifecycle: Mutex<Vec<Subscription>>,
    tagged: Mutex<Vec<Subscription>>,
}

impl GameServer {
    pub fn new(config: Config, scripts: Arc<dyn ScriptRegistry>, users: Arc<dyn UserStore>) -> Self {
        let bus = Arc::new(EventBus::new(config.events.lock_timeout));
        let router = Arc::new(PacketRouter::new(config.server.slow_handler_threshold));
        let metrics = Arc::new(Metrics::new());
        let language = Arc::new(match config.resources.language_file {
            Some(ref path) => LanguageResource::with_path(path),
            None => LanguageResource::new(),
        });
        let acceptor = ConnectionAcceptor::new(
            config.server.clone(),
            Arc::clone(&bus),
            Arc::clone(&router),
            Arc::clone(&metrics),
        );

        scripts.install(Arc::new(CoreUnit {
            router: Arc::clone(&router),
            scripts: Arc::downgrade(&scripts),
        }));

        Self {
            config,
            bus,
            router,
            acceptor,
            scripts,
            users,
            language,
            metrics,
            lifecycle: Mutex::new(Vec::new()),
            tagged: Mutex::new(Vec::new()),
        }
    }

    /// A server with an in-memory account store and the account handlers
    /// installed.
    pub fn with_accounts(config: Config) -> Self {
        let scripts: Arc<dyn ScriptRegistry> = Arc::new(StaticScriptRegistry::new());
        let users: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
        let server = Self::new(config, scripts, users);
        server.install_unit(Arc::new(AccountUnit::new(
            Arc::clone(&server.users),
            Arc::clone(&server.language),
        )));
        server
    }

    /// Run the startup sequence. Must run inside a Tokio runtime.
    pub fn start(&self) -> Result<AcceptorState> {
        if self.acceptor.state() == AcceptorState::Listening {
            info!("Server already started");
            return Ok(AcceptorState::Listening);
        }

        self.bind_tagged();

        if let Err(e) = self.language.reload() {
            error!(error = %e, "Language table not loaded");
        }

        let state = match self.open_listener() {
            Ok(state) => state,
            Err(e) => {
                self.unbind_tagged();
                return Err(e);
            }
        };
        self.bus
            .publish(&kinds::server::STARTED, None, &EventArgs::None);
        info!(
            addr = ?self.acceptor.local_addr(),
            handlers = self.router.len(),
            "Server started"
        );
        Ok(state)
    }

    fn open_listener(&self) -> Result<AcceptorState> {
        self.attach_lifecycle_logging()?;
        self.acceptor.create_socket(self.config.server.endpoint())?;
        self.bus
            .publish(&kinds::script::LOADED, None, &EventArgs::None);
        self.acceptor.start()
    }

    /// Close the listener and publish `Server.Stopped`.
    ///
    /// Tagged bindings are dropped afterwards; the next `start` binds the
    /// loaded units afresh.
    pub fn stop(&self) -> AcceptorState {
        let state = self.acceptor.stop();
        self.bus
            .publish(&kinds::server::STOPPED, None, &EventArgs::None);
        self.unbind_tagged();
        self.metrics.log_metrics();
        state
    }

    /// Bind the tagged handlers of every loaded unit, once per run.
    fn bind_tagged(&self) {
        let mut tagged = self.tagged.lock();
        if !tagged.is_empty() {
            return;
        }
        let units = self.scripts.loaded_units();
        for tag in EventTag::ALL {
            let bound = self.bus.bind_tagged(&units, tag, tag.kind());
            debug!(?tag, bound = bound.len(), "Tagged handlers registered");
            tagged.extend(bound);
        }
    }

    fn unbind_tagged(&self) {
        let bound = std::mem::take(&mut *self.tagged.lock());
        for subscription in &bound {
            if let Err(e) = self.bus.unsubscribe(subscription) {
                warn!(event = subscription.kind().name(), error = %e, "Failed to unbind tagged handler");
            }
        }
    }

    /// Add a code unit. While running, routing is rebuilt right away.
    pub fn install_unit(&self, unit: Arc<dyn CodeUnit>) -> bool {
        let installed = self.scripts.install(unit);
        if installed && self.acceptor.state() == AcceptorState::Listening {
            self.reload_scripts();
        }
        installed
    }

    /// Publish `Script.Unloaded` then `Script.Loaded`.
    pub fn reload_scripts(&self) {
        self.bus
            .publish(&kinds::script::UNLOADED, None, &EventArgs::None);
        self.bus
            .publish(&kinds::script::LOADED, None, &EventArgs::None);
    }

    /// Publish `Server.WorldSave`, returning how many handlers ran.
    pub fn save_world(&self) -> usize {
        self.bus
            .publish(&kinds::server::WORLD_SAVE, None, &EventArgs::None)
    }

    fn attach_lifecycle_logging(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if !lifecycle.is_empty() {
            return Ok(());
        }

        lifecycle.push(self.bus.subscribe(
            &kinds::client::CONNECTED,
            handler(|_, _, args| {
                if let Some(conn) = args.connection() {
                    info!(id = %conn.id(), peer = %conn.peer_addr(), "Client connected to server");
                }
                Ok(())
            }),
            Scope::Global,
            true,
        )?);
        lifecycle.push(self.bus.subscribe(
            &kinds::client::DISCONNECTED,
            handler(|_, _, args| {
                if let Some(conn) = args.connection() {
                    info!(id = %conn.id(), peer = %conn.peer_addr(), "Client left server");
                }
                Ok(())
            }),
            Scope::Global,
            true,
        )?);
        lifecycle.push(self.bus.subscribe(
            &kinds::client::MESSAGE_RECEIVED,
            handler(|_, _, args| {
                if let EventArgs::Message { connection, text } = args {
                    debug!(id = %connection.id(), len = text.len(), "Message received");
                }
                Ok(())
            }),
            Scope::Global,
            true,
        )?);
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn router(&self) -> &Arc<PacketRouter> {
        &self.router
    }

    pub fn acceptor(&self) -> &ConnectionAcceptor {
        &self.acceptor
    }

    pub fn scripts(&self) -> &Arc<dyn ScriptRegistry> {
        &self.scripts
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    pub fn language(&self) -> &Arc<LanguageResource> {
        &self.language
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}

/// Rebuilds packet routing from the loaded units on `Script.Loaded`.
struct CoreUnit {
    router: Arc<PacketRouter>,
    scripts: Weak<dyn ScriptRegistry>,
}

impl CodeUnit for CoreUnit {
    fn name(&self) -> &str {
        CORE_UNIT
    }

    fn event_bindings(&self) -> Vec<EventBinding> {
        let router = Arc::clone(&self.router);
        let scripts = Weak::clone(&self.scripts);
        vec![EventBinding::new(
            EventTag::ScriptLoaded,
            "discover-packet-handlers",
            handler(move |_, _, _| {
                let Some(scripts) = scripts.upgrade() else {
                    warn!("Script registry dropped, skipping handler discovery");
                    return Ok(());
                };
                router.discover_handlers(&scripts.loaded_units())?;
                Ok(())
            }),
        )]
    }
}
