use crate::error::Result;
use crate::protocol::dispatcher::PacketHandler;
use crate::protocol::message::Message;
use crate::resources::UserStore;
use crate::transport::connection::Connection;
use std::sync::Arc;
use tracing::debug;

/// Binds `WalletId` to the connection and reports whether it has an account.
pub struct WalletConnectHandler {
    users: Arc<dyn UserStore>,
}

impl WalletConnectHandler {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }
}

impl PacketHandler for WalletConnectHandler {
    fn name(&self) -> &str {
        "wallet-connect"
    }

    fn handle(&self, connection: &Arc<Connection>, message: &Message) -> Result<()> {
        let wallet = message.str_field("WalletId").unwrap_or_default();
        if wallet.is_empty() {
            return Ok(());
        }

        connection.set_wallet(wallet);
        let is_created = self.users.wallet_taken(wallet)?;
        debug!(id = %connection.id(), wallet, is_created, "Wallet bound");
        connection.out().send_wallet_state(is_created);
        Ok(())
    }
}
