use super::keys;
use crate::error::Result;
use crate::protocol::dispatcher::PacketHandler;
use crate::protocol::message::Message;
use crate::resources::{LanguageResource, UserStore};
use crate::transport::connection::Connection;
use std::sync::Arc;
use tracing::info;

/// Checks the password of the account behind the bound wallet.
pub struct LoginHandler {
    users: Arc<dyn UserStore>,
    language: Arc<LanguageResource>,
}

impl LoginHandler {
    pub fn new(users: Arc<dyn UserStore>, language: Arc<LanguageResource>) -> Self {
        Self { users, language }
    }
}

impl PacketHandler for LoginHandler {
    fn name(&self) -> &str {
        "login"
    }

    fn handle(&self, connection: &Arc<Connection>, message: &Message) -> Result<()> {
        let out = connection.out();

        let Some(wallet) = connection.wallet().filter(|w| !w.is_empty()) else {
            out.send_simple_alert(self.language.get(keys::LOGIN_NO_WALLET));
            return Ok(());
        };

        let password = message.str_field("Password").unwrap_or_default();
        if password.is_empty() {
            out.send_simple_alert(self.language.get(keys::LOGIN_EMPTY));
            return Ok(());
        }

        let Some(user) = self.users.find_by_wallet(&wallet)? else {
            out.send_simple_alert(self.language.get(keys::LOGIN_UNKNOWN_WALLET));
            return Ok(());
        };
        if user.password != password {
            out.send_simple_alert(self.language.get(keys::LOGIN_WRONG_PASSWORD));
            return Ok(());
        }

        info!(id = %connection.id(), user = user.id, "Login succeeded");
        out.send_simple_alert(self.language.get(keys::LOGIN_SUCCESS));
        out.send_completed_login();
        Ok(())
    }
}
