//! # Account Handlers
//!
//! Wallet binding, registration and login, packaged as one code unit.
//!
//! Validation failures answer with a `SimpleAlert` carrying a localized
//! message; the connection is never dropped for them.

mod login;
mod register;
mod wallet;

pub use login::LoginHandler;
pub use register::RegisterHandler;
pub use wallet::WalletConnectHandler;

use crate::protocol::dispatcher::PacketHandler;
use crate::protocol::message::PacketType;
use crate::resources::{LanguageResource, UserStore};
use crate::service::scripts::CodeUnit;
use std::sync::Arc;

/// Language keys used in alerts.
pub mod keys {
    pub const REGISTER_EMPTY: &str = "Accounts.Register.IsNullOrEmpty";
    pub const REGISTER_NO_WALLET: &str = "Accounts.Register.NoWallet";
    pub const REGISTER_MAIL: &str = "Accounts.Register.ValidMail";
    pub const REGISTER_PASSWORD: &str = "Accounts.Register.ValidPassword";
    pub const REGISTER_NICKNAME: &str = "Accounts.Register.ValidNickName";
    pub const REGISTER_MAIL_TAKEN: &str = "Accounts.Register.AnyMail";
    pub const REGISTER_WALLET_TAKEN: &str = "Accounts.Register.AnyWallet";
    pub const REGISTER_NICKNAME_TAKEN: &str = "Accounts.Register.AnyNickName";
    pub const REGISTER_SUCCESS: &str = "Accounts.Register.Success";

    pub const LOGIN_NO_WALLET: &str = "Accounts.Login.NoWallet";
    pub const LOGIN_EMPTY: &str = "Accounts.Login.IsNullOrEmpty";
    pub const LOGIN_UNKNOWN_WALLET: &str = "Accounts.Login.NoAnyWallet";
    pub const LOGIN_WRONG_PASSWORD: &str = "Accounts.Login.WrongPassword";
    pub const LOGIN_SUCCESS: &str = "Accounts.Login.Success";
}

/// Code unit providing the three account handlers.
pub struct AccountUnit {
    users: Arc<dyn UserStore>,
    language: Arc<LanguageResource>,
}

impl AccountUnit {
    pub fn new(users: Arc<dyn UserStore>, language: Arc<LanguageResource>) -> Self {
        Self { users, language }
    }
}

impl CodeUnit for AccountUnit {
    fn name(&self) -> &str {
        "accounts"
    }

    fn packet_handlers(&self) -> Vec<(u32, Arc<dyn PacketHandler>)> {
        let wallet: Arc<dyn PacketHandler> =
            Arc::new(WalletConnectHandler::new(Arc::clone(&self.users)));
        let register: Arc<dyn PacketHandler> = Arc::new(RegisterHandler::new(
            Arc::clone(&self.users),
            Arc::clone(&self.language),
        ));
        let login: Arc<dyn PacketHandler> = Arc::new(LoginHandler::new(
            Arc::clone(&self.users),
            Arc::clone(&self.language),
        ));

        vec![
            (PacketType::WalletConnect.opcode(), wallet),
            (PacketType::Register.opcode(), register),
            (PacketType::Login.opcode(), login),
        ]
    }
}
