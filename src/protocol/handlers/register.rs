use super::keys;
use crate::error::Result;
use crate::protocol::dispatcher::PacketHandler;
use crate::protocol::message::Message;
use crate::resources::{LanguageResource, NewUser, UserStore};
use crate::transport::connection::Connection;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::info;

const PASSWORD_LEN: RangeInclusive<usize> = 4..=16;
const NICKNAME_LEN: RangeInclusive<usize> = 3..=12;

/// Creates an account for the wallet bound to the connection.
pub struct RegisterHandler {
    users: Arc<dyn UserStore>,
    language: Arc<LanguageResource>,
}

impl RegisterHandler {
    pub fn new(users: Arc<dyn UserStore>, language: Arc<LanguageResource>) -> Self {
        Self { users, language }
    }

    /// First validation failure, as a language key.
    fn validate(&self, wallet: Option<&str>, form: &Form<'_>) -> Result<Option<&'static str>> {
        if [form.email, form.password, form.confirm, form.nickname]
            .iter()
            .any(|field| field.is_empty())
        {
            return Ok(Some(keys::REGISTER_EMPTY));
        }
        if !form.email.contains('@') {
            return Ok(Some(keys::REGISTER_MAIL));
        }
        if form.password != form.confirm || !PASSWORD_LEN.contains(&form.password.chars().count()) {
            return Ok(Some(keys::REGISTER_PASSWORD));
        }
        if !NICKNAME_LEN.contains(&form.nickname.chars().count()) {
            return Ok(Some(keys::REGISTER_NICKNAME));
        }
        let Some(wallet) = wallet else {
            return Ok(Some(keys::REGISTER_NO_WALLET));
        };
        if self.users.email_taken(form.email)? {
            return Ok(Some(keys::REGISTER_MAIL_TAKEN));
        }
        if self.users.wallet_taken(wallet)? {
            return Ok(Some(keys::REGISTER_WALLET_TAKEN));
        }
        if self.users.nickname_taken(form.nickname)? {
            return Ok(Some(keys::REGISTER_NICKNAME_TAKEN));
        }
        Ok(None)
    }
}

struct Form<'a> {
    email: &'a str,
    password: &'a str,
    confirm: &'a str,
    nickname: &'a str,
}

impl PacketHandler for RegisterHandler {
    fn name(&self) -> &str {
        "register"
    }

    fn handle(&self, connection: &Arc<Connection>, message: &Message) -> Result<()> {
        let form = Form {
            email: message.str_field("Email").unwrap_or_default(),
            password: message.str_field("Password").unwrap_or_default(),
            confirm: message.str_field("ConfirmPassword").unwrap_or_default(),
            nickname: message.str_field("NickName").unwrap_or_default(),
        };
        let wallet = connection.wallet().filter(|w| !w.is_empty());

        if let Some(key) = self.validate(wallet.as_deref(), &form)? {
            connection.out().send_simple_alert(self.language.get(key));
            return Ok(());
        }

        let record = self.users.insert(NewUser {
            wallet: wallet.unwrap_or_default(),
            nickname: form.nickname.to_string(),
            password: form.password.to_string(),
            email: form.email.to_string(),
        })?;
        info!(id = %connection.id(), user = record.id, nickname = %record.nickname, "Account registered");

        let out = connection.out();
        out.send_simple_alert(self.language.get(keys::REGISTER_SUCCESS));
        out.send_completed_register();
        Ok(())
    }
}
