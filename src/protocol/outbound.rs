//! Server to client packets.

use crate::protocol::message::{Message, PacketType};
use crate::transport::connection::Connection;

pub fn simple_alert(text: impl Into<String>) -> Message {
    Message::of(PacketType::SimpleAlert).with("Message", text.into())
}

pub fn wallet_state(is_created: bool) -> Message {
    Message::of(PacketType::WalletConnect).with("IsCreated", is_created)
}

pub fn completed_register() -> Message {
    Message::of(PacketType::CompletedRegister)
}

pub fn completed_login() -> Message {
    Message::of(PacketType::Login)
}

/// Typed send helpers bound to one connection. Every method returns whether
/// the packet was queued; nothing is sent to a disconnected client.
pub struct Outbound<'a> {
    connection: &'a Connection,
}

impl<'a> Outbound<'a> {
    pub fn new(connection: &'a Connection) -> Self {
        Self { connection }
    }

    pub fn send_simple_alert(&self, text: impl Into<String>) -> bool {
        self.connection.send_message(&simple_alert(text))
    }

    pub fn send_wallet_state(&self, is_created: bool) -> bool {
        self.connection.send_message(&wallet_state(is_created))
    }

    pub fn send_completed_register(&self) -> bool {
        self.connection.send_message(&completed_register())
    }

    pub fn send_completed_login(&self) -> bool {
        self.connection.send_message(&completed_login())
    }
}
