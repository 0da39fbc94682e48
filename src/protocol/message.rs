//! Application message envelope.
//!
//! Every text frame carries a JSON object with an integer `Opcode` field and
//! any handler-specific fields next to it:
//!
//! ```json
//! {"Opcode": 3, "Password": "hunter2"}
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Known packet opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PacketType {
    WalletConnect = 0,
    Register = 1,
    CompletedRegister = 2,
    Login = 3,
    SimpleAlert = 100,
}

impl PacketType {
    #[inline]
    pub fn opcode(self) -> u32 {
        self as u32
    }

    pub fn from_opcode(opcode: u32) -> Option<Self> {
        match opcode {
            0 => Some(PacketType::WalletConnect),
            1 => Some(PacketType::Register),
            2 => Some(PacketType::CompletedRegister),
            3 => Some(PacketType::Login),
            100 => Some(PacketType::SimpleAlert),
            _ => None,
        }
    }
}

/// A decoded application message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "Opcode")]
    pub opcode: u32,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Message {
    pub fn new(opcode: u32) -> Self {
        Self {
            opcode,
            fields: Map::new(),
        }
    }

    pub fn of(packet: PacketType) -> Self {
        Self::new(packet.opcode())
    }

    /// Builder-style field insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_opcode(self.opcode)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String field, `None` when absent or not a string.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }
}
