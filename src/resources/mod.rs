//! # Resources
//!
//! Collaborators the packet handlers read from.
//!
//! - **Language**: localized strings with `{n}` placeholders
//! - **Users**: account lookups and inserts

pub mod language;
pub mod users;

pub use language::LanguageResource;
pub use users::{InMemoryUserStore, NewUser, UserRecord, UserStore};
