//! Wallet connect, register and login handlers over loopback connections.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use bytes::Bytes;
use framegate::protocol::dispatcher::{DispatchOutcome, PacketRouter};
use framegate::protocol::handlers::{keys, AccountUnit};
use framegate::protocol::message::{Message, PacketType};
use framegate::resources::{InMemoryUserStore, LanguageResource, NewUser, UserStore};
use framegate::service::scripts::CodeUnit;
use framegate::transport::Connection;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

const LANGUAGE: &str = "\
# account messages
Accounts.Register.Success:Account created
Accounts.Login.Success:Welcome back
Accounts.Login.WrongPassword:Wrong password
";

struct Harness {
    router: PacketRouter,
    users: Arc<InMemoryUserStore>,
}

impl Harness {
    fn new() -> Self {
        let users = Arc::new(InMemoryUserStore::new());
        let language = Arc::new(LanguageResource::from_text(LANGUAGE));
        let store: Arc<dyn UserStore> = users.clone();
        let unit: Arc<dyn CodeUnit> = Arc::new(AccountUnit::new(store, language));

        let router = PacketRouter::default();
        assert_eq!(router.discover_handlers(&[unit]).unwrap(), 3);
        Self { router, users }
    }

    fn client() -> (Arc<Connection>, UnboundedReceiver<Bytes>) {
        Connection::loopback("127.0.0.1:5000".parse().unwrap())
    }

    fn send(&self, conn: &Arc<Connection>, message: Message) {
        let outcome = self.router.dispatch(conn, &message);
        assert!(
            matches!(outcome, DispatchOutcome::Handled { .. }),
            "unexpected outcome {outcome:?}"
        );
    }
}

/// Decode every queued server frame back into a message.
fn drain(rx: &mut UnboundedReceiver<Bytes>) -> Vec<Message> {
    let mut out = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        let start = match frame[1] & 0x7F {
            126 => 4,
            127 => 10,
            _ => 2,
        };
        out.push(Message::from_slice(&frame[start..]).unwrap());
    }
    out
}

fn alert_text(message: &Message) -> &str {
    assert_eq!(message.packet_type(), Some(PacketType::SimpleAlert));
    message.str_field("Message").unwrap()
}

fn register_form(email: &str, password: &str, confirm: &str, nickname: &str) -> Message {
    Message::of(PacketType::Register)
        .with("Email", email)
        .with("Password", password)
        .with("ConfirmPassword", confirm)
        .with("NickName", nickname)
}

fn seed(users: &InMemoryUserStore, wallet: &str, nickname: &str, password: &str) {
    users
        .insert(NewUser {
            wallet: wallet.into(),
            nickname: nickname.into(),
            password: password.into(),
            email: format!("{nickname}@example.com"),
        })
        .unwrap();
}

// =================== Wallet connect ===================

#[test]
fn test_wallet_connect_reports_unknown_wallet() {
    let harness = Harness::new();
    let (conn, mut rx) = Harness::client();

    harness.send(&conn, Message::of(PacketType::WalletConnect).with("WalletId", "0x01"));

    let replies = drain(&mut rx);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].packet_type(), Some(PacketType::WalletConnect));
    assert_eq!(replies[0].bool_field("IsCreated"), Some(false));
    assert_eq!(conn.wallet().as_deref(), Some("0x01"));
}

#[test]
fn test_wallet_connect_reports_existing_account() {
    let harness = Harness::new();
    seed(&harness.users, "0x02", "alice", "secret");
    let (conn, mut rx) = Harness::client();

    harness.send(&conn, Message::of(PacketType::WalletConnect).with("WalletId", "0x02"));
    assert_eq!(drain(&mut rx)[0].bool_field("IsCreated"), Some(true));
}

#[test]
fn test_wallet_connect_ignores_empty_wallet() {
    let harness = Harness::new();
    let (conn, mut rx) = Harness::client();

    harness.send(&conn, Message::of(PacketType::WalletConnect));
    assert!(drain(&mut rx).is_empty());
    assert_eq!(conn.wallet(), None);
}

// =================== Register ===================

#[test]
fn test_register_validation_order() {
    let harness = Harness::new();
    let (conn, mut rx) = Harness::client();

    let cases = [
        (register_form("", "pass", "pass", "bob"), keys::REGISTER_EMPTY),
        (register_form("bob.example.com", "pass", "pass", "bob"), keys::REGISTER_MAIL),
        (register_form("bob@example.com", "pass", "nope", "bob"), keys::REGISTER_PASSWORD),
        (register_form("bob@example.com", "abc", "abc", "bob"), keys::REGISTER_PASSWORD),
        (
            register_form("bob@example.com", "abcdefghijklmnopq", "abcdefghijklmnopq", "bob"),
            keys::REGISTER_PASSWORD,
        ),
        (register_form("bob@example.com", "pass", "pass", "bo"), keys::REGISTER_NICKNAME),
        (
            register_form("bob@example.com", "pass", "pass", "thirteenchars"),
            keys::REGISTER_NICKNAME,
        ),
        (register_form("bob@example.com", "pass", "pass", "bob"), keys::REGISTER_NO_WALLET),
    ];

    for (form, expected) in cases {
        harness.send(&conn, form);
        let replies = drain(&mut rx);
        assert_eq!(replies.len(), 1);
        // Keys missing from the table render as the key itself.
        assert_eq!(alert_text(&replies[0]), expected);
    }
    assert!(harness.users.is_empty());
}

#[test]
fn test_register_creates_account() {
    let harness = Harness::new();
    let (conn, mut rx) = Harness::client();
    conn.set_wallet("0x10");

    harness.send(&conn, register_form("bob@example.com", "hunter2", "hunter2", "bob"));

    let replies = drain(&mut rx);
    assert_eq!(replies.len(), 2);
    assert_eq!(alert_text(&replies[0]), "Account created");
    assert_eq!(replies[1].packet_type(), Some(PacketType::CompletedRegister));

    let user = harness.users.find_by_wallet("0x10").unwrap().unwrap();
    assert_eq!(user.nickname, "bob");
    assert_eq!(user.email, "bob@example.com");
}

#[test]
fn test_register_rejects_taken_fields() {
    let harness = Harness::new();
    seed(&harness.users, "0x20", "carol", "secret");

    let (conn, mut rx) = Harness::client();
    conn.set_wallet("0x21");
    harness.send(&conn, register_form("carol@example.com", "pass", "pass", "dave"));
    assert_eq!(alert_text(&drain(&mut rx)[0]), keys::REGISTER_MAIL_TAKEN);

    conn.set_wallet("0x20");
    harness.send(&conn, register_form("dave@example.com", "pass", "pass", "dave"));
    assert_eq!(alert_text(&drain(&mut rx)[0]), keys::REGISTER_WALLET_TAKEN);

    conn.set_wallet("0x21");
    harness.send(&conn, register_form("dave@example.com", "pass", "pass", "carol"));
    assert_eq!(alert_text(&drain(&mut rx)[0]), keys::REGISTER_NICKNAME_TAKEN);

    assert_eq!(harness.users.len(), 1);
}

// =================== Login ===================

#[test]
fn test_login_flow() {
    let harness = Harness::new();
    seed(&harness.users, "0x30", "erin", "secret");
    let (conn, mut rx) = Harness::client();

    let login = |password: &str| Message::of(PacketType::Login).with("Password", password);

    harness.send(&conn, login("secret"));
    assert_eq!(alert_text(&drain(&mut rx)[0]), keys::LOGIN_NO_WALLET);

    conn.set_wallet("0x99");
    harness.send(&conn, login(""));
    assert_eq!(alert_text(&drain(&mut rx)[0]), keys::LOGIN_EMPTY);

    harness.send(&conn, login("secret"));
    assert_eq!(alert_text(&drain(&mut rx)[0]), keys::LOGIN_UNKNOWN_WALLET);

    conn.set_wallet("0x30");
    harness.send(&conn, login("wrong"));
    assert_eq!(alert_text(&drain(&mut rx)[0]), "Wrong password");

    harness.send(&conn, login("secret"));
    let replies = drain(&mut rx);
    assert_eq!(replies.len(), 2);
    assert_eq!(alert_text(&replies[0]), "Welcome back");
    assert_eq!(replies[1].packet_type(), Some(PacketType::Login));
}

#[test]
fn test_disconnected_client_receives_nothing() {
    let harness = Harness::new();
    let (conn, mut rx) = Harness::client();
    conn.disconnect();

    harness.send(&conn, Message::of(PacketType::Login).with("Password", "x"));
    assert!(drain(&mut rx).is_empty());
}
