#![no_main]

use framegate::core::handshake;
use framegate::protocol::message::Message;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Upgrade request parsing on arbitrary text
    let request = String::from_utf8_lossy(data);
    if let Ok(response) = handshake::response_for(&request) {
        assert!(response.ends_with("\r\n\r\n"));
    }

    // Message envelope parsing on arbitrary bytes
    if let Ok(message) = Message::from_slice(data) {
        let _ = message.to_bytes();
    }
});
