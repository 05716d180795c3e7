//! Small pure helpers shared across the engine: the RFC 6455 handshake GUID
//! dance (kept standalone per SPEC_FULL.md §4.8 — never wired into the
//! engine's own ingest/emit surface) and the masking-key source used by
//! `Connection::write` when the role requires masking.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use rand::Rng;
use sha1::{Digest, Sha1};

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Derives the `Sec-WebSocket-Accept` value from a client's
/// `Sec-WebSocket-Key`, per RFC 6455 §1.3. The HTTP upgrade exchange itself
/// is out of scope for this engine; this primitive exists so whatever HTTP
/// layer a consumer plugs in has a ready, correct implementation.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

/// Generates a fresh, random `Sec-WebSocket-Key` for an outbound handshake.
pub fn generate_client_key() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    BASE64_STANDARD.encode(random_bytes)
}

/// Sources a fresh 4-byte masking key for one outbound frame. Isolated in
/// its own function (rather than inlined into the encoder) so it can be
/// stubbed out in tests that need deterministic wire bytes.
pub fn generate_mask_key() -> [u8; 4] {
    rand::rng().random()
}
