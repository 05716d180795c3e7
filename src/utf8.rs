//! Streaming UTF-8 validation as a byte-driven DFA, so a TEXT message's
//! payload can be validated fragment-by-fragment without buffering a whole
//! codepoint's bytes across frame boundaries.
//!
//! This is the table from Bjoern Hoehrmann's "Flexible and Economical UTF-8
//! Decoder" (<https://bjoern.hoehrmann.de/utf-8/decoder/dfa/>), used here
//! purely for acceptance (we never need the decoded codepoint, only whether
//! the byte stream is well-formed).

pub const ACCEPT: u8 = 0;
/// The sticky sink state: `STATES[12..24]` is an all-`12` row, so once the
/// DFA lands here no further byte can move it anywhere else.
pub const REJECT: u8 = 12;

#[rustfmt::skip]
const CLASSES: [u8; 256] = [
    0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0,
    0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0,
    0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0,
    0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0,
    1,1,1,1,1,1,1,1, 1,1,1,1,1,1,1,1, 9,9,9,9,9,9,9,9, 9,9,9,9,9,9,9,9,
    7,7,7,7,7,7,7,7, 7,7,7,7,7,7,7,7, 7,7,7,7,7,7,7,7, 7,7,7,7,7,7,7,7,
    8,8,2,2,2,2,2,2, 2,2,2,2,2,2,2,2, 2,2,2,2,2,2,2,2, 2,2,2,2,2,2,2,2,
    10,3,3,3,3,3,3,3, 3,3,3,3,3,4,3,3, 11,6,6,6,5,8,8,8, 8,8,8,8,8,8,8,8,
];

#[rustfmt::skip]
const STATES: [u8; 108] = [
    0,12,24,36,60,96,84,12,12,12,48,72, 12,12,12,12,12,12,12,12,12,12,12,12,
    12, 0,12,12,12,12,12, 0,12, 0,12,12, 12,24,12,12,12,12,12,24,12,24,12,12,
    12,12,12,12,12,12,12,24,12,12,12,12, 12,24,12,12,12,12,12,12,12,24,12,12,
    12,12,12,12,12,12,12,36,12,36,12,12, 12,36,12,12,12,12,12,36,12,36,12,12,
    12,36,12,12,12,12,12,12,12,12,12,12,
];

/// Feeds one byte through the DFA, returning the next state.
pub fn decode_byte(state: u8, byte: u8) -> u8 {
    let class = CLASSES[byte as usize];
    STATES[(state + class) as usize]
}

/// Feeds a whole slice through the DFA starting from `state`, short-circuiting
/// as soon as the state reaches [`REJECT`] (further bytes cannot recover it).
pub fn validate(mut state: u8, bytes: &[u8]) -> u8 {
    for &byte in bytes {
        state = decode_byte(state, byte);
        if state == REJECT {
            break;
        }
    }
    state
}
