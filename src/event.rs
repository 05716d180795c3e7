//! `Update` — the tagged records the engine emits while driving a connection.
//!
//! `ingest` is modeled as returning an eagerly-collected `Vec<Update>` per
//! call rather than a lazy `Stream`/generator: a plain `Vec` returned from a
//! synchronous call over a hand-rolled `Stream` adapter in the hot path.

use crate::error::Error;
use crate::frame::OpCode;
use rand::Rng;
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// Generates a fresh identifier for a newly accepted/opened connection.
pub fn generate_connection_id() -> ConnectionId {
    Uuid::new_v8(rand::rng().random::<[u8; 16]>())
}

/// A fully reassembled data message. TEXT payloads are UTF-8 checked well
/// before this point, by the streaming validator, so the conversion here is
/// infallible.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// Where a completed message's payload ended up: buffered by the engine, or
/// handed off byte-by-byte to an application-supplied sink as it arrived.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    Buffered(DecodedMessage),
    /// The message was streamed to an external sink; no payload is held by
    /// the engine.
    Streamed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadCode {
    Message {
        opcode: OpCode,
        payload: MessagePayload,
    },
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Disconnect {
        code: u16,
        reason: String,
    },
    SockDisconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Write,
    RsvBitSet,
    ProtocolError,
    InvalidPayload,
    InvalidTargetStream,
}

impl ErrorCode {
    /// Classifies an `Error` into the grouping surfaced to callers; returns
    /// `None` for errors that are not surfaced as an `Update` (fatal
    /// invariant breaches propagate as a hard `Err` instead).
    pub fn from_error(error: &Error) -> Option<Self> {
        match error {
            Error::Write => Some(ErrorCode::Write),
            Error::RsvBitSet => Some(ErrorCode::RsvBitSet),
            Error::ProtocolError(_) => Some(ErrorCode::ProtocolError),
            Error::InvalidPayload(_) => Some(ErrorCode::InvalidPayload),
            Error::InvalidTargetStream => Some(ErrorCode::InvalidTargetStream),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    Read(ReadCode),
    Error { code: ErrorCode, error: String },
}

/// One event emitted by the connection state machine, always tagged with
/// the connection it came from so a multiplexing outer loop can route it.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub source_connection: ConnectionId,
    pub kind: UpdateKind,
}

impl Update {
    pub fn read(source_connection: ConnectionId, code: ReadCode) -> Self {
        Self {
            source_connection,
            kind: UpdateKind::Read(code),
        }
    }

    pub fn error(source_connection: ConnectionId, error: &Error) -> Option<Self> {
        let code = ErrorCode::from_error(error)?;
        Some(Self {
            source_connection,
            kind: UpdateKind::Error {
                code,
                error: error.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_ids_are_unique() {
        let a = generate_connection_id();
        let b = generate_connection_id();
        assert_ne!(a, b);
    }

    #[test]
    fn error_classification_matches_spec_table() {
        assert_eq!(ErrorCode::from_error(&Error::Write), Some(ErrorCode::Write));
        assert_eq!(
            ErrorCode::from_error(&Error::RsvBitSet),
            Some(ErrorCode::RsvBitSet)
        );
        assert_eq!(
            ErrorCode::from_error(&Error::ProtocolError("x")),
            Some(ErrorCode::ProtocolError)
        );
        assert_eq!(
            ErrorCode::from_error(&Error::InvalidPayload("x")),
            Some(ErrorCode::InvalidPayload)
        );
        assert_eq!(
            ErrorCode::from_error(&Error::InvalidTargetStream),
            Some(ErrorCode::InvalidTargetStream)
        );
        assert_eq!(ErrorCode::from_error(&Error::Fatal("x")), None);
    }
}
