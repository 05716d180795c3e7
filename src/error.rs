use std::string::FromUtf8Error;
use thiserror::Error;

/// Everything that can go wrong while decoding bytes into frames, driving the
/// connection state machine, or writing frames back out.
///
/// One variant per failure mode; `#[from]` is reserved for genuine external
/// error types, never used for the engine's own protocol decisions (those
/// get a plain variant plus a `&'static str` describing which rule fired).
#[derive(Error, Debug)]
pub enum Error {
    // Protocol errors (remote misbehavior): enqueue a CLOSE frame, arm
    // close_after_write, and surface this to the caller.
    #[error("RSV bit set without an allowing extension")]
    RsvBitSet,

    #[error("protocol error: {0}")]
    ProtocolError(&'static str),

    #[error("invalid opcode")]
    InvalidOpcode,

    // Payload errors — invalid UTF-8 inside a TEXT message.
    #[error("invalid payload: {0}")]
    InvalidPayload(&'static str),

    // Sink errors — the application-supplied sink failed mid-message. The
    // connection survives; only this frame is considered lost.
    #[error("application sink rejected or failed to accept frame payload")]
    InvalidTargetStream,

    // Transport errors on write.
    #[error("write to transport failed")]
    Write,

    #[error("{source}")]
    FromUtf8Error {
        #[from]
        source: FromUtf8Error,
    },

    #[error("{source}")]
    IOError {
        #[from]
        source: std::io::Error,
    },

    /// A breach of an internal invariant the Framer/state machine are meant
    /// to make impossible (an opcode slipping past decode validation, an
    /// out-of-range RSV bit index, an unrecognized sink-callback return).
    /// Always a bug in the engine or its caller, never a remote-caused
    /// condition — unrecoverable, terminates the connection.
    #[error("fatal invariant violation: {0}")]
    Fatal(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
