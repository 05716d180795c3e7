//! Per-message decision of whether a payload is buffered in memory or
//! streamed to an application-supplied byte sink as frames arrive.

use crate::frame::OpCode;

/// Headers of the first frame of a new data message, handed to the
/// `new_message_sink` callback so it can decide how to receive the payload
/// (e.g. reject oversize uploads by content-length hint, or route large
/// binary transfers straight to disk).
#[derive(Debug, Clone, Copy)]
pub struct MessageHeaders {
    pub opcode: OpCode,
    pub fin: bool,
    /// Length of the first frame's payload only; later fragments may add
    /// more.
    pub first_frame_len: u64,
}

/// A writable byte destination for a streamed message. Mirrors
/// `std::io::Write` in spirit but stays fallible-and-simple rather than
/// pulling in the full `io::Write` contract, since the engine only ever
/// calls `write_all` semantics against it.
pub trait MessageSink: Send {
    /// Returns `Ok(())` once every byte in `data` has been accepted, or
    /// `Err(())` if the sink failed. A failed sink does not abort the
    /// connection; the caller emits `Error(InvalidTargetStream)` and moves
    /// on.
    fn write_all(&mut self, data: &[u8]) -> Result<(), ()>;
}

/// The three-way decision a `new_message_sink` callback returns, modeled as
/// a sum type rather than an overloaded boolean/Option.
pub enum SinkDecision {
    /// Buffer the message payload in memory (the common case).
    Buffer,
    /// Reject the message: the engine responds with CLOSE 1003.
    Reject,
    /// Stream the payload directly to the given sink instead of buffering.
    External(Box<dyn MessageSink>),
}

pub type NewMessageSinkCallback = Box<dyn FnMut(&MessageHeaders) -> SinkDecision + Send>;

/// Where an in-progress fragmented message's payload is currently going.
pub(crate) enum PartialTarget {
    Buffer(Vec<u8>),
    External(Box<dyn MessageSink>),
}
