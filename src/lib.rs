//! A non-blocking WebSocket (RFC 6455) connection engine.
//!
//! This crate implements the hard part of a WebSocket implementation — the
//! wire codec, fragmentation reassembly, the bilateral close handshake,
//! payload validation, and write-side scheduling — as a pure, transport-
//! agnostic state machine. It never performs socket I/O itself: an outer
//! event loop feeds it bytes via [`connection::Connection::ingest`] and
//! drains its outbound queue via [`connection::Connection::flush`] against
//! whatever [`scheduler::Transport`] it implements.
//!
//! HTTP upgrade handshake parsing, TCP/TLS, and server fleet management are
//! deliberately out of scope; [`utils::accept_key`] is kept as a standalone
//! primitive for whatever HTTP layer a consumer plugs in.

pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod frame;
pub mod role;
pub mod scheduler;
pub mod sink;
pub mod utf8;
pub mod utils;

pub use config::EngineConfig;
pub use connection::Connection;
pub use error::{Error, Result};
pub use event::{ConnectionId, DecodedMessage, ErrorCode, MessagePayload, ReadCode, Update, UpdateKind};
pub use frame::OpCode;
pub use role::{ClientRole, Role, ServerRole};
pub use scheduler::Transport;
pub use sink::{MessageHeaders, MessageSink, NewMessageSinkCallback, SinkDecision};
