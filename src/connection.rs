//! The core of the engine: owns all per-connection mutable state,
//! reassembles ingested bytes into messages, and drives the bilateral close
//! handshake.

use crate::config::EngineConfig;
use crate::error::Error;
use crate::event::{ConnectionId, DecodedMessage, MessagePayload, ReadCode, Update};
use crate::frame::{self, decode_header, DecodeResult, FrameHeader, OpCode};
use crate::role::Role;
use crate::scheduler::{FlushOutcome, Transport, WriteScheduler};
use crate::sink::{MessageHeaders, MessageSink, NewMessageSinkCallback, PartialTarget, SinkDecision};
use crate::utf8;
use crate::utils::generate_mask_key;
use std::marker::PhantomData;
use std::time::Instant;

/// Owns all mutable per-connection state. Generic over the role marker so
/// masking policy is resolved at compile time rather than a runtime branch,
/// since a connection's role never changes over its lifetime.
pub struct Connection<R: Role> {
    id: ConnectionId,
    config: EngineConfig,
    read_buffer: Vec<u8>,
    partial: Option<(OpCode, PartialTarget)>,
    utf8_state: u8,
    scheduler: WriteScheduler,
    opened_at: Instant,
    we_sent_close: bool,
    we_initiated_close: bool,
    remote_sent_close: bool,
    close_after_write: bool,
    new_message_sink: Option<NewMessageSinkCallback>,
    /// Advisory hint for an outer loop sizing its next read: how many more
    /// bytes the in-progress frame needs before it can be decoded/consumed.
    current_frame_remaining_bytes: Option<u64>,
    _role: PhantomData<R>,
}

impl<R: Role> Connection<R> {
    pub fn new(id: ConnectionId, config: EngineConfig) -> Self {
        Self {
            id,
            config,
            read_buffer: Vec::new(),
            partial: None,
            utf8_state: utf8::ACCEPT,
            scheduler: WriteScheduler::new(),
            opened_at: Instant::now(),
            we_sent_close: false,
            we_initiated_close: false,
            remote_sent_close: false,
            close_after_write: false,
            new_message_sink: None,
            current_frame_remaining_bytes: None,
            _role: PhantomData,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    pub fn should_mask(&self) -> bool {
        R::should_mask()
    }

    pub fn is_disconnecting(&self) -> bool {
        self.we_sent_close || self.remote_sent_close
    }

    pub fn is_write_buffer_empty(&self) -> bool {
        self.scheduler.is_empty()
    }

    pub fn set_close_after_write(&mut self) {
        self.close_after_write = true;
    }

    pub fn set_read_rate(&mut self, read_rate: usize) {
        self.config.read_rate = read_rate;
    }

    pub fn set_write_rate(&mut self, write_rate: usize) {
        self.config.write_rate = write_rate;
    }

    pub fn set_max_handshake_length(&mut self, max_handshake_length: usize) {
        self.config.max_handshake_length = max_handshake_length;
    }

    pub fn set_rsv_bit_allowed(&mut self, bit: u8, allowed: bool) -> Result<(), Error> {
        self.config.set_rsv_bit_allowed(bit, allowed)
    }

    pub fn is_rsv_bit_allowed(&self, bit: u8) -> Result<bool, Error> {
        self.config.is_rsv_bit_allowed(bit)
    }

    pub fn set_new_message_sink_callback(&mut self, callback: NewMessageSinkCallback) {
        self.new_message_sink = Some(callback);
    }

    // --- write-side public operations -----------------------------------

    /// Encodes one frame and routes it to the priority or normal queue
    /// depending on its opcode. Control opcodes always go to the priority
    /// queue regardless of call site, which is what makes the PONG-after-
    /// ingest-loop ordering in `ingest` fall out naturally.
    pub fn write(&mut self, data: &[u8], opcode: OpCode, fin: bool) -> Result<(), Error> {
        if self.we_sent_close && !matches!(opcode, OpCode::Pong | OpCode::Close) {
            return Err(Error::ProtocolError(
                "connection is closing; only pong replies may be enqueued",
            ));
        }

        let mask_key = if R::should_mask() { Some(generate_mask_key()) } else { None };
        let frame = frame::encode_frame(data, opcode, fin, mask_key);
        log::trace!("queueing {opcode:?} frame ({} bytes payload)", data.len());

        if opcode.is_priority() {
            self.scheduler.enqueue_priority(frame);
        } else {
            self.scheduler.enqueue_normal(frame);
        }
        Ok(())
    }

    /// Chunks `data` into frames of at most `frame_size` bytes. Per RFC
    /// 6455 §5.4 the data opcode appears on the first fragment only;
    /// subsequent fragments carry CONTINUE.
    pub fn write_multi_framed(&mut self, data: &[u8], opcode: OpCode, frame_size: usize) -> Result<(), Error> {
        if !matches!(opcode, OpCode::Text | OpCode::Binary) {
            return Err(Error::Fatal("write_multi_framed requires a TEXT or BINARY opcode"));
        }
        if frame_size == 0 {
            return Err(Error::Fatal("frame_size must be at least 1"));
        }

        if data.is_empty() {
            return self.write(data, opcode, true);
        }

        let chunks: Vec<&[u8]> = data.chunks(frame_size).collect();
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.iter().enumerate() {
            let frame_opcode = if i == 0 { opcode } else { OpCode::Continue };
            self.write(chunk, frame_opcode, i == last)?;
        }
        Ok(())
    }

    pub fn send_disconnect(&mut self, code: u16, reason: &str) -> Result<(), Error> {
        self.we_sent_close = true;
        if !self.remote_sent_close {
            self.we_initiated_close = true;
        }

        let mut payload = code.to_be_bytes().to_vec();
        payload.extend_from_slice(reason.as_bytes());
        log::debug!("sending close code={code} reason={reason:?}");
        self.write(&payload, OpCode::Close, true)
    }

    /// Runs one flush cycle against `transport`. The caller is responsible
    /// for invoking this again whenever the transport becomes writable; the
    /// scheduler performs exactly one write attempt per call.
    pub fn flush(&mut self, transport: &mut dyn Transport) -> Vec<Update> {
        match self
            .scheduler
            .flush_cycle(transport, self.config.write_rate, self.close_after_write)
        {
            Ok(FlushOutcome::Idle) | Ok(FlushOutcome::Wrote(_)) | Ok(FlushOutcome::Closed) => Vec::new(),
            Err(error) => {
                log::warn!("write to transport failed: {error}");
                Update::error(self.id, &error).into_iter().collect()
            }
        }
    }

    // --- ingest: the heart of the state machine -------------------------

    /// Appends `bytes` to the read buffer and decodes as many complete
    /// frames as are available, returning every `Update` produced. Never
    /// blocks; work is bounded by the bytes supplied.
    pub fn ingest(&mut self, bytes: &[u8]) -> Vec<Update> {
        self.read_buffer.extend_from_slice(bytes);
        let mut updates = Vec::new();
        let mut pending_pongs: Vec<Vec<u8>> = Vec::new();

        loop {
            let header = match decode_header(&self.read_buffer) {
                DecodeResult::NeedMore => {
                    self.current_frame_remaining_bytes = None;
                    break;
                }
                DecodeResult::Invalid => {
                    self.fail_protocol(&mut updates, 1002, "malformed frame header");
                    break;
                }
                DecodeResult::Header(header) => header,
            };

            if self.remote_sent_close && !header.opcode.is_control() {
                self.fail_protocol(&mut updates, 1002, "data frame received after remote close");
                break;
            }

            if !self
                .config
                .rsv_triplet_allowed(header.rsv1, header.rsv2, header.rsv3)
            {
                log::warn!("RSV bit set without an allowing extension, closing");
                self.enqueue_close_frame(1002, "Unexpected RSV bit set");
                self.close_after_write = true;
                if let Some(update) = Update::error(self.id, &Error::RsvBitSet) {
                    updates.push(update);
                }
                break;
            }

            let frame_length = header.frame_length() as usize;
            if self.read_buffer.len() < frame_length {
                self.current_frame_remaining_bytes =
                    Some(frame_length as u64 - self.read_buffer.len() as u64);
                break;
            }
            self.current_frame_remaining_bytes = None;

            let payload = match frame::extract_payload(&self.read_buffer[..frame_length], &header) {
                Ok(payload) => payload,
                Err(_) => {
                    self.fail_protocol(&mut updates, 1002, "frame shorter than declared length");
                    break;
                }
            };

            let should_terminate = self.dispatch_frame(&header, payload, &mut updates, &mut pending_pongs);
            self.read_buffer.drain(..frame_length);

            if should_terminate {
                break;
            }
        }

        if !self.is_disconnecting() {
            for payload in pending_pongs {
                // `write` routes PONG to the priority queue regardless of
                // call site; see the doc comment on `write`.
                let _ = self.write(&payload, OpCode::Pong, true);
            }
        }

        updates
    }

    /// Handles one fully-decoded frame. Returns `true` if ingestion must
    /// stop for this cycle (a protocol violation was just armed).
    fn dispatch_frame(
        &mut self,
        header: &FrameHeader,
        payload: Vec<u8>,
        updates: &mut Vec<Update>,
        pending_pongs: &mut Vec<Vec<u8>>,
    ) -> bool {
        match header.opcode {
            OpCode::Continue => self.dispatch_continuation(header.fin, payload, updates),
            OpCode::Text | OpCode::Binary => self.dispatch_new_message(header, payload, updates),
            OpCode::Close => self.dispatch_close(payload, updates),
            OpCode::Ping => {
                log::trace!("ping received ({} bytes)", payload.len());
                updates.push(Update::read(self.id, ReadCode::Ping(payload.clone())));
                pending_pongs.push(payload);
                false
            }
            OpCode::Pong => {
                log::trace!("pong received ({} bytes)", payload.len());
                updates.push(Update::read(self.id, ReadCode::Pong(payload)));
                false
            }
        }
    }

    fn dispatch_continuation(&mut self, fin: bool, payload: Vec<u8>, updates: &mut Vec<Update>) -> bool {
        let Some((opcode, _)) = self.partial.as_ref() else {
            self.fail_protocol(updates, 1002, "continuation frame with no message in progress");
            return true;
        };
        let opcode = *opcode;

        if opcode == OpCode::Text && !self.feed_utf8(&payload, fin, updates) {
            return true;
        }

        self.append_to_partial(payload, updates);

        if fin {
            self.complete_message(opcode, updates);
        }
        false
    }

    fn dispatch_new_message(&mut self, header: &FrameHeader, payload: Vec<u8>, updates: &mut Vec<Update>) -> bool {
        if self.partial.is_some() {
            self.fail_protocol(
                updates,
                1002,
                "got new message frame without completing the previous one",
            );
            return true;
        }

        let headers = MessageHeaders {
            opcode: header.opcode,
            fin: header.fin,
            first_frame_len: header.payload_length,
        };

        let decision = match self.new_message_sink.as_mut() {
            Some(callback) => callback(&headers),
            None => SinkDecision::Buffer,
        };

        let target = match decision {
            SinkDecision::Buffer => PartialTarget::Buffer(Vec::new()),
            SinkDecision::Reject => {
                log::warn!("message sink rejected new {:?} message", header.opcode);
                self.fail_protocol(updates, 1003, "unsupported payload");
                return true;
            }
            SinkDecision::External(sink) => PartialTarget::External(sink),
        };

        self.partial = Some((header.opcode, target));
        if header.opcode == OpCode::Text {
            self.utf8_state = utf8::ACCEPT;
        }

        if header.opcode == OpCode::Text && !self.feed_utf8(&payload, header.fin, updates) {
            return true;
        }

        self.append_to_partial(payload, updates);

        if header.fin {
            self.complete_message(header.opcode, updates);
        }
        false
    }

    /// Feeds `payload` through the UTF-8 validator for the in-progress TEXT
    /// message. Returns `false` (and has already armed the close/error path)
    /// if validation fails.
    fn feed_utf8(&mut self, payload: &[u8], fin: bool, updates: &mut Vec<Update>) -> bool {
        self.utf8_state = utf8::validate(self.utf8_state, payload);
        if self.utf8_state == utf8::REJECT || (fin && self.utf8_state != utf8::ACCEPT) {
            log::warn!("invalid UTF-8 in TEXT message");
            self.enqueue_close_frame(1007, "invalid UTF-8 payload");
            self.close_after_write = true;
            if let Some(update) = Update::error(self.id, &Error::InvalidPayload("invalid UTF-8 in TEXT message")) {
                updates.push(update);
            }
            return false;
        }
        true
    }

    fn append_to_partial(&mut self, payload: Vec<u8>, updates: &mut Vec<Update>) {
        let Some((_, target)) = self.partial.as_mut() else {
            return;
        };
        match target {
            PartialTarget::Buffer(buffer) => buffer.extend_from_slice(&payload),
            PartialTarget::External(sink) => {
                if sink.write_all(&payload).is_err() {
                    log::warn!("application sink rejected frame payload");
                    if let Some(update) = Update::error(self.id, &Error::InvalidTargetStream) {
                        updates.push(update);
                    }
                }
            }
        }
    }

    fn complete_message(&mut self, opcode: OpCode, updates: &mut Vec<Update>) {
        let Some((_, target)) = self.partial.take() else {
            return;
        };

        let payload = match target {
            PartialTarget::Buffer(bytes) => {
                let decoded = match opcode {
                    OpCode::Text => {
                        // Already validated byte-by-byte; this cannot fail.
                        DecodedMessage::Text(String::from_utf8(bytes).unwrap_or_default())
                    }
                    _ => DecodedMessage::Binary(bytes),
                };
                MessagePayload::Buffered(decoded)
            }
            PartialTarget::External(_) => MessagePayload::Streamed,
        };

        log::trace!("message complete: {opcode:?}");
        updates.push(Update::read(self.id, ReadCode::Message { opcode, payload }));
        self.utf8_state = utf8::ACCEPT;
    }

    fn dispatch_close(&mut self, payload: Vec<u8>, updates: &mut Vec<Update>) -> bool {
        let (resolved_code, reason) = self.resolve_close_payload(&payload);
        self.remote_sent_close = true;

        updates.push(Update::read(
            self.id,
            ReadCode::Disconnect {
                code: resolved_code,
                reason: reason.clone(),
            },
        ));

        if self.we_initiated_close {
            log::debug!("close handshake complete, closing transport");
            self.close_after_write = true;
            updates.push(Update::read(self.id, ReadCode::SockDisconnect));
        } else if !self.we_sent_close {
            log::debug!("echoing close code={resolved_code}");
            self.enqueue_close_frame(resolved_code, &reason);
            self.we_sent_close = true;
            self.close_after_write = true;
        }

        true
    }

    /// Parses and validates an inbound CLOSE frame's payload, remapping
    /// invalid codes/reasons to 1002.
    fn resolve_close_payload(&self, payload: &[u8]) -> (u16, String) {
        if payload.len() < 2 {
            return (1000, String::new());
        }

        let code = u16::from_be_bytes([payload[0], payload[1]]);
        let reason_bytes = &payload[2..];

        let code_valid = frame::is_valid_close_code(code);
        let reason = match String::from_utf8(reason_bytes.to_vec()) {
            Ok(reason) if code_valid => reason,
            _ => return (1002, "invalid close code or reason".to_string()),
        };

        (code, reason)
    }

    fn enqueue_close_frame(&mut self, code: u16, reason: &str) {
        let mut payload = code.to_be_bytes().to_vec();
        payload.extend_from_slice(reason.as_bytes());
        let _ = self.write(&payload, OpCode::Close, true);
    }

    /// Common protocol-violation path: enqueue a CLOSE with `code`, arm
    /// `close_after_write`, and push the matching `Error` update.
    fn fail_protocol(&mut self, updates: &mut Vec<Update>, code: u16, reason: &'static str) {
        log::warn!("protocol error: {reason}");
        self.enqueue_close_frame(code, reason);
        self.close_after_write = true;
        if let Some(update) = Update::error(self.id, &Error::ProtocolError(reason)) {
            updates.push(update);
        }
    }
}

impl<R: Role> Drop for Connection<R> {
    /// The engine never owns a live transport handle, so there is nothing to
    /// close here. This only logs if the connection is torn down with
    /// unsent bytes still queued.
    fn drop(&mut self) {
        if !self.is_write_buffer_empty() {
            log::warn!(
                "connection {} dropped with a non-empty write buffer",
                self.id
            );
        }
    }
}
