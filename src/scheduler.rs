//! A two-tier FIFO of fully-encoded frames awaiting transmission, with
//! control frames bypassing queued data frames and a bounded per-cycle byte
//! budget.

use crate::error::Error;
use std::collections::VecDeque;

/// The byte-oriented sink the scheduler drains into. Transport-agnostic by
/// design: an outer event loop implements this against whatever socket/pipe
/// it owns.
pub trait Transport {
    /// Attempts a single non-blocking write, returning the number of bytes
    /// actually accepted. Mirrors `std::io::Write::write`'s partial-write
    /// contract.
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>;

    /// Tears down the transport. Idempotent: may be called more than once.
    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing queued; no work done this cycle.
    Idle,
    /// `n` bytes were written to the transport.
    Wrote(usize),
    /// The cursor fully drained and `close_after_write` was armed with both
    /// queues empty: the transport has been closed.
    Closed,
}

#[derive(Default)]
pub struct WriteScheduler {
    priority_frame_queue: VecDeque<Vec<u8>>,
    frame_queue: VecDeque<Vec<u8>>,
    write_cursor: Option<Vec<u8>>,
}

impl WriteScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue_priority(&mut self, frame: Vec<u8>) {
        self.priority_frame_queue.push_back(frame);
    }

    pub fn enqueue_normal(&mut self, frame: Vec<u8>) {
        self.frame_queue.push_back(frame);
    }

    /// All three of priority queue, normal queue, and cursor are empty.
    pub fn is_empty(&self) -> bool {
        self.write_cursor.is_none() && self.priority_frame_queue.is_empty() && self.frame_queue.is_empty()
    }

    /// Runs exactly one flush cycle: one write attempt. The caller (the
    /// connection, driven by the outer event loop) decides when to call this
    /// again.
    pub fn flush_cycle(
        &mut self,
        transport: &mut dyn Transport,
        write_rate: usize,
        close_after_write: bool,
    ) -> Result<FlushOutcome, Error> {
        if self.write_cursor.is_none() {
            self.write_cursor = self
                .priority_frame_queue
                .pop_front()
                .or_else(|| self.frame_queue.pop_front());
        }

        let Some(cursor) = self.write_cursor.as_mut() else {
            return Ok(FlushOutcome::Idle);
        };

        let to_write = write_rate.min(cursor.len());
        let written = transport.write(&cursor[..to_write]).map_err(|_| Error::Write)?;

        if written < cursor.len() {
            cursor.drain(..written);
        } else {
            self.write_cursor = None;
        }

        if self.write_cursor.is_none() && close_after_write && self.priority_frame_queue.is_empty() && self.frame_queue.is_empty() {
            transport.close();
            return Ok(FlushOutcome::Closed);
        }

        Ok(FlushOutcome::Wrote(written))
    }
}
