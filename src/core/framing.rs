//! Message reassembly from transport fragments.
//!
//! The band writes each telemetry record as a `{...}` text block and the
//! radio splits it into notification-sized fragments. The reassembler keeps
//! one growable buffer; after each append it drains every complete
//! first-`{`-to-next-`}` pair and keeps the incomplete tail.
//!
//! Brace matching is deliberately naive: there is no nesting or string
//! literal awareness, so a `}` inside a quoted value ends the message early.
//! Payloads on the wire are flat records, and changing the rule would change
//! framing for every existing capture.

use crate::constants::MAX_REASSEMBLY_BYTES;
use std::borrow::Cow;
use tracing::{debug, warn};

/// Recovers complete messages from an unbounded fragment stream.
#[derive(Debug, Clone)]
pub struct Reassembler {
    buffer: Vec<u8>,
    max_buffer: usize,
    /// Bytes dropped by the overflow guard since creation.
    discarded: u64,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::with_limit(MAX_REASSEMBLY_BYTES)
    }

    /// Create a reassembler that holds at most `max_buffer` unterminated bytes.
    pub fn with_limit(max_buffer: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_buffer,
            discarded: 0,
        }
    }

    /// Append a text fragment and return every message it completes, in order.
    pub fn ingest(&mut self, fragment: &str) -> Vec<String> {
        self.ingest_bytes(fragment.as_bytes())
    }

    /// Append a raw notification payload.
    ///
    /// Scanning happens on bytes, so a multi-byte character split across two
    /// notifications is reassembled before it is decoded.
    pub fn ingest_bytes(&mut self, fragment: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(fragment);

        let mut messages = Vec::new();
        let mut consumed = 0;

        while let Some(open) = find(&self.buffer[consumed..], b'{') {
            let start = consumed + open;
            let Some(close) = find(&self.buffer[start..], b'}') else {
                break;
            };
            let end = start + close;
            let message = String::from_utf8_lossy(&self.buffer[start..=end]);
            debug!(message = %message, "reassembled message");
            messages.push(message.trim().to_string());
            consumed = end + 1;
        }

        if consumed > 0 {
            self.buffer.drain(..consumed);
        }
        self.enforce_limit();

        messages
    }

    /// The incomplete tail currently held.
    pub fn remainder(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }

    /// Number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes thrown away by the overflow guard.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    /// Drop any partial message (new measurement context).
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn enforce_limit(&mut self) {
        if self.buffer.len() <= self.max_buffer {
            return;
        }

        // Keep the most recent opener; everything before it can never frame.
        let keep_from = rfind(&self.buffer, b'{').unwrap_or(self.buffer.len());
        let mut dropped = keep_from;
        self.buffer.drain(..keep_from);

        if self.buffer.len() > self.max_buffer {
            dropped += self.buffer.len();
            self.buffer.clear();
        }

        self.discarded += dropped as u64;
        warn!(
            dropped,
            limit = self.max_buffer,
            "reassembly buffer overflow, discarding unterminated data"
        );
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

fn find(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}

fn rfind(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().rposition(|&b| b == needle)
}
