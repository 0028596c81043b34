// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch accumulation and the size/age flush trigger.
//!
//! # Batching Strategy
//!
//! Encoded events are appended to a single newline-delimited buffer until
//! either limit of the [`FlushPolicy`] is exceeded:
//! 1. **Size limit**: sum of the appended event lengths, delimiters excluded
//! 2. **Age limit**: time elapsed since the previous flush (or startup)
//!
//! The policy is only evaluated after an append, so a batch can overshoot
//! the size limit by at most one event and an idle batch is not flushed until
//! the next event arrives.

use std::time::Duration;
use tokio::time::Instant;

/// Default maximum batch size: 64MiB.
pub const DEFAULT_MAX_BATCH_BYTES: u64 = 67_108_864;

/// Default maximum batch age: 30 minutes.
pub const DEFAULT_MAX_BATCH_AGE: Duration = Duration::from_secs(1800);

/// Newline-delimited buffer of encoded events awaiting a single write.
#[derive(Debug)]
pub struct Batch {
    buffer: Vec<u8>,
    byte_count: u64,
    records: usize,
    last_flush: Instant,
}

impl Batch {
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Batch {
            buffer: Vec::new(),
            byte_count: 0,
            records: 0,
            last_flush: now,
        }
    }

    /// Appends `msg` followed by `\n`. Only `msg.len()` counts toward the
    /// size limit.
    pub fn append(&mut self, msg: &[u8]) {
        self.buffer.reserve(msg.len() + 1);
        self.buffer.extend_from_slice(msg);
        self.buffer.push(b'\n');
        self.byte_count += msg.len() as u64;
        self.records += 1;
    }

    pub fn reset(&mut self, now: Instant) {
        self.buffer = Vec::new();
        self.byte_count = 0;
        self.records = 0;
        self.last_flush = now;
    }

    /// Moves the buffered bytes out for a write. Counters and the flush
    /// timestamp are left for [`Batch::reset`] once the write has finished.
    pub fn take_buffer(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn last_flush(&self) -> Instant {
        self.last_flush
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}

/// Dual-threshold flush trigger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlushPolicy {
    pub max_batch_bytes: u64,
    pub max_batch_age: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        FlushPolicy {
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            max_batch_age: DEFAULT_MAX_BATCH_AGE,
        }
    }
}

impl FlushPolicy {
    #[must_use]
    pub fn new(max_batch_bytes: u64, max_batch_age: Duration) -> Self {
        FlushPolicy {
            max_batch_bytes,
            max_batch_age,
        }
    }

    /// True once the batch is strictly larger than the size limit or strictly
    /// older than the age limit.
    pub fn should_flush(&self, batch: &Batch, now: Instant) -> bool {
        batch.byte_count() > self.max_batch_bytes
            || now.saturating_duration_since(batch.last_flush()) > self.max_batch_age
    }
}
