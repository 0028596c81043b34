// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Flush orchestration.
//!
//! ```text
//!   message ──> decode ──> redact ──> append ──> FlushPolicy?
//!                                                    │ yes
//!                                                    v
//!                         ObjectNamer ──> ObjectSink::put_object ──> reset
//! ```
//!
//! A batch moves `EMPTY -> ACCUMULATING -> FLUSHING -> EMPTY`. The batch is
//! reset after every write attempt whether or not the write succeeded: a
//! failed batch is dropped rather than kept for retry, which keeps memory
//! bounded during a storage outage at the cost of losing that batch.

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::batch::{Batch, FlushPolicy};
use crate::config::Config;
use crate::event::Event;
use crate::object_key::ObjectNamer;
use crate::redactor::Redactor;
use crate::sink::ObjectSink;
use crate::worker::Handler;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Messages appended to a batch
    pub accepted: u64,
    /// Messages discarded because they could not be decoded or re-encoded
    pub dropped: u64,
    /// Write attempts, successful or not
    pub flushes: u64,
    /// Write attempts the sink rejected
    pub failed_flushes: u64,
}

pub struct BatchWriter<S> {
    sink: S,
    bucket: String,
    redactor: Redactor,
    policy: FlushPolicy,
    namer: ObjectNamer,
    batch: Batch,
    stats: WriterStats,
}

impl<S: ObjectSink> BatchWriter<S> {
    pub fn new(
        sink: S,
        bucket: &str,
        redactor: Redactor,
        policy: FlushPolicy,
        namer: ObjectNamer,
    ) -> Self {
        BatchWriter {
            sink,
            bucket: bucket.to_string(),
            redactor,
            policy,
            namer,
            batch: Batch::new(Instant::now()),
            stats: WriterStats::default(),
        }
    }

    pub fn from_config(sink: S, config: &Config) -> Self {
        Self::new(
            sink,
            &config.bucket,
            Redactor::new(config.strip_payload),
            config.flush_policy(),
            ObjectNamer::new(config.basedir.as_str()),
        )
    }

    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    /// Decodes, redacts and appends one message, flushing if the policy
    /// trips. Messages that redaction leaves unchanged are appended as
    /// received, byte for byte.
    pub async fn handle_message(&mut self, msg: &[u8]) {
        let mut event = match Event::from_slice(msg) {
            Ok(event) => event,
            Err(e) => {
                error!("Couldn't unmarshal json: {e}");
                self.stats.dropped += 1;
                return;
            }
        };

        if self.redactor.redact(&mut event) {
            match event.to_vec() {
                Ok(encoded) => self.append(&encoded).await,
                Err(e) => {
                    error!("JSON marshal failed: {e}");
                    self.stats.dropped += 1;
                }
            }
        } else {
            self.append(msg).await;
        }
    }

    async fn append(&mut self, msg: &[u8]) {
        self.batch.append(msg);
        self.stats.accepted += 1;

        if self.policy.should_flush(&self.batch, Instant::now()) {
            self.flush().await;
        }
    }

    /// Writes the current batch as one object named for the current time and
    /// resets the batch, whatever the outcome of the write.
    pub async fn flush(&mut self) {
        let key = self.namer.name(Utc::now());
        let records = self.batch.records();
        let bytes = self.batch.byte_count();
        let body = self.batch.take_buffer();

        debug!("Flushing {records} records ({bytes} bytes) to {key}");
        self.stats.flushes += 1;
        match self.sink.put_object(&self.bucket, &key, body).await {
            Ok(()) => info!("Wrote {records} records to gs://{}/{key}", self.bucket),
            Err(e) => {
                self.stats.failed_flushes += 1;
                error!("Couldn't insert {key}, dropping {records} records: {e}");
            }
        }

        self.batch.reset(Instant::now());
    }
}

#[async_trait]
impl<S: ObjectSink> Handler for BatchWriter<S> {
    async fn handle(&mut self, msg: &[u8]) {
        self.handle_message(msg).await;
    }

    /// Writes out whatever is buffered so a clean stop does not strand
    /// records. An empty batch writes nothing.
    async fn shutdown(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        info!(
            "Flushing {} buffered records before shutdown",
            self.batch.records()
        );
        self.flush().await;
    }
}
