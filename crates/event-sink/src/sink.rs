// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::errors::SinkError;

/// Durable named-blob store.
///
/// A write creates or overwrites `key` in `bucket` with `body`. Callers treat
/// it as fire-and-forget: an error is reported once and never retried.
#[async_trait]
pub trait ObjectSink: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), SinkError>;
}
