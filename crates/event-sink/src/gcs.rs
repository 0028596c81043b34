// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Google Cloud Storage adapter.
//!
//! Objects are written with a single-request media upload:
//!
//! ```text
//! POST {endpoint}/upload/storage/v1/b/{bucket}/o?uploadType=media&name={key}
//! Authorization: Bearer <token>
//! ```
//!
//! There is no retry. Every request carries the configured timeout, so a
//! hanging store cannot stall message intake indefinitely.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::credentials::TokenProvider;
use crate::errors::SinkError;
use crate::sink::ObjectSink;

pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct GcsSink {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    tokens: Arc<TokenProvider>,
}

impl GcsSink {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        endpoint: &str,
        timeout: Duration,
        tokens: Arc<TokenProvider>,
    ) -> Self {
        GcsSink {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout,
            tokens,
        }
    }

    /// Creates `bucket` in `project`. Failure, including the bucket already
    /// existing, is logged and ignored.
    pub async fn ensure_bucket(&self, project: &str, bucket: &str) {
        match self.create_bucket(project, bucket).await {
            Ok(()) => info!("Created bucket {bucket}"),
            Err(e) => warn!("Bucket create failed (ignored): {e}"),
        }
    }

    async fn create_bucket(&self, project: &str, bucket: &str) -> Result<(), SinkError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(format!("{}/storage/v1/b", self.endpoint))
            .query(&[("project", project)])
            .bearer_auth(token)
            .timeout(self.timeout)
            .json(&serde_json::json!({ "name": bucket }))
            .send()
            .await?;
        check_status(response).await
    }
}

#[async_trait]
impl ObjectSink for GcsSink {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), SinkError> {
        let token = self.tokens.access_token().await?;
        let size = body.len();
        let response = self
            .client
            .post(format!("{}/upload/storage/v1/b/{bucket}/o", self.endpoint))
            .query(&[("uploadType", "media"), ("name", key)])
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/octet-stream")
            .timeout(self.timeout)
            .body(body)
            .send()
            .await?;
        check_status(response).await?;
        debug!("Wrote {size} bytes to gs://{bucket}/{key}");
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    Err(SinkError::Status {
        status,
        body: response.text().await.unwrap_or_default(),
    })
}
