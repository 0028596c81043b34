// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

/// Errors raised while validating startup configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised while loading credentials or exchanging them for a token.
#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("Couldn't read key file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid key file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid private key: {0}")]
    PrivateKey(#[from] jsonwebtoken::errors::Error),

    #[error("Token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Token endpoint returned {status}: {body}")]
    TokenEndpoint {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Errors returned by an [`crate::sink::ObjectSink`] write.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Storage returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Couldn't obtain access token: {0}")]
    Credentials(#[from] CredentialsError),
}

/// Errors raised while selecting or reading the message input.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Unsupported input '{0}': expected '-', 'stdin' or 'udp://host:port'")]
    Unsupported(String),

    #[error("Input I/O error: {0}")]
    Io(#[from] std::io::Error),
}
