// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::batch::{FlushPolicy, DEFAULT_MAX_BATCH_AGE, DEFAULT_MAX_BATCH_BYTES};
use crate::errors::ConfigError;
use crate::gcs::{DEFAULT_ENDPOINT, DEFAULT_TIMEOUT};
use crate::object_key::DEFAULT_BASEDIR;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Startup configuration, read once from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// `MAX_BATCH`: flush once the batch holds more than this many bytes
    pub max_batch_bytes: u64,
    /// `MAX_TIME`: flush once this long has passed since the last flush
    pub max_batch_age: Duration,
    /// `STRIP_PAYLOAD`: blank payload fields before batching
    pub strip_payload: bool,
    /// `KEY`: credential file
    pub key_path: PathBuf,
    /// `GS_PROJECT`: project the bucket is created in
    pub project: String,
    /// `GS_BUCKET`: destination bucket
    pub bucket: String,
    /// `GS_BASEDIR`: object key prefix
    pub basedir: String,
    /// `GS_ENDPOINT`: storage API base URL
    pub endpoint: String,
    /// `GS_TIMEOUT`: per-request storage timeout
    pub store_timeout: Duration,
    /// `LOG_LEVEL`
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            max_batch_age: DEFAULT_MAX_BATCH_AGE,
            strip_payload: false,
            key_path: PathBuf::from("private.json"),
            project: String::new(),
            bucket: String::new(),
            basedir: DEFAULT_BASEDIR.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            store_timeout: DEFAULT_TIMEOUT,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Threshold values that fail to parse fall back to their defaults with a
    /// warning. Only [`Config::validate`] can fail.
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_batch_bytes = match env::var("MAX_BATCH") {
            Ok(raw) => parse_batch_size(&raw).unwrap_or_else(|| {
                warn!("Couldn't parse MAX_BATCH: {raw} :using default {DEFAULT_MAX_BATCH_BYTES}");
                DEFAULT_MAX_BATCH_BYTES
            }),
            Err(_) => DEFAULT_MAX_BATCH_BYTES,
        };
        info!("maxBatch set to: {max_batch_bytes}");

        let max_batch_age = match env::var("MAX_TIME") {
            Ok(raw) => parse_seconds(&raw).unwrap_or_else(|| {
                warn!(
                    "Couldn't parse MAX_TIME: {raw} :using default {}",
                    DEFAULT_MAX_BATCH_AGE.as_secs()
                );
                DEFAULT_MAX_BATCH_AGE
            }),
            Err(_) => DEFAULT_MAX_BATCH_AGE,
        };
        info!("maxTime set to: {}", max_batch_age.as_secs_f64());

        let store_timeout = match env::var("GS_TIMEOUT") {
            Ok(raw) => parse_seconds(&raw)
                .filter(|timeout| !timeout.is_zero())
                .unwrap_or_else(|| {
                    warn!(
                        "Couldn't parse GS_TIMEOUT: {raw} :using default {}",
                        DEFAULT_TIMEOUT.as_secs()
                    );
                    DEFAULT_TIMEOUT
                }),
            Err(_) => DEFAULT_TIMEOUT,
        };

        let config = Self {
            max_batch_bytes,
            max_batch_age,
            strip_payload: env::var("STRIP_PAYLOAD").map_or(false, |val| val == "true"),
            key_path: env::var("KEY")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("private.json")),
            project: env::var("GS_PROJECT").unwrap_or_default(),
            bucket: env::var("GS_BUCKET").unwrap_or_default(),
            basedir: env::var("GS_BASEDIR").unwrap_or_else(|_| DEFAULT_BASEDIR.to_string()),
            endpoint: env::var("GS_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            store_timeout,
            log_level: env::var("LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or_else(|_| "info".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "GS_BUCKET cannot be empty".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    pub fn flush_policy(&self) -> FlushPolicy {
        FlushPolicy::new(self.max_batch_bytes, self.max_batch_age)
    }
}

/// Parses a byte count such as `67108864`, `64M` or `"512 k"`.
///
/// Quotes and spaces are ignored. If the value contains an `M` (any case) every
/// `M` is dropped and the number is taken as MiB; otherwise a `K` marks KiB.
/// Negative sizes are rejected on purpose rather than accepted as "flush on
/// every message".
pub fn parse_batch_size(raw: &str) -> Option<u64> {
    let mut value: String = raw.replace('"', "").to_uppercase();
    let multiplier = if value.contains('M') {
        value = value.replace('M', "");
        1024 * 1024
    } else if value.contains('K') {
        value = value.replace('K', "");
        1024
    } else {
        1
    };
    let value = value.replace(' ', "");
    value.trim().parse::<u64>().ok()?.checked_mul(multiplier)
}

/// Parses a non-negative, finite number of seconds. Fractions are allowed.
/// Negative and infinite values are rejected on purpose, so a bad `MAX_TIME`
/// falls back to the default instead of disabling the age trigger.
pub fn parse_seconds(raw: &str) -> Option<Duration> {
    let value = raw.replace(['"', ' '], "");
    let secs = value.trim().parse::<f64>().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}
