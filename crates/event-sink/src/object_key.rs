// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Default object key prefix.
pub const DEFAULT_BASEDIR: &str = "cyberprobe";

/// Names flushed batches as `{basedir}/{YYYY-MM-DD}/{HH-MM}/{uuid}`.
///
/// The date and minute come from the time of the flush, not the time the
/// batch was started. Keys are not checked for uniqueness against the store;
/// the random v4 suffix makes collisions negligible.
#[derive(Debug, Clone)]
pub struct ObjectNamer {
    basedir: String,
}

impl Default for ObjectNamer {
    fn default() -> Self {
        ObjectNamer::new(DEFAULT_BASEDIR)
    }
}

impl ObjectNamer {
    #[must_use]
    pub fn new(basedir: impl Into<String>) -> Self {
        ObjectNamer {
            basedir: basedir.into(),
        }
    }

    pub fn name(&self, now: DateTime<Utc>) -> String {
        format!(
            "{}/{}/{}",
            self.basedir,
            now.format("%Y-%m-%d/%H-%M"),
            Uuid::new_v4().hyphenated()
        )
    }
}
