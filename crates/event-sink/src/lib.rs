// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Streaming sink that batches probe events into objects in cloud storage.
//!
//! Messages arrive one at a time from a [`worker::MessageReader`], are decoded
//! into an [`event::Event`], optionally stripped of large payload fields by the
//! [`redactor::Redactor`], and appended to a [`batch::Batch`]. When the
//! [`batch::FlushPolicy`] trips on size or age, the [`writer::BatchWriter`]
//! names the object with [`object_key::ObjectNamer`] and hands the whole
//! buffer to an [`sink::ObjectSink`] such as [`gcs::GcsSink`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batch;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod event;
pub mod gcs;
pub mod logger;
pub mod object_key;
pub mod redactor;
pub mod sink;
pub mod worker;
pub mod writer;

/// Program name used as the log line prefix.
pub const PROGRAM: &str = "googlestorage";
