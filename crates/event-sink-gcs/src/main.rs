// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process::ExitCode, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use event_sink::{
    config::Config,
    credentials::{Credentials, TokenProvider},
    gcs::GcsSink,
    logger::Formatter,
    worker::{self, MessageReader},
    writer::BatchWriter,
    PROGRAM,
};

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = env::var("LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!("h2=off,hyper=off,rustls=off,reqwest=off,{log_level}");

    let filter = match EnvFilter::try_new(env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("{PROGRAM}: could not parse LOG_LEVEL '{log_level}': {e}");
            return ExitCode::FAILURE;
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_ansi(false)
        .event_format(Formatter::new(PROGRAM))
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("{PROGRAM}: setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }

    info!("Initialising...");

    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("init: {e}");
            return ExitCode::FAILURE;
        }
    };

    let input = env::args().nth(1).unwrap_or_else(|| "-".to_string());

    let client = match reqwest::Client::builder()
        .timeout(config.store_timeout)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!("Couldn't create client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let tokens = match Credentials::from_file(&config.key_path)
        .and_then(|credentials| TokenProvider::from_credentials(credentials, client.clone()))
    {
        Ok(tokens) => Arc::new(tokens),
        Err(e) => {
            error!("init: {e}");
            return ExitCode::FAILURE;
        }
    };
    debug!("Loaded credentials {tokens:?}");

    let sink = GcsSink::new(
        client,
        &config.endpoint,
        config.store_timeout,
        Arc::clone(&tokens),
    );
    info!("Connected.");
    sink.ensure_bucket(&config.project, &config.bucket).await;

    let reader = match MessageReader::open(&input).await {
        Ok(reader) => reader,
        Err(e) => {
            error!("init: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut writer = BatchWriter::from_config(sink, &config);

    let cancel = CancellationToken::new();
    tokio::spawn(wait_for_shutdown(cancel.clone()));

    info!("Initialisation complete.");

    match worker::run(reader, &mut writer, cancel).await {
        Ok(()) => {
            let stats = writer.stats();
            info!(
                "Stopped: {} events accepted, {} dropped, {} batches written, {} failed",
                stats.accepted, stats.dropped, stats.flushes, stats.failed_flushes
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Event handling failed with err: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn wait_for_shutdown(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                return;
            }
        };
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl+C: {e}");
                    return;
                }
                info!("Received Ctrl+C, initiating shutdown");
            }
            _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            return;
        }
        info!("Received Ctrl+C, initiating shutdown");
    }
    cancel.cancel();
}
