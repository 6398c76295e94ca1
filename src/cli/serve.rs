// Copyright 2024-2026 msgport Contributors
// SPDX-License-Identifier: Apache-2.0

//! `serve` subcommand: run the echo server until Ctrl+C or a fatal fault.

use std::sync::Arc;

use crate::clock::CoarseClock;
use crate::config::EnvConfig;
use crate::exit::ExitStatus;
use crate::net::{EchoHandler, MessageServer, ServerError};
use crate::shutdown::ShutdownSignal;
use crate::telemetry;

/// Run the server and return the status the process should exit with.
pub async fn run_serve(env: EnvConfig) -> ExitStatus {
    if let Err(e) = telemetry::init_logging(&env.log) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitStatus::BadOptions;
    }
    if let Some(path) = &env.config_file {
        tracing::info!(path = %path.display(), "Loaded config file");
    }

    let clock = Arc::new(CoarseClock::default());
    let shutdown = ShutdownSignal::new();
    let handler = Arc::new(EchoHandler::with_clock(Arc::clone(&clock)));

    let server = MessageServer::builder(env.server, handler)
        .clock(clock)
        .shutdown(shutdown.clone())
        .build();
    let server = match server {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Invalid server configuration");
            return exit_status_for(&e);
        }
    };

    let ctrl_c = tokio::spawn(watch_ctrl_c(shutdown.clone()));

    let status = match server.run().await {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(error = %e, "Server error");
            exit_status_for(&e)
        }
    };
    ctrl_c.abort();

    tracing::info!(status = %status, "Server stopped");
    status
}

async fn watch_ctrl_c(shutdown: ShutdownSignal) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                tracing::info!("Shutdown signal received, draining");
                shutdown.request(ExitStatus::Clean);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to listen for Ctrl+C"),
        },
    }
}

/// Exit status for a server that failed to start or run.
pub fn exit_status_for(err: &ServerError) -> ExitStatus {
    match err {
        ServerError::HandlerAlreadyBound
        | ServerError::InvalidAddress(_)
        | ServerError::NoBindAddresses => ExitStatus::BadOptions,
        ServerError::Io(_) | ServerError::Bind { .. } => ExitStatus::Failure,
    }
}
