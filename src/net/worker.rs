//! Per-connection receive/dispatch loop.
//!
//! A worker owns its port and its admission permit for its whole life:
//!
//! ```text
//! Starting -> Connected -> Receiving <-> Dispatching -> Closing -> Released
//! ```
//!
//! `disconnected` runs and the permit is released on every way out of the
//! loop, including handler panics. A fatal fault additionally raises the
//! shutdown signal, after the connection's own resources are gone.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::Instrument;

use super::admission::Permit;
use super::fault::{Fault, FaultClass};
use super::handler::MessageHandler;
use super::last_error::LastError;
use super::port::{MessagePort, PortError};
use crate::exit::ExitStatus;
use crate::shutdown::ShutdownSignal;
use crate::telemetry::{self, NetworkCounter};

/// Everything a worker shares with the rest of the server.
pub struct WorkerContext {
    pub handler: Arc<dyn MessageHandler>,
    pub counters: Arc<NetworkCounter>,
    pub shutdown: ShutdownSignal,
    /// Suppress the end-of-connection log line.
    pub quiet: bool,
}

/// How a worker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Peer closed, or no complete message could be read.
    PeerClosed,
    /// The shutdown signal was observed.
    Shutdown,
    /// A recoverable fault closed the connection.
    Recovered,
    /// A fatal fault; the process must end with this status.
    Fatal(ExitStatus),
}

impl WorkerExit {
    fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::Shutdown => "shutdown",
            Self::Recovered => "recovered",
            Self::Fatal(_) => "fatal",
        }
    }
}

/// Run one connection to completion.
pub async fn serve_connection(
    port: MessagePort,
    permit: Permit,
    ctx: Arc<WorkerContext>,
) -> WorkerExit {
    let span = telemetry::connection_span(port.conn_id(), port.peer());
    run_worker(port, permit, ctx).instrument(span).await
}

async fn run_worker(mut port: MessagePort, permit: Permit, ctx: Arc<WorkerContext>) -> WorkerExit {
    let mut last_error = LastError::new();

    let outcome = AssertUnwindSafe(receive_loop(&mut port, &mut last_error, &ctx))
        .catch_unwind()
        .await;

    let exit = match outcome {
        Ok(Ok(exit)) => exit,
        Ok(Err(fault)) => apply_fault_policy(fault, &mut port).await,
        Err(panic) => apply_fault_policy(Fault::from_panic(panic), &mut port).await,
    };

    let notified = AssertUnwindSafe(ctx.handler.disconnected(&mut port))
        .catch_unwind()
        .await;
    let exit = match notified {
        Ok(()) => exit,
        Err(panic) => {
            let fault = Fault::from_panic(panic);
            tracing::error!(error = %fault, "Uncaught failure in disconnected callback, terminating");
            merge_fatal(exit, ExitStatus::UncaughtFailure)
        }
    };

    port.shutdown().await;
    drop(port);
    permit.release();

    tracing::Span::current().record("exit", exit.as_str());
    if let WorkerExit::Fatal(status) = exit {
        if ctx.shutdown.request(status) {
            tracing::error!(status = %status, "Fatal connection fault, shutting down");
        } else {
            tracing::debug!(status = %status, "Shutdown already in progress");
        }
    }
    exit
}

async fn receive_loop(
    port: &mut MessagePort,
    last_error: &mut LastError,
    ctx: &WorkerContext,
) -> Result<WorkerExit, Fault> {
    ctx.handler.connected(port).await;

    loop {
        port.clear_counters();

        if ctx.shutdown.is_requested() {
            return Ok(WorkerExit::Shutdown);
        }

        let received = tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => return Ok(WorkerExit::Shutdown),
            received = port.recv() => received,
        };

        let message = match received {
            Ok(Some(message)) => message,
            Ok(None) => {
                end_connection(port, ctx.quiet, None).await;
                return Ok(WorkerExit::PeerClosed);
            }
            Err(e) => {
                end_connection(port, ctx.quiet, Some(&e)).await;
                return Ok(WorkerExit::PeerClosed);
            }
        };

        last_error.start_request();
        ctx.handler.process(message, port, last_error).await?;
        ctx.counters.hit(port.bytes_in(), port.bytes_out());
    }
}

async fn end_connection(port: &mut MessagePort, quiet: bool, error: Option<&PortError>) {
    match error {
        Some(e) if !quiet => tracing::info!(peer = %port.peer(), error = %e, "end connection"),
        Some(e) => tracing::debug!(peer = %port.peer(), error = %e, "end connection"),
        None if !quiet => tracing::info!(peer = %port.peer(), "end connection"),
        None => {}
    }
    port.shutdown().await;
}

async fn apply_fault_policy(fault: Fault, port: &mut MessagePort) -> WorkerExit {
    let exit = match fault.class() {
        FaultClass::Recoverable => {
            tracing::info!(
                peer = %port.peer(),
                kind = fault.kind(),
                error = %fault,
                "Fault handling request, closing client connection"
            );
            WorkerExit::Recovered
        }
        FaultClass::FatalClockSkew => {
            tracing::warn!(peer = %port.peer(), error = %fault, "Clock skew detected, shutting down");
            WorkerExit::Fatal(ExitStatus::ClockSkewDetected)
        }
        FaultClass::FatalUncaught => {
            tracing::error!(peer = %port.peer(), error = %fault, "Uncaught failure, terminating");
            WorkerExit::Fatal(ExitStatus::UncaughtFailure)
        }
    };
    port.shutdown().await;
    exit
}

/// A fatal status already decided by the loop wins over a later one.
fn merge_fatal(exit: WorkerExit, status: ExitStatus) -> WorkerExit {
    match exit {
        WorkerExit::Fatal(_) => exit,
        _ => WorkerExit::Fatal(status),
    }
}
