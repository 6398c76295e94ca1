//! Accept loop.
//!
//! One loop per bound address. For every accepted socket the loop tries to
//! take an admission permit without waiting; on success it hands a worker to
//! the spawner, on failure it closes the socket. Both failure paths sleep for
//! the reject backoff, since a saturated server would otherwise spin on
//! accept.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::MissedTickBehavior;

use super::admission::AdmissionController;
use super::port::MessagePort;
use super::spawn::{SpawnError, WorkerSpawner};
use super::worker::{self, WorkerContext};
use crate::clock::CoarseClock;
use crate::exit::ExitStatus;
use crate::shutdown::ShutdownSignal;
use crate::telemetry;

/// Upper bound between two time-tracker refreshes.
pub const TIME_TRACK_INTERVAL: Duration = Duration::from_millis(100);

/// State shared by every accept loop of one server.
pub(crate) struct Acceptor {
    pub(crate) admission: Arc<AdmissionController>,
    pub(crate) spawner: Arc<dyn WorkerSpawner>,
    pub(crate) worker: Arc<WorkerContext>,
    pub(crate) shutdown: ShutdownSignal,
    pub(crate) clock: Arc<CoarseClock>,
    pub(crate) reject_backoff: Duration,
    pub(crate) max_frame_size: usize,
    pub(crate) next_conn_id: AtomicU64,
}

impl Acceptor {
    /// Accept until shutdown. `time_tracker` makes this loop the one that
    /// keeps the coarse clock fresh.
    pub(crate) async fn run(self: Arc<Self>, listener: TcpListener, time_tracker: bool) {
        let mut tick = tokio::time::interval(TIME_TRACK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if time_tracker {
                if let Err(fault) = self.clock.refresh() {
                    tracing::error!(error = %fault, "Time tracker detected clock skew, shutting down");
                    self.shutdown.request(ExitStatus::ClockSkewDetected);
                    break;
                }
            }

            let accepted = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = tick.tick(), if time_tracker => continue,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.accepted(stream, peer).await,
                Err(e) => {
                    // Aborted handshakes, EMFILE and friends: keep listening.
                    tracing::warn!(error = %e, "Accept failed");
                    self.backoff().await;
                }
            }
        }

        tracing::debug!(
            addr = ?listener.local_addr().ok(),
            "Accept loop stopped"
        );
    }

    async fn accepted(&self, stream: TcpStream, peer: SocketAddr) {
        let Some(permit) = self.admission.try_acquire() else {
            tracing::info!(
                peer = %peer,
                used = self.admission.used(),
                "Connection refused because too many open connections"
            );
            telemetry::record_connection_rejected();
            drop(stream);
            self.backoff().await;
            return;
        };

        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed) + 1;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer, error = %e, "set_nodelay failed");
        }
        let open = self.admission.used();
        tracing::info!(peer = %peer, conn_id, open, "Connection accepted");
        telemetry::record_connection_accepted();
        telemetry::record_connections_active(open);

        let port = MessagePort::new(stream, peer.to_string(), self.max_frame_size)
            .with_conn_id(conn_id);
        let admission = Arc::clone(&self.admission);
        let task = worker::serve_connection(port, permit, Arc::clone(&self.worker))
            .map(move |_| telemetry::record_connections_active(admission.used()))
            .boxed();

        // A failed spawn drops `task`, which releases the permit and closes
        // the socket.
        match self.spawner.spawn(task) {
            Ok(()) => return,
            Err(SpawnError::Exhausted(e)) => {
                tracing::warn!(peer = %peer, error = %e, "Can't create new worker, closing connection");
            }
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "Unknown error accepting new connection");
            }
        }
        telemetry::record_connections_active(self.admission.used());
        self.backoff().await;
    }

    async fn backoff(&self) {
        if !self.reject_backoff.is_zero() {
            tokio::time::sleep(self.reject_backoff).await;
        }
    }
}
