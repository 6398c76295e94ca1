//! Message server: binding, accept loops, orderly shutdown.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use super::admission::{AdmissionConfig, AdmissionController, DrainResult};
use super::handler::{HandlerBinding, HandlerSlot, MessageHandler};
use super::listener::Acceptor;
use super::port::{DEFAULT_MAX_FRAME_SIZE, MAX_FRAME_LIMIT, MIN_FRAME_LIMIT};
use super::spawn::{TokioSpawner, WorkerSpawner};
use super::worker::WorkerContext;
use crate::clock::CoarseClock;
use crate::exit::ExitStatus;
use crate::shutdown::{ShutdownSignal, ShutdownState};
use crate::telemetry::NetworkCounter;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Multiple message servers not supported: a handler is already bound")]
    HandlerAlreadyBound,

    #[error("Invalid bind address: {0}")]
    InvalidAddress(String),

    #[error("No bind addresses configured")]
    NoBindAddresses,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP addresses to listen on; every one uses `port`.
    pub bind_addresses: Vec<String>,
    /// 0 picks an ephemeral port per address.
    pub port: u16,
    /// Suppress the per-connection "end connection" line.
    pub quiet: bool,
    #[serde(flatten)]
    pub admission: AdmissionConfig,
    pub max_frame_size: usize,
    /// Pause after a rejected connection or failed worker start.
    #[serde(with = "millis")]
    pub reject_backoff: Duration,
    /// Make the first listener refresh the coarse clock.
    pub time_tracker: bool,
    /// How long `run` waits for workers after the accept loops stop.
    #[serde(with = "millis")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addresses: vec!["127.0.0.1".to_string()],
            port: 27017,
            quiet: false,
            admission: AdmissionConfig::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            reject_backoff: Duration::from_millis(2),
            time_tracker: true,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Resolve `bind_addresses` x `port` into socket addresses.
    pub fn socket_addrs(&self) -> Result<Vec<SocketAddr>, ServerError> {
        let mut addrs = Vec::with_capacity(self.bind_addresses.len());
        for raw in &self.bind_addresses {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            let ip: IpAddr = trimmed
                .parse()
                .map_err(|_| ServerError::InvalidAddress(trimmed.to_string()))?;
            let addr = SocketAddr::new(ip, self.port);
            if !addrs.contains(&addr) {
                addrs.push(addr);
            }
        }
        if addrs.is_empty() {
            return Err(ServerError::NoBindAddresses);
        }
        Ok(addrs)
    }

    /// Raise `max_connections` to at least 1 and keep `max_frame_size`
    /// between 4 KiB and what the u32 length prefix can carry.
    pub fn clamp_limits(&mut self) {
        self.admission.max_connections = self.admission.max_connections.max(1);
        self.max_frame_size = self.max_frame_size.clamp(MIN_FRAME_LIMIT, MAX_FRAME_LIMIT);
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Builder for [`MessageServer`]. Collaborators default to fresh instances
/// and the process-wide handler slot.
pub struct ServerBuilder {
    config: ServerConfig,
    handler: Arc<dyn MessageHandler>,
    slot: Option<HandlerSlot>,
    shutdown: Option<ShutdownSignal>,
    counters: Option<Arc<NetworkCounter>>,
    spawner: Option<Arc<dyn WorkerSpawner>>,
    clock: Option<Arc<CoarseClock>>,
}

impl ServerBuilder {
    pub fn handler_slot(mut self, slot: HandlerSlot) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn counters(mut self, counters: Arc<NetworkCounter>) -> Self {
        self.counters = Some(counters);
        self
    }

    pub fn spawner(mut self, spawner: Arc<dyn WorkerSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn clock(mut self, clock: Arc<CoarseClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and bind the handler. No socket is opened.
    pub fn build(self) -> Result<MessageServer, ServerError> {
        let mut config = self.config;
        config.clamp_limits();
        let addrs = config.socket_addrs()?;
        let slot = self.slot.unwrap_or_else(HandlerSlot::process);
        let binding = slot.bind(self.handler)?;

        Ok(MessageServer {
            admission: Arc::new(AdmissionController::new(config.admission.clone())),
            time_tracker: config.time_tracker,
            config,
            addrs,
            binding,
            shutdown: self.shutdown.unwrap_or_default(),
            counters: self.counters.unwrap_or_default(),
            spawner: self.spawner,
            clock: self.clock.unwrap_or_default(),
            listeners: Vec::new(),
        })
    }
}

pub struct MessageServer {
    config: ServerConfig,
    addrs: Vec<SocketAddr>,
    binding: HandlerBinding,
    admission: Arc<AdmissionController>,
    shutdown: ShutdownSignal,
    counters: Arc<NetworkCounter>,
    spawner: Option<Arc<dyn WorkerSpawner>>,
    clock: Arc<CoarseClock>,
    time_tracker: bool,
    listeners: Vec<TcpListener>,
}

impl MessageServer {
    /// Server bound to the process-wide handler slot.
    pub fn new(config: ServerConfig, handler: Arc<dyn MessageHandler>) -> Result<Self, ServerError> {
        Self::builder(config, handler).build()
    }

    pub fn builder(config: ServerConfig, handler: Arc<dyn MessageHandler>) -> ServerBuilder {
        ServerBuilder {
            config,
            handler,
            slot: None,
            shutdown: None,
            counters: None,
            spawner: None,
            clock: None,
        }
    }

    /// Let the first listener keep the coarse clock fresh.
    pub fn set_as_time_tracker(&mut self) {
        self.time_tracker = true;
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    pub fn counters(&self) -> &Arc<NetworkCounter> {
        &self.counters
    }

    pub fn clock(&self) -> &Arc<CoarseClock> {
        &self.clock
    }

    /// Open every listening socket. Idempotent.
    pub async fn bind(&mut self) -> Result<Vec<SocketAddr>, ServerError> {
        if self.listeners.is_empty() {
            for addr in &self.addrs {
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|source| ServerError::Bind { addr: *addr, source })?;
                self.listeners.push(listener);
            }
        }
        self.local_addrs()
    }

    /// Addresses actually bound (resolves port 0).
    pub fn local_addrs(&self) -> Result<Vec<SocketAddr>, ServerError> {
        self.listeners
            .iter()
            .map(|l| l.local_addr().map_err(ServerError::from))
            .collect()
    }

    /// Serve until the shutdown signal is raised, then drain workers.
    ///
    /// Returns the exit status recorded by whoever raised the signal.
    pub async fn run(mut self) -> Result<ExitStatus, ServerError> {
        let addrs = self.bind().await?;
        let spawner = match self.spawner.take() {
            Some(spawner) => spawner,
            None => Arc::new(TokioSpawner::current().map_err(|e| {
                ServerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
            })?),
        };

        let acceptor = Arc::new(Acceptor {
            admission: Arc::clone(&self.admission),
            spawner,
            worker: Arc::new(WorkerContext {
                handler: Arc::clone(self.binding.handler()),
                counters: Arc::clone(&self.counters),
                shutdown: self.shutdown.clone(),
                quiet: self.config.quiet,
            }),
            shutdown: self.shutdown.clone(),
            clock: Arc::clone(&self.clock),
            reject_backoff: self.config.reject_backoff,
            max_frame_size: self.config.max_frame_size,
            next_conn_id: AtomicU64::new(0),
        });

        for addr in &addrs {
            tracing::info!(
                addr = %addr,
                max_connections = self.admission.max(),
                "Waiting for connections"
            );
        }

        let mut loops = JoinSet::new();
        for (i, listener) in std::mem::take(&mut self.listeners).into_iter().enumerate() {
            let tracker = self.time_tracker && i == 0;
            loops.spawn(Arc::clone(&acceptor).run(listener, tracker));
        }

        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Accept loop panicked");
                self.shutdown.request(ExitStatus::UncaughtFailure);
            }
        }

        self.shutdown.set_state(ShutdownState::Draining);
        match self.admission.drain(self.config.shutdown_timeout).await {
            DrainResult::Complete => tracing::info!("All connections closed"),
            DrainResult::Timeout { remaining } => {
                tracing::warn!(remaining, "Shutdown timeout, connections still open");
            }
        }
        self.shutdown.set_state(ShutdownState::Stopped);

        Ok(self.shutdown.status().unwrap_or(ExitStatus::Clean))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_addrs_expands_each_ip() {
        let config = ServerConfig {
            bind_addresses: vec!["127.0.0.1".into(), " ::1 ".into(), "127.0.0.1".into()],
            port: 4000,
            ..Default::default()
        };
        let addrs = config.socket_addrs().unwrap();
        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[0], "127.0.0.1:4000".parse().unwrap());
        assert_eq!(addrs[1], "[::1]:4000".parse().unwrap());
    }

    #[test]
    fn socket_addrs_rejects_garbage() {
        let config = ServerConfig {
            bind_addresses: vec!["not-an-ip".into()],
            ..Default::default()
        };
        assert!(matches!(
            config.socket_addrs(),
            Err(ServerError::InvalidAddress(a)) if a == "not-an-ip"
        ));
    }

    #[test]
    fn socket_addrs_requires_one() {
        let config = ServerConfig {
            bind_addresses: vec![" ".into()],
            ..Default::default()
        };
        assert!(matches!(config.socket_addrs(), Err(ServerError::NoBindAddresses)));
    }

    #[test]
    fn build_clamps_limits() {
        let mut config = ServerConfig {
            port: 0,
            max_frame_size: 4,
            ..Default::default()
        };
        config.admission.max_connections = 0;
        let server = MessageServer::builder(config, Arc::new(crate::net::EchoHandler::new()))
            .handler_slot(HandlerSlot::new())
            .build()
            .unwrap();
        assert_eq!(server.config().admission.max_connections, 1);
        assert_eq!(server.config().max_frame_size, MIN_FRAME_LIMIT);
        assert_eq!(server.admission().max(), 1);
    }

    #[test]
    fn clamp_limits_caps_frame_size_at_prefix_width() {
        let mut config = ServerConfig {
            max_frame_size: usize::MAX,
            ..Default::default()
        };
        config.clamp_limits();
        assert_eq!(config.max_frame_size, MAX_FRAME_LIMIT);
    }

    #[test]
    fn toml_config_maps_fields() {
        let config: ServerConfig = toml::from_str(
            r#"
            bind_addresses = ["0.0.0.0"]
            port = 9000
            quiet = true
            max_connections = 16
            reject_backoff = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_addresses, vec!["0.0.0.0"]);
        assert_eq!(config.port, 9000);
        assert!(config.quiet);
        assert_eq!(config.admission.max_connections, 16);
        assert_eq!(config.reject_backoff, Duration::from_millis(5));
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
    }
}
