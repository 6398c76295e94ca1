//! Starting connection workers.
//!
//! The acceptor hands each worker to a [`WorkerSpawner`]. A spawner that
//! fails must drop the task it was given: the task owns the connection's
//! permit and socket, so dropping it is what releases the slot and closes the
//! connection.

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::runtime::Handle;

#[derive(Error, Debug)]
pub enum SpawnError {
    /// No execution context could be allocated (threads, memory).
    #[error("Worker resources exhausted: {0}")]
    Exhausted(String),

    #[error("Failed to start worker: {0}")]
    Other(String),
}

pub trait WorkerSpawner: Send + Sync {
    fn spawn(&self, task: BoxFuture<'static, ()>) -> Result<(), SpawnError>;
}

/// One tokio task per connection.
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    handle: Handle,
}

impl TokioSpawner {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Spawner on the runtime the caller is running in.
    pub fn current() -> Result<Self, SpawnError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| SpawnError::Other(e.to_string()))
    }
}

impl WorkerSpawner for TokioSpawner {
    fn spawn(&self, task: BoxFuture<'static, ()>) -> Result<(), SpawnError> {
        drop(self.handle.spawn(task));
        Ok(())
    }
}

/// One OS thread per connection, each driving its worker on the runtime.
///
/// Thread creation failures are reported instead of aborting, so an
/// exhausted host rejects connections rather than crashing.
#[derive(Debug, Clone)]
pub struct ThreadSpawner {
    handle: Handle,
    stack_size: usize,
}

impl ThreadSpawner {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            stack_size: 0,
        }
    }

    /// Thread stack size in bytes (0 = platform default).
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }
}

impl WorkerSpawner for ThreadSpawner {
    fn spawn(&self, task: BoxFuture<'static, ()>) -> Result<(), SpawnError> {
        let mut builder = std::thread::Builder::new().name("conn".to_string());
        if self.stack_size > 0 {
            builder = builder.stack_size(self.stack_size);
        }
        let handle = self.handle.clone();
        builder
            .spawn(move || handle.block_on(task))
            .map(drop)
            .map_err(classify_thread_error)
    }
}

fn classify_thread_error(err: std::io::Error) -> SpawnError {
    match err.kind() {
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::OutOfMemory => {
            SpawnError::Exhausted(err.to_string())
        }
        _ => SpawnError::Other(err.to_string()),
    }
}
