//! Process-wide shutdown signal.
//!
//! One signal is shared by the acceptors and every connection worker. It is
//! raised at most once; the first request also decides the exit status the
//! process ends with, so concurrent fatal faults cannot race each other into
//! different exit codes.

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::exit::ExitStatus;

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

struct Inner {
    token: CancellationToken,
    status: OnceLock<ExitStatus>,
    state: RwLock<ShutdownState>,
}

/// Cheap to clone; all clones observe the same signal.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                status: OnceLock::new(),
                state: RwLock::new(ShutdownState::Running),
            }),
        }
    }

    /// Raise the signal with `status`.
    ///
    /// Returns `true` for the call that actually raised it. Later calls change
    /// nothing, whatever status they carry.
    pub fn request(&self, status: ExitStatus) -> bool {
        let first = self.inner.status.set(status).is_ok();
        if first {
            self.inner.token.cancel();
        }
        first
    }

    pub fn is_requested(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Exit status recorded by the first request.
    pub fn status(&self) -> Option<ExitStatus> {
        self.inner.status.get().copied()
    }

    /// Resolves once the signal is raised.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }

    pub fn state(&self) -> ShutdownState {
        *self.inner.state.read()
    }

    pub(crate) fn set_state(&self, state: ShutdownState) {
        *self.inner.state.write() = state;
    }

    /// Still accepting new connections.
    pub fn is_accepting(&self) -> bool {
        !self.is_requested() && self.state() == ShutdownState::Running
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("requested", &self.is_requested())
            .field("status", &self.status())
            .field("state", &self.state())
            .finish()
    }
}
