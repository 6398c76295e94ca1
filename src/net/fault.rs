//! Failure taxonomy for connection workers.
//!
//! Every failure that escapes a handler is a [`Fault`]. The worker maps it to
//! a [`FaultClass`] with an exhaustive match, and the class decides whether
//! only the connection ends or the whole process goes down.

use std::any::Any;

use thiserror::Error;

use super::port::PortError;
use crate::exit::ExitStatus;

#[derive(Error, Debug)]
pub enum Fault {
    /// A request violated an assertion or the handler's protocol.
    #[error("Protocol assertion {code}: {message}")]
    Protocol { code: u32, message: String },

    /// The socket failed while reading or writing.
    #[error("Transport error: {0}")]
    Transport(#[from] PortError),

    /// The host wall clock moved backward past tolerance.
    #[error("Clock skew detected: {0}")]
    ClockSkew(String),

    /// Anything else, including a panic inside the handler.
    #[error("Uncaught failure: {0}")]
    Uncaught(String),
}

/// What a worker does about a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Log, close the connection, keep serving everyone else.
    Recoverable,
    FatalClockSkew,
    FatalUncaught,
}

impl Fault {
    pub fn protocol(code: u32, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    /// Turn a caught panic payload into an uncaught fault.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Uncaught(format!("panic: {}", detail))
    }

    pub fn class(&self) -> FaultClass {
        match self {
            Self::Protocol { .. } | Self::Transport(_) => FaultClass::Recoverable,
            Self::ClockSkew(_) => FaultClass::FatalClockSkew,
            Self::Uncaught(_) => FaultClass::FatalUncaught,
        }
    }

    /// Short label for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Protocol { .. } => "protocol",
            Self::Transport(_) => "transport",
            Self::ClockSkew(_) => "clock_skew",
            Self::Uncaught(_) => "uncaught",
        }
    }
}

impl From<std::io::Error> for Fault {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(PortError::Io(err))
    }
}

impl FaultClass {
    /// Exit status the process must end with, if any.
    pub fn exit_status(self) -> Option<ExitStatus> {
        match self {
            Self::Recoverable => None,
            Self::FatalClockSkew => Some(ExitStatus::ClockSkewDetected),
            Self::FatalUncaught => Some(ExitStatus::UncaughtFailure),
        }
    }

    pub fn is_fatal(self) -> bool {
        self.exit_status().is_some()
    }
}
