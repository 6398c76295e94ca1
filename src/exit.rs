//! Process exit statuses.
//!
//! The two fatal statuses are what a connection worker asks for when it hits
//! a failure the process cannot continue past. They must stay distinct.

use std::fmt;
use std::process::ExitCode;

/// Documented exit statuses of the `msgport` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExitStatus {
    /// Orderly shutdown, nothing went wrong.
    Clean = 0,
    /// Startup or serve failure (bind error, runtime error).
    Failure = 1,
    /// Invalid configuration or a second handler binding.
    BadOptions = 2,
    /// The host wall clock moved backward past tolerance.
    ClockSkewDetected = 47,
    /// A worker hit a failure outside every recoverable category.
    UncaughtFailure = 100,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// True for the statuses a worker can request on its own.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::ClockSkewDetected | Self::UncaughtFailure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Failure => "failure",
            Self::BadOptions => "bad_options",
            Self::ClockSkewDetected => "clock_skew",
            Self::UncaughtFailure => "uncaught",
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_codes_are_distinct() {
        assert_ne!(
            ExitStatus::ClockSkewDetected.code(),
            ExitStatus::UncaughtFailure.code()
        );
        assert!(ExitStatus::ClockSkewDetected.is_fatal());
        assert!(ExitStatus::UncaughtFailure.is_fatal());
        assert!(!ExitStatus::Clean.is_fatal());
    }

    #[test]
    fn display_includes_code() {
        assert_eq!(ExitStatus::ClockSkewDetected.to_string(), "clock_skew (47)");
    }
}
