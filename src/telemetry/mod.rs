//! Telemetry for msgport.
//!
//! Structured logging, connection spans, and the process-wide network
//! counters every worker reports into.

mod counters;
mod logging;
mod spans;

pub use counters::{
    record_connection_accepted, record_connection_rejected, record_connections_active,
    NetworkCounter, NetworkSnapshot, BYTES_IN_TOTAL, BYTES_OUT_TOTAL, CONNECTIONS_ACCEPTED_TOTAL,
    CONNECTIONS_ACTIVE, CONNECTIONS_REJECTED_TOTAL, REQUESTS_TOTAL,
};
pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use spans::connection_span;
