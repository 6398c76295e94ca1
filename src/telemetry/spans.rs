//! Span factory for connection workers.

use tracing::{info_span, Span};

/// Span wrapping one connection worker.
///
/// Fields:
/// - `conn_id`: connection number assigned at accept time
/// - `peer`: remote address
/// - `exit`: filled in when the worker ends
pub fn connection_span(conn_id: u64, peer: &str) -> Span {
    info_span!(
        "conn",
        conn_id,
        peer = %peer,
        exit = tracing::field::Empty,
    )
}
