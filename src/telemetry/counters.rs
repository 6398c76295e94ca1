//! Process-wide network counters.
//!
//! Atomic totals kept here for the CLI and tests; every update is mirrored
//! to the `metrics` facade for whatever exporter the embedding process
//! installs.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

pub const BYTES_IN_TOTAL: &str = "msgport_network_bytes_in_total";
pub const BYTES_OUT_TOTAL: &str = "msgport_network_bytes_out_total";
pub const REQUESTS_TOTAL: &str = "msgport_network_requests_total";
pub const CONNECTIONS_ACTIVE: &str = "msgport_connections_active";
pub const CONNECTIONS_ACCEPTED_TOTAL: &str = "msgport_connections_accepted_total";
pub const CONNECTIONS_REJECTED_TOTAL: &str = "msgport_connections_rejected_total";

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub requests: u64,
}

#[derive(Debug, Default)]
pub struct NetworkCounter {
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    requests: AtomicU64,
}

impl NetworkCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one request/response exchange.
    pub fn hit(&self, bytes_in: u64, bytes_out: u64) {
        self.bytes_in.fetch_add(bytes_in, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes_out, Ordering::Relaxed);
        self.requests.fetch_add(1, Ordering::Relaxed);

        metrics::counter!(BYTES_IN_TOTAL).increment(bytes_in);
        metrics::counter!(BYTES_OUT_TOTAL).increment(bytes_out);
        metrics::counter!(REQUESTS_TOTAL).increment(1);
    }

    pub fn snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
        }
    }
}

/// Record the open-connection gauge.
pub fn record_connections_active(count: usize) {
    metrics::gauge!(CONNECTIONS_ACTIVE).set(count as f64);
}

pub fn record_connection_accepted() {
    metrics::counter!(CONNECTIONS_ACCEPTED_TOTAL).increment(1);
}

pub fn record_connection_rejected() {
    metrics::counter!(CONNECTIONS_REJECTED_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn hits_accumulate() {
        let counter = NetworkCounter::new();
        counter.hit(100, 40);
        counter.hit(10, 0);
        assert_eq!(
            counter.snapshot(),
            NetworkSnapshot {
                bytes_in: 110,
                bytes_out: 40,
                requests: 2
            }
        );
    }

    #[test]
    fn concurrent_hits_are_not_lost() {
        let counter = Arc::new(NetworkCounter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.hit(2, 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = counter.snapshot();
        assert_eq!(snap.requests, 8000);
        assert_eq!(snap.bytes_in, 16000);
        assert_eq!(snap.bytes_out, 8000);
    }
}
