//! Coarse wall clock with skew detection.
//!
//! The listener designated as time tracker refreshes the cached time on every
//! wake-up, so handlers can read a recent timestamp without a syscall. A
//! refresh that sees wall time move backward by more than the tolerance
//! reports [`Fault::ClockSkew`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::net::Fault;

/// Default backward-jump tolerance.
pub const DEFAULT_SKEW_TOLERANCE: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct CoarseClock {
    millis: AtomicU64,
    tolerance_ms: u64,
}

impl CoarseClock {
    pub fn new(tolerance: Duration) -> Self {
        Self {
            millis: AtomicU64::new(0),
            tolerance_ms: tolerance.as_millis() as u64,
        }
    }

    /// Last refreshed wall time in milliseconds since the epoch.
    pub fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::Acquire)
    }

    /// Read the wall clock and update the cached time.
    pub fn refresh(&self) -> Result<u64, Fault> {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Fault::ClockSkew(format!("wall clock before epoch: {}", e)))?;
        self.observe(wall.as_millis() as u64)
    }

    /// Same as [`CoarseClock::refresh`], discarding the time.
    pub fn check(&self) -> Result<(), Fault> {
        self.refresh().map(|_| ())
    }

    fn observe(&self, wall_ms: u64) -> Result<u64, Fault> {
        let previous = self.millis.fetch_max(wall_ms, Ordering::AcqRel);
        if previous > wall_ms && previous - wall_ms > self.tolerance_ms {
            return Err(Fault::ClockSkew(format!(
                "wall clock moved back {}ms (tolerance {}ms)",
                previous - wall_ms,
                self.tolerance_ms
            )));
        }
        Ok(previous.max(wall_ms))
    }
}

impl Default for CoarseClock {
    fn default() -> Self {
        Self::new(DEFAULT_SKEW_TOLERANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::FaultClass;

    #[test]
    fn refresh_advances() {
        let clock = CoarseClock::default();
        assert_eq!(clock.now_millis(), 0);
        let t = clock.refresh().unwrap();
        assert!(t > 0);
        assert_eq!(clock.now_millis(), t);
    }

    #[test]
    fn small_backward_step_is_tolerated() {
        let clock = CoarseClock::new(Duration::from_millis(100));
        clock.observe(10_000).unwrap();
        assert_eq!(clock.observe(9_950).unwrap(), 10_000);
        assert_eq!(clock.now_millis(), 10_000);
    }

    #[test]
    fn large_backward_step_is_skew() {
        let clock = CoarseClock::new(Duration::from_millis(100));
        clock.observe(10_000).unwrap();
        let err = clock.observe(5_000).unwrap_err();
        assert_eq!(err.class(), FaultClass::FatalClockSkew);
        // cached time never goes backward
        assert_eq!(clock.now_millis(), 10_000);
    }
}
