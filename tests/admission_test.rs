//! Tests for admission control.

use std::sync::Arc;
use std::time::Duration;

use msgport::net::{AdmissionConfig, AdmissionController, DrainResult};

fn pool(max_connections: usize) -> Arc<AdmissionController> {
    Arc::new(AdmissionController::new(AdmissionConfig { max_connections }))
}

#[test]
fn test_acquire_within_limit() {
    let pool = pool(2);

    let permit1 = pool.try_acquire();
    assert!(permit1.is_some());
    assert_eq!(pool.used(), 1);

    let permit2 = pool.try_acquire();
    assert!(permit2.is_some());
    assert_eq!(pool.used(), 2);
    assert_eq!(pool.available(), 0);
}

#[test]
fn test_acquire_at_limit_rejects() {
    let pool = pool(1);

    let _permit = pool.try_acquire();
    assert_eq!(pool.used(), 1);

    assert!(pool.try_acquire().is_none());
    assert_eq!(pool.used(), 1);
}

#[test]
fn test_permit_releases_on_drop() {
    let pool = pool(1);

    {
        let _permit = pool.try_acquire();
        assert_eq!(pool.used(), 1);
    }

    assert_eq!(pool.used(), 0);
    assert!(pool.try_acquire().is_some());
}

#[test]
fn test_concurrent_acquire_never_exceeds_max() {
    use std::thread;

    let pool = pool(100);
    let barrier = Arc::new(std::sync::Barrier::new(10));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut permits = Vec::new();
                for _ in 0..15 {
                    if let Some(permit) = pool.try_acquire() {
                        permits.push(permit);
                    }
                    assert!(pool.used() <= pool.max());
                }
                // Keep permits alive until every thread has tried.
                barrier.wait();
                permits.len()
            })
        })
        .collect();

    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    // 150 attempts against 100 slots: exactly 50 rejected.
    assert_eq!(total, 100);
    assert_eq!(pool.used(), 0);
}

#[tokio::test]
async fn test_drain_waits_for_release() {
    let pool = pool(4);
    let permit = pool.try_acquire().unwrap();

    let pool_clone = Arc::clone(&pool);
    let drain = tokio::spawn(async move { pool_clone.drain(Duration::from_millis(500)).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    permit.release();

    assert_eq!(drain.await.unwrap(), DrainResult::Complete);
}

#[tokio::test]
async fn test_drain_timeout_reports_remaining() {
    let pool = pool(4);
    let _a = pool.try_acquire().unwrap();
    let _b = pool.try_acquire().unwrap();

    let result = pool.drain(Duration::from_millis(50)).await;
    assert_eq!(result, DrainResult::Timeout { remaining: 2 });
}

#[test]
fn test_admission_config_defaults() {
    assert_eq!(AdmissionConfig::default().max_connections, 819);
}
