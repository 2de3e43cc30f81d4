use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use vigil::config::{BulkheadConfig, CircuitBreakerConfig, RetryConfig};
use vigil::resilience::{BulkheadError, CircuitError, RetryStopReason};
use vigil::{Bulkhead, CircuitBreaker, CircuitState, RetryPolicy};

fn breaker_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 3,
        success_threshold: 2,
        half_open_time_ms: 50,
        monitoring_window_ms: 60_000,
    }
}

fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        ..Default::default()
    }
}

#[test]
fn test_breaker_full_cycle() {
    let breaker = CircuitBreaker::new("scanner-api", breaker_config());
    for _ in 0..3 {
        let _ = breaker.call(|| Err::<(), _>("boom"));
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let calls = AtomicU32::new(0);
    let rejected = breaker.call(|| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(())
    });
    assert!(matches!(rejected, Err(CircuitError::Open { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    thread::sleep(Duration::from_millis(60));
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    breaker.call(|| Ok::<_, String>(())).unwrap();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    breaker.call(|| Ok::<_, String>(())).unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);

    let stats = breaker.stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.window_calls, 5);
    assert!((stats.success_rate - 0.4).abs() < 1e-9);
}

#[test]
fn test_half_open_failure_reopens() {
    let breaker = CircuitBreaker::new("scanner-api", breaker_config());
    breaker.force_open();
    thread::sleep(Duration::from_millis(60));

    let _ = breaker.call(|| Err::<(), _>("still down"));
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[test]
fn test_retry_recovers_from_transient_io_errors() {
    let policy = RetryPolicy::new(fast_retry(3));
    let value = policy
        .execute(|attempt| {
            if attempt < 3 {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"))
            } else {
                Ok(attempt)
            }
        })
        .unwrap();
    assert_eq!(value, 3);
}

#[test]
fn test_retry_stops_on_permanent_error() {
    let policy = RetryPolicy::new(fast_retry(3));
    let failure = policy
        .execute(|_| Err::<(), _>(io::Error::new(io::ErrorKind::PermissionDenied, "denied")))
        .unwrap_err();
    assert_eq!(failure.attempts, 1);
    assert_eq!(failure.reason, RetryStopReason::NotRetryable);
}

#[test]
fn test_retry_exhausts_budget() {
    let policy = RetryPolicy::new(fast_retry(2));
    let failure = policy
        .execute(|_| Err::<(), _>("network unreachable".to_string()))
        .unwrap_err();
    assert_eq!(failure.attempts, 3);
    assert_eq!(failure.reason, RetryStopReason::Exhausted);
}

#[test]
fn test_bulkhead_rejects_beyond_queue() {
    let bulkhead = Arc::new(Bulkhead::new(
        "remote",
        BulkheadConfig {
            max_concurrent: 1,
            max_queue: 1,
            queue_timeout_ms: 5_000,
        },
    ));
    let started = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));

    let holder = {
        let bulkhead = Arc::clone(&bulkhead);
        let started = Arc::clone(&started);
        let release = Arc::clone(&release);
        thread::spawn(move || {
            bulkhead.execute(|| {
                started.wait();
                release.wait();
            })
        })
    };
    started.wait();

    let waiter = {
        let bulkhead = Arc::clone(&bulkhead);
        thread::spawn(move || bulkhead.execute(|| 7))
    };
    while bulkhead.stats().queued == 0 {
        thread::sleep(Duration::from_millis(1));
    }

    let rejected = bulkhead.execute(|| 0);
    assert!(matches!(rejected, Err(BulkheadError::QueueFull { max_queue: 1, .. })));

    release.wait();
    holder.join().unwrap().unwrap();
    assert_eq!(waiter.join().unwrap().unwrap(), 7);
    assert_eq!(bulkhead.stats().rejected, 1);
}

#[test]
fn test_bulkhead_queue_timeout() {
    let bulkhead = Arc::new(Bulkhead::new(
        "remote",
        BulkheadConfig {
            max_concurrent: 1,
            max_queue: 4,
            queue_timeout_ms: 20,
        },
    ));
    let started = Arc::new(Barrier::new(2));
    let holder = {
        let bulkhead = Arc::clone(&bulkhead);
        let started = Arc::clone(&started);
        thread::spawn(move || {
            bulkhead.execute(|| {
                started.wait();
                thread::sleep(Duration::from_millis(150));
            })
        })
    };
    started.wait();

    let timed_out = bulkhead.execute(|| ());
    assert!(matches!(timed_out, Err(BulkheadError::QueueTimeout { .. })));
    holder.join().unwrap().unwrap();
    assert_eq!(bulkhead.stats().timed_out, 1);
}
