use anyhow::{Result, anyhow};
use notification_pipeline::{
    models::retry::RetryConfig,
    utils::{backoff_delay, retry_with_backoff},
};
use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

/// Test: Successful operations complete without retry
#[tokio::test]
async fn test_successful_operation_no_retry() -> Result<()> {
    let config = RetryConfig {
        max_attempts: 3,
        initial_delay_ms: 100,
        max_delay_ms: 1000,
        backoff_multiplier: 2,
    };

    let attempt_count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempt_count);

    let result = retry_with_backoff(&config, || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>("connected")
        }
    })
    .await?;

    assert_eq!(result, "connected");
    assert_eq!(
        attempt_count.load(Ordering::SeqCst),
        1,
        "Should only attempt once"
    );

    Ok(())
}

/// Test: Transient connection failures are retried with backoff
#[tokio::test]
async fn test_transient_failures_are_retried() -> Result<()> {
    let config = RetryConfig {
        max_attempts: 5,
        initial_delay_ms: 20,
        max_delay_ms: 100,
        backoff_multiplier: 2,
    };

    let attempt_count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempt_count);

    let result = retry_with_backoff(&config, || {
        let counter = Arc::clone(&counter);
        async move {
            let attempts = counter.fetch_add(1, Ordering::SeqCst);

            // Broker comes back on the 3rd attempt
            if attempts < 2 {
                Err(anyhow!("Connection refused"))
            } else {
                Ok("connected")
            }
        }
    })
    .await?;

    assert_eq!(result, "connected");
    assert_eq!(
        attempt_count.load(Ordering::SeqCst),
        3,
        "Should retry 2 times then succeed"
    );

    Ok(())
}

/// Test: Reconnect attempts are bounded
#[tokio::test]
async fn test_permanent_failure_exhausts_retries() -> Result<()> {
    let config = RetryConfig {
        max_attempts: 4,
        initial_delay_ms: 10,
        max_delay_ms: 50,
        backoff_multiplier: 2,
    };

    let attempt_count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempt_count);

    let result = retry_with_backoff(&config, || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(anyhow!("Connection refused"))
        }
    })
    .await;

    assert!(result.is_err(), "Should fail after max attempts");
    assert_eq!(
        attempt_count.load(Ordering::SeqCst),
        4,
        "Should attempt exactly max_attempts times"
    );

    Ok(())
}

/// Test: Delays grow exponentially within the jitter band
#[test]
fn test_backoff_delay_grows_exponentially() {
    let config = RetryConfig {
        max_attempts: 5,
        initial_delay_ms: 100,
        max_delay_ms: 10_000,
        backoff_multiplier: 2,
    };

    for attempt in 1..=4u32 {
        let expected = 100 * 2u64.pow(attempt - 1);
        let delay = backoff_delay(&config, attempt).as_millis() as u64;

        assert!(
            delay >= expected * 8 / 10 && delay <= expected * 12 / 10,
            "Attempt {} delay {} outside the jitter band around {}",
            attempt,
            delay,
            expected
        );
    }
}

/// Test: Max delay cap is respected
#[test]
fn test_backoff_delay_is_capped() {
    let config = RetryConfig {
        max_attempts: 50,
        initial_delay_ms: 100,
        max_delay_ms: 300,
        backoff_multiplier: 2,
    };

    for attempt in [3, 10, 40, u32::MAX] {
        let delay = backoff_delay(&config, attempt).as_millis() as u64;
        assert!(delay <= 360, "Delay {} should not exceed the cap", delay);
    }
}

/// Test: Zero initial delay never sleeps
#[test]
fn test_zero_initial_delay() {
    let config = RetryConfig {
        max_attempts: 3,
        initial_delay_ms: 0,
        max_delay_ms: 0,
        backoff_multiplier: 2,
    };

    assert_eq!(backoff_delay(&config, 0).as_millis(), 0);
    assert_eq!(backoff_delay(&config, 7).as_millis(), 0);
}
