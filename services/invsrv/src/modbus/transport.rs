//! Transport abstraction and the bounded retry policy wrapped around it.
//!
//! Callers use 1-indexed logical addresses everywhere; implementations
//! subtract one when building wire frames. A bus is shared by every device
//! on it, so the transport sits behind an async mutex that is held per
//! attempt only: retry sleeps never block other devices on the same bus.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::warn;

use crate::catalog::RegisterKind;
use crate::error::{InvSrvError, Result};

/// One register-oriented bus endpoint.
#[async_trait]
pub trait RegisterTransport: Send {
    /// Read `count` consecutive words starting at the 1-indexed `address`.
    async fn read(
        &mut self,
        unit: u8,
        kind: RegisterKind,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>>;

    /// Write consecutive words starting at the 1-indexed `address`.
    /// Only holding registers are writable.
    async fn write(&mut self, unit: u8, address: u16, words: &[u16]) -> Result<()>;
}

/// Transport shared by all devices on one bus.
pub type SharedTransport = Arc<Mutex<dyn RegisterTransport>>;

/// Bounded retry with capped exponential backoff and jitter.
///
/// Only transient transport errors are retried; protocol exceptions and
/// everything else pass through on the first attempt. Exhausting the budget
/// surfaces `DeviceUnavailable` so the device can be parked instead of
/// stalling the poll loop forever.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Backoff ceiling
    pub max_delay: Duration,
    /// Backoff multiplier for exponential delay
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(20),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(
        max_attempts: u32,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            backoff_multiplier,
            jitter: true,
        }
    }

    /// Delay to sleep after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .initial_delay
            .as_millis() as f64
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = exp.min(self.max_delay.as_millis() as f64);
        let with_jitter = if self.jitter {
            capped * rand::thread_rng().gen_range(0.8..1.2)
        } else {
            capped
        };
        Duration::from_millis(with_jitter as u64)
    }
}

/// Read with the retry policy applied. The transport lock is taken per
/// attempt so backoff sleeps do not starve other devices on the bus.
pub async fn read_with_retry(
    transport: &SharedTransport,
    policy: &RetryPolicy,
    device: &str,
    unit: u8,
    kind: RegisterKind,
    address: u16,
    count: u16,
) -> Result<Vec<u16>> {
    retry(policy, device, || async {
        transport.lock().await.read(unit, kind, address, count).await
    })
    .await
}

/// Write with the retry policy applied.
pub async fn write_with_retry(
    transport: &SharedTransport,
    policy: &RetryPolicy,
    device: &str,
    unit: u8,
    address: u16,
    words: &[u16],
) -> Result<()> {
    retry(policy, device, || async {
        transport.lock().await.write(unit, address, words).await
    })
    .await
}

async fn retry<T, F, Fut>(policy: &RetryPolicy, device: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    device,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient transport error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) if err.is_transient() => {
                warn!(device, attempts = attempt, error = %err, "retry budget exhausted");
                return Err(InvSrvError::DeviceUnavailable {
                    device: device.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn backoff_doubles_until_the_cap() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(10), Duration::from_secs(20));
    }

    #[test]
    fn jitter_stays_near_the_nominal_delay() {
        let policy = RetryPolicy::default();
        for attempt in 1..6 {
            let nominal = no_jitter().delay_for(attempt).as_millis() as f64;
            let actual = policy.delay_for(attempt).as_millis() as f64;
            assert!(actual >= nominal * 0.8 - 1.0);
            assert!(actual <= nominal * 1.2 + 1.0);
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried_then_exhausted() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: false,
            ..RetryPolicy::default()
        };
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = retry(&policy, "dev", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err(InvSrvError::transport("link down"))
            }
        })
        .await;

        assert!(matches!(result, Err(InvSrvError::DeviceUnavailable { .. })));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn protocol_exceptions_are_never_retried() {
        let policy = RetryPolicy::default();
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = retry(&policy, "dev", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err(InvSrvError::ProtocolException {
                    code: 0x02,
                    reason: "Illegal Data Address",
                })
            }
        })
        .await;

        assert!(matches!(result, Err(InvSrvError::ProtocolException { .. })));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
