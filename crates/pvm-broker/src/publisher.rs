//! Reliable publish with Fibonacci backoff.

use std::time::Duration;

use tracing::warn;

use crate::BrokerTransport;

pub const DEFAULT_PUBLISH_ATTEMPTS: u32 = 6;

/// Backoff schedule for an attempt budget, seeded `1, 1, 2, 3, 5, 8, ...`
/// seconds. One entry per attempt; the final entry is never slept because the
/// last failure returns immediately.
pub fn fibonacci_schedule(attempts: u32) -> Vec<u64> {
    let mut fib: Vec<u64> = vec![1, 1];
    while fib.len() < attempts as usize {
        let next = fib[fib.len() - 1] + fib[fib.len() - 2];
        fib.push(next);
    }
    fib.truncate(attempts.max(1) as usize);
    fib
}

/// Bounded-retry publisher shared by the API layer and the engine.
///
/// `publish` returns `false` after exhausting the attempt budget instead of
/// erroring; callers own the compensating state changes on failure.
#[derive(Debug, Clone)]
pub struct ReliablePublisher {
    max_attempts: u32,
    schedule: Vec<u64>,
}

impl Default for ReliablePublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl ReliablePublisher {
    pub fn new() -> Self {
        Self::with_attempts(DEFAULT_PUBLISH_ATTEMPTS)
    }

    pub fn with_attempts(max_attempts: u32) -> Self {
        let max_attempts = max_attempts.max(1);
        ReliablePublisher {
            max_attempts,
            schedule: fibonacci_schedule(max_attempts),
        }
    }

    /// Attempt an acknowledged publish up to the attempt budget.
    ///
    /// May block the caller for the full backoff window (12s at the default
    /// budget of 6). Only the outbound path uses it; the inbound critical
    /// path never waits on a publish.
    pub async fn publish<T: BrokerTransport>(
        &self,
        transport: &mut T,
        topic: &str,
        payload: &str,
    ) -> bool {
        for attempt in 0..self.max_attempts {
            match transport.publish_acked(topic, payload).await {
                Ok(()) => return true,
                Err(e) => {
                    warn!(
                        topic,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        "publish attempt failed: {e:#}"
                    );
                    if attempt + 1 == self.max_attempts {
                        return false;
                    }
                    tokio::time::sleep(Duration::from_secs(self.schedule[attempt as usize]))
                        .await;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InboundFrame;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    /// Transport whose publishes fail `failures` times before succeeding.
    struct FlakyTransport {
        failures: u32,
        attempts: u32,
    }

    #[async_trait]
    impl BrokerTransport for FlakyTransport {
        async fn subscribe(&mut self, _topic: &str) -> Result<()> {
            Ok(())
        }

        async fn next_frame(&mut self) -> Result<Option<InboundFrame>> {
            Ok(None)
        }

        async fn ack(&mut self, _delivery_id: u64) -> Result<()> {
            Ok(())
        }

        async fn publish_acked(&mut self, _topic: &str, _payload: &str) -> Result<()> {
            self.attempts += 1;
            if self.attempts <= self.failures {
                Err(anyhow!("broker unreachable"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn schedule_is_seeded_one_one() {
        assert_eq!(fibonacci_schedule(6), vec![1, 1, 2, 3, 5, 8]);
        assert_eq!(fibonacci_schedule(2), vec![1, 1]);
        assert_eq!(fibonacci_schedule(1), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_without_sleeping_on_first_try() {
        let mut t = FlakyTransport {
            failures: 0,
            attempts: 0,
        };
        let start = tokio::time::Instant::now();
        let ok = ReliablePublisher::new()
            .publish(&mut t, "properties/requests", "{}")
            .await;
        assert!(ok);
        assert_eq!(t.attempts, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_succeeds() {
        let mut t = FlakyTransport {
            failures: 2,
            attempts: 0,
        };
        let start = tokio::time::Instant::now();
        let ok = ReliablePublisher::new()
            .publish(&mut t, "properties/requests", "{}")
            .await;
        assert!(ok);
        assert_eq!(t.attempts, 3);
        // Slept 1s + 1s before the third attempt succeeded.
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_false_after_twelve_seconds() {
        let mut t = FlakyTransport {
            failures: u32::MAX,
            attempts: 0,
        };
        let start = tokio::time::Instant::now();
        let ok = ReliablePublisher::new()
            .publish(&mut t, "properties/requests", "{}")
            .await;
        assert!(!ok);
        assert_eq!(t.attempts, 6);
        // Five sleeps between six attempts: 1 + 1 + 2 + 3 + 5 = 12.
        assert_eq!(start.elapsed(), Duration::from_secs(12));
    }
}
