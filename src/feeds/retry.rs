use anyhow::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry schedule for idempotent Kite reads (LTP, quote, instrument dump).
/// Orders never go through here.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total tries including the first one.
    pub attempts: u32,
    pub first_wait: Duration,
    pub max_wait: Duration,
    /// Fractional spread applied to each wait, 0.25 means +/-25%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            first_wait: Duration::from_millis(100),
            max_wait: Duration::from_secs(1),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (0-based): doubles each time, capped
    /// at `max_wait`, then spread by `jitter`.
    fn wait_before(&self, retry: u32) -> Duration {
        let doubled = self.first_wait.saturating_mul(1u32 << retry.min(16));
        let capped = doubled.min(self.max_wait);
        if self.jitter <= 0.0 {
            return capped;
        }
        let spread = self.jitter.min(1.0);
        capped.mul_f64(rand::thread_rng().gen_range(1.0 - spread..=1.0 + spread))
    }

    /// Run `read` until it succeeds or the attempts run out. The last error
    /// is returned untouched.
    pub async fn run<F, Fut, T>(&self, what: &str, mut read: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut retry = 0;
        loop {
            match read().await {
                Ok(value) => return Ok(value),
                Err(e) if retry + 1 >= attempts => return Err(e),
                Err(e) => {
                    let wait = self.wait_before(retry);
                    retry += 1;
                    warn!("{what} failed ({retry}/{attempts}): {e}; again in {wait:?}");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            first_wait: Duration::from_millis(1),
            max_wait: Duration::from_millis(2),
            jitter: 0.0,
        }
    }

    #[test]
    fn test_wait_doubles_up_to_cap() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        let waits: Vec<u64> = (0..6).map(|r| policy.wait_before(r).as_millis() as u64).collect();
        assert_eq!(waits, vec![100, 200, 400, 800, 1000, 1000]);
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let ms = policy.wait_before(1).as_millis();
            assert!((149..=250).contains(&ms), "{ms}");
        }
    }

    #[tokio::test]
    async fn test_second_read_succeeds() {
        let calls = AtomicU32::new(0);
        let quote = quick(3)
            .run("quote", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    anyhow::ensure!(n > 0, "502 from broker");
                    Ok(22_512.35)
                }
            })
            .await
            .unwrap();
        assert_eq!(quote, 22_512.35);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_last_error_surfaces_after_all_attempts() {
        let calls = AtomicU32::new(0);
        let err = quick(2)
            .run("ltp", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err::<f64, _>(anyhow::anyhow!("timeout #{n}")) }
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "timeout #1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
