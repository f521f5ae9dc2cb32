use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// External allow-flag that gates every risk-increasing action.
#[async_trait]
pub trait KillSwitchStore: Send + Sync {
    async fn read_allowed(&self, flag_id: &str) -> anyhow::Result<bool>;
}

/// Minute-cached view of the kill-switch flag.
///
/// Polls the store at most once per wall-clock minute. Any read error or
/// timeout resolves to "not allowed" until the next minute's poll.
pub struct KillSwitchGate {
    store: Arc<dyn KillSwitchStore>,
    flag_id: String,
    timeout: Duration,
    last_polled_minute: Option<i64>,
    allowed: bool,
}

impl KillSwitchGate {
    pub fn new(store: Arc<dyn KillSwitchStore>, flag_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            store,
            flag_id: flag_id.into(),
            timeout,
            last_polled_minute: None,
            allowed: false,
        }
    }

    /// Cached value; false until the first successful poll.
    pub fn allowed(&self) -> bool {
        self.allowed
    }

    /// Refresh the cache if `now` falls in a minute not yet polled.
    pub async fn refresh<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> bool {
        let minute = now.timestamp().div_euclid(60);
        if self.last_polled_minute.is_some_and(|m| minute <= m) {
            return self.allowed;
        }
        self.last_polled_minute = Some(minute);

        let read = tokio::time::timeout(self.timeout, self.store.read_allowed(&self.flag_id)).await;
        let allowed = match read {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => {
                warn!("Kill-switch read failed ({e}); blocking trading");
                false
            }
            Err(_) => {
                warn!("Kill-switch read timed out after {:?}; blocking trading", self.timeout);
                false
            }
        };

        if allowed != self.allowed {
            info!(flag = %self.flag_id, allowed, "Kill-switch changed");
        }
        self.allowed = allowed;
        allowed
    }
}
