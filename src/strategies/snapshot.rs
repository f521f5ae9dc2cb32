use chrono::{DateTime, TimeZone};

/// Per-minute mark-to-market throttle, keyed by wall-clock minute rather
/// than tick count.
#[derive(Debug, Default)]
pub struct SnapshotScheduler {
    last_minute: Option<i64>,
}

impl SnapshotScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn minute<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
        now.timestamp().div_euclid(60)
    }

    pub fn is_due<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        self.last_minute.map_or(true, |m| Self::minute(now) > m)
    }

    /// Record that the snapshot for `now`'s minute was written.
    pub fn mark<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) {
        self.last_minute = Some(Self::minute(now));
    }

    /// Forget the last minute so the next open tick snapshots immediately.
    pub fn reset(&mut self) {
        self.last_minute = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn t(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, h, m, s).unwrap()
    }

    #[test]
    fn test_one_per_minute() {
        let mut s = SnapshotScheduler::new();
        let mut emitted = 0;
        for now in [t(9, 31, 0), t(9, 31, 20), t(9, 31, 45), t(9, 32, 5)] {
            if s.is_due(&now) {
                s.mark(&now);
                emitted += 1;
            }
        }
        assert_eq!(emitted, 2);
    }

    #[test]
    fn test_reset_allows_same_minute() {
        let mut s = SnapshotScheduler::new();
        s.mark(&t(9, 31, 0));
        assert!(!s.is_due(&t(9, 31, 30)));
        s.reset();
        assert!(s.is_due(&t(9, 31, 30)));
    }
}
