use crate::models::candle::MinuteBar;
use chrono::{DateTime, TimeZone};
use std::collections::VecDeque;
use tracing::debug;

/// Minute-bucketed ATR over a raw reference-price stream.
///
/// Each tick either extends the current minute bar or, on a new minute,
/// closes it into a true range. ATR is the mean of the last `period`
/// true ranges, rounded to 2 decimals, and stays `None` until the window
/// has filled once.
#[derive(Debug)]
pub struct TrueRangeAtr {
    period: usize,
    bar: Option<MinuteBar>,
    prev_close: f64,
    ranges: VecDeque<f64>,
    atr: Option<f64>,
}

impl TrueRangeAtr {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            bar: None,
            prev_close: 0.0,
            ranges: VecDeque::with_capacity(period),
            atr: None,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn current(&self) -> Option<f64> {
        self.atr
    }

    /// Feed one sample observed at `now`. Missing or non-finite samples are
    /// ignored and the last known ATR is returned.
    pub fn update<Tz: TimeZone>(&mut self, now: &DateTime<Tz>, sample: Option<f64>) -> Option<f64> {
        let Some(price) = sample.filter(|p| p.is_finite()) else {
            debug!("ATR: skipping missing reference sample");
            return self.atr;
        };
        let minute = now.timestamp().div_euclid(60);

        let Some(bar) = self.bar.as_mut() else {
            self.bar = Some(MinuteBar::open(minute, price));
            self.prev_close = price;
            return self.atr;
        };

        if minute <= bar.minute {
            bar.update(price);
            return self.atr;
        }

        let tr = bar.true_range(self.prev_close);
        if self.ranges.len() >= self.period {
            self.ranges.pop_front();
        }
        self.ranges.push_back(tr);

        if self.ranges.len() >= self.period {
            let mean = self.ranges.iter().sum::<f64>() / self.period as f64;
            self.atr = Some((mean * 100.0).round() / 100.0);
        }

        self.prev_close = bar.close;
        self.bar = Some(MinuteBar::open(minute, price));
        self.atr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn at(minute: i64, second: i64) -> DateTime<Utc> {
        let base = Utc.with_ymd_and_hms(2024, 1, 15, 9, 15, 0).unwrap();
        base + Duration::minutes(minute) + Duration::seconds(second)
    }

    /// Each bar opens at the previous close and closes `tr` higher,
    /// so its true range is exactly `tr`.
    fn feed_ranges(atr: &mut TrueRangeAtr, ranges: &[f64]) -> Vec<Option<f64>> {
        let mut close = 100.0;
        let mut out = Vec::new();
        for (i, tr) in ranges.iter().enumerate() {
            out.push(atr.update(&at(i as i64, 0), Some(close)));
            close += tr;
            atr.update(&at(i as i64, 30), Some(close));
        }
        out.push(atr.update(&at(ranges.len() as i64, 0), Some(close)));
        out
    }

    #[test]
    fn test_warmup_then_sliding_mean() {
        let mut atr = TrueRangeAtr::new(3);
        let out = feed_ranges(&mut atr, &[10.0, 12.0, 8.0, 14.0]);
        // out[k] is returned when minute k opens, i.e. after k ranges closed
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_eq!(out[2], None);
        assert_eq!(out[3], Some(10.0));
        assert_eq!(out[4], Some(11.33));
    }

    #[test]
    fn test_same_minute_keeps_value() {
        let mut atr = TrueRangeAtr::new(3);
        feed_ranges(&mut atr, &[10.0, 12.0, 8.0]);
        assert_eq!(atr.current(), Some(10.0));
        assert_eq!(atr.update(&at(3, 10), Some(500.0)), Some(10.0));
        assert_eq!(atr.update(&at(3, 20), Some(90.0)), Some(10.0));
    }

    #[test]
    fn test_missing_and_nan_samples_skipped() {
        let mut atr = TrueRangeAtr::new(3);
        feed_ranges(&mut atr, &[10.0, 12.0, 8.0]);
        assert_eq!(atr.update(&at(3, 10), None), Some(10.0));
        assert_eq!(atr.update(&at(3, 20), Some(f64::NAN)), Some(10.0));
        assert_eq!(atr.update(&at(5, 0), Some(f64::INFINITY)), Some(10.0));

        // A NaN must not have leaked into the running bar
        let next = atr.update(&at(6, 0), Some(130.0));
        assert!(next.unwrap().is_finite());
    }

    #[test]
    fn test_gap_counts_against_previous_close() {
        let mut atr = TrueRangeAtr::new(1);
        atr.update(&at(0, 0), Some(100.0));
        atr.update(&at(0, 30), Some(101.0));
        // Minute 1 opens far above the prior close
        atr.update(&at(1, 0), Some(120.0));
        assert_eq!(atr.current(), Some(1.0));
        let v = atr.update(&at(2, 0), Some(120.0));
        assert_eq!(v, Some(19.0));
    }

    #[test]
    fn test_zero_period_clamped() {
        let atr = TrueRangeAtr::new(0);
        assert_eq!(atr.period(), 1);
    }
}
