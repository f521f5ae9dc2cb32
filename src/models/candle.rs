/// One wall-clock minute of reference prices, built tick by tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinuteBar {
    /// Unix minute (seconds / 60) this bar covers.
    pub minute: i64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl MinuteBar {
    pub fn open(minute: i64, price: f64) -> Self {
        Self {
            minute,
            high: price,
            low: price,
            close: price,
        }
    }

    pub fn update(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }

    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_true_range_inside_bar() {
        let mut bar = MinuteBar::open(0, 100.0);
        bar.update(104.0);
        bar.update(98.0);
        assert_eq!(bar.true_range(101.0), 6.0);
    }

    #[test]
    fn test_true_range_gap() {
        let mut bar = MinuteBar::open(0, 110.0);
        bar.update(112.0);
        // Gap up from previous close dominates the intrabar range
        assert_eq!(bar.true_range(100.0), 12.0);
        assert_eq!(bar.close, 112.0);
    }
}
