/// Maps spot to the ATM strike and decides whether that strike is close
/// enough to act on.
#[derive(Debug, Clone, Copy)]
pub struct StrikeResolver {
    step: u32,
    tolerance: f64,
}

/// ATM strike for one spot observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrikeCandidate {
    pub strike: i64,
    pub distance: f64,
    pub eligible: bool,
}

impl StrikeResolver {
    pub fn new(step: u32, tolerance: f64) -> Self {
        Self {
            step: step.max(1),
            tolerance: tolerance.abs(),
        }
    }

    pub fn candidate(&self, spot: f64) -> StrikeCandidate {
        let strike = round_to_strike(spot, self.step);
        let distance = (spot - strike as f64).abs();
        StrikeCandidate {
            strike,
            distance,
            eligible: distance <= self.tolerance,
        }
    }

    /// ENTRY guard: flat book and spot within tolerance of the ATM strike.
    pub fn should_enter(&self, spot: f64, has_position: bool) -> Option<i64> {
        if has_position {
            return None;
        }
        let c = self.candidate(spot);
        c.eligible.then_some(c.strike)
    }

    /// ROLL guard: spot sits within tolerance of a strike other than the
    /// one currently held. The tolerance band keeps a spot hovering around
    /// the midpoint between two strikes from flip-flopping.
    pub fn should_roll(&self, spot: f64, active_strike: i64) -> Option<i64> {
        let c = self.candidate(spot);
        (c.eligible && c.strike != active_strike).then_some(c.strike)
    }
}

/// Round half up to the nearest multiple of `step`.
///
/// `floor(spot / step + 0.5) * step`: exact midpoints always go up, unlike
/// `f64::round_ties_even` or banker's rounding.
pub fn round_to_strike(spot: f64, step: u32) -> i64 {
    let step = step.max(1) as f64;
    ((spot / step + 0.5).floor() * step) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_examples() {
        assert_eq!(round_to_strike(22498.0, 50), 22500);
        assert_eq!(round_to_strike(22544.0, 50), 22550);
        assert_eq!(round_to_strike(22524.99, 50), 22500);
        assert_eq!(round_to_strike(22525.0, 50), 22550);
        assert_eq!(round_to_strike(22575.0, 50), 22600);
    }

    #[test]
    fn test_round_bounds_and_idempotence() {
        let step = 50;
        let mut spot = 21_000.0;
        while spot < 23_000.0 {
            let k = round_to_strike(spot, step);
            assert!((k as f64 - spot).abs() <= step as f64 / 2.0, "spot={spot} strike={k}");
            assert_eq!(round_to_strike(k as f64, step), k);
            assert_eq!(k % step as i64, 0);
            spot += 0.37;
        }
    }

    #[test]
    fn test_entry_tolerance() {
        let r = StrikeResolver::new(50, 4.0);
        assert_eq!(r.should_enter(22498.0, false), Some(22500));
        assert_eq!(r.should_enter(22504.0, false), Some(22500));
        assert_eq!(r.should_enter(22505.0, false), None);
        assert_eq!(r.should_enter(22498.0, true), None);
    }

    #[test]
    fn test_roll_needs_new_strike_within_tolerance() {
        let r = StrikeResolver::new(50, 4.0);
        // 22544 → 22550 but 6 points away
        assert_eq!(r.should_roll(22544.0, 22500), None);
        // 22547 → 22550, 3 points away, different strike
        assert_eq!(r.should_roll(22547.0, 22500), Some(22550));
        // Same strike never rolls
        assert_eq!(r.should_roll(22501.0, 22500), None);
    }

    #[test]
    fn test_midpoint_oscillation_does_not_roll() {
        let r = StrikeResolver::new(50, 4.0);
        for spot in [22524.0, 22525.0, 22526.0, 22524.5, 22525.5] {
            assert_eq!(r.should_roll(spot, 22500), None, "spot={spot}");
            assert_eq!(r.should_roll(spot, 22550), None, "spot={spot}");
        }
    }

    #[test]
    fn test_candidate_distance() {
        let r = StrikeResolver::new(100, 10.0);
        let c = r.candidate(48_012.5);
        assert_eq!(c.strike, 48_000);
        assert!((c.distance - 12.5).abs() < 1e-9);
        assert!(!c.eligible);
    }
}
