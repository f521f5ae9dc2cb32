use crate::models::event::TradeEvent;
use async_trait::async_trait;

/// Append-only destination for trade events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn append(&self, event: &TradeEvent) -> anyhow::Result<()>;
}

/// One-line human summary used in logs and alerts.
pub fn summarize(event: &TradeEvent) -> String {
    let mut line = format!("{} [{}] {}", event.kind, event.status.as_str(), event.reason);
    if let Some(strike) = event.strike {
        line.push_str(&format!(" strike={strike}"));
    }
    if let Some(spot) = event.spot {
        line.push_str(&format!(" spot={spot:.2}"));
    }
    if let (Some(ce), Some(pe)) = (event.ce_exit, event.pe_exit) {
        line.push_str(&format!(" exit={ce:.2}/{pe:.2}"));
    }
    if let Some(u) = event.unrealized_pnl {
        line.push_str(&format!(" pnl={u:.2}"));
    }
    line.push_str(&format!(" realized={:.2}", event.realized_pnl));
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::{EventKind, EventStatus};
    use crate::models::order::OrderEngine;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_summary_includes_exit_prices() {
        let ev = TradeEvent::new(Utc::now(), EventStatus::Exit, EventKind::FinalExit, "TARGET", OrderEngine::Paper)
            .with_strike(22500)
            .with_exit(Some(dec!(140)), Some(dec!(80)))
            .with_pnl(Some(dec!(1950)), dec!(1950));
        let s = summarize(&ev);
        assert!(s.starts_with("FINAL_EXIT [EXIT] TARGET"));
        assert!(s.contains("strike=22500"));
        assert!(s.contains("exit=140.00/80.00"));
        assert!(s.contains("realized=1950.00"));
    }
}
