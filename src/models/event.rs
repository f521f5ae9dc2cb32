use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::order::OrderEngine;
use super::position::StraddlePosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventStatus {
    Open,
    Exit,
    M2M,
    Error,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Open => "OPEN",
            EventStatus::Exit => "EXIT",
            EventStatus::M2M => "M2M",
            EventStatus::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Entry,
    RollExit,
    RollEntry,
    FinalExit,
    KillSwitchExit,
    TimeExit,
    Snapshot,
    EntryFailed,
    RollFailed,
    ExitFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Entry => "ENTRY",
            EventKind::RollExit => "ROLL_EXIT",
            EventKind::RollEntry => "ROLL_ENTRY",
            EventKind::FinalExit => "FINAL_EXIT",
            EventKind::KillSwitchExit => "KILL_SWITCH_EXIT",
            EventKind::TimeExit => "TIME_EXIT",
            EventKind::Snapshot => "SNAPSHOT",
            EventKind::EntryFailed => "ENTRY_FAILED",
            EventKind::RollFailed => "ROLL_FAILED",
            EventKind::ExitFailed => "EXIT_FAILED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// India VIX (or any other volatility index) at the time of an event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolReference {
    pub prev_close: f64,
    pub live: f64,
}

/// One append-only row in the trade journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub timestamp: DateTime<Utc>,
    pub status: EventStatus,
    pub kind: EventKind,
    pub reason: String,
    pub spot: Option<f64>,
    pub strike: Option<i64>,
    pub ce_symbol: Option<String>,
    pub pe_symbol: Option<String>,
    pub ce_entry: Option<Decimal>,
    pub pe_entry: Option<Decimal>,
    pub ce_exit: Option<Decimal>,
    pub pe_exit: Option<Decimal>,
    pub ce_ltp: Option<Decimal>,
    pub pe_ltp: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub realized_pnl: Decimal,
    pub atr: Option<f64>,
    pub vol_reference: Option<VolReference>,
    pub order_engine: OrderEngine,
}

impl TradeEvent {
    pub fn new(
        timestamp: DateTime<Utc>,
        status: EventStatus,
        kind: EventKind,
        reason: impl Into<String>,
        order_engine: OrderEngine,
    ) -> Self {
        Self {
            timestamp,
            status,
            kind,
            reason: reason.into(),
            spot: None,
            strike: None,
            ce_symbol: None,
            pe_symbol: None,
            ce_entry: None,
            pe_entry: None,
            ce_exit: None,
            pe_exit: None,
            ce_ltp: None,
            pe_ltp: None,
            unrealized_pnl: None,
            realized_pnl: Decimal::ZERO,
            atr: None,
            vol_reference: None,
            order_engine,
        }
    }

    pub fn with_position(mut self, pos: &StraddlePosition) -> Self {
        self.strike = Some(pos.strike);
        self.ce_symbol = Some(pos.call.symbol.clone());
        self.pe_symbol = Some(pos.put.symbol.clone());
        self.ce_entry = Some(pos.call.entry_price);
        self.pe_entry = Some(pos.put.entry_price);
        self
    }

    pub fn with_market(mut self, spot: Option<f64>, atr: Option<f64>, vol: Option<VolReference>) -> Self {
        self.spot = spot;
        self.atr = atr;
        self.vol_reference = vol;
        self
    }

    pub fn with_exit(mut self, ce_exit: Option<Decimal>, pe_exit: Option<Decimal>) -> Self {
        self.ce_exit = ce_exit;
        self.pe_exit = pe_exit;
        self
    }

    pub fn with_ltp(mut self, ce_ltp: Decimal, pe_ltp: Decimal) -> Self {
        self.ce_ltp = Some(ce_ltp);
        self.pe_ltp = Some(pe_ltp);
        self
    }

    pub fn with_pnl(mut self, unrealized: Option<Decimal>, realized: Decimal) -> Self {
        self.unrealized_pnl = unrealized;
        self.realized_pnl = realized;
        self
    }

    pub fn with_strike(mut self, strike: i64) -> Self {
        self.strike = Some(strike);
        self
    }
}
