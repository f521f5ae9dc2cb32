use crate::config::{SessionConfig, StrategyConfig};
use crate::error::{EngineError, ExecutionError, ResolveError};
use crate::execution::ExecutionGateway;
use crate::feeds::instruments::InstrumentResolver;
use crate::feeds::PriceSource;
use crate::models::event::{EventKind, EventStatus, TradeEvent, VolReference};
use crate::models::order::{to_price, LegFill, OrderEngine, OrderSide};
use crate::models::position::{Leg, OptionKind, StraddlePosition};
use crate::risk::kill_switch::KillSwitchGate;
use crate::signals::atr::TrueRangeAtr;
use crate::signals::strike::StrikeResolver;
use crate::strategies::snapshot::SnapshotScheduler;
use crate::telemetry::journal::{summarize, EventSink};
use crate::telemetry::pnl::PnlLedger;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// External capabilities the engine drives.
pub struct EngineDeps {
    pub prices: Arc<dyn PriceSource>,
    pub instruments: Arc<dyn InstrumentResolver>,
    pub gateway: Arc<dyn ExecutionGateway>,
    pub events: Arc<dyn EventSink>,
    pub kill_switch: KillSwitchGate,
}

/// What a tick did to the position.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Entry { strike: i64 },
    Roll { from: i64, to: i64, realized: Decimal },
    Exit { kind: EventKind, reason: String, realized: Decimal },
    Failed { kind: EventKind, message: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub transition: Option<Transition>,
    pub snapshot: bool,
    /// Square-off time reached with no position left; the loop should stop.
    pub session_over: bool,
}

/// Market state sampled at the start of a tick.
struct TickContext {
    utc: DateTime<Utc>,
    local: NaiveDateTime,
    spot: Option<f64>,
    atr: Option<f64>,
    vol: Option<VolReference>,
}

/// Outcome of selling back one leg accepted during a failed open.
type Unwind = (String, Result<Option<Decimal>, ExecutionError>);

/// Why opening both legs failed, and what happened to legs already accepted.
struct OpenFailure {
    error: EngineError,
    unwound: Vec<Unwind>,
}

impl OpenFailure {
    fn describe(&self) -> String {
        let mut text = self.error.to_string();
        for (symbol, outcome) in &self.unwound {
            match outcome {
                Ok(Some(price)) => text.push_str(&format!("; {symbol} unwound at {price:.2}")),
                Ok(None) => text.push_str(&format!("; {symbol} unwound, price unknown")),
                Err(e) => text.push_str(&format!("; {symbol} UNWIND FAILED: {e}")),
            }
        }
        text
    }
}

impl From<ResolveError> for OpenFailure {
    fn from(e: ResolveError) -> Self {
        Self {
            error: e.into(),
            unwound: Vec::new(),
        }
    }
}

impl From<ExecutionError> for OpenFailure {
    fn from(e: ExecutionError) -> Self {
        Self {
            error: e.into(),
            unwound: Vec::new(),
        }
    }
}

/// ATM rolling long-straddle state machine.
///
/// Owns every piece of mutable strategy state and is driven one tick at a
/// time by a single loop, so at most one transition is ever in flight.
/// Guards are evaluated in priority order and at most one fires per tick:
/// square-off, kill switch, roll, target/stop, entry.
pub struct StraddleEngine {
    config: StrategyConfig,
    session: SessionConfig,
    reference_symbol: String,
    strikes: StrikeResolver,
    prices: Arc<dyn PriceSource>,
    instruments: Arc<dyn InstrumentResolver>,
    gateway: Arc<dyn ExecutionGateway>,
    events: Arc<dyn EventSink>,
    kill_switch: KillSwitchGate,
    atr: TrueRangeAtr,
    position: Option<StraddlePosition>,
    ledger: PnlLedger,
    snapshots: SnapshotScheduler,
}

impl StraddleEngine {
    /// Build the engine, resolving the nearest future as the ATR reference.
    pub fn new(
        config: StrategyConfig,
        session: SessionConfig,
        deps: EngineDeps,
        as_of: NaiveDate,
    ) -> Result<Self, EngineError> {
        let reference_symbol = deps.instruments.future(&config.underlying, as_of)?;
        info!("ATR reference feed: {reference_symbol}");

        Ok(Self {
            strikes: StrikeResolver::new(config.strike_step, config.entry_tolerance),
            atr: TrueRangeAtr::new(config.atr_period),
            config,
            session,
            reference_symbol,
            prices: deps.prices,
            instruments: deps.instruments,
            gateway: deps.gateway,
            events: deps.events,
            kill_switch: deps.kill_switch,
            position: None,
            ledger: PnlLedger::new(),
            snapshots: SnapshotScheduler::new(),
        })
    }

    pub fn position(&self) -> Option<&StraddlePosition> {
        self.position.as_ref()
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.ledger.realized()
    }

    pub fn ledger(&self) -> &PnlLedger {
        &self.ledger
    }

    pub fn atr(&self) -> Option<f64> {
        self.atr.current()
    }

    pub fn reference_symbol(&self) -> &str {
        &self.reference_symbol
    }

    pub fn order_engine(&self) -> OrderEngine {
        self.gateway.engine()
    }

    /// Run one tick at wall-clock `now`.
    ///
    /// Returns `Err` only when the tick could not be evaluated (spot or leg
    /// prices unavailable); any transition that already fired is logged
    /// before returning.
    pub async fn tick<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<TickReport, EngineError> {
        let utc = now.with_timezone(&Utc);
        let local = now.naive_local();
        let mut report = TickReport::default();

        let spot = self
            .prices
            .last_traded_price(&self.config.index_symbol)
            .await
            .map_err(|source| EngineError::Price {
                symbol: self.config.index_symbol.clone(),
                source,
            });

        let reference = match self.prices.last_traded_price(&self.reference_symbol).await {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Reference price unavailable ({e}); ATR not updated this tick");
                None
            }
        };
        let atr = self.atr.update(&utc, reference);

        let vol = match self.prices.quote(&self.config.vix_symbol).await {
            Ok(q) => Some(VolReference {
                prev_close: q.prev_close,
                live: q.last_price,
            }),
            Err(e) => {
                debug!("Volatility reference unavailable: {e}");
                None
            }
        };

        let ctx = TickContext {
            utc,
            local,
            spot: spot.as_ref().ok().copied(),
            atr,
            vol,
        };

        // 1. Square-off: always permitted, ends the session.
        if self.session.square_off_reached(local.time()) {
            if let Some(pos) = self.position.clone() {
                report.transition = Some(self.exit(&pos, EventKind::TimeExit, "SQUARE_OFF", &ctx).await);
            }
            report.session_over = self.position.is_none();
            return Ok(report);
        }

        // 2. Kill switch.
        let allowed = self.kill_switch.refresh(&utc).await;
        if !allowed {
            if let Some(pos) = self.position.clone() {
                report.transition = Some(self.exit(&pos, EventKind::KillSwitchExit, "FLAG_DISABLED", &ctx).await);
                return Ok(report);
            }
        }

        let spot = spot?;
        let mut marks = None;

        match self.position.clone() {
            Some(pos) => {
                // 3. Roll to a new ATM strike.
                let roll_to = if allowed { self.strikes.should_roll(spot, pos.strike) } else { None };
                if let Some(to) = roll_to {
                    report.transition = Some(self.roll(&pos, to, &ctx).await);
                } else {
                    // 4. Target / stop-loss.
                    let (ce, pe) = self.leg_prices(&pos).await?;
                    let unrealized = pos.pnl_at(ce, pe, self.config.qty_per_leg);
                    if unrealized >= self.config.profit_target || unrealized <= -self.config.stop_loss {
                        let reason = if unrealized >= self.config.profit_target { "TARGET" } else { "SL" };
                        report.transition = Some(self.exit(&pos, EventKind::FinalExit, reason, &ctx).await);
                    } else {
                        marks = Some((ce, pe));
                    }
                }
            }
            None => {
                // 5. Entry at the ATM strike.
                let strike = if allowed { self.strikes.should_enter(spot, false) } else { None };
                if let Some(strike) = strike {
                    report.transition = Some(self.enter(strike, &ctx).await);
                }
            }
        }

        report.snapshot = self.snapshot(&ctx, marks).await;
        Ok(report)
    }

    async fn leg_prices(&self, pos: &StraddlePosition) -> Result<(Decimal, Decimal), EngineError> {
        let mut marks = [Decimal::ZERO; 2];
        for (slot, symbol) in marks.iter_mut().zip([&pos.call.symbol, &pos.put.symbol]) {
            let ltp = self
                .prices
                .last_traded_price(symbol)
                .await
                .map_err(|source| EngineError::Price {
                    symbol: symbol.clone(),
                    source,
                })?;
            *slot = to_price(ltp).ok_or_else(|| EngineError::Price {
                symbol: symbol.clone(),
                source: anyhow::anyhow!("non-finite LTP {ltp}"),
            })?;
        }
        Ok((marks[0], marks[1]))
    }

    fn event(&self, ctx: &TickContext, status: EventStatus, kind: EventKind, reason: impl Into<String>) -> TradeEvent {
        TradeEvent::new(ctx.utc, status, kind, reason, self.gateway.engine())
            .with_market(ctx.spot, ctx.atr, ctx.vol)
    }

    /// Append to the journal. Failures are logged and never abort a transition.
    async fn record(&self, event: TradeEvent) -> bool {
        let timeout = self.session.call_timeout();
        match tokio::time::timeout(timeout, self.events.append(&event)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Event log append failed for {}: {e}", event.kind);
                false
            }
            Err(_) => {
                warn!("Event log append timed out after {timeout:?} for {}", event.kind);
                false
            }
        }
    }

    /// SELL both legs and book the PnL.
    ///
    /// Both SELLs are always attempted. When both are rejected nothing
    /// changed and the position stays open for the next tick. Any accepted
    /// SELL means the book can no longer be trusted to hold both legs: it is
    /// forced flat and EXIT_FAILED names what needs reconciling. PnL is
    /// booked only when both fills are priced.
    async fn close_position(
        &mut self,
        pos: &StraddlePosition,
        kind: EventKind,
        reason: &str,
        ctx: &TickContext,
    ) -> Result<Decimal, Transition> {
        let qty = self.config.qty_per_leg;
        let ce = self.gateway.place_leg(&pos.call.symbol, OrderSide::Sell, qty).await;
        let pe = self.gateway.place_leg(&pos.put.symbol, OrderSide::Sell, qty).await;

        match (ce, pe) {
            (Ok(ce), Ok(pe)) => {
                let (Some(ce_price), Some(pe_price)) = (ce.price, pe.price) else {
                    let unpriced = unpriced_symbols(&[&ce, &pe]);
                    let message = format!("{kind} sent, fill price unknown for {unpriced}; PnL not booked, reconcile with broker");
                    return Err(self.abandon(pos, ctx, message, ce.price, pe.price).await);
                };

                let pnl = self.ledger.realize(pos, ce_price, pe_price, qty);
                self.position = None;
                self.snapshots.reset();

                let event = self
                    .event(ctx, EventStatus::Exit, kind, reason)
                    .with_position(pos)
                    .with_exit(Some(ce_price), Some(pe_price))
                    .with_ltp(ce_price, pe_price)
                    .with_pnl(Some(pnl), self.ledger.realized());
                info!("{}", summarize(&event));
                self.record(event).await;
                Ok(pnl)
            }
            (Err(ce_err), Err(pe_err)) => {
                let message = format!("{kind} not executed, position kept: {ce_err}; {pe_err}");
                error!("{message}");
                let event = self
                    .event(ctx, EventStatus::Error, EventKind::ExitFailed, message.clone())
                    .with_position(pos)
                    .with_pnl(None, self.ledger.realized());
                self.record(event).await;
                Err(Transition::Failed {
                    kind: EventKind::ExitFailed,
                    message,
                })
            }
            (Ok(fill), Err(e)) | (Err(e), Ok(fill)) => {
                let call_closed = fill.symbol == pos.call.symbol;
                let orphan = if call_closed { &pos.put.symbol } else { &pos.call.symbol };
                let message = format!("{kind} partial: {orphan} still open at broker, reconcile manually: {e}");
                let (ce_exit, pe_exit) = if call_closed { (fill.price, None) } else { (None, fill.price) };
                Err(self.abandon(pos, ctx, message, ce_exit, pe_exit).await)
            }
        }
    }

    /// Drop the position without booking PnL after an exit the broker only
    /// partly confirmed. Never re-sends a SELL for these legs.
    async fn abandon(
        &mut self,
        pos: &StraddlePosition,
        ctx: &TickContext,
        message: String,
        ce_exit: Option<Decimal>,
        pe_exit: Option<Decimal>,
    ) -> Transition {
        error!("{message}");
        self.position = None;
        self.snapshots.reset();

        let event = self
            .event(ctx, EventStatus::Error, EventKind::ExitFailed, message.clone())
            .with_position(pos)
            .with_exit(ce_exit, pe_exit)
            .with_pnl(None, self.ledger.realized());
        self.record(event).await;
        Transition::Failed {
            kind: EventKind::ExitFailed,
            message,
        }
    }

    /// Resolve and BUY both legs at `strike`. No state is touched here.
    ///
    /// Whatever the broker accepted is sold back when the pair cannot be
    /// completed with known prices, so a failure never leaves a leg behind.
    async fn open_position(&self, strike: i64, as_of: NaiveDate) -> Result<StraddlePosition, OpenFailure> {
        let underlying = &self.config.underlying;
        let qty = self.config.qty_per_leg;

        let ce_symbol = self.instruments.option(underlying, strike, OptionKind::Call, as_of)?;
        let pe_symbol = self.instruments.option(underlying, strike, OptionKind::Put, as_of)?;

        let ce = self.gateway.place_leg(&ce_symbol, OrderSide::Buy, qty).await?;
        let pe = match self.gateway.place_leg(&pe_symbol, OrderSide::Buy, qty).await {
            Ok(fill) => fill,
            Err(e) => {
                warn!("Put leg failed after call was accepted; unwinding {ce_symbol}");
                return Err(OpenFailure {
                    error: e.into(),
                    unwound: self.unwind(&[&ce]).await,
                });
            }
        };

        match (ce.price, pe.price) {
            (Some(ce_price), Some(pe_price)) => Ok(StraddlePosition::new(
                strike,
                Leg {
                    symbol: ce.symbol,
                    entry_price: ce_price,
                },
                Leg {
                    symbol: pe.symbol,
                    entry_price: pe_price,
                },
            )),
            _ => {
                let unpriced = unpriced_symbols(&[&ce, &pe]);
                warn!("Entry fill price unknown for {unpriced}; unwinding both legs");
                Err(OpenFailure {
                    error: EngineError::UnpricedFill(unpriced),
                    unwound: self.unwind(&[&ce, &pe]).await,
                })
            }
        }
    }

    async fn unwind(&self, fills: &[&LegFill]) -> Vec<Unwind> {
        let mut outcomes = Vec::with_capacity(fills.len());
        for fill in fills {
            let result = self
                .gateway
                .place_leg(&fill.symbol, OrderSide::Sell, fill.quantity)
                .await
                .map(|f| f.price);
            if let Err(e) = &result {
                error!("Unwind of {} failed, leg still open at broker: {e}", fill.symbol);
            }
            outcomes.push((fill.symbol.clone(), result));
        }
        outcomes
    }

    fn opened(&mut self, pos: StraddlePosition, ctx: &TickContext, kind: EventKind, reason: &str) -> TradeEvent {
        let event = self
            .event(ctx, EventStatus::Open, kind, reason)
            .with_position(&pos)
            .with_ltp(pos.call.entry_price, pos.put.entry_price)
            .with_pnl(Some(Decimal::ZERO), self.ledger.realized());
        self.position = Some(pos);
        self.snapshots.reset();
        event
    }

    async fn enter(&mut self, strike: i64, ctx: &TickContext) -> Transition {
        match self.open_position(strike, ctx.local.date()).await {
            Ok(pos) => {
                let event = self.opened(pos, ctx, EventKind::Entry, "ATM_TOUCH");
                info!("{}", summarize(&event));
                self.record(event).await;
                Transition::Entry { strike }
            }
            Err(failure) => {
                let message = format!("entry at {strike} aborted: {}", failure.describe());
                error!("{message}");
                let event = self
                    .event(ctx, EventStatus::Error, EventKind::EntryFailed, message.clone())
                    .with_strike(strike)
                    .with_pnl(None, self.ledger.realized());
                self.record(event).await;
                Transition::Failed {
                    kind: EventKind::EntryFailed,
                    message,
                }
            }
        }
    }

    async fn exit(&mut self, pos: &StraddlePosition, kind: EventKind, reason: &str, ctx: &TickContext) -> Transition {
        match self.close_position(pos, kind, reason, ctx).await {
            Ok(realized) => Transition::Exit {
                kind,
                reason: reason.to_string(),
                realized,
            },
            Err(failed) => failed,
        }
    }

    /// Close the current legs and reopen at `to` without yielding to
    /// another tick. Between the halves the book is flat, so a failed
    /// re-entry leaves it flat rather than pointing at closed legs.
    async fn roll(&mut self, pos: &StraddlePosition, to: i64, ctx: &TickContext) -> Transition {
        let from = pos.strike;
        let realized = match self
            .close_position(pos, EventKind::RollExit, &format!("STRIKE_SHIFT {from}->{to}"), ctx)
            .await
        {
            Ok(pnl) => pnl,
            Err(failed) => return failed,
        };

        match self.open_position(to, ctx.local.date()).await {
            Ok(new_pos) => {
                let event = self.opened(new_pos, ctx, EventKind::RollEntry, "ATM_ROLL");
                info!("{}", summarize(&event));
                self.record(event).await;
                Transition::Roll { from, to, realized }
            }
            Err(failure) => {
                let message = format!("roll {from}->{to} re-entry failed, now flat: {}", failure.describe());
                error!("{message}");
                let event = self
                    .event(ctx, EventStatus::Error, EventKind::RollFailed, message.clone())
                    .with_strike(to)
                    .with_pnl(None, self.ledger.realized());
                self.record(event).await;
                Transition::Failed {
                    kind: EventKind::RollFailed,
                    message,
                }
            }
        }
    }

    /// Emit the minute's SNAPSHOT if the book is open and none was written
    /// for this minute yet. `marks` are reused when already fetched for
    /// the same legs this tick.
    async fn snapshot(&mut self, ctx: &TickContext, marks: Option<(Decimal, Decimal)>) -> bool {
        let Some(pos) = self.position.clone() else {
            return false;
        };
        if !self.snapshots.is_due(&ctx.utc) {
            return false;
        }

        let (ce, pe) = match marks {
            Some(m) => m,
            None => match self.leg_prices(&pos).await {
                Ok(m) => m,
                Err(e) => {
                    warn!("Snapshot skipped: {e}");
                    return false;
                }
            },
        };

        let unrealized = pos.pnl_at(ce, pe, self.config.qty_per_leg);
        let event = self
            .event(ctx, EventStatus::M2M, EventKind::Snapshot, "PER_MINUTE")
            .with_position(&pos)
            .with_ltp(ce, pe)
            .with_pnl(Some(unrealized), self.ledger.realized());

        debug!("{}", summarize(&event));
        if self.record(event).await {
            self.snapshots.mark(&ctx.utc);
            true
        } else {
            false
        }
    }
}

fn unpriced_symbols(fills: &[&LegFill]) -> String {
    fills
        .iter()
        .filter(|f| f.price.is_none())
        .map(|f| f.symbol.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl std::fmt::Debug for StraddleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StraddleEngine")
            .field("reference_symbol", &self.reference_symbol)
            .field("position", &self.position)
            .field("realized", &self.ledger.realized())
            .field("atr", &self.atr.current())
            .field("kill_switch_allowed", &self.kill_switch.allowed())
            .finish()
    }
}

