use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub kite: KiteConfig,
    pub strategy: StrategyConfig,
    pub session: SessionConfig,
    pub execution: ExecutionConfig,
    pub storage: StorageConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KiteConfig {
    pub api_url: String,
    pub api_key: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub underlying: String,     // Instrument dump `name`, e.g. "NIFTY"
    pub index_symbol: String,   // Spot feed, e.g. "NSE:NIFTY 50"
    pub vix_symbol: String,     // Volatility reference, e.g. "NSE:INDIA VIX"
    pub strike_step: u32,
    pub entry_tolerance: f64,   // Max |spot - strike| to enter or roll
    pub qty_per_leg: u32,
    pub profit_target: Decimal, // Unrealized PnL that triggers FINAL_EXIT (TARGET)
    pub stop_loss: Decimal,     // Positive amount; exit when unrealized <= -stop_loss
    pub atr_period: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub market_start: NaiveTime,
    pub market_end: NaiveTime,
    pub square_off: NaiveTime,
    pub tick_interval_secs: f64,
    pub idle_backoff_secs: f64,  // Sleep outside market hours
    pub error_backoff_secs: f64, // Cooldown after an unexpected tick error
    pub call_timeout_secs: f64,  // Upper bound for any single external call
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeMode {
    Paper,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineChoice {
    /// Stocko when its order URL is configured, otherwise Kite.
    Auto,
    Stocko,
    Kite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub mode: TradeMode,
    pub engine: EngineChoice,
    pub stocko_order_url: Option<String>,
    pub stocko_auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_url: String,
    pub event_table: String,
    pub flag_table: String,
    pub flag_column: String,
    pub flag_row_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub alert_on_trade: bool,
    pub alert_on_error: bool,
}

impl FromStr for TradeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "PAPER" => Ok(TradeMode::Paper),
            "LIVE" => Ok(TradeMode::Live),
            other => anyhow::bail!("TRADE_MODE must be PAPER or LIVE, got {other:?}"),
        }
    }
}

impl FromStr for EngineChoice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "AUTO" => Ok(EngineChoice::Auto),
            "STOCKO" => Ok(EngineChoice::Stocko),
            "KITE" | "KITEONLY" => Ok(EngineChoice::Kite),
            other => anyhow::bail!("EXECUTION_ENGINE must be AUTO, STOCKO or KITE, got {other:?}"),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            underlying: "NIFTY".into(),
            index_symbol: "NSE:NIFTY 50".into(),
            vix_symbol: "NSE:INDIA VIX".into(),
            strike_step: 50,
            entry_tolerance: 4.0,
            qty_per_leg: 65,
            profit_target: Decimal::new(1500, 0),
            stop_loss: Decimal::new(1500, 0),
            atr_period: 14,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            market_start: hhmm(9, 15),
            market_end: hhmm(15, 30),
            square_off: hhmm(15, 20),
            tick_interval_secs: 1.0,
            idle_backoff_secs: 5.0,
            error_backoff_secs: 5.0,
            call_timeout_secs: 10.0,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: TradeMode::Paper,
            engine: EngineChoice::Auto,
            stocko_order_url: None,
            stocko_auth_token: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            event_table: "nifty_long_strang_roll".into(),
            flag_table: "trade_flag".into(),
            flag_column: "live_ls_nifty_spot".into(),
            flag_row_id: 1,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_chat_id: None,
            discord_webhook_url: None,
            alert_on_trade: true,
            alert_on_error: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kite: KiteConfig {
                api_url: "https://api.kite.trade".into(),
                api_key: String::new(),
                access_token: String::new(),
            },
            strategy: StrategyConfig::default(),
            session: SessionConfig::default(),
            execution: ExecutionConfig::default(),
            storage: StorageConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

fn hhmm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default()
}

/// Parse "HH:MM" (or "HH:MM:SS").
pub fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|e| anyhow::anyhow!("invalid time {s:?}: {e}"))
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse an env var, keeping `current` when unset and warning when unparseable.
fn env_parse<T: FromStr>(key: &str, current: T) -> T {
    match non_empty(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparseable {key}={raw:?}");
            current
        }),
        None => current,
    }
}

fn env_time(key: &str, current: NaiveTime) -> NaiveTime {
    match non_empty(key) {
        Some(raw) => parse_time(&raw).unwrap_or_else(|e| {
            tracing::warn!("Ignoring {key}: {e}");
            current
        }),
        None => current,
    }
}

/// Valid unquoted SQL identifier; table and column names are interpolated.
pub fn is_sql_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl SessionConfig {
    pub fn in_market_hours(&self, now: NaiveTime) -> bool {
        self.market_start <= now && now <= self.market_end
    }

    pub fn square_off_reached(&self, now: NaiveTime) -> bool {
        now >= self.square_off
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.tick_interval_secs.max(0.0))
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.idle_backoff_secs.max(0.0))
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.error_backoff_secs.max(0.0))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.call_timeout_secs.max(0.1))
    }
}

impl Config {
    /// Load configuration from environment variables (.env file) with defaults.
    ///
    /// Required env vars:
    ///   KITE_API_KEY, KITE_ACCESS_TOKEN: market data + Kite orders
    ///   DATABASE_URL: Postgres for the event journal and kill-switch flag
    ///
    /// Optional env vars:
    ///   TRADE_MODE: PAPER (default) or LIVE
    ///   EXECUTION_ENGINE: AUTO (default), STOCKO or KITE
    ///   STOCKO_ORDER_URL, STOCKO_AUTH_TOKEN: Stocko order endpoint
    ///   ENTRY_TOL, QTY_PER_LEG, PROFIT_TARGET, STOP_LOSS, STRIKE_STEP, ATR_PERIOD
    ///   MARKET_START_TIME, MARKET_END_TIME, SQUARE_OFF_TIME: "HH:MM", Asia/Kolkata
    ///   TICK_INTERVAL, IDLE_BACKOFF, ERROR_BACKOFF, CALL_TIMEOUT: seconds
    ///   TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID, DISCORD_WEBHOOK_URL: alerts
    pub fn load_or_default() -> Self {
        let _ = dotenv::dotenv();

        let mut config = Self::default();

        // Kite
        if let Some(v) = non_empty("KITE_API_URL") {
            config.kite.api_url = v;
        }
        if let Some(v) = non_empty("KITE_API_KEY") {
            config.kite.api_key = v;
        }
        if let Some(v) = non_empty("KITE_ACCESS_TOKEN") {
            config.kite.access_token = v;
        }

        // Strategy
        let s = &mut config.strategy;
        if let Some(v) = non_empty("UNDERLYING") {
            s.underlying = v;
        }
        if let Some(v) = non_empty("INDEX_SYMBOL") {
            s.index_symbol = v;
        }
        if let Some(v) = non_empty("VIX_SYMBOL") {
            s.vix_symbol = v;
        }
        s.strike_step = env_parse("STRIKE_STEP", s.strike_step);
        s.entry_tolerance = env_parse("ENTRY_TOL", s.entry_tolerance);
        s.qty_per_leg = env_parse("QTY_PER_LEG", s.qty_per_leg);
        s.profit_target = env_parse("PROFIT_TARGET", s.profit_target);
        s.stop_loss = env_parse("STOP_LOSS", s.stop_loss);
        s.atr_period = env_parse("ATR_PERIOD", s.atr_period);

        // Session
        let sess = &mut config.session;
        sess.market_start = env_time("MARKET_START_TIME", sess.market_start);
        sess.market_end = env_time("MARKET_END_TIME", sess.market_end);
        sess.square_off = env_time("SQUARE_OFF_TIME", sess.square_off);
        sess.tick_interval_secs = env_parse("TICK_INTERVAL", sess.tick_interval_secs);
        sess.idle_backoff_secs = env_parse("IDLE_BACKOFF", sess.idle_backoff_secs);
        sess.error_backoff_secs = env_parse("ERROR_BACKOFF", sess.error_backoff_secs);
        sess.call_timeout_secs = env_parse("CALL_TIMEOUT", sess.call_timeout_secs);

        // Execution
        config.execution.mode = env_parse("TRADE_MODE", config.execution.mode);
        config.execution.engine = env_parse("EXECUTION_ENGINE", config.execution.engine);
        config.execution.stocko_order_url = non_empty("STOCKO_ORDER_URL");
        config.execution.stocko_auth_token = non_empty("STOCKO_AUTH_TOKEN");

        // Storage
        if let Some(v) = non_empty("DATABASE_URL") {
            config.storage.database_url = v;
        }
        if let Some(v) = non_empty("EVENT_TABLE") {
            config.storage.event_table = v;
        }
        if let Some(v) = non_empty("FLAG_TABLE") {
            config.storage.flag_table = v;
        }
        if let Some(v) = non_empty("FLAG_COLUMN") {
            config.storage.flag_column = v;
        }
        config.storage.flag_row_id = env_parse("FLAG_ROW_ID", config.storage.flag_row_id);

        // Alerts
        config.telemetry.telegram_bot_token = non_empty("TELEGRAM_BOT_TOKEN");
        config.telemetry.telegram_chat_id = non_empty("TELEGRAM_CHAT_ID");
        config.telemetry.discord_webhook_url = non_empty("DISCORD_WEBHOOK_URL");

        config
    }

    pub fn is_live(&self) -> bool {
        self.execution.mode == TradeMode::Live
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.kite.api_key.is_empty() && !self.kite.access_token.is_empty(),
            "Missing Kite credentials (KITE_API_KEY / KITE_ACCESS_TOKEN)"
        );
        anyhow::ensure!(!self.storage.database_url.is_empty(), "DATABASE_URL not set");

        for ident in [
            &self.storage.event_table,
            &self.storage.flag_table,
            &self.storage.flag_column,
        ] {
            anyhow::ensure!(is_sql_identifier(ident), "invalid SQL identifier {ident:?}");
        }

        let s = &self.strategy;
        anyhow::ensure!(s.strike_step > 0, "STRIKE_STEP must be positive");
        anyhow::ensure!(
            s.entry_tolerance >= 0.0 && s.entry_tolerance < s.strike_step as f64 / 2.0,
            "ENTRY_TOL must be in [0, STRIKE_STEP/2), got {}",
            s.entry_tolerance
        );
        anyhow::ensure!(s.qty_per_leg > 0, "QTY_PER_LEG must be positive");
        anyhow::ensure!(
            s.profit_target > Decimal::ZERO && s.stop_loss > Decimal::ZERO,
            "PROFIT_TARGET and STOP_LOSS must be positive amounts"
        );
        anyhow::ensure!(s.atr_period > 0, "ATR_PERIOD must be positive");

        let sess = &self.session;
        anyhow::ensure!(
            sess.market_start < sess.square_off && sess.square_off <= sess.market_end,
            "SQUARE_OFF_TIME must fall after MARKET_START_TIME and no later than MARKET_END_TIME"
        );
        for (key, secs) in [
            ("TICK_INTERVAL", sess.tick_interval_secs),
            ("IDLE_BACKOFF", sess.idle_backoff_secs),
            ("ERROR_BACKOFF", sess.error_backoff_secs),
            ("CALL_TIMEOUT", sess.call_timeout_secs),
        ] {
            anyhow::ensure!(secs.is_finite() && secs >= 0.0, "{key} must be a finite number of seconds, got {secs}");
        }
        anyhow::ensure!(sess.tick_interval_secs > 0.0, "TICK_INTERVAL must be positive");
        anyhow::ensure!(sess.call_timeout_secs > 0.0, "CALL_TIMEOUT must be positive");

        if self.is_live() {
            match self.execution.engine {
                EngineChoice::Stocko => anyhow::ensure!(
                    self.execution.stocko_order_url.is_some(),
                    "EXECUTION_ENGINE=STOCKO requires STOCKO_ORDER_URL"
                ),
                EngineChoice::Auto | EngineChoice::Kite => {}
            }
        }
        Ok(())
    }
}
