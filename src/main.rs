use straddle_roller::config::Config;
use straddle_roller::execution::build_gateway;
use straddle_roller::feeds::instruments::{InstrumentCatalog, InstrumentResolver};
use straddle_roller::feeds::kite::KiteClient;
use straddle_roller::feeds::retry::RetryPolicy;
use straddle_roller::feeds::PriceSource;
use straddle_roller::risk::kill_switch::KillSwitchGate;
use straddle_roller::storage::postgres::PgStore;
use straddle_roller::strategies::straddle::{EngineDeps, StraddleEngine};
use straddle_roller::telemetry::alerts::AlertManager;

use chrono::Utc;
use chrono_tz::Asia::Kolkata;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let config = Config::load_or_default();
    config.validate()?;

    let strategy = &config.strategy;
    let session = &config.session;

    info!("================================================");
    info!("  ATM rolling long straddle v0.1.0");
    info!("  {} step={} tol={} qty/leg={}", strategy.underlying, strategy.strike_step, strategy.entry_tolerance, strategy.qty_per_leg);
    info!("  target={} stop={} square-off={}", strategy.profit_target, strategy.stop_loss, session.square_off);
    info!("================================================");

    if config.is_live() {
        warn!("LIVE MODE: orders will be sent to the broker");
    } else {
        info!("Paper mode: fills simulated at LTP");
    }

    let timeout = session.call_timeout();

    // === Market data ===
    let kite = Arc::new(KiteClient::new(config.kite.clone(), timeout, RetryPolicy::default())?);
    let prices: Arc<dyn PriceSource> = kite.clone();

    let catalog = InstrumentCatalog::from_csv(&kite.instruments_csv("NFO").await?)?;
    anyhow::ensure!(!catalog.is_empty(), "NFO instrument dump is empty; check Kite credentials");
    info!("Loaded {} NFO instruments", catalog.len());
    let instruments: Arc<dyn InstrumentResolver> = Arc::new(catalog);

    // === Storage: event journal + kill-switch flag ===
    let store = Arc::new(PgStore::connect(&config.storage, timeout).await?);
    store.ensure_schema().await?;

    let gateway = build_gateway(&config.execution, kite.clone(), prices.clone(), timeout)?;
    info!("Order engine: {}", gateway.engine());

    let kill_switch = KillSwitchGate::new(store.clone(), config.storage.flag_column.clone(), timeout);

    let alerts = AlertManager::new(config.telemetry.clone(), strategy.underlying.clone(), timeout)?;

    let today = Utc::now().with_timezone(&Kolkata).date_naive();
    let mut engine = StraddleEngine::new(
        strategy.clone(),
        session.clone(),
        EngineDeps {
            prices,
            instruments,
            gateway,
            events: store.clone(),
            kill_switch,
        },
        today,
    )?;

    info!("=== running, Ctrl+C to stop ===");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let now = Utc::now().with_timezone(&Kolkata);

        let pause = if !session.in_market_hours(now.time()) {
            session.idle_backoff()
        } else {
            match engine.tick(&now).await {
                Ok(report) => {
                    if let Some(transition) = &report.transition {
                        alerts.on_transition(transition).await;
                    }
                    if report.session_over {
                        info!("Square-off reached with no open position, session over");
                        break;
                    }
                    session.tick_interval()
                }
                Err(e) if e.is_transient() => {
                    warn!("Tick skipped: {e}");
                    session.tick_interval()
                }
                Err(e) => {
                    error!("Tick failed: {e}");
                    alerts.on_error(&e.to_string()).await;
                    session.error_backoff()
                }
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    if let Some(pos) = engine.position() {
        warn!(
            "Stopping with an open straddle at {} ({} / {}); positions remain at the broker",
            pos.strike, pos.call.symbol, pos.put.symbol
        );
    }

    engine.ledger().log_summary();
    info!("Shutdown complete.");
    Ok(())
}
