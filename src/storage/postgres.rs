use crate::config::{is_sql_identifier, StorageConfig};
use crate::models::event::TradeEvent;
use crate::risk::kill_switch::KillSwitchStore;
use crate::telemetry::journal::EventSink;
use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::info;

/// Postgres-backed event journal and kill-switch flag.
pub struct PgStore {
    pool: PgPool,
    event_table: String,
    flag_table: String,
    flag_row_id: i64,
}

impl PgStore {
    pub async fn connect(config: &StorageConfig, timeout: Duration) -> Result<Self> {
        for ident in [&config.event_table, &config.flag_table, &config.flag_column] {
            ensure!(is_sql_identifier(ident), "invalid SQL identifier {ident:?}");
        }

        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(timeout)
            .connect(&config.database_url)
            .await
            .context("failed to connect to DATABASE_URL")?;

        info!("Postgres connected (events -> {})", config.event_table);

        Ok(Self {
            pool,
            event_table: config.event_table.clone(),
            flag_table: config.flag_table.clone(),
            flag_row_id: config.flag_row_id,
        })
    }

    /// Create the event table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(&create_table_sql(&self.event_table))
            .execute(&self.pool)
            .await
            .context("failed to create event table")?;
        Ok(())
    }
}

fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            timestamp TIMESTAMPTZ,
            status TEXT,
            event TEXT,
            reason TEXT,
            spot DOUBLE PRECISION,
            atm BIGINT,
            ce_symbol TEXT,
            pe_symbol TEXT,
            ce_entry DOUBLE PRECISION,
            pe_entry DOUBLE PRECISION,
            ce_exit DOUBLE PRECISION,
            pe_exit DOUBLE PRECISION,
            ce_ltp DOUBLE PRECISION,
            pe_ltp DOUBLE PRECISION,
            unreal_pnl DOUBLE PRECISION,
            realized_pnl DOUBLE PRECISION,
            atr DOUBLE PRECISION,
            vix_prev DOUBLE PRECISION,
            vix DOUBLE PRECISION,
            order_engine TEXT
        )"
    )
}

fn insert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {table} (timestamp, status, event, reason, spot, atm, ce_symbol, pe_symbol,
            ce_entry, pe_entry, ce_exit, pe_exit, ce_ltp, pe_ltp, unreal_pnl, realized_pnl,
            atr, vix_prev, vix, order_engine)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)"
    )
}

/// Money columns are DOUBLE PRECISION; amounts are paise-exact decimals
/// in memory and converted only here.
fn money(value: Option<Decimal>) -> Option<f64> {
    value.and_then(|d| d.to_f64())
}

fn flag_sql(table: &str, column: &str) -> String {
    format!("SELECT {column} FROM {table} WHERE id = $1")
}

#[async_trait]
impl EventSink for PgStore {
    async fn append(&self, e: &TradeEvent) -> Result<()> {
        let sql = insert_sql(&self.event_table);
        sqlx::query(&sql)
            .bind(e.timestamp)
            .bind(e.status.as_str())
            .bind(e.kind.as_str())
            .bind(&e.reason)
            .bind(e.spot)
            .bind(e.strike)
            .bind(e.ce_symbol.as_deref())
            .bind(e.pe_symbol.as_deref())
            .bind(money(e.ce_entry))
            .bind(money(e.pe_entry))
            .bind(money(e.ce_exit))
            .bind(money(e.pe_exit))
            .bind(money(e.ce_ltp))
            .bind(money(e.pe_ltp))
            .bind(money(e.unrealized_pnl))
            .bind(money(Some(e.realized_pnl)))
            .bind(e.atr)
            .bind(e.vol_reference.map(|v| v.prev_close))
            .bind(e.vol_reference.map(|v| v.live))
            .bind(e.order_engine.as_str())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to append {} event", e.kind))?;
        Ok(())
    }
}

#[async_trait]
impl KillSwitchStore for PgStore {
    /// A missing row or NULL value reads as not allowed.
    async fn read_allowed(&self, flag_id: &str) -> Result<bool> {
        ensure!(is_sql_identifier(flag_id), "invalid flag column {flag_id:?}");
        let sql = flag_sql(&self.flag_table, flag_id);
        let row = sqlx::query(&sql)
            .bind(self.flag_row_id)
            .fetch_optional(&self.pool)
            .await?;
        let allowed = match row {
            Some(row) => row.try_get::<Option<bool>, _>(0)?.unwrap_or(false),
            None => false,
        };
        Ok(allowed)
    }
}
