//! Postgres-backed alert and price persistence.
//!
//! The alerts table is owned by the CRUD surface; this adapter only reads
//! eligible rules and writes back trigger bookkeeping. Price rows are fully
//! owned by the sync engine.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, warn};

use crate::domain::{
    AlertCondition, AlertKind, AlertParams, AlertRule, AlertSettings, PriceSnapshot,
};
use crate::error::Result;
use crate::ports::{AlertStore, PriceStore};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Cheap liveness probe for the health check loop
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn kind_from_str(s: &str) -> AlertKind {
    match s {
        "volume" => AlertKind::Volume,
        "technical" => AlertKind::Technical,
        _ => AlertKind::Price,
    }
}

fn condition_from_str(s: &str) -> AlertCondition {
    match s {
        "above" => AlertCondition::Above,
        "below" => AlertCondition::Below,
        "equals" => AlertCondition::Equals,
        "percent-change-up" => AlertCondition::PercentChangeUp,
        "percent-change-down" => AlertCondition::PercentChangeDown,
        "volume-spike" => AlertCondition::VolumeSpike,
        "volume-drop" => AlertCondition::VolumeDrop,
        "rsi-overbought" => AlertCondition::RsiOverbought,
        "rsi-oversold" => AlertCondition::RsiOversold,
        "new-high" => AlertCondition::NewHigh,
        "new-low" => AlertCondition::NewLow,
        other => {
            warn!(condition = other, "unrecognized alert condition");
            AlertCondition::Unknown
        }
    }
}

fn json_column<T: serde::de::DeserializeOwned + Default>(
    row: &sqlx::postgres::PgRow,
    column: &str,
) -> T {
    let value: Option<serde_json::Value> = row.get(column);
    match value {
        Some(v) => serde_json::from_value(v).unwrap_or_else(|e| {
            warn!(column, error = %e, "malformed json column, using defaults");
            T::default()
        }),
        None => T::default(),
    }
}

#[async_trait]
impl AlertStore for PostgresStore {
    async fn load_eligible_alerts(&self) -> Result<Vec<AlertRule>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, symbol, kind, condition, value, message,
                   is_active, triggered, triggered_at, triggered_price,
                   trigger_count, last_triggered, settings, params
            FROM price_alerts
            WHERE is_active = TRUE
              AND (settings ->> 'expires_at' IS NULL
                   OR (settings ->> 'expires_at')::timestamptz > NOW())
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let rules: Vec<AlertRule> = rows
            .iter()
            .map(|row| {
                let kind: String = row.get("kind");
                let condition: String = row.get("condition");
                let trigger_count: i32 = row.get("trigger_count");
                AlertRule {
                    id: row.get("id"),
                    owner_id: row.get("owner_id"),
                    symbol: row.get("symbol"),
                    kind: kind_from_str(&kind),
                    condition: condition_from_str(&condition),
                    value: row.get("value"),
                    message: row.get("message"),
                    is_active: row.get("is_active"),
                    triggered: row.get("triggered"),
                    triggered_at: row.get("triggered_at"),
                    triggered_price: row.get("triggered_price"),
                    trigger_count: trigger_count.max(0) as u32,
                    last_triggered: row.get("last_triggered"),
                    settings: json_column::<AlertSettings>(row, "settings"),
                    params: json_column::<AlertParams>(row, "params"),
                }
            })
            .collect();

        debug!(count = rules.len(), "loaded eligible alerts");
        Ok(rules)
    }

    async fn save_alert_state(&self, rule: &AlertRule) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE price_alerts
            SET triggered = $2,
                triggered_at = $3,
                triggered_price = $4,
                trigger_count = $5,
                last_triggered = $6,
                is_active = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(rule.id)
        .bind(rule.triggered)
        .bind(rule.triggered_at)
        .bind(rule.triggered_price)
        .bind(rule.trigger_count as i32)
        .bind(rule.last_triggered)
        .bind(rule.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PriceStore for PostgresStore {
    async fn upsert_latest(&self, snapshot: &PriceSnapshot) -> Result<()> {
        let rsi: Option<Decimal> = snapshot.rsi();

        sqlx::query(
            r#"
            INSERT INTO latest_quotes (
                symbol, current_price, previous_close, day_change,
                day_change_percent, volume, average_volume,
                week52_high, week52_low, rsi14, captured_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (symbol) DO UPDATE
            SET current_price = EXCLUDED.current_price,
                previous_close = EXCLUDED.previous_close,
                day_change = EXCLUDED.day_change,
                day_change_percent = EXCLUDED.day_change_percent,
                volume = EXCLUDED.volume,
                average_volume = EXCLUDED.average_volume,
                week52_high = EXCLUDED.week52_high,
                week52_low = EXCLUDED.week52_low,
                rsi14 = EXCLUDED.rsi14,
                captured_at = EXCLUDED.captured_at
            "#,
        )
        .bind(&snapshot.symbol)
        .bind(snapshot.current_price)
        .bind(snapshot.previous_close)
        .bind(snapshot.day_change)
        .bind(snapshot.day_change_percent)
        .bind(snapshot.volume.map(|v| v as i64))
        .bind(snapshot.average_volume.map(|v| v as i64))
        .bind(snapshot.week52_high)
        .bind(snapshot.week52_low)
        .bind(rsi)
        .bind(snapshot.captured_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_history_if_new_day(&self, snapshot: &PriceSnapshot) -> Result<()> {
        // ON CONFLICT DO NOTHING keeps this to one row per symbol per UTC day
        let trade_date = Utc::now().date_naive();
        sqlx::query(
            r#"
            INSERT INTO price_history (symbol, trade_date, close_price, volume)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (symbol, trade_date) DO NOTHING
            "#,
        )
        .bind(&snapshot.symbol)
        .bind(trade_date)
        .bind(snapshot.current_price)
        .bind(snapshot.volume.map(|v| v as i64))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
