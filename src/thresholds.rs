use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use utoipa::ToSchema;

use crate::error::ControlError;

/// Hysteresis band for the water pump, on soil moisture (%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PumpThresholds {
    /// Activate the pump below this.
    pub turn_on: f64,
    /// Deactivate the pump above this. Must be above `turn_on`.
    pub turn_off: f64,
}

/// Three-band hysteresis for the cooling fan, on temperature (°C).
///
/// Invariant: `turn_off < turn_on_low < turn_on_high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FanThresholds {
    pub turn_off: f64,
    pub turn_on_low: f64,
    pub turn_on_high: f64,
}

/// Per-site actuator thresholds — the single configurable source of truth
/// the decision engine works from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ThresholdConfig {
    pub soil_moisture: PumpThresholds,
    pub temperature: FanThresholds,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            soil_moisture: PumpThresholds {
                turn_on: 30.0,
                turn_off: 65.0,
            },
            temperature: FanThresholds {
                turn_off: 25.0,
                turn_on_low: 30.0,
                turn_on_high: 35.0,
            },
        }
    }
}

impl ThresholdConfig {
    /// Enforce the band-ordering invariants. Called before every persist so
    /// no store can ever hold a config that violates them. NaN boundaries
    /// fail the comparisons and are rejected too.
    pub fn validate(&self) -> Result<(), ControlError> {
        let p = &self.soil_moisture;
        if !(p.turn_on < p.turn_off) {
            return Err(ControlError::InvalidThreshold(format!(
                "soil_moisture: turn_on ({}) must be below turn_off ({})",
                p.turn_on, p.turn_off
            )));
        }
        let f = &self.temperature;
        if !(f.turn_off < f.turn_on_low && f.turn_on_low < f.turn_on_high) {
            return Err(ControlError::InvalidThreshold(format!(
                "temperature: expected turn_off < turn_on_low < turn_on_high, \
                 got {} / {} / {}",
                f.turn_off, f.turn_on_low, f.turn_on_high
            )));
        }
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct ThresholdRow {
    pump_turn_on: f64,
    pump_turn_off: f64,
    fan_turn_off: f64,
    fan_turn_on_low: f64,
    fan_turn_on_high: f64,
    #[allow(dead_code)]
    updated_at: DateTime<Utc>,
}

impl From<ThresholdRow> for ThresholdConfig {
    fn from(r: ThresholdRow) -> Self {
        Self {
            soil_moisture: PumpThresholds {
                turn_on: r.pump_turn_on,
                turn_off: r.pump_turn_off,
            },
            temperature: FanThresholds {
                turn_off: r.fan_turn_off,
                turn_on_low: r.fan_turn_on_low,
                turn_on_high: r.fan_turn_on_high,
            },
        }
    }
}

/// Access to the per-site threshold rows.
#[derive(Clone)]
pub struct ThresholdStore {
    pool: PgPool,
}

impl ThresholdStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Current config for `site_id`, or the compiled-in defaults when the
    /// site has never been configured.
    pub async fn get(&self, site_id: &str) -> Result<ThresholdConfig, ControlError> {
        let row = sqlx::query_as::<_, ThresholdRow>(
            "SELECT pump_turn_on, pump_turn_off, \
                    fan_turn_off, fan_turn_on_low, fan_turn_on_high, updated_at \
             FROM threshold_config \
             WHERE site_id = $1",
        )
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into).unwrap_or_default())
    }

    /// Validated last-write-wins upsert. Rejects any candidate violating the
    /// ordering invariants before touching the store.
    pub async fn update(
        &self,
        site_id: &str,
        config: ThresholdConfig,
    ) -> Result<ThresholdConfig, ControlError> {
        config.validate()?;

        sqlx::query(
            "INSERT INTO threshold_config \
                 (site_id, pump_turn_on, pump_turn_off, \
                  fan_turn_off, fan_turn_on_low, fan_turn_on_high, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, now()) \
             ON CONFLICT (site_id) DO UPDATE SET \
                 pump_turn_on     = EXCLUDED.pump_turn_on, \
                 pump_turn_off    = EXCLUDED.pump_turn_off, \
                 fan_turn_off     = EXCLUDED.fan_turn_off, \
                 fan_turn_on_low  = EXCLUDED.fan_turn_on_low, \
                 fan_turn_on_high = EXCLUDED.fan_turn_on_high, \
                 updated_at       = now()",
        )
        .bind(site_id)
        .bind(config.soil_moisture.turn_on)
        .bind(config.soil_moisture.turn_off)
        .bind(config.temperature.turn_off)
        .bind(config.temperature.turn_on_low)
        .bind(config.temperature.turn_on_high)
        .execute(&self.pool)
        .await?;

        Ok(config)
    }
}
