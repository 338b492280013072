use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Mirrors the `sensor_kind` Postgres enum.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
    ToSchema,
)]
#[sqlx(type_name = "sensor_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    Humidity,
    SoilMoisture,
    LightIntensity,
}

impl SensorKind {
    /// Every kind a complete reading submission must carry.
    pub const ALL: [SensorKind; 4] = [
        SensorKind::Temperature,
        SensorKind::Humidity,
        SensorKind::SoilMoisture,
        SensorKind::LightIntensity,
    ];

    /// Canonical unit readings of this kind are stored in.
    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "°C",
            SensorKind::Humidity => "%",
            SensorKind::SoilMoisture => "%",
            SensorKind::LightIntensity => "lx",
        }
    }

    /// Physically plausible `(low, high)` bounds; values outside are rejected
    /// at ingestion.
    pub fn physical_range(&self) -> (f64, f64) {
        match self {
            SensorKind::Temperature => (-40.0, 85.0),
            SensorKind::Humidity => (0.0, 100.0),
            SensorKind::SoilMoisture => (0.0, 100.0),
            SensorKind::LightIntensity => (0.0, 200_000.0),
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::SoilMoisture => "soil_moisture",
            SensorKind::LightIntensity => "light_intensity",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SensorReading {
    pub id: Uuid,
    pub site_id: String,
    pub sensor_kind: SensorKind,
    pub recorded_at: DateTime<Utc>,
    pub value: f64,
    /// Canonical unit for the kind — see [`SensorKind::unit`].
    pub unit: String,
}

/// Mirrors the `actuator_kind` Postgres enum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "actuator_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActuatorKind {
    WaterPump,
    CoolingFan,
}

impl ActuatorKind {
    /// The sensor kind whose value drives this actuator's decisions.
    pub fn driving_sensor(&self) -> SensorKind {
        match self {
            ActuatorKind::WaterPump => SensorKind::SoilMoisture,
            ActuatorKind::CoolingFan => SensorKind::Temperature,
        }
    }

    /// Whether `level` is a state this actuator can take: the pump is ON/OFF,
    /// the fan is OFF/LOW/HIGH.
    pub fn allows(&self, level: ActuatorLevel) -> bool {
        match self {
            ActuatorKind::WaterPump => {
                matches!(level, ActuatorLevel::Off | ActuatorLevel::On)
            }
            ActuatorKind::CoolingFan => {
                matches!(
                    level,
                    ActuatorLevel::Off | ActuatorLevel::Low | ActuatorLevel::High
                )
            }
        }
    }
}

impl fmt::Display for ActuatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActuatorKind::WaterPump => "water_pump",
            ActuatorKind::CoolingFan => "cooling_fan",
        };
        f.write_str(s)
    }
}

/// Mirrors the `actuator_level` Postgres enum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "actuator_level", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActuatorLevel {
    Off,
    On,
    Low,
    High,
}

impl fmt::Display for ActuatorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActuatorLevel::Off => "OFF",
            ActuatorLevel::On => "ON",
            ActuatorLevel::Low => "LOW",
            ActuatorLevel::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// Mirrors the `command_source` Postgres enum — which control path produced a
/// state change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "command_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    Automatic,
    Manual,
}

impl fmt::Display for CommandSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandSource::Automatic => "automatic",
            CommandSource::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// The single mutable row per (site, actuator): the latest applied state.
///
/// `version` increases by one on every applied change and is the marker
/// conditional writes compare against.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ActuatorState {
    pub site_id: String,
    pub actuator: ActuatorKind,
    pub level: ActuatorLevel,
    pub reason: String,
    pub source: CommandSource,
    pub changed_at: DateTime<Utc>,
    pub version: i64,
}

/// Immutable history entry: one applied state transition.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Command {
    pub id: Uuid,
    pub site_id: String,
    pub actuator: ActuatorKind,
    pub level: ActuatorLevel,
    pub reason: String,
    pub source: CommandSource,
    /// The sensor values that justified the transition; `{}` for manual
    /// commands.
    pub sensor_values: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Mirrors the `alert_severity` Postgres enum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "alert_severity", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Immutable record of a monitoring-threshold breach.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub site_id: String,
    pub sensor_kind: SensorKind,
    pub value: f64,
    /// The bound the value fell outside of.
    pub threshold: f64,
    pub severity: AlertSeverity,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
