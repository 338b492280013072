use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::control::dispatch::DispatchOutcome;
use crate::db::models::{
    ActuatorKind, ActuatorLevel, ActuatorState, Alert, AlertSeverity, Command, CommandSource,
    SensorKind, SensorReading,
};
use crate::thresholds::ThresholdConfig;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SensorReadingDto {
    pub id: Uuid,
    pub site_id: String,
    pub sensor_kind: SensorKind,
    pub recorded_at: DateTime<Utc>,
    pub value: f64,
    pub unit: String,
}

impl From<SensorReading> for SensorReadingDto {
    fn from(r: SensorReading) -> Self {
        Self {
            id: r.id,
            site_id: r.site_id,
            sensor_kind: r.sensor_kind,
            recorded_at: r.recorded_at,
            value: r.value,
            unit: r.unit,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertDto {
    pub id: Uuid,
    pub site_id: String,
    pub sensor_kind: SensorKind,
    pub value: f64,
    pub threshold: f64,
    pub severity: AlertSeverity,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl From<Alert> for AlertDto {
    fn from(a: Alert) -> Self {
        Self {
            id: a.id,
            site_id: a.site_id,
            sensor_kind: a.sensor_kind,
            value: a.value,
            threshold: a.threshold,
            severity: a.severity,
            message: a.message,
            created_at: a.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActuatorStateDto {
    pub actuator: ActuatorKind,
    pub level: ActuatorLevel,
    pub reason: String,
    pub source: CommandSource,
    pub changed_at: DateTime<Utc>,
}

impl From<ActuatorState> for ActuatorStateDto {
    fn from(s: ActuatorState) -> Self {
        Self {
            actuator: s.actuator,
            level: s.level,
            reason: s.reason,
            source: s.source,
            changed_at: s.changed_at,
        }
    }
}

/// Response for `GET /sites/{site_id}/actuators`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActuatorStatusDto {
    pub site_id: String,
    /// One entry per actuator that has ever been commanded.
    pub actuators: Vec<ActuatorStateDto>,
    pub thresholds: ThresholdConfig,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CommandDto {
    pub id: Uuid,
    pub actuator: ActuatorKind,
    pub level: ActuatorLevel,
    pub reason: String,
    pub source: CommandSource,
    pub sensor_values: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<Command> for CommandDto {
    fn from(c: Command) -> Self {
        Self {
            id: c.id,
            actuator: c.actuator,
            level: c.level,
            reason: c.reason,
            source: c.source,
            sensor_values: c.sensor_values,
            created_at: c.created_at,
        }
    }
}

/// Request body for `POST /sites/{site_id}/actuators/manual`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ManualCommandDto {
    pub actuator: ActuatorKind,
    pub level: ActuatorLevel,
    /// Optional operator note recorded as the command reason.
    pub reason: Option<String>,
}

/// Response for manual commands: whether a transition was recorded and the
/// resulting level.
#[derive(Debug, Serialize, ToSchema)]
pub struct DispatchOutcomeDto {
    pub applied: bool,
    pub level: ActuatorLevel,
    /// Present when a state change was recorded.
    pub command: Option<CommandDto>,
}

impl From<DispatchOutcome> for DispatchOutcomeDto {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Applied(command) => Self {
                applied: true,
                level: command.level,
                command: Some(command.into()),
            },
            DispatchOutcome::NoOp { current } => Self {
                applied: false,
                level: current,
                command: None,
            },
        }
    }
}

/// Per-sensor aggregate over a stats window.
#[derive(Debug, Serialize, ToSchema)]
pub struct SensorStatsDto {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub current: f64,
}

/// Response for `GET /sites/{site_id}/stats`.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsDto {
    pub site_id: String,
    pub sensors: BTreeMap<SensorKind, SensorStatsDto>,
    pub total_readings: i64,
    pub total_alerts: i64,
    pub period_hours: i64,
}
