use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::db::models::{Alert, AlertSeverity, SensorKind};
use crate::error::ControlError;

/// An acceptable `[low, high]` value band.
#[derive(Debug, Clone, Copy)]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

impl Band {
    fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }

    /// The bound `value` fell outside of.
    fn breached_bound(&self, value: f64) -> f64 {
        if value < self.low {
            self.low
        } else {
            self.high
        }
    }
}

/// Monitoring bounds for one sensor kind: values outside `warning` raise a
/// WARNING alert, values outside the wider `critical` band a CRITICAL one.
#[derive(Debug, Clone, Copy)]
pub struct SensorLimits {
    pub warning: Band,
    pub critical: Band,
}

/// Per-kind monitoring limits. These are deliberately wider than, and
/// independent from, the actuator hysteresis thresholds: an actuator can be
/// working as intended while a value still drifts into alert territory.
#[derive(Debug, Clone, Copy)]
pub struct MonitoringLimits {
    pub temperature: SensorLimits,
    pub humidity: SensorLimits,
    pub soil_moisture: SensorLimits,
    pub light_intensity: SensorLimits,
}

impl Default for MonitoringLimits {
    fn default() -> Self {
        Self {
            temperature: SensorLimits {
                warning: Band { low: 10.0, high: 40.0 },
                critical: Band { low: 2.0, high: 48.0 },
            },
            humidity: SensorLimits {
                warning: Band { low: 20.0, high: 90.0 },
                critical: Band { low: 10.0, high: 98.0 },
            },
            soil_moisture: SensorLimits {
                warning: Band { low: 15.0, high: 85.0 },
                critical: Band { low: 5.0, high: 95.0 },
            },
            light_intensity: SensorLimits {
                warning: Band { low: 0.0, high: 60_000.0 },
                critical: Band { low: 0.0, high: 90_000.0 },
            },
        }
    }
}

impl MonitoringLimits {
    fn for_kind(&self, kind: SensorKind) -> &SensorLimits {
        match kind {
            SensorKind::Temperature => &self.temperature,
            SensorKind::Humidity => &self.humidity,
            SensorKind::SoilMoisture => &self.soil_moisture,
            SensorKind::LightIntensity => &self.light_intensity,
        }
    }

    /// Severity and breached bound for `value`, if it violates the limits.
    pub fn evaluate(&self, kind: SensorKind, value: f64) -> Option<(AlertSeverity, f64)> {
        let limits = self.for_kind(kind);
        if !limits.critical.contains(value) {
            Some((
                AlertSeverity::Critical,
                limits.critical.breached_bound(value),
            ))
        } else if !limits.warning.contains(value) {
            Some((AlertSeverity::Warning, limits.warning.breached_bound(value)))
        } else {
            None
        }
    }
}

/// Fan-out of threshold-violation events.
///
/// Every published alert is persisted and broadcast to in-process
/// subscribers; a breach of the same (site, kind, severity) inside the
/// rolling dedup window is suppressed so a flapping sensor cannot cause a
/// notification storm.
#[derive(Clone)]
pub struct AlertPublisher {
    pool: PgPool,
    tx: broadcast::Sender<Alert>,
    last_published: Arc<RwLock<HashMap<(String, SensorKind, AlertSeverity), DateTime<Utc>>>>,
    window: Duration,
}

impl AlertPublisher {
    pub fn new(pool: PgPool, window_secs: u64) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            pool,
            tx,
            last_published: Arc::default(),
            window: Duration::seconds(window_secs as i64),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.tx.subscribe()
    }

    /// Persist and broadcast one alert. Returns `Ok(false)` when the alert
    /// was suppressed by the dedup window.
    pub async fn publish(
        &self,
        site_id: &str,
        kind: SensorKind,
        value: f64,
        threshold: f64,
        severity: AlertSeverity,
    ) -> Result<bool, ControlError> {
        if !self.claim_window(site_id, kind, severity, Utc::now()).await {
            debug!(
                site_id,
                sensor_kind = %kind,
                severity = %severity,
                "Alert suppressed by dedup window"
            );
            return Ok(false);
        }

        let message =
            format!("{kind} {severity}: value {value:.1} breached limit {threshold:.1}");

        let alert = sqlx::query_as::<_, Alert>(
            "INSERT INTO alerts (site_id, sensor_kind, value, threshold, severity, message) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, site_id, sensor_kind, value, threshold, severity, \
                       message, created_at",
        )
        .bind(site_id)
        .bind(kind)
        .bind(value)
        .bind(threshold)
        .bind(severity)
        .bind(&message)
        .fetch_one(&self.pool)
        .await?;

        // A send error only means nobody is subscribed right now.
        let _ = self.tx.send(alert);
        Ok(true)
    }

    /// Record `now` for the dedup key unless an alert was already published
    /// inside the window. A zero window disables deduplication.
    async fn claim_window(
        &self,
        site_id: &str,
        kind: SensorKind,
        severity: AlertSeverity,
        now: DateTime<Utc>,
    ) -> bool {
        let key = (site_id.to_owned(), kind, severity);
        let mut guard = self.last_published.write().await;
        if let Some(last) = guard.get(&key) {
            if now.signed_duration_since(*last) < self.window {
                return false;
            }
        }
        guard.insert(key, now);
        true
    }
}
