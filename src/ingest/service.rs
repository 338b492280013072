use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::alerts::{AlertPublisher, MonitoringLimits};
use crate::db::models::{SensorKind, SensorReading};
use crate::error::ControlError;
use crate::reading_cache::ReadingCache;

/// One delivered reading: a full snapshot of every sensor at one timestamp.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReadingSubmission {
    pub site_id: String,
    pub recorded_at: DateTime<Utc>,
    /// One entry per sensor kind; all kinds are required.
    pub sensors: BTreeMap<SensorKind, SensorValue>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SensorValue {
    pub value: f64,
    /// Optional; must match the kind's canonical unit when present.
    pub unit: Option<String>,
}

/// Result of persisting one submission.
#[derive(Debug)]
pub enum IngestOutcome {
    /// The snapshot was stored; `alerts_published` breaches were fanned out.
    Stored {
        readings: Vec<SensorReading>,
        alerts_published: usize,
    },
    /// The same (site, timestamp) snapshot was already stored. Redelivery is
    /// a no-op: nothing written, no alerts re-raised.
    Duplicate,
}

/// Validates, persists and alert-checks incoming readings.
///
/// Persisting is idempotent on (site, kind, timestamp), so the at-least-once
/// transport may redeliver freely. Newly stored rows also refresh the shared
/// latest-reading cache the control loop works from.
#[derive(Clone)]
pub struct IngestionService {
    pool: PgPool,
    cache: ReadingCache,
    alerts: AlertPublisher,
    limits: MonitoringLimits,
}

impl IngestionService {
    pub fn new(
        pool: PgPool,
        cache: ReadingCache,
        alerts: AlertPublisher,
        limits: MonitoringLimits,
    ) -> Self {
        Self {
            pool,
            cache,
            alerts,
            limits,
        }
    }

    pub async fn ingest(
        &self,
        submission: ReadingSubmission,
    ) -> Result<IngestOutcome, ControlError> {
        validate(&submission)?;

        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(SensorKind::ALL.len());
        for (kind, sensor) in &submission.sensors {
            let row = sqlx::query_as::<_, SensorReading>(
                "INSERT INTO sensor_readings (site_id, sensor_kind, recorded_at, value, unit) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (site_id, sensor_kind, recorded_at) DO NOTHING \
                 RETURNING id, site_id, sensor_kind, recorded_at, value, unit",
            )
            .bind(&submission.site_id)
            .bind(*kind)
            .bind(submission.recorded_at)
            .bind(sensor.value)
            .bind(kind.unit())
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = row {
                stored.push(row);
            }
        }
        tx.commit().await?;

        if stored.is_empty() {
            info!(
                site_id = %submission.site_id,
                recorded_at = %submission.recorded_at,
                "Duplicate delivery; reading already stored"
            );
            return Ok(IngestOutcome::Duplicate);
        }

        for reading in &stored {
            self.cache.update(reading.clone()).await;
        }

        // Persist-then-alert: a failed publication never rolls back the
        // stored reading.
        let mut alerts_published = 0;
        for reading in &stored {
            let Some((severity, threshold)) =
                self.limits.evaluate(reading.sensor_kind, reading.value)
            else {
                continue;
            };
            match self
                .alerts
                .publish(
                    &reading.site_id,
                    reading.sensor_kind,
                    reading.value,
                    threshold,
                    severity,
                )
                .await
            {
                Ok(true) => alerts_published += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    site_id = %reading.site_id,
                    sensor_kind = %reading.sensor_kind,
                    error = %e,
                    "Alert publication failed; reading kept"
                ),
            }
        }

        info!(
            site_id = %submission.site_id,
            readings = stored.len(),
            alerts = alerts_published,
            "Reading persisted"
        );
        Ok(IngestOutcome::Stored {
            readings: stored,
            alerts_published,
        })
    }
}

fn validate(submission: &ReadingSubmission) -> Result<(), ControlError> {
    if submission.site_id.trim().is_empty() {
        return Err(ControlError::Validation(
            "site_id must not be empty".to_owned(),
        ));
    }

    for kind in SensorKind::ALL {
        let Some(sensor) = submission.sensors.get(&kind) else {
            return Err(ControlError::Validation(format!("missing {kind} value")));
        };
        if !sensor.value.is_finite() {
            return Err(ControlError::Validation(format!(
                "{kind} value must be finite"
            )));
        }
        let (low, high) = kind.physical_range();
        if sensor.value < low || sensor.value > high {
            return Err(ControlError::Validation(format!(
                "{kind} value {} outside physical range {low}..={high}",
                sensor.value
            )));
        }
        if let Some(unit) = &sensor.unit {
            if unit != kind.unit() {
                return Err(ControlError::Validation(format!(
                    "{kind} unit {unit:?} does not match expected {:?}",
                    kind.unit()
                )));
            }
        }
    }

    Ok(())
}
