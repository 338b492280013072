use serde_json::Value;
use sqlx::PgPool;
use tracing::debug;

use crate::db::models::{ActuatorKind, ActuatorLevel, ActuatorState, Command, CommandSource};
use crate::error::ControlError;

/// A requested state transition, from either control path (scheduled
/// decision or manual override).
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub site_id: String,
    pub actuator: ActuatorKind,
    pub target: ActuatorLevel,
    pub reason: String,
    pub source: CommandSource,
    /// Sensor values that justified the transition; `{}` for manual
    /// commands.
    pub sensor_values: Value,
}

/// Result of dispatching a request.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The state changed; exactly one history row was appended.
    Applied(Command),
    /// Target already equals the stored state; nothing was written.
    NoOp { current: ActuatorLevel },
}

/// Applies target states to the actuator-state store.
///
/// A missing state row is read as OFF; the row is created on the first
/// transition away from OFF. All writes go through a version-guarded
/// conditional update so any number of engine replicas can dispatch
/// concurrently without recording duplicate commands.
#[derive(Clone)]
pub struct CommandDispatcher {
    pool: PgPool,
}

impl CommandDispatcher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Latest stored state for `(site_id, actuator)`, if any.
    pub async fn current_state(
        &self,
        site_id: &str,
        actuator: ActuatorKind,
    ) -> Result<Option<ActuatorState>, ControlError> {
        let row = sqlx::query_as::<_, ActuatorState>(
            "SELECT site_id, actuator, level, reason, source, changed_at, version \
             FROM actuator_state \
             WHERE site_id = $1 AND actuator = $2",
        )
        .bind(site_id)
        .bind(actuator)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Apply `request` if and only if it changes the stored state.
    ///
    /// The write is guarded by the version read just before it, so two
    /// concurrent callers cannot both record the same transition. A guard
    /// miss is retried once with a fresh read (re-checking the no-op
    /// condition); a second miss surfaces as [`ControlError::Conflict`] and
    /// the caller may retry the whole decision cycle.
    pub async fn dispatch(
        &self,
        request: CommandRequest,
    ) -> Result<DispatchOutcome, ControlError> {
        if !request.actuator.allows(request.target) {
            return Err(ControlError::Validation(format!(
                "{} cannot be set to {}",
                request.actuator, request.target
            )));
        }

        for attempt in 0..2 {
            let current = self
                .current_state(&request.site_id, request.actuator)
                .await?;
            let (current_level, expected_version) = match &current {
                Some(state) => (state.level, Some(state.version)),
                None => (ActuatorLevel::Off, None),
            };

            if request.target == current_level {
                debug!(
                    site_id = %request.site_id,
                    actuator = %request.actuator,
                    level = %current_level,
                    "Target equals current state; nothing to apply"
                );
                return Ok(DispatchOutcome::NoOp {
                    current: current_level,
                });
            }

            if let Some(command) = self.try_apply(&request, expected_version).await? {
                return Ok(DispatchOutcome::Applied(command));
            }

            debug!(
                site_id = %request.site_id,
                actuator = %request.actuator,
                attempt,
                "Conditional write lost the race; re-reading"
            );
        }

        Err(ControlError::Conflict {
            site_id: request.site_id,
            actuator: request.actuator,
        })
    }

    /// One conditional state write plus the matching history append, in a
    /// single transaction. Returns `None` when the version guard misses.
    async fn try_apply(
        &self,
        request: &CommandRequest,
        expected_version: Option<i64>,
    ) -> Result<Option<Command>, ControlError> {
        let mut tx = self.pool.begin().await?;

        let rows_affected = match expected_version {
            None => {
                sqlx::query(
                    "INSERT INTO actuator_state \
                         (site_id, actuator, level, reason, source, changed_at, version) \
                     VALUES ($1, $2, $3, $4, $5, now(), 1) \
                     ON CONFLICT (site_id, actuator) DO NOTHING",
                )
                .bind(&request.site_id)
                .bind(request.actuator)
                .bind(request.target)
                .bind(&request.reason)
                .bind(request.source)
                .execute(&mut *tx)
                .await?
                .rows_affected()
            }
            Some(version) => {
                sqlx::query(
                    "UPDATE actuator_state \
                     SET level = $3, reason = $4, source = $5, \
                         changed_at = now(), version = version + 1 \
                     WHERE site_id = $1 AND actuator = $2 AND version = $6",
                )
                .bind(&request.site_id)
                .bind(request.actuator)
                .bind(request.target)
                .bind(&request.reason)
                .bind(request.source)
                .bind(version)
                .execute(&mut *tx)
                .await?
                .rows_affected()
            }
        };

        if rows_affected == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let command = sqlx::query_as::<_, Command>(
            "INSERT INTO actuator_commands \
                 (site_id, actuator, level, reason, source, sensor_values) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, site_id, actuator, level, reason, source, \
                       sensor_values, created_at",
        )
        .bind(&request.site_id)
        .bind(request.actuator)
        .bind(request.target)
        .bind(&request.reason)
        .bind(request.source)
        .bind(request.sensor_values.clone())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(command))
    }
}
