use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::time;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::control::decision::{decide_fan, decide_pump, Decision};
use crate::control::dispatch::{CommandDispatcher, CommandRequest, DispatchOutcome};
use crate::db::models::{ActuatorKind, ActuatorLevel, CommandSource};
use crate::error::ControlError;
use crate::reading_cache::ReadingCache;
use crate::thresholds::{ThresholdConfig, ThresholdStore};

/// How one actuator evaluation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// A state change was applied and recorded.
    Applied,
    /// The decided target already matched the stored state.
    NoOp,
    /// The value sat inside the maintenance range; no command attempted.
    Held,
    /// The driving sensor has no reading yet.
    Skipped,
}

/// One actuator's evaluation within a control cycle.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActuatorOutcome {
    pub actuator: ActuatorKind,
    pub previous: ActuatorLevel,
    pub target: ActuatorLevel,
    pub reason: String,
    pub outcome: OutcomeKind,
}

/// Result of one decision cycle for one site.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SiteControlOutcome {
    pub site_id: String,
    pub actuators: Vec<ActuatorOutcome>,
}

/// Runs the decision engine against live state and pushes the results
/// through the command dispatcher.
#[derive(Clone)]
pub struct ControlEngine {
    dispatcher: CommandDispatcher,
    thresholds: ThresholdStore,
    cache: ReadingCache,
}

impl ControlEngine {
    pub fn new(
        dispatcher: CommandDispatcher,
        thresholds: ThresholdStore,
        cache: ReadingCache,
    ) -> Self {
        Self {
            dispatcher,
            thresholds,
            cache,
        }
    }

    /// One decision cycle over every site with readings. Failures are logged
    /// per site and never block the remaining sites. Returns the number of
    /// sites that completed.
    pub async fn run_all(&self) -> usize {
        let sites = self.cache.site_ids().await;
        if sites.is_empty() {
            info!("No sensor readings cached yet; skipping control cycle");
            return 0;
        }

        let mut completed = 0;
        for site_id in sites {
            match self.run_site(&site_id).await {
                Ok(outcome) => {
                    completed += 1;
                    let applied = outcome
                        .actuators
                        .iter()
                        .filter(|a| a.outcome == OutcomeKind::Applied)
                        .count();
                    info!(site_id = %site_id, commands = applied, "Control cycle complete");
                }
                Err(e) => error!(site_id = %site_id, error = %e, "Control cycle failed"),
            }
        }
        completed
    }

    /// Evaluate and (where needed) actuate both actuators for one site.
    pub async fn run_site(&self, site_id: &str) -> Result<SiteControlOutcome, ControlError> {
        let config = self.thresholds.get(site_id).await?;

        let mut actuators = Vec::with_capacity(2);
        for actuator in [ActuatorKind::WaterPump, ActuatorKind::CoolingFan] {
            actuators.push(self.evaluate(site_id, actuator, &config).await?);
        }

        Ok(SiteControlOutcome {
            site_id: site_id.to_owned(),
            actuators,
        })
    }

    async fn evaluate(
        &self,
        site_id: &str,
        actuator: ActuatorKind,
        config: &ThresholdConfig,
    ) -> Result<ActuatorOutcome, ControlError> {
        let current = self
            .dispatcher
            .current_state(site_id, actuator)
            .await?
            .map(|state| state.level)
            .unwrap_or(ActuatorLevel::Off);

        let kind = actuator.driving_sensor();
        let Some(reading) = self.cache.get(site_id, kind).await else {
            warn!(site_id, actuator = %actuator, sensor_kind = %kind, "No reading available; skipping actuator");
            return Ok(ActuatorOutcome {
                actuator,
                previous: current,
                target: current,
                reason: format!("no {kind} reading available"),
                outcome: OutcomeKind::Skipped,
            });
        };

        let (decision, snapshot) = match actuator {
            ActuatorKind::WaterPump => (
                decide_pump(reading.value, &config.soil_moisture, current),
                json!({ "soil_moisture": reading.value }),
            ),
            ActuatorKind::CoolingFan => (
                decide_fan(reading.value, &config.temperature, current),
                json!({ "temperature": reading.value }),
            ),
        };

        match decision {
            Decision::Hold { reason } => Ok(ActuatorOutcome {
                actuator,
                previous: current,
                target: current,
                reason,
                outcome: OutcomeKind::Held,
            }),
            Decision::Switch { target, reason } => {
                let dispatched = self
                    .dispatcher
                    .dispatch(CommandRequest {
                        site_id: site_id.to_owned(),
                        actuator,
                        target,
                        reason: reason.clone(),
                        source: CommandSource::Automatic,
                        sensor_values: snapshot,
                    })
                    .await?;

                let outcome = match dispatched {
                    DispatchOutcome::Applied(_) => OutcomeKind::Applied,
                    DispatchOutcome::NoOp { .. } => OutcomeKind::NoOp,
                };
                Ok(ActuatorOutcome {
                    actuator,
                    previous: current,
                    target,
                    reason,
                    outcome,
                })
            }
        }
    }
}

/// The periodic trigger: ticks at a fixed interval and runs a decision cycle
/// over all known sites.
pub struct ControlService {
    engine: ControlEngine,
    interval: Duration,
}

impl ControlService {
    pub fn new(engine: ControlEngine, interval_secs: u64) -> Self {
        Self {
            engine,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// Runs the control loop indefinitely.
    /// Spawn this via `tokio::spawn`.
    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "Control loop started");
        let mut ticker = time::interval(self.interval);

        loop {
            ticker.tick().await;
            self.engine.run_all().await;
        }
    }
}
