use thiserror::Error;

use crate::db::models::ActuatorKind;

/// Error taxonomy of the control core.
///
/// Every variant is scoped to a single reading or a single (site, actuator);
/// callers processing many sites handle each error locally and move on.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Malformed or physically implausible reading, or an actuator command
    /// with a level the actuator cannot take. The input is dropped; the
    /// transport owns redelivery.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Threshold update violating a band-ordering invariant. The stored
    /// config is left unchanged.
    #[error("invalid threshold configuration: {0}")]
    InvalidThreshold(String),

    /// The actuator state row changed underneath us twice in a row. The
    /// whole decision cycle is safe to retry.
    #[error("concurrent update of actuator state for {site_id}/{actuator}")]
    Conflict {
        site_id: String,
        actuator: ActuatorKind,
    },

    #[error("store unavailable")]
    StoreUnavailable(#[from] sqlx::Error),
}
