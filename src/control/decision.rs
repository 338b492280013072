//! Pure hysteresis decisions for the water pump and the cooling fan.
//!
//! No storage, no clock: each function maps (sensor value, thresholds,
//! current level) to a target level and a reason, so the whole state machine
//! is unit-testable in isolation. Branches are ordered most-urgent first,
//! which also settles ties when a misconfigured band lets a value satisfy
//! several conditions at once.

use crate::db::models::ActuatorLevel;
use crate::thresholds::{FanThresholds, PumpThresholds};

/// Outcome of evaluating one actuator against the latest reading.
///
/// `Hold` keeps the hysteresis band's "no change" branch first-class: inside
/// the band the actuator keeps its current level and no command is issued.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Switch {
        target: ActuatorLevel,
        reason: String,
    },
    Hold {
        reason: String,
    },
}

impl Decision {
    /// The level this decision leaves the actuator at, given its current
    /// level.
    pub fn resolve(&self, current: ActuatorLevel) -> ActuatorLevel {
        match self {
            Decision::Switch { target, .. } => *target,
            Decision::Hold { .. } => current,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Decision::Switch { reason, .. } | Decision::Hold { reason } => reason,
        }
    }
}

/// Water pump: two-threshold hysteresis on soil moisture (%).
pub fn decide_pump(
    soil_moisture: f64,
    t: &PumpThresholds,
    current: ActuatorLevel,
) -> Decision {
    if soil_moisture < t.turn_on {
        Decision::Switch {
            target: ActuatorLevel::On,
            reason: format!(
                "soil moisture low: {soil_moisture:.1}% (turn_on {:.1}%)",
                t.turn_on
            ),
        }
    } else if soil_moisture > t.turn_off {
        Decision::Switch {
            target: ActuatorLevel::Off,
            reason: format!(
                "soil moisture sufficient: {soil_moisture:.1}% (turn_off {:.1}%)",
                t.turn_off
            ),
        }
    } else {
        Decision::Hold {
            reason: format!(
                "soil moisture in maintenance range: {soil_moisture:.1}%, holding {current}"
            ),
        }
    }
}

/// Cooling fan: three-band hysteresis on temperature (°C).
pub fn decide_fan(temperature: f64, t: &FanThresholds, current: ActuatorLevel) -> Decision {
    if temperature >= t.turn_on_high {
        Decision::Switch {
            target: ActuatorLevel::High,
            reason: format!(
                "temperature critical: {temperature:.1}°C (turn_on_high {:.1}°C)",
                t.turn_on_high
            ),
        }
    } else if temperature >= t.turn_on_low {
        Decision::Switch {
            target: ActuatorLevel::Low,
            reason: format!(
                "temperature elevated: {temperature:.1}°C (turn_on_low {:.1}°C)",
                t.turn_on_low
            ),
        }
    } else if temperature < t.turn_off {
        Decision::Switch {
            target: ActuatorLevel::Off,
            reason: format!(
                "temperature normal: {temperature:.1}°C (turn_off {:.1}°C)",
                t.turn_off
            ),
        }
    } else {
        Decision::Hold {
            reason: format!(
                "temperature in maintenance range: {temperature:.1}°C, holding {current}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ActuatorLevel::{High, Low, Off, On};

    fn pump() -> PumpThresholds {
        PumpThresholds {
            turn_on: 30.0,
            turn_off: 65.0,
        }
    }

    fn fan() -> FanThresholds {
        FanThresholds {
            turn_off: 25.0,
            turn_on_low: 30.0,
            turn_on_high: 35.0,
        }
    }

    // -----------------------------------------------------------------------
    // Pump
    // -----------------------------------------------------------------------

    #[test]
    fn pump_turns_on_below_turn_on_regardless_of_prior_state() {
        for prior in [Off, On] {
            let d = decide_pump(20.0, &pump(), prior);
            assert_eq!(d.resolve(prior), On);
            assert!(d.reason().starts_with("soil moisture low"), "{}", d.reason());
        }
    }

    #[test]
    fn pump_turns_off_above_turn_off_regardless_of_prior_state() {
        for prior in [Off, On] {
            let d = decide_pump(70.0, &pump(), prior);
            assert_eq!(d.resolve(prior), Off);
            assert!(d.reason().starts_with("soil moisture sufficient"));
        }
    }

    #[test]
    fn pump_holds_inside_maintenance_band() {
        for prior in [Off, On] {
            let d = decide_pump(50.0, &pump(), prior);
            assert!(matches!(d, Decision::Hold { .. }));
            assert_eq!(d.resolve(prior), prior);
        }
    }

    #[test]
    fn pump_band_boundaries_belong_to_the_hold_zone() {
        // value == turn_on is not "< turn_on"; value == turn_off is not
        // "> turn_off".
        assert!(matches!(decide_pump(30.0, &pump(), Off), Decision::Hold { .. }));
        assert!(matches!(decide_pump(65.0, &pump(), On), Decision::Hold { .. }));
    }

    #[test]
    fn pump_narrow_band_turns_off_just_above_turn_off() {
        // 52% with {turn_on: 30, turn_off: 31}: above turn_off, so OFF even
        // though the band is unusually narrow.
        let t = PumpThresholds {
            turn_on: 30.0,
            turn_off: 31.0,
        };
        let d = decide_pump(52.0, &t, Off);
        assert_eq!(d.resolve(Off), Off);
        assert!(d.reason().starts_with("soil moisture sufficient"));
    }

    #[test]
    fn pump_inverted_band_resolves_to_on_first() {
        // With turn_on above turn_off a mid value satisfies both branches;
        // the most urgent one (ON) is evaluated first.
        let t = PumpThresholds {
            turn_on: 70.0,
            turn_off: 30.0,
        };
        let d = decide_pump(50.0, &t, Off);
        assert_eq!(d.resolve(Off), On);
    }

    #[test]
    fn pump_decisions_are_deterministic() {
        let a = decide_pump(20.0, &pump(), Off);
        let b = decide_pump(20.0, &pump(), Off);
        assert_eq!(a, b);
    }

    // -----------------------------------------------------------------------
    // Fan
    // -----------------------------------------------------------------------

    #[test]
    fn fan_goes_high_at_or_above_turn_on_high() {
        let d = decide_fan(36.0, &fan(), Off);
        assert_eq!(d.resolve(Off), High);
        assert!(d.reason().starts_with("temperature critical"));

        assert_eq!(decide_fan(35.0, &fan(), Off).resolve(Off), High);
    }

    #[test]
    fn fan_goes_low_between_turn_on_low_and_turn_on_high() {
        let d = decide_fan(32.0, &fan(), Off);
        assert_eq!(d.resolve(Off), Low);
        assert!(d.reason().starts_with("temperature elevated"));

        assert_eq!(decide_fan(30.0, &fan(), Off).resolve(Off), Low);
    }

    #[test]
    fn fan_turns_off_below_turn_off() {
        for prior in [Off, Low, High] {
            let d = decide_fan(20.0, &fan(), prior);
            assert_eq!(d.resolve(prior), Off);
            assert!(d.reason().starts_with("temperature normal"));
        }
    }

    #[test]
    fn fan_holds_between_turn_off_and_turn_on_low() {
        for prior in [Off, Low, High] {
            let d = decide_fan(27.0, &fan(), prior);
            assert!(matches!(d, Decision::Hold { .. }));
            assert_eq!(d.resolve(prior), prior);
        }
        // turn_off itself is not "< turn_off".
        assert!(matches!(decide_fan(25.0, &fan(), Low), Decision::Hold { .. }));
    }

    #[test]
    fn fan_misconfigured_bands_resolve_highest_severity_first() {
        // turn_on_high below turn_off: a low value satisfies both the HIGH
        // and the OFF branch; HIGH wins.
        let t = FanThresholds {
            turn_off: 30.0,
            turn_on_low: 20.0,
            turn_on_high: 10.0,
        };
        let d = decide_fan(15.0, &t, Off);
        assert_eq!(d.resolve(Off), High);
    }
}
