use crate::sensors::charger::{DEFAULT_CHARGER_FAILURE_RATE, DEFAULT_CHARGING_POWER_KW};
use crate::sensors::gate::DEFAULT_GATE_FAILURE_RATE;
use crate::sensors::occupancy::DEFAULT_NOISE_RATE;
use crate::vehicle::DEFAULT_CHARGE_RATE;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

const DEFAULT_GATES: u32 = 2;
const DEFAULT_SPOTS: u32 = 10;
const DEFAULT_CHARGERS: u32 = 6;
const DEFAULT_MAX_STEPS: u64 = 100;
const DEFAULT_ARRIVAL_RATE: f64 = 0.3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),
    #[error("{field} must be a probability in [0, 1], got {value}")]
    InvalidProbability { field: &'static str, value: f64 },
    #[error("{field} must be a non-negative finite number, got {value}")]
    InvalidRate { field: &'static str, value: f64 },
    #[error("{field} is scheduled but the depot has no {device}")]
    MissingDevice {
        field: &'static str,
        device: &'static str,
    },
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Depot layout and stochastic behavior for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub num_gates: u32,
    pub num_spots: u32,
    pub num_chargers: u32,
    pub max_steps: u64,
    pub vehicle_arrival_rate: f64,
    /// Step at which charger 0 is forced into failure.
    pub charger_failure_step: Option<u64>,
    /// Step at which gate 0 is forced into failure.
    pub gate_failure_step: Option<u64>,
    pub noise_level: f64,
    pub gate_failure_rate: f64,
    pub charger_failure_rate: f64,
    pub charge_rate: f64,
    pub charging_power_kw: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_gates: DEFAULT_GATES,
            num_spots: DEFAULT_SPOTS,
            num_chargers: DEFAULT_CHARGERS,
            max_steps: DEFAULT_MAX_STEPS,
            vehicle_arrival_rate: DEFAULT_ARRIVAL_RATE,
            charger_failure_step: None,
            gate_failure_step: None,
            noise_level: DEFAULT_NOISE_RATE,
            gate_failure_rate: DEFAULT_GATE_FAILURE_RATE,
            charger_failure_rate: DEFAULT_CHARGER_FAILURE_RATE,
            charge_rate: DEFAULT_CHARGE_RATE,
            charging_power_kw: DEFAULT_CHARGING_POWER_KW,
        }
    }
}

impl SimulationConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_probability("vehicle_arrival_rate", self.vehicle_arrival_rate)?;
        check_probability("noise_level", self.noise_level)?;
        check_probability("gate_failure_rate", self.gate_failure_rate)?;
        check_probability("charger_failure_rate", self.charger_failure_rate)?;
        check_rate("charge_rate", self.charge_rate)?;
        check_rate("charging_power_kw", self.charging_power_kw)?;

        if self.charger_failure_step.is_some() && self.num_chargers == 0 {
            return Err(ConfigError::MissingDevice {
                field: "charger_failure_step",
                device: "chargers",
            });
        }
        if self.gate_failure_step.is_some() && self.num_gates == 0 {
            return Err(ConfigError::MissingDevice {
                field: "gate_failure_step",
                device: "gates",
            });
        }

        Ok(())
    }
}

fn check_probability(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidProbability { field, value })
    }
}

fn check_rate(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidRate { field, value })
    }
}

/// Named preset runs used for pass/fail regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Normal,
    ChargerFailure,
    GateStuck,
    SensorNoise,
    HighTraffic,
}

impl Scenario {
    pub const ALL: [Scenario; 5] = [
        Scenario::Normal,
        Scenario::ChargerFailure,
        Scenario::GateStuck,
        Scenario::SensorNoise,
        Scenario::HighTraffic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::Normal => "normal",
            Scenario::ChargerFailure => "charger_failure",
            Scenario::GateStuck => "gate_stuck",
            Scenario::SensorNoise => "sensor_noise",
            Scenario::HighTraffic => "high_traffic",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Scenario::Normal => "baseline traffic, no scheduled failures",
            Scenario::ChargerFailure => "charger 0 fails at step 30",
            Scenario::GateStuck => "gate 0 sticks at step 20",
            Scenario::SensorNoise => "occupancy noise raised to 15%",
            Scenario::HighTraffic => "larger depot under 80% arrival rate",
        }
    }

    pub fn config(self) -> SimulationConfig {
        let small_depot = SimulationConfig {
            num_gates: 2,
            num_spots: 5,
            num_chargers: 3,
            max_steps: 50,
            vehicle_arrival_rate: 0.3,
            ..SimulationConfig::default()
        };

        match self {
            Scenario::Normal => small_depot,
            // Scheduled failure is the only fault source, so it is seen at step 30.
            Scenario::ChargerFailure => SimulationConfig {
                max_steps: 80,
                vehicle_arrival_rate: 0.4,
                charger_failure_step: Some(30),
                noise_level: 0.0,
                gate_failure_rate: 0.0,
                charger_failure_rate: 0.0,
                ..small_depot
            },
            Scenario::GateStuck => SimulationConfig {
                max_steps: 60,
                gate_failure_step: Some(20),
                ..small_depot
            },
            Scenario::SensorNoise => SimulationConfig {
                noise_level: 0.15,
                ..small_depot
            },
            Scenario::HighTraffic => SimulationConfig {
                num_spots: 8,
                num_chargers: 6,
                max_steps: 100,
                vehicle_arrival_rate: 0.8,
                ..small_depot
            },
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .iter()
            .copied()
            .find(|scenario| scenario.name() == s)
            .ok_or_else(|| ConfigError::UnknownScenario(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
        for scenario in Scenario::ALL {
            assert!(scenario.config().validate().is_ok(), "{}", scenario);
        }
    }

    #[test]
    fn test_scenario_round_trip_by_name() {
        for scenario in Scenario::ALL {
            assert_eq!(scenario.name().parse::<Scenario>().unwrap(), scenario);
        }
    }

    #[test]
    fn test_unknown_scenario_fails_fast() {
        let err = "rush_hour".parse::<Scenario>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownScenario(ref name) if name == "rush_hour"));
    }

    #[test]
    fn test_normal_preset_layout() {
        let config = Scenario::Normal.config();
        assert_eq!((config.num_gates, config.num_spots, config.num_chargers), (2, 5, 3));
        assert_eq!(config.max_steps, 50);
        assert_eq!(config.vehicle_arrival_rate, 0.3);
        assert_eq!(config.charger_failure_step, None);
    }

    #[test]
    fn test_charger_failure_preset_isolates_scheduled_failure() {
        let config = Scenario::ChargerFailure.config();
        assert_eq!(config.charger_failure_step, Some(30));
        assert_eq!(config.charger_failure_rate, 0.0);
        assert_eq!(config.gate_failure_rate, 0.0);
        assert_eq!(config.noise_level, 0.0);
    }

    #[test]
    fn test_invalid_probability_rejected() {
        let config = SimulationConfig {
            noise_level: 1.5,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidProbability { field: "noise_level", .. })
        ));
    }

    #[test]
    fn test_failure_step_needs_device() {
        let config = SimulationConfig {
            num_chargers: 0,
            charger_failure_step: Some(5),
            ..SimulationConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingDevice { .. })));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{"num_spots": 4, "gate_failure_step": 12}"#).unwrap();
        assert_eq!(config.num_spots, 4);
        assert_eq!(config.gate_failure_step, Some(12));
        assert_eq!(config.num_gates, DEFAULT_GATES);
        assert_eq!(config.noise_level, DEFAULT_NOISE_RATE);
    }
}
