pub mod gate;
pub mod occupancy;
pub mod charger;

pub use gate::{GateSensor, GateCommand};
pub use occupancy::{OccupancySensor, OccupancyCommand};
pub use charger::{ChargerSensor, ChargerCommand, ChargerStatus};

use crate::config::SimulationConfig;
use core::fmt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Gate,
    Occupancy,
    Charger,
}

impl DeviceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Gate => "gate",
            DeviceKind::Occupancy => "occupancy",
            DeviceKind::Charger => "charger",
        }
    }

    /// Prefix used in device display names (`gate_0`, `spot_3`, `charger_1`).
    pub fn name_prefix(self) -> &'static str {
        match self {
            DeviceKind::Gate => "gate",
            DeviceKind::Occupancy => "spot",
            DeviceKind::Charger => "charger",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed address of one physical device in the depot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId {
    pub kind: DeviceKind,
    pub index: u32,
}

impl DeviceId {
    pub const fn gate(index: u32) -> Self {
        Self { kind: DeviceKind::Gate, index }
    }

    pub const fn spot(index: u32) -> Self {
        Self { kind: DeviceKind::Occupancy, index }
    }

    pub const fn charger(index: u32) -> Self {
        Self { kind: DeviceKind::Charger, index }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind.name_prefix(), self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingValue {
    Flag(bool),
    Charger(ChargerStatus),
}

impl ReadingValue {
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            ReadingValue::Flag(value) => Some(*value),
            ReadingValue::Charger(_) => None,
        }
    }

    pub fn as_charger(&self) -> Option<&ChargerStatus> {
        match self {
            ReadingValue::Charger(status) => Some(status),
            ReadingValue::Flag(_) => None,
        }
    }

    /// Text encoding used by the event log.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            ReadingValue::Flag(value) => Ok(value.to_string()),
            ReadingValue::Charger(status) => serde_json::to_string(status),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub device: DeviceId,
    pub value: ReadingValue,
    pub is_fault: bool,
}

impl SensorReading {
    pub fn kind(&self) -> DeviceKind {
        self.device.kind
    }

    pub fn name(&self) -> String {
        self.device.to_string()
    }
}

/// One step's worth of readings, in network order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    readings: Vec<SensorReading>,
}

impl SensorSnapshot {
    pub fn from_readings(readings: Vec<SensorReading>) -> Self {
        Self { readings }
    }

    pub fn get(&self, device: DeviceId) -> Option<&SensorReading> {
        self.readings.iter().find(|r| r.device == device)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorReading> {
        self.readings.iter()
    }

    pub fn faulted(&self) -> impl Iterator<Item = &SensorReading> {
        self.readings.iter().filter(|r| r.is_fault)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

impl<'a> IntoIterator for &'a SensorSnapshot {
    type Item = &'a SensorReading;
    type IntoIter = core::slice::Iter<'a, SensorReading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),
    #[error("{0} has no failure state to inject")]
    NotFailable(DeviceId),
    #[error("gate {0} is stuck, command ignored")]
    GateStuck(u32),
    #[error("charger {0} has failed")]
    ChargerFailed(u32),
    #[error("charger {0} has no vehicle connected")]
    ChargerNotConnected(u32),
}

/// Command addressed to a single device by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DeviceCommand {
    SetGate { gate: u32, open: bool },
    SetOccupancy { spot: u32, occupied: bool },
    ConnectCharger { charger: u32 },
    StartCharging { charger: u32, power_kw: f64 },
    StopCharging { charger: u32 },
    DisconnectCharger { charger: u32 },
}

impl DeviceCommand {
    pub fn device(&self) -> DeviceId {
        match *self {
            DeviceCommand::SetGate { gate, .. } => DeviceId::gate(gate),
            DeviceCommand::SetOccupancy { spot, .. } => DeviceId::spot(spot),
            DeviceCommand::ConnectCharger { charger }
            | DeviceCommand::StartCharging { charger, .. }
            | DeviceCommand::StopCharging { charger }
            | DeviceCommand::DisconnectCharger { charger } => DeviceId::charger(charger),
        }
    }
}

/// A simulated depot sensor.
///
/// Every `read` consumes exactly one draw from `rng`, which keeps whole-network
/// reads reproducible for a given seed.
pub trait Sensor {
    type Command: Clone;

    fn device(&self) -> DeviceId;
    fn read<R: Rng + ?Sized>(&mut self, rng: &mut R) -> SensorReading;
    fn execute_command(&mut self, command: Self::Command) -> Result<(), SensorError>;
    fn is_failed(&self) -> bool;
}

#[derive(Debug)]
pub struct SensorNetwork {
    gates: Vec<GateSensor>,
    spots: Vec<OccupancySensor>,
    chargers: Vec<ChargerSensor>,
}

impl SensorNetwork {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            gates: (0..config.num_gates)
                .map(|i| GateSensor::new(i, config.gate_failure_rate))
                .collect(),
            spots: (0..config.num_spots)
                .map(|i| OccupancySensor::new(i, config.noise_level))
                .collect(),
            chargers: (0..config.num_chargers)
                .map(|i| ChargerSensor::new(i, config.charger_failure_rate))
                .collect(),
        }
    }

    /// Reads gates, then spots, then chargers, each in ascending index order.
    pub fn read_all<R: Rng + ?Sized>(&mut self, rng: &mut R) -> SensorSnapshot {
        let mut readings =
            Vec::with_capacity(self.gates.len() + self.spots.len() + self.chargers.len());

        for gate in &mut self.gates {
            readings.push(gate.read(rng));
        }
        for spot in &mut self.spots {
            readings.push(spot.read(rng));
        }
        for charger in &mut self.chargers {
            readings.push(charger.read(rng));
        }

        SensorSnapshot::from_readings(readings)
    }

    /// Forces the sticky failure state of a gate or charger. Repeated calls are no-ops.
    pub fn inject_failure(&mut self, device: DeviceId) -> Result<(), SensorError> {
        match device.kind {
            DeviceKind::Gate => {
                self.gate_mut(device.index)?.inject_failure();
                Ok(())
            }
            DeviceKind::Charger => {
                self.charger_mut(device.index)?.inject_failure();
                Ok(())
            }
            DeviceKind::Occupancy => {
                // Validate the address first so an absent spot reports as unknown.
                self.spot_mut(device.index)?;
                Err(SensorError::NotFailable(device))
            }
        }
    }

    pub fn execute(&mut self, command: DeviceCommand) -> Result<(), SensorError> {
        match command {
            DeviceCommand::SetGate { gate, open } => {
                let command = if open { GateCommand::Open } else { GateCommand::Close };
                self.gate_mut(gate)?.execute_command(command)
            }
            DeviceCommand::SetOccupancy { spot, occupied } => {
                self.spot_mut(spot)?.execute_command(OccupancyCommand::Set(occupied))
            }
            DeviceCommand::ConnectCharger { charger } => {
                self.charger_mut(charger)?.execute_command(ChargerCommand::Connect)
            }
            DeviceCommand::StartCharging { charger, power_kw } => {
                self.charger_mut(charger)?.execute_command(ChargerCommand::StartCharging(power_kw))
            }
            DeviceCommand::StopCharging { charger } => {
                self.charger_mut(charger)?.execute_command(ChargerCommand::StopCharging)
            }
            DeviceCommand::DisconnectCharger { charger } => {
                self.charger_mut(charger)?.execute_command(ChargerCommand::Disconnect)
            }
        }
    }

    pub fn gate(&self, index: u32) -> Option<&GateSensor> {
        self.gates.get(index as usize)
    }

    pub fn spot(&self, index: u32) -> Option<&OccupancySensor> {
        self.spots.get(index as usize)
    }

    pub fn charger(&self, index: u32) -> Option<&ChargerSensor> {
        self.chargers.get(index as usize)
    }

    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }

    pub fn spot_count(&self) -> usize {
        self.spots.len()
    }

    pub fn charger_count(&self) -> usize {
        self.chargers.len()
    }

    pub fn sensor_count(&self) -> usize {
        self.gates.len() + self.spots.len() + self.chargers.len()
    }

    fn gate_mut(&mut self, index: u32) -> Result<&mut GateSensor, SensorError> {
        self.gates
            .get_mut(index as usize)
            .ok_or(SensorError::UnknownDevice(DeviceId::gate(index)))
    }

    fn spot_mut(&mut self, index: u32) -> Result<&mut OccupancySensor, SensorError> {
        self.spots
            .get_mut(index as usize)
            .ok_or(SensorError::UnknownDevice(DeviceId::spot(index)))
    }

    fn charger_mut(&mut self, index: u32) -> Result<&mut ChargerSensor, SensorError> {
        self.chargers
            .get_mut(index as usize)
            .ok_or(SensorError::UnknownDevice(DeviceId::charger(index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn quiet_config() -> SimulationConfig {
        SimulationConfig {
            num_gates: 2,
            num_spots: 3,
            num_chargers: 2,
            noise_level: 0.0,
            gate_failure_rate: 0.0,
            charger_failure_rate: 0.0,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_read_all_order() {
        let mut network = SensorNetwork::new(&quiet_config());
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let names: Vec<String> = network.read_all(&mut rng).iter().map(SensorReading::name).collect();
        assert_eq!(
            names,
            vec!["gate_0", "gate_1", "spot_0", "spot_1", "spot_2", "charger_0", "charger_1"]
        );
    }

    #[test]
    fn test_device_display_names() {
        assert_eq!(DeviceId::gate(3).to_string(), "gate_3");
        assert_eq!(DeviceId::spot(0).to_string(), "spot_0");
        assert_eq!(DeviceId::charger(12).to_string(), "charger_12");
    }

    #[test]
    fn test_inject_failure_routing() {
        let mut network = SensorNetwork::new(&quiet_config());

        assert!(network.inject_failure(DeviceId::charger(1)).is_ok());
        assert!(network.charger(1).is_some_and(ChargerSensor::is_failed));

        assert_eq!(
            network.inject_failure(DeviceId::spot(0)),
            Err(SensorError::NotFailable(DeviceId::spot(0)))
        );
        assert_eq!(
            network.inject_failure(DeviceId::gate(9)),
            Err(SensorError::UnknownDevice(DeviceId::gate(9)))
        );
    }

    #[test]
    fn test_execute_reaches_addressed_device() {
        let mut network = SensorNetwork::new(&quiet_config());
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        network.execute(DeviceCommand::SetGate { gate: 1, open: true }).unwrap();
        network.execute(DeviceCommand::SetOccupancy { spot: 2, occupied: true }).unwrap();

        let snapshot = network.read_all(&mut rng);
        assert_eq!(snapshot.get(DeviceId::gate(0)).unwrap().value, ReadingValue::Flag(false));
        assert_eq!(snapshot.get(DeviceId::gate(1)).unwrap().value, ReadingValue::Flag(true));
        assert_eq!(snapshot.get(DeviceId::spot(2)).unwrap().value, ReadingValue::Flag(true));
    }

    #[test]
    fn test_same_seed_same_snapshot() {
        let config = SimulationConfig {
            noise_level: 0.5,
            gate_failure_rate: 0.2,
            charger_failure_rate: 0.2,
            ..quiet_config()
        };
        let mut a = SensorNetwork::new(&config);
        let mut b = SensorNetwork::new(&config);
        let mut rng_a = ChaCha8Rng::seed_from_u64(99);
        let mut rng_b = ChaCha8Rng::seed_from_u64(99);

        for _ in 0..20 {
            assert_eq!(a.read_all(&mut rng_a), b.read_all(&mut rng_b));
        }
    }

    #[test]
    fn test_charger_value_encoding() {
        let value = ReadingValue::Charger(ChargerStatus {
            connected: true,
            charging: true,
            power_kw: 50.0,
            failed: false,
        });
        let encoded = value.encode().unwrap();
        assert!(encoded.contains("\"connected\":true"));
        assert!(encoded.contains("\"power_kw\":50.0"));
        assert_eq!(ReadingValue::Flag(false).encode().unwrap(), "false");
    }
}
