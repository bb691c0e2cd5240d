use crate::controller::ControlError;
use crate::sensors::{DeviceId, DeviceKind, SensorSnapshot};
use crate::vehicle::VehicleRegistry;
use core::fmt;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultType {
    ChargerFailure,
    GateStuck,
    SensorNoise,
    OccupancyConflict,
    SystemError,
}

impl FaultType {
    pub fn as_str(self) -> &'static str {
        match self {
            FaultType::ChargerFailure => "charger_failure",
            FaultType::GateStuck => "gate_stuck",
            FaultType::SensorNoise => "sensor_noise",
            FaultType::OccupancyConflict => "occupancy_conflict",
            FaultType::SystemError => "system_error",
        }
    }

    /// Fault raised by a faulted reading from a device of this kind.
    pub fn for_device(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::Charger => FaultType::ChargerFailure,
            DeviceKind::Gate => FaultType::GateStuck,
            DeviceKind::Occupancy => FaultType::SensorNoise,
        }
    }
}

impl fmt::Display for FaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultEvent {
    pub id: u64,
    pub fault_type: FaultType,
    pub alert_level: AlertLevel,
    pub description: String,
    pub affected_component: String,
    pub detected_at: u64,
    /// Never populated: a persisting condition raises a new event each step.
    pub resolved_at: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultStats {
    pub total: u64,
    pub charger_failures: u64,
    pub gate_stuck: u64,
    pub sensor_noise: u64,
    pub occupancy_conflicts: u64,
    pub system_errors: u64,
}

impl FaultStats {
    fn record(&mut self, fault_type: FaultType) {
        self.total += 1;
        match fault_type {
            FaultType::ChargerFailure => self.charger_failures += 1,
            FaultType::GateStuck => self.gate_stuck += 1,
            FaultType::SensorNoise => self.sensor_noise += 1,
            FaultType::OccupancyConflict => self.occupancy_conflicts += 1,
            FaultType::SystemError => self.system_errors += 1,
        }
    }
}

/// Turns faulted readings, occupancy conflicts and controller errors into
/// fault events. Nothing is deduplicated across steps.
#[derive(Debug)]
pub struct FaultDetector {
    next_fault_id: u64,
    stats: FaultStats,
}

impl FaultDetector {
    pub fn new() -> Self {
        Self {
            next_fault_id: 1,
            stats: FaultStats::default(),
        }
    }

    pub fn detect(
        &mut self,
        step: u64,
        snapshot: &SensorSnapshot,
        registry: &VehicleRegistry,
        control_errors: &[ControlError],
    ) -> Vec<FaultEvent> {
        let mut faults = Vec::new();

        for reading in snapshot.faulted() {
            faults.push(self.raise(
                FaultType::for_device(reading.kind()),
                AlertLevel::Warning,
                format!("Sensor fault detected: {}", reading.device),
                reading.device.to_string(),
                step,
            ));
        }

        for conflict in registry.detect_occupancy_conflicts() {
            let claimants: Vec<String> = conflict.vehicles.iter().map(ToString::to_string).collect();
            faults.push(self.raise(
                FaultType::OccupancyConflict,
                AlertLevel::Critical,
                format!(
                    "Multiple vehicles claiming spot {}: [{}]",
                    conflict.spot,
                    claimants.join(", ")
                ),
                DeviceId::spot(conflict.spot).to_string(),
                step,
            ));
        }

        for error in control_errors {
            faults.push(self.raise(
                FaultType::SystemError,
                AlertLevel::Critical,
                format!("Controller error: {}", error.source),
                format!("vehicle_{}", error.vehicle),
                step,
            ));
        }

        faults
    }

    fn raise(
        &mut self,
        fault_type: FaultType,
        alert_level: AlertLevel,
        description: String,
        affected_component: String,
        detected_at: u64,
    ) -> FaultEvent {
        let id = self.next_fault_id;
        self.next_fault_id = self.next_fault_id.wrapping_add(1);
        self.stats.record(fault_type);

        FaultEvent {
            id,
            fault_type,
            alert_level,
            description,
            affected_component,
            detected_at,
            resolved_at: None,
        }
    }

    pub fn stats(&self) -> &FaultStats {
        &self.stats
    }
}

impl Default for FaultDetector {
    fn default() -> Self {
        Self::new()
    }
}
