//! Rule-based depot controller.
//!
//! Each step the controller folds the latest sensor snapshot into a
//! [`DepotView`], walks the vehicles in insertion order through their
//! lifecycle, and then arbitrates the gates. Decisions come out as
//! [`ControlAction`] records plus the [`DeviceCommand`]s that carry them out.

use crate::config::SimulationConfig;
use crate::sensors::{
    ChargerStatus, DeviceCommand, DeviceId, DeviceKind, ReadingValue, SensorNetwork, SensorSnapshot,
};
use crate::vehicle::{ClaimError, ReleasedClaims, VehicleId, VehicleRegistry, VehicleState};
use core::fmt;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

pub const CONTROLLER_NAME: &str = "depot_controller";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    VehicleAssignment,
    ChargerAssignment,
    ChargerControl,
    FaultResponse,
    GateControl,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::VehicleAssignment => "vehicle_assignment",
            ActionType::ChargerAssignment => "charger_assignment",
            ActionType::ChargerControl => "charger_control",
            ActionType::FaultResponse => "fault_response",
            ActionType::GateControl => "gate_control",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionTarget {
    Vehicle(VehicleId),
    Device(DeviceId),
}

impl fmt::Display for ActionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionTarget::Vehicle(id) => write!(f, "vehicle_{}", id),
            ActionTarget::Device(device) => write!(f, "{}", device),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlAction {
    pub controller: &'static str,
    pub action_type: ActionType,
    pub target: ActionTarget,
    pub command: String,
    pub success: bool,
}

/// Device command issued on behalf of an action (or on its own, for departures).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Actuation {
    pub action: Option<usize>,
    pub command: DeviceCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("step {step}: vehicle {vehicle}: {source}")]
pub struct ControlError {
    pub vehicle: VehicleId,
    pub step: u64,
    #[source]
    pub source: ClaimError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlOutput {
    pub actions: Vec<ControlAction>,
    pub actuations: Vec<Actuation>,
    pub errors: Vec<ControlError>,
}

impl ControlOutput {
    fn push_action(&mut self, action_type: ActionType, target: ActionTarget, command: String) -> usize {
        self.actions.push(ControlAction {
            controller: CONTROLLER_NAME,
            action_type,
            target,
            command,
            success: true,
        });
        self.actions.len() - 1
    }

    fn actuate(&mut self, action: Option<usize>, command: DeviceCommand) {
        self.actuations.push(Actuation { action, command });
    }

    /// Sends every actuation to the sensor network. A rejected command marks
    /// its action unsuccessful; the remaining commands are still applied.
    /// Returns the number of rejected commands.
    pub fn apply(&mut self, network: &mut SensorNetwork) -> usize {
        let mut rejected = 0;
        for actuation in &self.actuations {
            if let Err(e) = network.execute(actuation.command) {
                rejected += 1;
                warn!(device = %actuation.command.device(), error = %e, "actuation rejected");
                if let Some(action) = actuation.action.and_then(|i| self.actions.get_mut(i)) {
                    action.success = false;
                }
            }
        }
        rejected
    }
}

/// Controller-side picture of the depot, rebuilt from sensor readings.
#[derive(Debug, Clone, PartialEq)]
pub struct DepotView {
    gates: Vec<bool>,
    spots: Vec<bool>,
    chargers: Vec<ChargerStatus>,
}

impl DepotView {
    pub fn new(num_gates: u32, num_spots: u32, num_chargers: u32) -> Self {
        Self {
            gates: vec![false; num_gates as usize],
            spots: vec![false; num_spots as usize],
            chargers: vec![ChargerStatus::default(); num_chargers as usize],
        }
    }

    /// Folds a snapshot into the view. Readings for devices outside the
    /// configured layout, or whose value does not fit the device kind, are skipped.
    pub fn apply(&mut self, snapshot: &SensorSnapshot) {
        for reading in snapshot {
            let index = reading.device.index as usize;
            match (reading.device.kind, reading.value) {
                (DeviceKind::Gate, ReadingValue::Flag(open)) => {
                    if let Some(slot) = self.gates.get_mut(index) {
                        *slot = open;
                    }
                }
                (DeviceKind::Occupancy, ReadingValue::Flag(occupied)) => {
                    if let Some(slot) = self.spots.get_mut(index) {
                        *slot = occupied;
                    }
                }
                (DeviceKind::Charger, ReadingValue::Charger(status)) => {
                    if let Some(slot) = self.chargers.get_mut(index) {
                        *slot = status;
                    }
                }
                _ => {}
            }
        }
    }

    pub fn gate_open(&self, gate: u32) -> Option<bool> {
        self.gates.get(gate as usize).copied()
    }

    pub fn spot_occupied(&self, spot: u32) -> Option<bool> {
        self.spots.get(spot as usize).copied()
    }

    pub fn charger(&self, charger: u32) -> Option<&ChargerStatus> {
        self.chargers.get(charger as usize)
    }

    pub fn free_spot_count(&self) -> usize {
        self.spots.iter().filter(|occupied| !**occupied).count()
    }

    pub fn working_charger_count(&self) -> usize {
        self.chargers.iter().filter(|status| !status.failed).count()
    }

    /// At least one free spot and one charger that has not failed.
    pub fn can_admit(&self) -> bool {
        self.free_spot_count() > 0 && self.working_charger_count() > 0
    }

    pub fn is_charger_failed(&self, charger: u32) -> bool {
        self.charger(charger).is_some_and(|status| status.failed)
    }

    fn set_spot(&mut self, spot: u32, occupied: bool) {
        if let Some(slot) = self.spots.get_mut(spot as usize) {
            *slot = occupied;
        }
    }

    fn set_charger_connected(&mut self, charger: u32, connected: bool) {
        if let Some(status) = self.chargers.get_mut(charger as usize) {
            status.connected = connected;
            if !connected {
                status.charging = false;
                status.power_kw = 0.0;
            }
        }
    }
}

#[derive(Debug)]
pub struct DepotController {
    view: DepotView,
    charging_power_kw: f64,
}

impl DepotController {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            view: DepotView::new(config.num_gates, config.num_spots, config.num_chargers),
            charging_power_kw: config.charging_power_kw,
        }
    }

    pub fn view(&self) -> &DepotView {
        &self.view
    }

    pub fn process_step(
        &mut self,
        snapshot: &SensorSnapshot,
        registry: &mut VehicleRegistry,
        step: u64,
    ) -> ControlOutput {
        let mut output = ControlOutput::default();

        self.view.apply(snapshot);

        for id in registry.ids() {
            if let Err(source) = self.process_vehicle(id, registry, step, &mut output) {
                warn!(vehicle = %id, step, error = %source, "vehicle processing failed");
                output.errors.push(ControlError {
                    vehicle: id,
                    step,
                    source,
                });
            }
        }

        self.control_gates(registry, &mut output);

        output
    }

    fn process_vehicle(
        &mut self,
        id: VehicleId,
        registry: &mut VehicleRegistry,
        step: u64,
        output: &mut ControlOutput,
    ) -> Result<(), ClaimError> {
        let vehicle = registry.get(id).cloned().ok_or(ClaimError::UnknownVehicle(id))?;

        match vehicle.state {
            VehicleState::Approaching | VehicleState::Waiting => {
                if self.view.can_admit() {
                    if let Some(spot) = self.find_spot(registry) {
                        registry.claim_spot(id, spot)?;
                        registry.set_state(id, VehicleState::Entering)?;
                        self.view.set_spot(spot, true);

                        let action = output.push_action(
                            ActionType::VehicleAssignment,
                            ActionTarget::Vehicle(id),
                            format!("assign_spot_{}", spot),
                        );
                        output.actuate(Some(action), DeviceCommand::SetOccupancy { spot, occupied: true });
                        return Ok(());
                    }
                }
                if vehicle.state == VehicleState::Approaching {
                    registry.set_state(id, VehicleState::Waiting)?;
                }
            }

            VehicleState::Entering => {
                registry.set_state(id, VehicleState::Parking)?;
            }

            VehicleState::Parking => {
                if let Some(charger) = self.find_charger(registry) {
                    registry.claim_charger(id, charger)?;
                    registry.set_state(id, VehicleState::Charging)?;
                    self.view.set_charger_connected(charger, true);

                    let action = output.push_action(
                        ActionType::ChargerAssignment,
                        ActionTarget::Device(DeviceId::charger(charger)),
                        "start_charging".to_string(),
                    );
                    output.actuate(Some(action), DeviceCommand::ConnectCharger { charger });
                    output.actuate(
                        Some(action),
                        DeviceCommand::StartCharging {
                            charger,
                            power_kw: self.charging_power_kw,
                        },
                    );
                }
            }

            VehicleState::Charging => {
                if vehicle.is_charging_complete() {
                    registry.set_state(id, VehicleState::Exiting)?;
                    if let Some(charger) = vehicle.assigned_charger {
                        let action = output.push_action(
                            ActionType::ChargerControl,
                            ActionTarget::Device(DeviceId::charger(charger)),
                            "stop_charging".to_string(),
                        );
                        output.actuate(Some(action), DeviceCommand::StopCharging { charger });
                    }
                } else if vehicle
                    .assigned_charger
                    .is_some_and(|charger| self.view.is_charger_failed(charger))
                {
                    let released = registry.release_all(id)?;
                    registry.set_state(id, VehicleState::Waiting)?;
                    warn!(vehicle = %id, step, charger = ?released.charger, "charger failed mid-charge, vehicle rerouted");

                    let action = output.push_action(
                        ActionType::FaultResponse,
                        ActionTarget::Vehicle(id),
                        "charger_failure_detected".to_string(),
                    );
                    self.release_devices(released, Some(action), output);
                }
            }

            VehicleState::Exiting => {
                let released = registry.release_all(id)?;
                registry.set_state(id, VehicleState::Departed)?;
                if let Some(departed) = registry.get_mut(id) {
                    departed.departure_step = Some(step);
                }
                self.release_devices(released, None, output);
            }

            VehicleState::Departed => {}
        }

        Ok(())
    }

    fn release_devices(&mut self, released: ReleasedClaims, action: Option<usize>, output: &mut ControlOutput) {
        if let Some(charger) = released.charger {
            self.view.set_charger_connected(charger, false);
            output.actuate(action, DeviceCommand::DisconnectCharger { charger });
        }
        if let Some(spot) = released.spot {
            self.view.set_spot(spot, false);
            output.actuate(action, DeviceCommand::SetOccupancy { spot, occupied: false });
        }
    }

    /// First-fit: lowest spot that reads free and is unclaimed.
    fn find_spot(&self, registry: &VehicleRegistry) -> Option<u32> {
        (0..self.view.spots.len() as u32)
            .find(|&spot| self.view.spot_occupied(spot) == Some(false) && registry.is_spot_free(spot))
    }

    /// First-fit: lowest charger that is neither connected nor failed and is unclaimed.
    fn find_charger(&self, registry: &VehicleRegistry) -> Option<u32> {
        (0..self.view.chargers.len() as u32).find(|&charger| {
            self.view
                .charger(charger)
                .is_some_and(|status| !status.connected && !status.failed)
                && registry.is_charger_free(charger)
        })
    }

    fn control_gates(&mut self, registry: &VehicleRegistry, output: &mut ControlOutput) {
        let should_open = registry.has_queued() && self.view.can_admit();

        for gate in 0..self.view.gates.len() as u32 {
            if self.view.gate_open(gate) == Some(should_open) {
                continue;
            }
            let action = output.push_action(
                ActionType::GateControl,
                ActionTarget::Device(DeviceId::gate(gate)),
                if should_open { "open" } else { "close" }.to_string(),
            );
            output.actuate(Some(action), DeviceCommand::SetGate { gate, open: should_open });
        }
    }
}
