//! Vehicle lifecycle and resource-claim bookkeeping.
//!
//! The registry hands out spots and chargers exclusively through
//! [`VehicleRegistry::claim_spot`] and [`VehicleRegistry::claim_charger`].
//! Occupancy conflicts are still checked every step by scanning each
//! vehicle's own `assigned_spot`, so a defect anywhere in the allocation path
//! (or a deliberate [`VehicleRegistry::inject_spot_claim`]) shows up as a
//! fault instead of being hidden by the claim table.

use core::fmt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

pub const INITIAL_CHARGE_LEVEL: f64 = 0.2;
pub const TARGET_CHARGE_LEVEL: f64 = 0.8;
pub const DEFAULT_CHARGE_RATE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VehicleId(pub u32);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleState {
    Approaching,
    Waiting,
    Entering,
    Parking,
    Charging,
    Exiting,
    Departed,
}

impl VehicleState {
    pub fn as_str(self) -> &'static str {
        match self {
            VehicleState::Approaching => "approaching",
            VehicleState::Waiting => "waiting",
            VehicleState::Entering => "entering",
            VehicleState::Parking => "parking",
            VehicleState::Charging => "charging",
            VehicleState::Exiting => "exiting",
            VehicleState::Departed => "departed",
        }
    }

    /// Vehicles in these states are queued outside the depot.
    pub fn is_queued(self) -> bool {
        matches!(self, VehicleState::Approaching | VehicleState::Waiting)
    }
}

impl fmt::Display for VehicleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub state: VehicleState,
    pub assigned_spot: Option<u32>,
    pub assigned_charger: Option<u32>,
    pub charge_level: f64,
    pub target_charge: f64,
    pub arrival_step: u64,
    pub departure_step: Option<u64>,
}

impl Vehicle {
    pub fn new(id: VehicleId, arrival_step: u64) -> Self {
        Self {
            id,
            state: VehicleState::Approaching,
            assigned_spot: None,
            assigned_charger: None,
            charge_level: INITIAL_CHARGE_LEVEL,
            target_charge: TARGET_CHARGE_LEVEL,
            arrival_step,
            departure_step: None,
        }
    }

    pub fn is_charging_complete(&self) -> bool {
        self.charge_level >= self.target_charge
    }

    pub fn update_charge(&mut self, rate: f64) {
        if self.state == VehicleState::Charging {
            self.charge_level = (self.charge_level + rate).min(1.0);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("vehicle {0} is not registered")]
    UnknownVehicle(VehicleId),
    #[error("spot {spot} is already claimed by vehicle {holder}")]
    SpotClaimed { spot: u32, holder: VehicleId },
    #[error("charger {charger} is already claimed by vehicle {holder}")]
    ChargerClaimed { charger: u32, holder: VehicleId },
}

/// Spot claimed by more than one vehicle at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyConflict {
    pub spot: u32,
    pub vehicles: Vec<VehicleId>,
}

/// Resources a vehicle gave back when its claims were released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleasedClaims {
    pub spot: Option<u32>,
    pub charger: Option<u32>,
}

#[derive(Debug)]
pub struct VehicleRegistry {
    vehicles: Vec<Vehicle>,
    spot_claims: BTreeMap<u32, VehicleId>,
    charger_claims: BTreeMap<u32, VehicleId>,
    next_vehicle_id: u32,
}

impl VehicleRegistry {
    pub fn new() -> Self {
        Self {
            vehicles: Vec::new(),
            spot_claims: BTreeMap::new(),
            charger_claims: BTreeMap::new(),
            next_vehicle_id: 1,
        }
    }

    /// Registers a newly arrived vehicle in the APPROACHING state.
    pub fn admit(&mut self, arrival_step: u64) -> VehicleId {
        let id = VehicleId(self.next_vehicle_id);
        self.next_vehicle_id = self.next_vehicle_id.wrapping_add(1);
        self.vehicles.push(Vehicle::new(id, arrival_step));
        debug!(vehicle = %id, step = arrival_step, "vehicle arrived");
        id
    }

    pub fn get(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.iter().find(|v| v.id == id)
    }

    pub fn get_mut(&mut self, id: VehicleId) -> Option<&mut Vehicle> {
        self.vehicles.iter_mut().find(|v| v.id == id)
    }

    /// Vehicles in insertion order, departed ones included.
    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    pub fn ids(&self) -> Vec<VehicleId> {
        self.vehicles.iter().map(|v| v.id).collect()
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.vehicles
            .iter()
            .filter(|v| v.state != VehicleState::Departed)
            .count()
    }

    pub fn by_state(&self, state: VehicleState) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.iter().filter(move |v| v.state == state)
    }

    pub fn has_queued(&self) -> bool {
        self.vehicles.iter().any(|v| v.state.is_queued())
    }

    pub fn spot_holder(&self, spot: u32) -> Option<VehicleId> {
        self.spot_claims.get(&spot).copied()
    }

    pub fn charger_holder(&self, charger: u32) -> Option<VehicleId> {
        self.charger_claims.get(&charger).copied()
    }

    pub fn is_spot_free(&self, spot: u32) -> bool {
        !self.spot_claims.contains_key(&spot)
    }

    pub fn is_charger_free(&self, charger: u32) -> bool {
        !self.charger_claims.contains_key(&charger)
    }

    /// Exclusive spot claim. A vehicle moving to a new spot gives up its old one.
    pub fn claim_spot(&mut self, id: VehicleId, spot: u32) -> Result<(), ClaimError> {
        if let Some(holder) = self.spot_holder(spot) {
            if holder != id {
                return Err(ClaimError::SpotClaimed { spot, holder });
            }
        }

        let vehicle = self
            .vehicles
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or(ClaimError::UnknownVehicle(id))?;

        if let Some(previous) = vehicle.assigned_spot.replace(spot) {
            if previous != spot {
                self.spot_claims.remove(&previous);
            }
        }
        self.spot_claims.insert(spot, id);
        Ok(())
    }

    pub fn claim_charger(&mut self, id: VehicleId, charger: u32) -> Result<(), ClaimError> {
        if let Some(holder) = self.charger_holder(charger) {
            if holder != id {
                return Err(ClaimError::ChargerClaimed { charger, holder });
            }
        }

        let vehicle = self
            .vehicles
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or(ClaimError::UnknownVehicle(id))?;

        if let Some(previous) = vehicle.assigned_charger.replace(charger) {
            if previous != charger {
                self.charger_claims.remove(&previous);
            }
        }
        self.charger_claims.insert(charger, id);
        Ok(())
    }

    /// Sets `assigned_spot` without consulting the claim table.
    ///
    /// This is a fault-injection probe: it lets tests and scenarios create the
    /// double claims that [`detect_occupancy_conflicts`](Self::detect_occupancy_conflicts)
    /// must report.
    pub fn inject_spot_claim(&mut self, id: VehicleId, spot: u32) -> Result<(), ClaimError> {
        let vehicle = self
            .vehicles
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or(ClaimError::UnknownVehicle(id))?;

        if let Some(previous) = vehicle.assigned_spot.replace(spot) {
            if self.spot_claims.get(&previous) == Some(&id) {
                self.spot_claims.remove(&previous);
            }
        }
        Ok(())
    }

    pub fn release_charger(&mut self, id: VehicleId) -> Result<Option<u32>, ClaimError> {
        let vehicle = self
            .vehicles
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or(ClaimError::UnknownVehicle(id))?;

        let charger = vehicle.assigned_charger.take();
        if let Some(charger) = charger {
            if self.charger_claims.get(&charger) == Some(&id) {
                self.charger_claims.remove(&charger);
            }
        }
        Ok(charger)
    }

    pub fn release_spot(&mut self, id: VehicleId) -> Result<Option<u32>, ClaimError> {
        let vehicle = self
            .vehicles
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or(ClaimError::UnknownVehicle(id))?;

        let spot = vehicle.assigned_spot.take();
        if let Some(spot) = spot {
            if self.spot_claims.get(&spot) == Some(&id) {
                self.spot_claims.remove(&spot);
            }
        }
        Ok(spot)
    }

    pub fn release_all(&mut self, id: VehicleId) -> Result<ReleasedClaims, ClaimError> {
        let charger = self.release_charger(id)?;
        let spot = self.release_spot(id)?;
        Ok(ReleasedClaims { spot, charger })
    }

    pub fn set_state(&mut self, id: VehicleId, state: VehicleState) -> Result<(), ClaimError> {
        let vehicle = self.get_mut(id).ok_or(ClaimError::UnknownVehicle(id))?;
        vehicle.state = state;
        Ok(())
    }

    /// Advances charge on every CHARGING vehicle.
    pub fn advance_charge(&mut self, rate: f64) {
        for vehicle in &mut self.vehicles {
            vehicle.update_charge(rate);
        }
    }

    /// Spot id to every vehicle claiming it, built from the vehicles themselves.
    pub fn spot_claim_map(&self) -> BTreeMap<u32, Vec<VehicleId>> {
        let mut claims: BTreeMap<u32, Vec<VehicleId>> = BTreeMap::new();
        for vehicle in &self.vehicles {
            if let Some(spot) = vehicle.assigned_spot {
                claims.entry(spot).or_default().push(vehicle.id);
            }
        }
        claims
    }

    /// Spots claimed by more than one vehicle, in ascending spot order.
    pub fn detect_occupancy_conflicts(&self) -> Vec<OccupancyConflict> {
        self.spot_claim_map()
            .into_iter()
            .filter(|(_, vehicles)| vehicles.len() > 1)
            .map(|(spot, vehicles)| OccupancyConflict { spot, vehicles })
            .collect()
    }
}

impl Default for VehicleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admit_assigns_sequential_ids() {
        let mut registry = VehicleRegistry::new();
        let a = registry.admit(1);
        let b = registry.admit(1);

        assert_eq!(a, VehicleId(1));
        assert_eq!(b, VehicleId(2));
        assert_eq!(registry.get(a).unwrap().state, VehicleState::Approaching);
        assert_eq!(registry.get(a).unwrap().charge_level, INITIAL_CHARGE_LEVEL);
    }

    #[test]
    fn test_spot_claims_are_exclusive() {
        let mut registry = VehicleRegistry::new();
        let a = registry.admit(0);
        let b = registry.admit(0);

        registry.claim_spot(a, 0).unwrap();
        assert_eq!(
            registry.claim_spot(b, 0),
            Err(ClaimError::SpotClaimed { spot: 0, holder: a })
        );
        assert_eq!(registry.get(b).unwrap().assigned_spot, None);
        assert!(registry.detect_occupancy_conflicts().is_empty());
    }

    #[test]
    fn test_moving_spot_frees_previous() {
        let mut registry = VehicleRegistry::new();
        let a = registry.admit(0);

        registry.claim_spot(a, 0).unwrap();
        registry.claim_spot(a, 3).unwrap();

        assert!(registry.is_spot_free(0));
        assert_eq!(registry.spot_holder(3), Some(a));
    }

    #[test]
    fn test_release_all_frees_both_claims() {
        let mut registry = VehicleRegistry::new();
        let a = registry.admit(0);
        registry.claim_spot(a, 1).unwrap();
        registry.claim_charger(a, 2).unwrap();

        let released = registry.release_all(a).unwrap();
        assert_eq!(released, ReleasedClaims { spot: Some(1), charger: Some(2) });
        assert!(registry.is_spot_free(1));
        assert!(registry.is_charger_free(2));
    }

    #[test]
    fn test_unknown_vehicle_claim() {
        let mut registry = VehicleRegistry::new();
        assert_eq!(
            registry.claim_spot(VehicleId(42), 0),
            Err(ClaimError::UnknownVehicle(VehicleId(42)))
        );
        assert!(registry.is_spot_free(0));
    }

    #[test]
    fn test_injected_claim_is_detected() {
        let mut registry = VehicleRegistry::new();
        let a = registry.admit(0);
        let b = registry.admit(0);
        let c = registry.admit(0);

        registry.claim_spot(a, 2).unwrap();
        registry.inject_spot_claim(c, 2).unwrap();
        registry.inject_spot_claim(b, 2).unwrap();

        let conflicts = registry.detect_occupancy_conflicts();
        assert_eq!(conflicts, vec![OccupancyConflict { spot: 2, vehicles: vec![a, b, c] }]);
        assert_eq!(registry.detect_occupancy_conflicts(), conflicts);
    }

    #[test]
    fn test_default_registry_starts_ids_at_one() {
        let mut registry = VehicleRegistry::default();
        assert_eq!(registry.admit(0), VehicleId(1));
    }

    #[test]
    fn test_injected_claim_drops_previous_spot_claim() {
        let mut registry = VehicleRegistry::new();
        let a = registry.admit(0);
        registry.claim_spot(a, 1).unwrap();

        registry.inject_spot_claim(a, 3).unwrap();
        assert!(registry.is_spot_free(1));
        assert_eq!(registry.spot_holder(1), None);

        assert_eq!(registry.release_spot(a).unwrap(), Some(3));
        assert!(registry.is_spot_free(1));
        assert!(registry.is_spot_free(3));
    }

    #[test]
    fn test_charge_only_advances_while_charging() {
        let mut registry = VehicleRegistry::new();
        let a = registry.admit(0);
        let b = registry.admit(0);
        registry.set_state(a, VehicleState::Charging).unwrap();

        for _ in 0..30 {
            registry.advance_charge(DEFAULT_CHARGE_RATE);
        }

        assert_eq!(registry.get(a).unwrap().charge_level, 1.0);
        assert_eq!(registry.get(b).unwrap().charge_level, INITIAL_CHARGE_LEVEL);
    }
}
