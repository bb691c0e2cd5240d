use crate::config::SimulationConfig;
use crate::sensors::{DeviceId, DeviceKind, SensorError, SensorNetwork};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A one-shot failure forced onto a device at a given step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledFailure {
    pub step: u64,
    pub device: DeviceId,
    pub applied: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionStats {
    pub total_injected: u32,
    pub gate_failures_injected: u32,
    pub charger_failures_injected: u32,
}

/// Scenario-driven failure injection. Each scheduled failure fires at most
/// once; reaching its step again does nothing.
#[derive(Debug, Default)]
pub struct FailureSchedule {
    failures: Vec<ScheduledFailure>,
    stats: InjectionStats,
}

impl FailureSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charger 0 and gate 0 failures from the scenario config.
    pub fn from_config(config: &SimulationConfig) -> Self {
        let mut schedule = Self::new();
        if let Some(step) = config.charger_failure_step {
            schedule.schedule(step, DeviceId::charger(0));
        }
        if let Some(step) = config.gate_failure_step {
            schedule.schedule(step, DeviceId::gate(0));
        }
        schedule
    }

    pub fn schedule(&mut self, step: u64, device: DeviceId) {
        self.failures.push(ScheduledFailure {
            step,
            device,
            applied: false,
        });
    }

    /// Applies every pending failure due at `step`. A failure is only marked
    /// applied once the network accepts it.
    pub fn apply_due(&mut self, step: u64, network: &mut SensorNetwork) -> Result<Vec<DeviceId>, SensorError> {
        let mut injected = Vec::new();

        for failure in self.failures.iter_mut().filter(|f| f.step == step && !f.applied) {
            network.inject_failure(failure.device)?;
            failure.applied = true;

            self.stats.total_injected += 1;
            match failure.device.kind {
                DeviceKind::Gate => self.stats.gate_failures_injected += 1,
                DeviceKind::Charger => self.stats.charger_failures_injected += 1,
                DeviceKind::Occupancy => {}
            }

            warn!(device = %failure.device, step, "scheduled failure injected");
            injected.push(failure.device);
        }

        Ok(injected)
    }

    pub fn pending(&self) -> impl Iterator<Item = &ScheduledFailure> {
        self.failures.iter().filter(|f| !f.applied)
    }

    pub fn failures(&self) -> &[ScheduledFailure] {
        &self.failures
    }

    pub fn stats(&self) -> &InjectionStats {
        &self.stats
    }
}
