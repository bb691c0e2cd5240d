use crate::fault::{AlertLevel, FaultEvent, FaultType};
use crate::log_sink::FaultEventRecord;
use core::fmt;
use serde::{Deserialize, Serialize};

/// More critical faults than this fails the run.
pub const MAX_CRITICAL_FAULTS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    OccupancyConflicts,
    TooManyCriticalFaults,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::OccupancyConflicts => f.write_str("Occupancy conflicts detected"),
            FailureReason::TooManyCriticalFaults => f.write_str("Too many critical faults"),
        }
    }
}

/// Pass/fail verdict over the faults of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAnalysis {
    pub total_faults: u64,
    pub critical_faults: u64,
    pub occupancy_conflicts: u64,
    pub charger_failures: u64,
    pub gate_failures: u64,
    pub sensor_noise: u64,
    pub system_errors: u64,
    pub failure_reasons: Vec<FailureReason>,
}

impl RunAnalysis {
    pub fn from_faults(faults: &[FaultEvent]) -> Self {
        Self::tally(faults.iter().map(|f| (f.fault_type, f.alert_level)))
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a FaultEventRecord>) -> Self {
        Self::tally(records.into_iter().map(|r| (r.fault_type, r.alert_level)))
    }

    fn tally(faults: impl Iterator<Item = (FaultType, AlertLevel)>) -> Self {
        let mut analysis = Self::default();

        for (fault_type, alert_level) in faults {
            analysis.total_faults += 1;
            if alert_level == AlertLevel::Critical {
                analysis.critical_faults += 1;
            }
            match fault_type {
                FaultType::OccupancyConflict => analysis.occupancy_conflicts += 1,
                FaultType::ChargerFailure => analysis.charger_failures += 1,
                FaultType::GateStuck => analysis.gate_failures += 1,
                FaultType::SensorNoise => analysis.sensor_noise += 1,
                FaultType::SystemError => analysis.system_errors += 1,
            }
        }

        if analysis.occupancy_conflicts > 0 {
            analysis.failure_reasons.push(FailureReason::OccupancyConflicts);
        }
        if analysis.critical_faults > MAX_CRITICAL_FAULTS {
            analysis.failure_reasons.push(FailureReason::TooManyCriticalFaults);
        }

        analysis
    }

    pub fn passed(&self) -> bool {
        self.failure_reasons.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fault(fault_type: FaultType, alert_level: AlertLevel) -> FaultEvent {
        FaultEvent {
            id: 0,
            fault_type,
            alert_level,
            description: String::new(),
            affected_component: String::new(),
            detected_at: 1,
            resolved_at: None,
        }
    }

    #[test]
    fn test_warnings_alone_pass() {
        let faults: Vec<_> = (0..20).map(|_| fault(FaultType::SensorNoise, AlertLevel::Warning)).collect();
        let analysis = RunAnalysis::from_faults(&faults);

        assert!(analysis.passed());
        assert_eq!(analysis.sensor_noise, 20);
        assert_eq!(analysis.critical_faults, 0);
    }

    #[test]
    fn test_single_conflict_fails() {
        let analysis = RunAnalysis::from_faults(&[fault(FaultType::OccupancyConflict, AlertLevel::Critical)]);

        assert!(!analysis.passed());
        assert_eq!(analysis.failure_reasons, vec![FailureReason::OccupancyConflicts]);
    }

    #[test]
    fn test_critical_threshold() {
        let five: Vec<_> = (0..5).map(|_| fault(FaultType::SystemError, AlertLevel::Critical)).collect();
        assert!(RunAnalysis::from_faults(&five).passed());

        let six: Vec<_> = (0..6).map(|_| fault(FaultType::SystemError, AlertLevel::Critical)).collect();
        let analysis = RunAnalysis::from_faults(&six);
        assert_eq!(analysis.failure_reasons, vec![FailureReason::TooManyCriticalFaults]);
    }
}
