use crate::config::{ConfigError, Scenario, SimulationConfig};
use crate::controller::{ControlAction, DepotController};
use crate::fault::{FaultDetector, FaultEvent, FaultStats};
use crate::fault_injection::{FailureSchedule, InjectionStats};
use crate::log_sink::{
    ControlActionRecord, FaultEventRecord, LogRecord, LogSink, RunRecord, SensorReadingRecord, SinkError,
    StepRecord,
};
use crate::sensors::{SensorError, SensorNetwork, SensorSnapshot};
use crate::vehicle::VehicleRegistry;
use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// A run stops early once the cumulative fault count goes past this.
pub const FAULT_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("sensor error: {0}")]
    Sensor(#[from] SensorError),
    #[error("log sink error: {0}")]
    Sink(#[from] SinkError),
    #[error("simulation already started")]
    AlreadyStarted,
    #[error("simulation is not running")]
    NotRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    NotStarted,
    Running,
    Finalized,
}

/// Mutable state of one run: identity, step counter and every fault raised so far.
#[derive(Debug, Clone)]
pub struct RunSession {
    run_id: Uuid,
    scenario_name: String,
    start_time: DateTime<Utc>,
    step: u64,
    faults: Vec<FaultEvent>,
}

impl RunSession {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn scenario_name(&self) -> &str {
        &self.scenario_name
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn current_step(&self) -> u64 {
        self.step
    }

    pub fn faults(&self) -> &[FaultEvent] {
        &self.faults
    }

    pub fn fault_limit_exceeded(&self) -> bool {
        self.faults.len() > FAULT_LIMIT
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    pub step: u64,
    pub vehicles: usize,
    pub sensor_readings: usize,
    pub control_actions: usize,
    pub faults: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub scenario_name: String,
    pub total_steps: u64,
    pub total_faults: usize,
    pub terminated_early: bool,
    pub step_results: Vec<StepSummary>,
    pub faults: Vec<FaultEvent>,
}

/// Everything one step produced, in emission order.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub summary: StepSummary,
    pub snapshot: SensorSnapshot,
    pub actions: Vec<ControlAction>,
    pub faults: Vec<FaultEvent>,
}

/// Discrete-time depot simulation.
///
/// One engine drives one run through NOT_STARTED → RUNNING → FINALIZED.
/// All randomness comes from a single seeded ChaCha8 stream, consumed per
/// step as: arrival draw, then gates, spots and chargers.
#[derive(Debug)]
pub struct SimulationEngine {
    config: SimulationConfig,
    sensors: SensorNetwork,
    registry: VehicleRegistry,
    controller: DepotController,
    detector: FaultDetector,
    schedule: FailureSchedule,
    rng: ChaCha8Rng,
    phase: RunPhase,
}

impl SimulationEngine {
    pub fn new(config: SimulationConfig, seed: u64) -> Result<Self, EngineError> {
        config.validate()?;

        Ok(Self {
            sensors: SensorNetwork::new(&config),
            registry: VehicleRegistry::new(),
            controller: DepotController::new(&config),
            detector: FaultDetector::new(),
            schedule: FailureSchedule::from_config(&config),
            rng: ChaCha8Rng::seed_from_u64(seed),
            phase: RunPhase::NotStarted,
            config,
        })
    }

    pub fn for_scenario(scenario: Scenario, seed: u64) -> Result<Self, EngineError> {
        Self::new(scenario.config(), seed)
    }

    pub fn start<S: LogSink + ?Sized>(
        &mut self,
        scenario_name: &str,
        sink: &mut S,
    ) -> Result<RunSession, EngineError> {
        if self.phase != RunPhase::NotStarted {
            return Err(EngineError::AlreadyStarted);
        }

        let session = RunSession {
            run_id: Uuid::new_v4(),
            scenario_name: scenario_name.to_string(),
            start_time: Utc::now(),
            step: 0,
            faults: Vec::new(),
        };

        sink.append(LogRecord::RunStarted(self.run_record(&session, None)))?;
        self.phase = RunPhase::Running;

        info!(
            run_id = %session.run_id,
            scenario = scenario_name,
            gates = self.config.num_gates,
            spots = self.config.num_spots,
            chargers = self.config.num_chargers,
            "simulation started"
        );

        Ok(session)
    }

    pub fn run_step<S: LogSink + ?Sized>(
        &mut self,
        session: &mut RunSession,
        sink: &mut S,
    ) -> Result<StepOutcome, EngineError> {
        if self.phase != RunPhase::Running {
            return Err(EngineError::NotRunning);
        }

        let step = session.step + 1;
        self.schedule.apply_due(step, &mut self.sensors)?;
        session.step = step;

        if self.rng.gen::<f64>() < self.config.vehicle_arrival_rate {
            self.registry.admit(step);
        }

        let snapshot = self.sensors.read_all(&mut self.rng);

        self.registry.advance_charge(self.config.charge_rate);

        let mut output = self.controller.process_step(&snapshot, &mut self.registry, step);
        output.apply(&mut self.sensors);

        let faults = self.detector.detect(step, &snapshot, &self.registry, &output.errors);
        session.faults.extend(faults.iter().cloned());

        let summary = StepSummary {
            step,
            vehicles: self.registry.len(),
            sensor_readings: snapshot.len(),
            control_actions: output.actions.len(),
            faults: faults.len(),
        };
        debug!(
            step,
            vehicles = summary.vehicles,
            actions = summary.control_actions,
            faults = summary.faults,
            "step complete"
        );

        let outcome = StepOutcome {
            summary,
            snapshot,
            actions: output.actions,
            faults,
        };
        Self::emit(session, &outcome, sink)?;

        Ok(outcome)
    }

    fn emit<S: LogSink + ?Sized>(
        session: &RunSession,
        outcome: &StepOutcome,
        sink: &mut S,
    ) -> Result<(), SinkError> {
        let step_id = StepRecord::step_id(session.run_id, outcome.summary.step);

        sink.append(LogRecord::Step(StepRecord {
            run_id: session.run_id,
            step_id: step_id.clone(),
            step_index: outcome.summary.step,
            timestamp: Utc::now(),
        }))?;

        for reading in &outcome.snapshot {
            sink.append(LogRecord::SensorReading(SensorReadingRecord::new(&step_id, reading)?))?;
        }
        for action in &outcome.actions {
            sink.append(LogRecord::ControlAction(ControlActionRecord::new(&step_id, action)))?;
        }
        for fault in &outcome.faults {
            sink.append(LogRecord::FaultEvent(FaultEventRecord::new(&step_id, fault)))?;
        }

        Ok(())
    }

    pub fn finalize<S: LogSink + ?Sized>(
        &mut self,
        session: RunSession,
        sink: &mut S,
    ) -> Result<RunSummary, EngineError> {
        if self.phase != RunPhase::Running {
            return Err(EngineError::NotRunning);
        }

        let record = self.run_record(&session, Some(Utc::now()));
        sink.append(LogRecord::RunFinalized(record))?;
        sink.flush()?;
        self.phase = RunPhase::Finalized;

        info!(
            run_id = %session.run_id,
            total_steps = session.step,
            total_faults = session.faults.len(),
            "simulation finalized"
        );

        Ok(RunSummary {
            run_id: session.run_id,
            scenario_name: session.scenario_name,
            total_steps: session.step,
            total_faults: session.faults.len(),
            terminated_early: false,
            step_results: Vec::new(),
            faults: session.faults,
        })
    }

    /// Runs up to `max_steps`, stopping early once more than [`FAULT_LIMIT`]
    /// faults have been raised, then finalizes the run.
    ///
    /// `terminated_early` is only set when steps were actually skipped.
    pub fn run_complete_simulation<S: LogSink + ?Sized>(
        &mut self,
        scenario_name: &str,
        sink: &mut S,
    ) -> Result<RunSummary, EngineError> {
        let mut session = self.start(scenario_name, sink)?;
        let mut step_results = Vec::new();
        let mut terminated_early = false;

        for _ in 0..self.config.max_steps {
            let outcome = self.run_step(&mut session, sink)?;
            step_results.push(outcome.summary);

            if session.fault_limit_exceeded() && session.step < self.config.max_steps {
                info!(step = session.step, faults = session.faults.len(), "fault limit exceeded, stopping early");
                terminated_early = true;
                break;
            }
        }

        let mut summary = self.finalize(session, sink)?;
        summary.step_results = step_results;
        summary.terminated_early = terminated_early;
        Ok(summary)
    }

    fn run_record(&self, session: &RunSession, end_time: Option<DateTime<Utc>>) -> RunRecord {
        RunRecord {
            run_id: session.run_id,
            scenario_name: session.scenario_name.clone(),
            start_time: session.start_time,
            end_time,
            total_steps: session.step,
            config: self.config.clone(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn sensors(&self) -> &SensorNetwork {
        &self.sensors
    }

    pub fn registry(&self) -> &VehicleRegistry {
        &self.registry
    }

    /// Mutable registry access, used to plant allocation defects for the
    /// conflict detector.
    pub fn registry_mut(&mut self) -> &mut VehicleRegistry {
        &mut self.registry
    }

    pub fn controller(&self) -> &DepotController {
        &self.controller
    }

    pub fn fault_stats(&self) -> &FaultStats {
        self.detector.stats()
    }

    pub fn injection_stats(&self) -> &InjectionStats {
        self.schedule.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_sink::MemorySink;

    #[test]
    fn test_phase_transitions() {
        let mut engine = SimulationEngine::new(SimulationConfig::default(), 1).unwrap();
        let mut sink = MemorySink::new();
        assert_eq!(engine.phase(), RunPhase::NotStarted);

        let mut session = engine.start("unit", &mut sink).unwrap();
        assert_eq!(engine.phase(), RunPhase::Running);
        assert!(matches!(engine.start("again", &mut sink), Err(EngineError::AlreadyStarted)));

        engine.run_step(&mut session, &mut sink).unwrap();
        let mut stale = session.clone();
        engine.finalize(session, &mut sink).unwrap();
        assert_eq!(engine.phase(), RunPhase::Finalized);

        assert!(matches!(engine.run_step(&mut stale, &mut sink), Err(EngineError::NotRunning)));
    }

    #[test]
    fn test_invalid_config_rejected_before_run() {
        let config = SimulationConfig {
            vehicle_arrival_rate: -0.1,
            ..SimulationConfig::default()
        };
        assert!(matches!(SimulationEngine::new(config, 0), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_step_counter_advances_once_per_step() {
        let mut engine = SimulationEngine::new(SimulationConfig::default(), 5).unwrap();
        let mut sink = MemorySink::new();
        let mut session = engine.start("unit", &mut sink).unwrap();

        for expected in 1..=4 {
            let outcome = engine.run_step(&mut session, &mut sink).unwrap();
            assert_eq!(outcome.summary.step, expected);
        }
        assert_eq!(session.current_step(), 4);
        assert_eq!(sink.steps().count(), 4);
    }
}
