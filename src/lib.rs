//! # Depot HIL Simulator
//!
//! A discrete-time, hardware-in-the-loop style simulation of a vehicle depot
//! with gates, parking spots and EV chargers. Synthetic sensors inject noise
//! and sticky failures, a rule-based controller allocates spots and chargers
//! and drives the gates, and a fault detector classifies what goes wrong.
//! Every step is written to an append-only log for pass/fail analysis.
//!
//! ## Quick Start
//!
//! ```rust
//! use depotsim::{MemorySink, RunAnalysis, Scenario, SimulationEngine};
//!
//! let mut engine = SimulationEngine::for_scenario(Scenario::Normal, 42)?;
//! let mut sink = MemorySink::new();
//! let summary = engine.run_complete_simulation("normal", &mut sink)?;
//!
//! let analysis = RunAnalysis::from_faults(&summary.faults);
//! println!("{} steps, passed: {}", summary.total_steps, analysis.passed());
//! # Ok::<(), depotsim::EngineError>(())
//! ```
//!
//! ## Architecture
//!
//! - [`sensors`] - Gate, occupancy and charger sensor models and the network
//! - [`vehicle`] - Vehicle lifecycle and resource-claim registry
//! - [`controller`] - Depot control rules and device actuation
//! - [`fault`] - Fault classification
//! - [`fault_injection`] - Scenario-scheduled failures
//! - [`engine`] - Step pipeline, run session and termination
//! - [`log_sink`] - Event log records and sinks
//! - [`analysis`] - Pass/fail verdicts
//! - [`config`] - Run configuration and scenario presets

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod analysis;
pub mod config;
pub mod controller;
pub mod engine;
pub mod fault;
pub mod fault_injection;
pub mod log_sink;
pub mod sensors;
pub mod vehicle;

// Re-export main public types for convenience
pub use analysis::RunAnalysis;
pub use config::{ConfigError, Scenario, SimulationConfig};
pub use engine::{EngineError, RunSession, RunSummary, SimulationEngine};
pub use log_sink::{JsonLinesSink, LogSink, MemorySink};
pub use sensors::SensorNetwork;
pub use vehicle::VehicleRegistry;
