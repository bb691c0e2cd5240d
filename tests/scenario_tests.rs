use depotsim::analysis::FailureReason;
use depotsim::fault::FaultType;
use depotsim::*;
use std::io::Write;

fn run(scenario: Scenario, seed: u64) -> (RunSummary, MemorySink) {
    let mut engine = SimulationEngine::for_scenario(scenario, seed).unwrap();
    let mut sink = MemorySink::new();
    let summary = engine.run_complete_simulation(scenario.name(), &mut sink).unwrap();
    (summary, sink)
}

#[test]
fn test_normal_scenario_never_double_books_a_spot() {
    for seed in 0..25 {
        let (summary, sink) = run(Scenario::Normal, seed);

        assert!(
            summary.faults.iter().all(|f| f.fault_type != FaultType::OccupancyConflict),
            "seed {}",
            seed
        );
        let analysis = RunAnalysis::from_records(sink.fault_events());
        assert_eq!(analysis.occupancy_conflicts, 0);
        assert_eq!(analysis.system_errors, 0);
        assert!(analysis.passed(), "seed {}: {:?}", seed, analysis.failure_reasons);
    }
}

#[test]
fn test_charger_failure_preset_first_detected_at_step_30() {
    for seed in 0..100 {
        let (summary, _) = run(Scenario::ChargerFailure, seed);

        let first = summary
            .faults
            .iter()
            .find(|f| f.fault_type == FaultType::ChargerFailure)
            .unwrap_or_else(|| panic!("seed {}: no charger failure", seed));
        assert!((30..=35).contains(&first.detected_at), "seed {}: {}", seed, first.detected_at);
        assert_eq!(first.affected_component, "charger_0");
        assert!(summary.total_steps >= 30, "seed {}", seed);
    }
}

#[test]
fn test_every_preset_runs_to_completion() {
    for scenario in Scenario::ALL {
        let (summary, sink) = run(scenario, 42);
        let config = scenario.config();

        assert_eq!(summary.scenario_name, scenario.name());
        assert!(summary.total_steps >= 1);
        assert!(summary.total_steps <= config.max_steps);
        assert_eq!(summary.step_results.len() as u64, summary.total_steps);
        assert_eq!(sink.steps().count() as u64, summary.total_steps);

        let run = sink.run().unwrap();
        assert_eq!(run.config, config);
        assert_eq!(run.scenario_name, scenario.name());
        assert!(run.end_time.unwrap() >= run.start_time);
    }
}

#[test]
fn test_analysis_from_records_matches_summary() {
    let (summary, sink) = run(Scenario::SensorNoise, 17);

    let from_records = RunAnalysis::from_records(sink.fault_events());
    let from_faults = RunAnalysis::from_faults(&summary.faults);

    assert_eq!(from_records, from_faults);
    assert_eq!(from_records.total_faults as usize, summary.total_faults);
}

#[test]
fn test_fault_ids_are_unique_and_increasing() {
    let (summary, _) = run(Scenario::HighTraffic, 3);

    assert!(summary.faults.windows(2).all(|w| w[0].id < w[1].id));
    assert!(summary.faults.windows(2).all(|w| w[0].detected_at <= w[1].detected_at));
}

#[test]
fn test_config_file_loads_with_defaults() {
    let path = std::env::temp_dir().join(format!("depotsim-config-{}.json", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, r#"{{ "num_spots": 4, "max_steps": 12, "charger_failure_step": 6 }}"#).unwrap();
    drop(file);

    let config = SimulationConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.num_spots, 4);
    assert_eq!(config.max_steps, 12);
    assert_eq!(config.charger_failure_step, Some(6));
    assert_eq!(config.num_gates, SimulationConfig::default().num_gates);

    let mut engine = SimulationEngine::new(config, 1).unwrap();
    let summary = engine.run_complete_simulation("from_file", &mut MemorySink::new()).unwrap();
    assert!(summary.total_steps <= 12);
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let path = std::env::temp_dir().join(format!("depotsim-bad-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "noise_level": 1.5 }"#).unwrap();

    let result = SimulationConfig::from_json_file(&path);
    std::fs::remove_file(&path).unwrap();

    assert!(matches!(
        result,
        Err(ConfigError::InvalidProbability { field: "noise_level", .. })
    ));
}

#[test]
fn test_conflict_verdict_reason() {
    let mut engine = SimulationEngine::for_scenario(Scenario::Normal, 0).unwrap();
    let mut sink = MemorySink::new();
    let mut session = engine.start("verdict", &mut sink).unwrap();

    let registry = engine.registry_mut();
    let a = registry.admit(0);
    let b = registry.admit(0);
    registry.set_state(a, depotsim::vehicle::VehicleState::Parking).unwrap();
    registry.set_state(b, depotsim::vehicle::VehicleState::Parking).unwrap();
    registry.inject_spot_claim(a, 4).unwrap();
    registry.inject_spot_claim(b, 4).unwrap();

    engine.run_step(&mut session, &mut sink).unwrap();
    let summary = engine.finalize(session, &mut sink).unwrap();

    let analysis = RunAnalysis::from_faults(&summary.faults);
    assert!(analysis.failure_reasons.contains(&FailureReason::OccupancyConflicts));
    assert_eq!(FailureReason::OccupancyConflicts.to_string(), "Occupancy conflicts detected");
}
