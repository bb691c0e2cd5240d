use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use depotsim::engine::RunSummary;
use depotsim::{JsonLinesSink, LogSink, MemorySink, RunAnalysis, Scenario, SimulationConfig, SimulationEngine};
use std::fs::File;
use std::io::BufWriter;
use std::process;

const DEFAULT_SEED: &str = "42";
const DEFAULT_SCENARIO: &str = "normal";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let scenario_names: Vec<&str> = Scenario::ALL.iter().map(|s| s.name()).collect();

    let matches = App::new("depot-sim")
        .version("0.1.0")
        .about("Depot HIL simulator - gates, parking spots and EV chargers under injected faults")
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["table", "json"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable debug logging")
                .global(true),
        )
        .arg(
            Arg::with_name("seed")
                .short("s")
                .long("seed")
                .value_name("SEED")
                .help("Random seed for sensor noise, failures and arrivals")
                .takes_value(true)
                .default_value(DEFAULT_SEED)
                .global(true)
                .validator(|v| match v.parse::<u64>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Seed must be a non-negative integer".into()),
                }),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Run a single scenario")
                .arg(
                    Arg::with_name("scenario")
                        .help("Scenario preset")
                        .possible_values(&scenario_names)
                        .default_value(DEFAULT_SCENARIO),
                )
                .arg(
                    Arg::with_name("config")
                        .short("c")
                        .long("config")
                        .value_name("FILE")
                        .help("JSON config file, replaces the scenario preset")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("max-steps")
                        .long("max-steps")
                        .value_name("STEPS")
                        .help("Override the number of steps")
                        .takes_value(true)
                        .validator(|v| match v.parse::<u64>() {
                            Ok(_) => Ok(()),
                            Err(_) => Err("Step count must be a non-negative integer".into()),
                        }),
                )
                .arg(
                    Arg::with_name("log")
                        .short("l")
                        .long("log")
                        .value_name("FILE")
                        .help("Write the event log to FILE as JSON lines")
                        .takes_value(true),
                ),
        )
        .subcommand(SubCommand::with_name("scenarios").about("List scenario presets"))
        .subcommand(
            SubCommand::with_name("suite")
                .about("Run every scenario preset and report pass/fail")
                .long_about("Runs all presets with the same seed. Exits non-zero if any scenario fails."),
        )
        .get_matches();

    let format = matches.value_of("format").unwrap_or("table");
    let verbose = matches.is_present("verbose");
    let seed: u64 = matches.value_of("seed").unwrap_or(DEFAULT_SEED).parse()?;

    init_tracing(verbose);

    match matches.subcommand() {
        ("run", Some(sub_matches)) => handle_run(sub_matches, seed, format)?,
        ("scenarios", _) => handle_scenarios(format)?,
        ("suite", _) => {
            if !handle_suite(seed, format)? {
                process::exit(1);
            }
        }
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  {} Run the normal scenario", "depot-sim run".bright_cyan());
            println!("  {} Run every scenario", "depot-sim suite".bright_cyan());
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_run(matches: &ArgMatches<'_>, seed: u64, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let scenario: Scenario = matches.value_of("scenario").unwrap_or(DEFAULT_SCENARIO).parse()?;

    let mut config = match matches.value_of("config") {
        Some(path) => SimulationConfig::from_json_file(path)?,
        None => scenario.config(),
    };
    if let Some(steps) = matches.value_of("max-steps") {
        config.max_steps = steps.parse()?;
    }

    let mut engine = SimulationEngine::new(config, seed)?;
    let summary = match matches.value_of("log") {
        Some(path) => {
            let mut sink = JsonLinesSink::new(BufWriter::new(File::create(path)?));
            run_with_sink(&mut engine, scenario.name(), &mut sink)?
        }
        None => run_with_sink(&mut engine, scenario.name(), &mut MemorySink::new())?,
    };

    let analysis = RunAnalysis::from_faults(&summary.faults);
    match format {
        "json" => {
            let report = serde_json::json!({
                "seed": seed,
                "summary": summary,
                "analysis": analysis,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => print_run_table(&summary, &analysis, seed),
    }

    Ok(())
}

fn run_with_sink<S: LogSink>(
    engine: &mut SimulationEngine,
    scenario_name: &str,
    sink: &mut S,
) -> Result<RunSummary, Box<dyn std::error::Error>> {
    Ok(engine.run_complete_simulation(scenario_name, sink)?)
}

fn handle_scenarios(format: &str) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        "json" => {
            let presets: Vec<_> = Scenario::ALL
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "name": s.name(),
                        "description": s.description(),
                        "config": s.config(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&presets)?);
        }
        _ => {
            println!("{}", "Scenario presets".bright_blue().bold());
            println!("{}", "════════════════".bright_blue());
            for scenario in Scenario::ALL.iter() {
                let config = scenario.config();
                println!(
                    "{:<16} {:>2}g {:>2}s {:>2}c {:>4} steps  {}",
                    scenario.name().bright_cyan(),
                    config.num_gates,
                    config.num_spots,
                    config.num_chargers,
                    config.max_steps,
                    scenario.description().dimmed()
                );
            }
        }
    }
    Ok(())
}

/// Returns whether every scenario passed.
fn handle_suite(seed: u64, format: &str) -> Result<bool, Box<dyn std::error::Error>> {
    let mut results = Vec::new();

    for scenario in Scenario::ALL.iter() {
        let mut engine = SimulationEngine::for_scenario(*scenario, seed)?;
        let summary = engine.run_complete_simulation(scenario.name(), &mut MemorySink::new())?;
        let analysis = RunAnalysis::from_faults(&summary.faults);
        results.push((*scenario, summary, analysis));
    }

    let all_passed = results.iter().all(|(_, _, analysis)| analysis.passed());

    match format {
        "json" => {
            let report: Vec<_> = results
                .iter()
                .map(|(scenario, summary, analysis)| {
                    serde_json::json!({
                        "scenario": scenario.name(),
                        "total_steps": summary.total_steps,
                        "terminated_early": summary.terminated_early,
                        "analysis": analysis,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            println!("{} (seed {})", "Scenario suite".bright_blue().bold(), seed);
            println!("{}", "┌──────────────────┬───────┬────────┬──────────┬────────┐".bright_white());
            println!("{}", "│ Scenario         │ Steps │ Faults │ Critical │ Result │".bright_white());
            println!("{}", "├──────────────────┼───────┼────────┼──────────┼────────┤".bright_white());
            for (scenario, summary, analysis) in &results {
                println!(
                    "│ {:<16} │ {:>5} │ {:>6} │ {:>8} │ {} │",
                    scenario.name(),
                    summary.total_steps,
                    analysis.total_faults,
                    analysis.critical_faults,
                    verdict(analysis.passed())
                );
            }
            println!("{}", "└──────────────────┴───────┴────────┴──────────┴────────┘".bright_white());

            for (scenario, _, analysis) in &results {
                for reason in &analysis.failure_reasons {
                    println!("{} {}: {}", "✗".red(), scenario.name().bright_white(), reason.to_string().bright_red());
                }
            }
        }
    }

    Ok(all_passed)
}

fn print_run_table(summary: &RunSummary, analysis: &RunAnalysis, seed: u64) {
    println!("\n{}", "Depot Simulation Run".bright_blue().bold());
    println!("{}", "════════════════════".bright_blue());
    println!("{} {}", "Run ID:".bright_white(), summary.run_id);
    println!("{} {}", "Scenario:".bright_white(), summary.scenario_name.bright_cyan());
    println!("{} {}", "Seed:".bright_white(), seed);
    println!("{} {}", "Steps:".bright_white(), summary.total_steps);
    if summary.terminated_early {
        println!("{} {}", "Stopped:".bright_white(), "fault limit exceeded".yellow());
    }

    println!("\n{}", "Faults".bright_white().bold());
    println!("  total              {}", analysis.total_faults);
    println!("  critical           {}", analysis.critical_faults);
    println!("  occupancy conflict {}", analysis.occupancy_conflicts);
    println!("  charger failure    {}", analysis.charger_failures);
    println!("  gate stuck         {}", analysis.gate_failures);
    println!("  sensor noise       {}", analysis.sensor_noise);
    println!("  system error       {}", analysis.system_errors);

    println!("\n{} {}", "Result:".bright_white().bold(), verdict(analysis.passed()));
    for reason in &analysis.failure_reasons {
        println!("  {} {}", "✗".red(), reason.to_string().bright_red());
    }
}

fn verdict(passed: bool) -> ColoredString {
    if passed {
        " PASS ".bright_green().bold()
    } else {
        " FAIL ".bright_red().bold()
    }
}
