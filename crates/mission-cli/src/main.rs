mod cli_args;
mod command_file;
mod config_file;
mod scenario;
mod scenario_command;
mod sim_driver;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use mission_store::{InMemoryMissionInfoStore, JsonFileMissionInfoStore, MissionInfoStore};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli_args::Cli;
use crate::command_file::parse_command_file;
use crate::config_file::load_manager_config;
use crate::scenario::ScenarioRunner;
use crate::scenario_command::SCENARIO_USAGE;

/// Logs go to stderr so scenario output on stdout stays clean.
fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var("MISSIONCTL_LOG")
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn open_store(cli: &Cli) -> Result<Arc<dyn MissionInfoStore>> {
    match &cli.store {
        Some(path) => {
            let store = JsonFileMissionInfoStore::open(path.clone())
                .with_context(|| format!("failed to open mission store {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryMissionInfoStore::new())),
    }
}

fn run(cli: Cli) -> Result<()> {
    if cli.print_commands {
        println!("{SCENARIO_USAGE}");
        return Ok(());
    }
    let Some(scenario) = cli.scenario.as_deref() else {
        bail!("a scenario file is required");
    };
    let config = load_manager_config(cli.config.as_deref())?;
    let entries = parse_command_file(scenario)?;
    let store = open_store(&cli)?;
    tracing::info!(
        scenario = %scenario.display(),
        commands = entries.len(),
        user_id = config.user_id,
        "replaying scenario"
    );

    let mut runner = ScenarioRunner::new(config, store, cli.auto_ack);
    let (report, output) = runner.run_entries(&entries, cli.fail_fast);
    for line in output {
        println!("{line}");
    }

    if cli.json {
        let infos = runner.mission_infos()?;
        println!(
            "{}",
            serde_json::to_string_pretty(&infos).context("failed to encode mission infos")?
        );
    } else {
        for line in runner.manager().dump() {
            println!("{line}");
        }
    }
    println!(
        "scenario: total={} executed={} succeeded={} failed={} halted_early={} clock={}ms",
        report.total,
        report.executed,
        report.succeeded,
        report.failed,
        report.halted_early,
        runner.now_ms()
    );
    if report.failed > 0 {
        bail!("{} scenario command(s) failed", report.failed);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli)
}
