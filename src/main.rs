use std::env;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use solver_scheduler::config::SolverSchedulerConfig;
use solver_scheduler::core::scheduler::interface::{
    SchedulerContext, SnapshotInstanceLocator, StaticHostStateProvider,
};
use solver_scheduler::core::scheduler::solver_scheduler::SolverScheduler;
use solver_scheduler::printer::{print_placements, OutputFormat};
use solver_scheduler::scenario::Scenario;

#[derive(Parser)]
struct Args {
    #[clap(short, long)]
    config_file: std::path::PathBuf,
    #[clap(short, long)]
    scenario_file: std::path::PathBuf,
    #[clap(short, long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

fn run(args: &Args) -> Result<(), String> {
    info!("Path to config file: {:?}", args.config_file);
    info!("Path to scenario file: {:?}", args.scenario_file);

    let config = SolverSchedulerConfig::from_file(&args.config_file).map_err(|e| e.to_string())?;
    let scenario = Scenario::from_file(&args.scenario_file).map_err(|e| e.to_string())?;
    info!(
        "Scheduling {} instances on {} hosts",
        scenario.request_spec.num_instances,
        scenario.hosts.len()
    );

    let provider = StaticHostStateProvider::new(scenario.hosts);
    let scheduler =
        SolverScheduler::from_config(config, Box::new(provider)).map_err(|e| e.to_string())?;

    let context = SchedulerContext::new(
        &scenario.request_id,
        std::sync::Arc::new(SnapshotInstanceLocator),
    );
    let mut filter_properties = scenario.filter_properties;
    scheduler
        .populate_filter_properties(&scenario.request_spec, &mut filter_properties)
        .map_err(|e| e.to_string())?;
    let placements = scheduler
        .schedule(&context, &scenario.request_spec, filter_properties)
        .map_err(|e| e.to_string())?;

    print_placements(
        &mut std::io::stdout().lock(),
        &scenario.request_id,
        &placements,
        args.format,
    )
    .map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    // log level INFO by default
    let mut env_logger_builder = env_logger::builder();
    if env::var("RUST_LOG").is_err() {
        env_logger_builder.filter_level(log::LevelFilter::Info);
    }
    env_logger_builder.init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
