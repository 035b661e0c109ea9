//! trolleynet-solver - command-line interface
//!
//! Wires the Network/Trolley/Model/Solve layers together for a single
//! operator invocation: either one C3/C4 solve pass, or a full C5
//! refinement run across a Δt schedule.

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use trolleynet_solver::model::{self, Penalties, TruckRestriction};
use trolleynet_solver::network::Network;
use trolleynet_solver::refine::{self, Level, RefineConfig};
use trolleynet_solver::schedule::TruckSchedule;
use trolleynet_solver::solve::{self, GurobiBackend, SolverBackend};
use trolleynet_solver::trolley::{self, PreprocessPolicy};

#[derive(Parser)]
#[command(name = "trolleynet-solver")]
#[command(author = "Network Design Team")]
#[command(version = "0.1.0")]
#[command(about = "Time-expanded multi-commodity network design solver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a single network/trolley instance at one tick resolution.
    Solve {
        /// Network file
        network: PathBuf,
        /// Tick size in hours
        tick_hours: f64,
        /// Wall-clock time of tick zero, in hours
        tick_zero: f64,
        /// Trolley stream CSV
        trolleys: PathBuf,

        /// Write the truck schedule here
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
        /// Also write the truck schedule as pretty-printed JSON here
        #[arg(long)]
        json: Option<PathBuf>,
        /// Read a truck schedule here for warm start / restriction
        #[arg(short = 'i', long)]
        input: Option<PathBuf>,
        /// Time limit in seconds
        #[arg(short = 't', long, default_value = "300")]
        time_limit: f64,
        /// Allowed deviation (hours) when restricting to a previous schedule
        #[arg(short = 'd', long, default_value = "1.0")]
        deviation: f64,
        /// Repair infeasible trolleys instead of filtering them
        #[arg(short = 'm', long)]
        repair: bool,
        /// Warm-start x from the schedule given by -i
        #[arg(short = 'c', long)]
        warm_start: bool,
        /// Solver thread count
        #[arg(long, default_value = "4")]
        threads: u32,
        /// Gurobi MIPFocus parameter
        #[arg(long, default_value = "0")]
        mip_focus: u32,
    },

    /// Run the multi-resolution refinement loop end to end.
    Refine {
        /// Network file
        network: PathBuf,
        /// Trolley stream CSV
        trolleys: PathBuf,

        /// Prefix for each level's truck schedule file (`<prefix>_<level>.trucks`)
        #[arg(short = 'o', long, default_value = "refine")]
        output: PathBuf,
        /// Per-level time limit in seconds
        #[arg(short = 't', long, default_value = "300")]
        time_limit: f64,
        /// Required fractional improvement to keep refining at the same level
        #[arg(long, default_value = "0.01")]
        rho: f64,
        /// Comma-separated `tickHours:deviationHours` schedule
        #[arg(long)]
        levels: Option<String>,
        /// Repair infeasible trolleys instead of filtering them
        #[arg(short = 'm', long)]
        repair: bool,
        /// Solver thread count
        #[arg(long, default_value = "4")]
        threads: u32,
        /// Gurobi MIPFocus parameter
        #[arg(long, default_value = "0")]
        mip_focus: u32,
    },
}

fn parse_levels(spec: &str) -> Result<Vec<Level>, String> {
    spec.split(',')
        .map(|entry| {
            let (tick_hours, deviation) = entry
                .split_once(':')
                .ok_or_else(|| format!("malformed level '{}': expected tickHours:deviationHours", entry))?;
            let tick_hours: f64 = tick_hours.parse().map_err(|_| format!("malformed tick size in level '{}'", entry))?;
            let deviation: f64 = deviation.parse().map_err(|_| format!("malformed deviation in level '{}'", entry))?;
            Ok(Level { tick_hours, deviation })
        })
        .collect()
}

fn load_network(path: &PathBuf, tick_hours: f64, tick_zero: f64) -> Result<Network, String> {
    let file = File::open(path).map_err(|e| format!("failed to open network file {}: {}", path.display(), e))?;
    let mut network = Network::read(BufReader::new(file)).map_err(|e| format!("{}", e))?;
    network.set_discretization(tick_hours, tick_zero);
    network.validate().map_err(|e| format!("{}", e))?;
    Ok(network)
}

#[allow(clippy::too_many_arguments)]
fn run_solve(
    network: PathBuf,
    tick_hours: f64,
    tick_zero: f64,
    trolleys: PathBuf,
    output: Option<PathBuf>,
    json: Option<PathBuf>,
    input: Option<PathBuf>,
    time_limit: f64,
    deviation: f64,
    repair: bool,
    warm_start: bool,
    threads: u32,
    mip_focus: u32,
) -> Result<(), String> {
    let net = load_network(&network, tick_hours, tick_zero)?;
    let trolley_file = File::open(&trolleys).map_err(|e| format!("failed to open trolley stream {}: {}", trolleys.display(), e))?;
    let raw = trolley::read_csv(BufReader::new(trolley_file), &net)?;

    let policy = if repair { PreprocessPolicy::Repair } else { PreprocessPolicy::Filter };
    let processed = trolley::preprocess(&net, &raw, policy).map_err(|e| format!("{}", e))?;
    log::info!("preprocessed {} trolleys ({} modified, {} dropped)", processed.trolleys.len(), processed.modified, processed.dropped_infeasible);

    let previous = input
        .as_ref()
        .map(|path| -> Result<TruckSchedule, String> {
            let file = File::open(path).map_err(|e| format!("failed to open truck schedule {}: {}", path.display(), e))?;
            TruckSchedule::read(BufReader::new(file)).map_err(|e| format!("{}", e))
        })
        .transpose()?;

    let restriction: Option<TruckRestriction> = previous.as_ref().map(|s| s.to_restriction(deviation));
    let warm_starts = match (&previous, warm_start) {
        (Some(schedule), true) => schedule.to_warm_start(&net),
        _ => {
            let (t_min, t_max) = model::tick_horizon(&net, &processed.trolleys).map_err(|e| format!("{}", e))?;
            model::greedy_warm_start(&net, &processed.trolleys, t_min, t_max)
        }
    };

    let penalties = Penalties::default();
    let mut backend = GurobiBackend::new("trolleynet-solve").map_err(|e| format!("{}", e))?;
    let vars = model::build(&net, &processed, restriction.as_ref(), &penalties, &mut backend).map_err(|e| format!("{}", e))?;
    model::apply_warm_start(&vars, &mut backend, &warm_starts).map_err(|e| format!("{}", e))?;
    backend.set_threads(threads).map_err(|e| format!("{}", e))?;
    backend.set_mip_focus(mip_focus).map_err(|e| format!("{}", e))?;

    let status = solve::run_two_phase(&mut backend, time_limit, time_limit).map_err(|e| format!("{}", e))?;
    if !status.has_solution() {
        return Err(format!("solver finished with status {:?}, no solution produced", status));
    }

    let extracted = model::extract(&net, &vars, &backend, &penalties).map_err(|e| format!("{}", e))?;
    let schedule = TruckSchedule::from_extracted(&net, &extracted);

    println!(
        "objective={:.3} distance={:.3} penalty={:.3} unproduced={} undelivered={} trucks={}",
        schedule.objective,
        schedule.distance,
        schedule.penalty,
        schedule.unproduced,
        schedule.undelivered,
        schedule.trucks.len()
    );

    if let Some(output_path) = output {
        let file = File::create(&output_path).map_err(|e| format!("failed to create {}: {}", output_path.display(), e))?;
        let mut writer = BufWriter::new(file);
        schedule.write(&mut writer).map_err(|e| format!("failed to write truck schedule: {}", e))?;
    }

    if let Some(json_path) = json {
        let text = schedule.to_json().map_err(|e| format!("failed to serialize truck schedule: {}", e))?;
        std::fs::write(&json_path, text).map_err(|e| format!("failed to write {}: {}", json_path.display(), e))?;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_refine(
    network: PathBuf,
    trolleys: PathBuf,
    output: PathBuf,
    time_limit: f64,
    rho: f64,
    levels: Option<String>,
    repair: bool,
    threads: u32,
    mip_focus: u32,
) -> Result<(), String> {
    // The network's own discretisation is superseded per-level by the
    // refinement loop; load it at the coarsest requested Δt for validation.
    let levels = match levels {
        Some(spec) => parse_levels(&spec)?,
        None => RefineConfig::default().levels,
    };
    let coarsest = levels.first().map(|l| l.tick_hours).unwrap_or(2.0);
    let net = load_network(&network, coarsest, 0.0)?;

    let trolley_file = File::open(&trolleys).map_err(|e| format!("failed to open trolley stream {}: {}", trolleys.display(), e))?;
    let raw = trolley::read_csv(BufReader::new(trolley_file), &net)?;

    let mut config = RefineConfig::default();
    config.levels = levels;
    config.rho = rho;
    config.time_limit = time_limit;
    config.threads = threads;
    config.mip_focus = mip_focus;
    config.policy = if repair { PreprocessPolicy::Repair } else { PreprocessPolicy::Filter };

    let results = refine::run::<GurobiBackend, _>(&net, &raw, &config, || GurobiBackend::new("trolleynet-refine")).map_err(|e| format!("{}", e))?;

    if results.is_empty() {
        return Err("first refinement level produced no solution".to_string());
    }

    for result in &results {
        println!(
            "level={} tickHours={} objective={:.3} accepted={}",
            result.level, result.tick_hours, result.objective, result.accepted
        );
        let path = format!("{}_{}.trucks", output.display(), result.level);
        let file = File::create(&path).map_err(|e| format!("failed to create {}: {}", path, e))?;
        let mut writer = BufWriter::new(file);
        result.schedule.write(&mut writer).map_err(|e| format!("failed to write {}: {}", path, e))?;
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Solve { network, tick_hours, tick_zero, trolleys, output, json, input, time_limit, deviation, repair, warm_start, threads, mip_focus } => {
            run_solve(network, tick_hours, tick_zero, trolleys, output, json, input, time_limit, deviation, repair, warm_start, threads, mip_focus)
        }
        Commands::Refine { network, trolleys, output, time_limit, rho, levels, repair, threads, mip_focus } => {
            run_refine(network, trolleys, output, time_limit, rho, levels, repair, threads, mip_focus)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            log::error!("{}", message);
            ExitCode::FAILURE
        }
    }
}
