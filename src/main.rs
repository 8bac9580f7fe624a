use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use manet::{ScenarioBuilder, ScenarioConfig, SimDuration};

/// Run a MANET scenario and print what happened.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario file (TOML). Defaults to the reference scenario.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulated time in seconds.
    #[arg(short, long)]
    time: Option<f64>,

    /// Random seed.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of nodes.
    #[arg(long)]
    size: Option<u32>,

    /// Write the periodic routing-table dumps to this file.
    #[arg(long)]
    routes: Option<PathBuf>,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,

    /// Verbosity; repeat for more (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter_level = match log::LevelFilter::iter().nth(usize::from(args.verbose) + 2) {
        Some(level) => level,
        None => log::LevelFilter::max(),
    };
    env_logger::builder()
        .format_module_path(false)
        .format_target(false)
        .filter_level(filter_level)
        .parse_default_env()
        .init();

    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading scenario file {}", path.display()))?;
            ScenarioConfig::from_toml(&text)
                .with_context(|| format!("loading scenario file {}", path.display()))?
        }
        None => ScenarioConfig::default(),
    };
    if let Some(secs) = args.time {
        config.stop_time = SimDuration::from_secs_f64(secs).context("--time")?;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(size) = args.size {
        config.nodes = size;
    }
    if args.routes.is_none() {
        config.route_dump_interval = SimDuration::ZERO;
    }

    info!(
        "Starting simulation for {:.1} s with {} nodes",
        config.stop_time.as_secs_f64(),
        config.nodes
    );
    let mut scenario = ScenarioBuilder::from_config(config)
        .build()
        .context("building scenario")?;
    let report = scenario.run();

    if let Some(path) = &args.routes {
        fs::write(path, scenario.render_route_dumps())
            .with_context(|| format!("writing routing tables to {}", path.display()))?;
    }

    if args.json {
        println!("{}", report.to_json().context("serialising report")?);
    } else {
        println!("{}", report);
    }
    Ok(())
}
