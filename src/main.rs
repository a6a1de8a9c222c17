//! # correlator
//!
//! > What's past is prologue.
//! >
//! > -- The Tempest
//!
//! Between July 11 and July 15, 2024 the automated reduction pipeline fell
//! over for days while the instruments kept acquiring. The evidence is
//! scattered across logs that were never meant to be read together: a run
//! table exported from the run database, the workflow manager's container
//! log, each autoreducer's post-processing log, and a hand-collected list of
//! service restarts.
//!
//! The correlator reads all of them, normalizes every line into typed
//! timestamped events, pairs reduction data-ready/complete events into
//! turnaround measurements, and puts the whole incident on one shared time
//! axis so cause and effect can finally be seen in the same place.
//!
//! ## Use
//!
//! ```txt
//! correlator
//! ```
//!
//! Run from the directory holding the incident logs; with no arguments the
//! built-in July 2024 file set is used. A different layout can be described
//! in a YAML file:
//!
//! ```txt
//! correlator --config/-c /path/to/some/config.yml
//! ```
//!
//! and a template can be generated with the `new` command:
//!
//! ```txt
//! correlator --config/-c /path/to/some/config.yml new
//! ```
//!
//! ### Configuration
//!
//! ```yaml
//! data_path: "."
//! runs_csv: "runs-for-peterson.csv"
//! restarts_file: "AR_restarts"
//! workflow_log: "workflow_manager_20240711_20240715.log"
//! ar_nodes: [1, 2, 4]
//! ```
//!
//! ## Inputs
//!
//! - The run table is a CSV with columns Instrument, Experiment, Run Number,
//!   Duration (seconds) and End Time.
//! - The restart list is a hand-edited text file: node-name header lines
//!   followed by comma-delimited timestamp lines.
//! - The workflow-manager log is JSON lines with `log` and `time` fields,
//!   recorded in UTC (shifted 4 hours on load).
//! - The post-processing logs are one file per autoreducer node, lines
//!   prefixed with a local timestamp.
//!
//! ## Output
//!
//! Diagnostic counts and per-instrument run rates on standard output, and an
//! interactive three-panel chart: acquisition cadence, reduction turnaround,
//! and node health. Nothing is written to disk.
mod chart;
mod config;
mod pairing;
mod postproc;
mod restarts;
mod runs;
mod workflow;

use clap::{Arg, Command};
use color_eyre::eyre::Result;
use human_bytes::human_bytes;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::PathBuf;

use chart::{ChartData, NodeSeries};
use config::Config;

/// Add up the on-disk size of every input about to be read.
fn total_input_bytes(config: &Config) -> u64 {
    let mut paths = vec![
        config.runs_csv_path(),
        config.restarts_path(),
        config.workflow_log_path(),
    ];
    paths.extend(config.ar_nodes.iter().map(|node| config.postproc_log_path(*node)));
    paths
        .iter()
        .filter_map(|path| path.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

/// Main processing loop. Loads every log, pairs durations, opens the chart.
pub fn correlate(config: Config) -> Result<()> {
    let runs = runs::load_runs(&config.runs_csv_path())?;
    let instruments = runs::instruments(&runs);
    runs::print_run_rates(&runs, &instruments);

    let restarts = restarts::load_restarts(&config.restarts_path())?;

    let workflow = workflow::load_workflow_log(&config.workflow_log_path())?;
    println!("There are {} data manager errors", workflow.len());

    let mut nodes = Vec::new();
    for &number in &config.ar_nodes {
        let path = config.postproc_log_path(number);
        let total = postproc::count_log_lines(&path)?;
        let progress = ProgressBar::new(total)
            .with_style(ProgressStyle::with_template(
                "{msg}: {bar:40.cyan/blue} [{human_pos}/{human_len} - {percent}%] (ETA: {eta}, Duration: {elapsed})",
            )?)
            .with_message(format!("AR{number}"));
        let events = postproc::load_postproc_log(&path, &progress)?;
        progress.finish();

        let (durations, stats) = pairing::pair_durations(&format!("AR{number}"), &events)?;
        info!(
            "AR{number}: {} turnaround samples from {} events ({} skipped, {} mismatched)",
            durations.len(),
            stats.kept,
            stats.skipped,
            stats.mismatches
        );
        nodes.push(NodeSeries {
            number,
            events,
            durations,
        });
    }

    chart::show_chart(ChartData {
        runs,
        instruments,
        restarts,
        workflow,
        nodes,
    })
}

/// Program entry point. Handles the CLI.
fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Command::new("correlator")
        .subcommand(Command::new("new").about("Create a new template config file"))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to a configuration file (YAML)"),
        )
        .get_matches();

    println!("------------------- AR outage correlator --------------------");

    // Handle the new subcommand
    if let Some(("new", _)) = cli.subcommand() {
        let config_path = PathBuf::from(
            cli.get_one::<String>("config")
                .map(String::as_str)
                .unwrap_or("correlator.yml"),
        );
        println!(
            "Making a template configuration file at {}...",
            config_path.display()
        );
        Config::default().save(&config_path)?;
        println!("Done.");
        println!("-------------------------------------------------------------");
        return Ok(());
    }

    let config = match cli.get_one::<String>("config") {
        Some(path) => {
            let path = PathBuf::from(path);
            let config = Config::load(&path)?;
            println!("Successfully loaded configuration from {}", path.display());
            config
        }
        None => Config::default(),
    };

    if !config.data_path.exists() {
        println!(
            "Data path {} does not exist! Quitting.",
            config.data_path.display()
        );
        println!("-------------------------------------------------------------");
        return Ok(());
    }

    println!(
        "Total amount of data to be correlated: {}",
        human_bytes(total_input_bytes(&config) as f64)
    );
    correlate(config)?;

    println!("-------------------------------------------------------------");

    Ok(())
}
