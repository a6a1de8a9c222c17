//! Loading of the completed-run table exported from the run database.
use std::io::Read;
use std::path::Path;

use chrono::{Duration, NaiveDateTime};
use color_eyre::eyre::Result;
use serde::Deserialize;

use super::postproc::TIME_FORMAT;

/// One row of the export, as written by the run database.
#[derive(Debug, Deserialize)]
struct RawRun {
    #[serde(rename = "Instrument")]
    instrument: String,
    #[serde(rename = "Experiment")]
    experiment: String,
    #[serde(rename = "Run Number")]
    run_number: i64,
    /// DAQ duration in seconds.
    #[serde(rename = "Duration")]
    duration: f64,
    #[serde(rename = "End Time")]
    end_time: String,
}

/// A completed acquisition run, with the duration converted to hours.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub instr: String,
    pub exp: String,
    pub runnum: i64,
    pub duration: f64,
    pub endtime: NaiveDateTime,
}

impl TryFrom<RawRun> for RunRecord {
    type Error = color_eyre::eyre::Report;

    fn try_from(raw: RawRun) -> Result<Self> {
        Ok(Self {
            instr: raw.instrument,
            exp: raw.experiment,
            runnum: raw.run_number,
            duration: raw.duration / 3600.0,
            endtime: NaiveDateTime::parse_from_str(&raw.end_time, TIME_FORMAT)?,
        })
    }
}

pub fn load_runs(path: &Path) -> Result<Vec<RunRecord>> {
    parse_runs(csv::Reader::from_path(path)?)
}

fn parse_runs<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<RunRecord>> {
    let mut runs = Vec::new();
    for row in reader.deserialize() {
        let raw: RawRun = row?;
        runs.push(RunRecord::try_from(raw)?);
    }
    Ok(runs)
}

/// Sorted unique instrument names across the table.
pub fn instruments(runs: &[RunRecord]) -> Vec<String> {
    let mut names: Vec<String> = runs.iter().map(|run| run.instr.clone()).collect();
    names.sort();
    names.dedup();
    names
}

/// Print how often each instrument finished a run over the observed window.
///
/// The window is last row minus first row, in file order.
pub fn print_run_rates(runs: &[RunRecord], instruments: &[String]) {
    let (Some(first), Some(last)) = (runs.first(), runs.last()) else {
        return;
    };
    let time_range = last.endtime - first.endtime;
    for instr in instruments {
        let number = runs.iter().filter(|run| &run.instr == instr).count();
        println!(
            "{instr:7} - {number:4} runs - 1 run every {}",
            human_delta(time_range / number as i32)
        );
    }
    println!(
        "Overall 1 run every {}",
        human_delta(time_range / runs.len() as i32)
    );
    println!(
        "    observed over {} for {} runs",
        human_delta(time_range),
        runs.len()
    );
}

/// `days HH:MM:SS` rendering for a time delta.
fn human_delta(delta: Duration) -> String {
    let total = delta.num_seconds();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    if days > 0 {
        format!("{days} days {hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}
