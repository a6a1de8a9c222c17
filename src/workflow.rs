//! Error extraction from the workflow-manager container log.
//!
//! The container logs JSON lines. Only entries whose text mentions an error
//! are kept, a known-benign syntax error is dropped, and the rest are
//! bucketed into a small set of categories for the health panel.
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDateTime};
use color_eyre::eyre::Result;
use serde::Deserialize;

pub const ONCAT_ERROR: &str = "CATALOG.ONCAT.ERROR";
pub const CATALOG_ERROR: &str = "CATALOG.ERROR";
pub const REDUCTION_ENV: &str = "REDUCTION: Failed to find launcher:";
pub const REDUCTION_ERROR: &str = "REDUCTION.ERROR";
pub const NO_FILE: &str = "Data file does not exist or is not readable";
pub const CALVERA: &str = "CALVERA.RAW.ERROR";

/// The workflow manager records UTC; every other log is local time. The
/// shift is a constant, not derived from timezone rules.
const UTC_SHIFT_HOURS: i64 = 4;

/// Error categories reported by the workflow manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    OncatError,
    CatalogError,
    Calvera,
    NoFile,
    ReductionEnv,
    ReductionError,
    Unknown,
}

impl ErrorKind {
    /// Bucket a log message; precedence is fixed, first match wins.
    pub fn of(log: &str) -> Self {
        if log.contains(ONCAT_ERROR) {
            Self::OncatError
        } else if log.contains(CATALOG_ERROR) {
            Self::CatalogError
        } else if log.contains(CALVERA) {
            Self::Calvera
        } else if log.contains(NO_FILE) {
            Self::NoFile
        } else if log.contains(REDUCTION_ENV) {
            Self::ReductionEnv
        } else if log.contains(REDUCTION_ERROR) {
            Self::ReductionError
        } else {
            Self::Unknown
        }
    }
}

#[derive(Debug, Deserialize)]
struct WorkflowLine {
    log: String,
    time: String,
}

/// One retained error entry, timestamp already shifted to local time.
#[derive(Debug, Clone)]
pub struct WorkflowError {
    pub time: NaiveDateTime,
    pub message: String,
    pub kind: ErrorKind,
}

pub fn load_workflow_log(path: &Path) -> Result<Vec<WorkflowError>> {
    parse_workflow_log(BufReader::new(File::open(path)?))
}

fn parse_workflow_log<R: BufRead>(reader: R) -> Result<Vec<WorkflowError>> {
    let mut errors = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !(line.contains("error") || line.contains("ERROR") || line.contains("Error")) {
            continue;
        }
        let item: WorkflowLine = serde_json::from_str(line.trim())?;
        if item.log.starts_with("SyntaxError") {
            continue;
        }
        let time = DateTime::parse_from_rfc3339(&item.time)?.naive_utc()
            - Duration::hours(UTC_SHIFT_HOURS);
        let kind = ErrorKind::of(&item.log);
        errors.push(WorkflowError {
            time,
            message: item.log,
            kind,
        });
    }
    Ok(errors)
}
