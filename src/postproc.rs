//! Classifier for the per-node post-processing logs.
//!
//! Each autoreducer writes a line-oriented log where interesting lines open
//! with a local timestamp and carry a message naming one of the catalog or
//! reduction queues, usually with an embedded JSON record identifying the
//! run. This module turns those lines into [`Event`]s: a parsed timestamp, a
//! shortened message for display, and a coarse [`EventKind`] used later to
//! pair data-ready and complete events.
//!
//! A malformed embedded record aborts the whole file load. Lines that do not
//! open with the incident date prefix are dropped without comment.
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDateTime;
use color_eyre::eyre::{eyre, Result};
use indicatif::ProgressBar;
use serde_json::Value;

/// Timestamp layout shared by the run table, the restart list and the
/// post-processing logs.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Only lines from the incident month are considered at all.
pub const DATE_PREFIX: &str = "2024-07-";

// Queue names as they appear in the logs.
pub const CAT_DATA_READY: &str = "/queue/CATALOG.ONCAT.DATA_READY:";
pub const CAT_STARTED: &str = "/queue/CATALOG.ONCAT.STARTED:";
pub const CAT_COMPLETE: &str = "/queue/CATALOG.ONCAT.COMPLETE:";
pub const REDUX_DATA_READY: &str = "/queue/REDUCTION.DATA_READY:";
pub const REDUX_STARTED: &str = "/queue/REDUCTION.STARTED:";
pub const REDUX_COMPLETE: &str = "/queue/REDUCTION.COMPLETE:";
pub const REDUX_DISABLED: &str = "/queue/REDUCTION.DISABLED:";
pub const REDUX_CREATE_SCRIPT: &str = "/queue/REDUCTION.CREATE_SCRIPT:";
pub const REDUX_CAT_DATA_READY: &str = "/queue/REDUCTION_CATALOG.DATA_READY";
pub const REDUX_CAT_STARTED: &str = "/queue/REDUCTION_CATALOG.STARTED:";
pub const REDUX_CAT_COMPLETE: &str = "/queue/REDUCTION_CATALOG.COMPLETE";

/// Every queue whose messages carry an embedded run record.
const RUN_ID_QUEUES: [&str; 10] = [
    CAT_DATA_READY,
    CAT_STARTED,
    CAT_COMPLETE,
    REDUX_DATA_READY,
    REDUX_STARTED,
    REDUX_COMPLETE,
    REDUX_DISABLED,
    REDUX_CAT_DATA_READY,
    REDUX_CAT_STARTED,
    REDUX_CAT_COMPLETE,
];

/// Coarse lifecycle tag for a log line, independent of the short message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    DataReady,
    Started,
    Complete,
    Disabled,
    CatalogStarted,
    Unknown,
}

impl EventKind {
    /// Tag a raw message by ordered marker containment; first match wins.
    pub fn of(message: &str) -> Self {
        if message.contains(REDUX_STARTED) {
            Self::Started
        } else if message.contains(REDUX_COMPLETE) {
            Self::Complete
        } else if message.contains(REDUX_DATA_READY) {
            Self::DataReady
        } else if message.contains(REDUX_DISABLED) {
            Self::Disabled
        } else if message.contains(CAT_STARTED) || message.contains(REDUX_CAT_STARTED) {
            Self::CatalogStarted
        } else {
            Self::Unknown
        }
    }
}

/// One classified log line.
#[derive(Debug, Clone)]
pub struct Event {
    pub time: NaiveDateTime,
    pub message: String,
    pub kind: EventKind,
}

/// Whether the message carries an embedded run record.
///
/// The queue tests are an OR across the whole set, all case-sensitive. The
/// queue-listing banner and CREATE_SCRIPT messages name queues without
/// carrying a record, so they are excluded up front.
pub fn has_run_id(message: &str) -> bool {
    if message.contains("Input queues:") || message.contains(REDUX_CREATE_SCRIPT) {
        return false;
    }
    RUN_ID_QUEUES.iter().any(|queue| message.contains(queue))
}

/// Pull the embedded run record out of a message and render it as
/// `facility INSTRUMENT ipts run_number`.
///
/// The record is taken from the first `{` to the last `}` so payloads with
/// nested objects stay intact. Instrument names are upper-cased; numeric and
/// string fields are both accepted. Any malformation is an error and the
/// caller aborts the whole file load.
pub fn extract_run_id(message: &str) -> Result<String> {
    let start = message
        .find('{')
        .ok_or_else(|| eyre!("no run record in message: {message}"))?;
    let stop = message
        .rfind('}')
        .ok_or_else(|| eyre!("unterminated run record in message: {message}"))?;
    if stop < start {
        return Err(eyre!("malformed run record in message: {message}"));
    }
    let record: Value = serde_json::from_str(&message[start..=stop])?;
    Ok(format!(
        "{} {} {} {}",
        field_text(&record, "facility")?,
        field_text(&record, "instrument")?.to_uppercase(),
        field_text(&record, "ipts")?,
        field_text(&record, "run_number")?,
    ))
}

/// Render a record field that may be either a JSON string or a number.
fn field_text(record: &Value, name: &str) -> Result<String> {
    match record.get(name) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(Value::Number(number)) => Ok(number.to_string()),
        Some(other) => Err(eyre!("run record field {name} has unexpected shape: {other}")),
        None => Err(eyre!("run record is missing field {name}")),
    }
}

/// Rewrite a raw message into the short form used for display and pairing.
///
/// Order matters: the heartbeat suffix short-circuits everything, subprocess
/// messages recurse on their payload and are re-prefixed, then severity
/// prefixes are rewritten, and finally a few known-noisy shapes are
/// compacted, first match wins.
pub fn clean_message(message: &str) -> Result<String> {
    if message.ends_with("Sending frame: 'SEND'") {
        return Ok(String::from("HEARTBEAT"));
    }
    if message.starts_with("SUBPROCESS/") {
        let payload = join_from(message, 3);
        return Ok(format!("SUB-{}", clean_message(&payload)?));
    }

    let mut message = if message.starts_with("INFO/") {
        let rewritten = if has_run_id(message) {
            format!(
                "{} {}",
                nth_token(message, 1),
                extract_run_id(&join_from(message, 2))?
            )
        } else {
            join_from(message, 1)
        };
        format!("INFO {rewritten}")
    } else if message.starts_with("WARNING/") {
        format!("WARN {}", join_from(message, 1))
    } else {
        message.to_string()
    };

    // shorten commands
    if message.starts_with("WARN Command") {
        if has_run_id(&message) {
            let queue = message
                .split(',')
                .nth(3)
                .ok_or_else(|| eyre!("short admin command line: {message}"))?;
            message = format!(
                "WARN PostProcessAdmin.py -q{queue} {}",
                extract_run_id(&message)?
            );
        }
    } else if message.starts_with("INFO Created thread") {
        message = String::from("INFO Created thread to start daemon");
    } else if message.starts_with("INFO Starting receiver loop") {
        message = String::from("INFO Starting receiver loop");
    }

    Ok(message)
}

/// Whitespace tokens from `start` onward, space-joined.
fn join_from(message: &str, start: usize) -> String {
    message
        .split_whitespace()
        .skip(start)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A single whitespace token, or empty when the message is too short.
fn nth_token(message: &str, index: usize) -> &str {
    message.split_whitespace().nth(index).unwrap_or("")
}

/// Classify one raw line, or `None` when it lacks the date prefix.
pub fn classify_line(line: &str) -> Result<Option<Event>> {
    if !line.starts_with(DATE_PREFIX) {
        return Ok(None);
    }
    let mut tokens = line.split_whitespace();
    let date = tokens.next().unwrap_or("");
    let clock = tokens.next().unwrap_or("");
    let stamp = if clock.is_empty() {
        date.to_string()
    } else {
        format!("{date} {clock}")
    };
    let message = line.replace(&stamp, "");
    let message = message.trim();

    // the clock carries milliseconds after a comma
    let seconds = stamp.split(',').next().unwrap_or(&stamp);
    let time = NaiveDateTime::parse_from_str(seconds, TIME_FORMAT)?;

    let kind = EventKind::of(message);
    let message = clean_message(message)?;
    Ok(Some(Event { time, message, kind }))
}

/// Number of lines in a log, for sizing the progress bar.
pub fn count_log_lines(path: &Path) -> Result<u64> {
    let reader = BufReader::new(File::open(path)?);
    Ok(reader.lines().count() as u64)
}

/// Load one node's post-processing log into classified events.
pub fn load_postproc_log(path: &Path, progress: &ProgressBar) -> Result<Vec<Event>> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        progress.inc(1);
        if let Some(event) = classify_line(line.trim())? {
            events.push(event);
        }
    }
    println!("THERE ARE {} messages", events.len());
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record() -> &'static str {
        r#"{"facility": "SNS", "instrument": "arcs", "ipts": "IPTS-1234", "run_number": 56789}"#
    }

    #[test]
    fn heartbeat_short_circuits() {
        let msg = "INFO/SNS.COMMON stomp.py: Sending frame: 'SEND'";
        assert_eq!(clean_message(msg).unwrap(), "HEARTBEAT");
    }

    #[test]
    fn subprocess_reprefixes_the_cleaned_payload() {
        let msg = "SUBPROCESS/2931/ 12:00:00 stdout stomp.py: Sending frame: 'SEND'";
        assert_eq!(clean_message(msg).unwrap(), "SUB-HEARTBEAT");

        let msg = "SUBPROCESS/2931/ 12:00:00 stdout something unrecognized";
        assert_eq!(clean_message(msg).unwrap(), "SUB-something unrecognized");
    }

    #[test]
    fn run_id_fields_join_in_order() {
        let msg = format!("{REDUX_DATA_READY} data ready {}", record());
        assert_eq!(extract_run_id(&msg).unwrap(), "SNS ARCS IPTS-1234 56789");
    }

    #[test]
    fn malformed_record_is_fatal() {
        assert!(extract_run_id("no braces at all").is_err());
        assert!(extract_run_id("stuff { not json }").is_err());
        assert!(extract_run_id(r#"stuff {"facility": "SNS"}"#).is_err());
        assert!(extract_run_id("backwards } {").is_err());
    }

    #[test]
    fn info_line_with_run_id_is_shortened() {
        let line = format!(
            "2024-07-12 08:00:00,123 INFO/SNS.ARCS {REDUX_DATA_READY} {}",
            record()
        );
        let event = classify_line(&line).unwrap().unwrap();
        assert_eq!(event.kind, EventKind::DataReady);
        assert_eq!(
            event.message,
            format!("INFO {REDUX_DATA_READY} SNS ARCS IPTS-1234 56789")
        );
        assert_eq!(
            event.time,
            NaiveDate::from_ymd_opt(2024, 7, 12)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn severity_prefixes_become_short_tags() {
        assert_eq!(
            clean_message("WARNING/SNS.COMMON connection lost").unwrap(),
            "WARN connection lost"
        );
        assert_eq!(
            clean_message("INFO/SNS.COMMON Input queues: ['/queue/REDUCTION.DATA_READY:']")
                .unwrap(),
            "INFO Input queues: ['/queue/REDUCTION.DATA_READY:']"
        );
    }

    #[test]
    fn known_shapes_are_compacted() {
        assert_eq!(
            clean_message("INFO/SNS.COMMON Created thread <Thread(Thread-7)>").unwrap(),
            "INFO Created thread to start daemon"
        );
        assert_eq!(
            clean_message("INFO/SNS.COMMON Starting receiver loop for /queue/FOO").unwrap(),
            "INFO Starting receiver loop"
        );
    }

    #[test]
    fn admin_command_is_rewritten() {
        let msg = format!(
            "WARNING/SNS.COMMON Command python, PostProcessAdmin.py, -q, {REDUX_DATA_READY} {}",
            record()
        );
        let cleaned = clean_message(&msg).unwrap();
        assert!(cleaned.starts_with("WARN PostProcessAdmin.py -q"));
        assert!(cleaned.ends_with("SNS ARCS IPTS-1234 56789"));
    }

    #[test]
    fn create_script_messages_carry_no_run_id() {
        let msg = format!("{REDUX_CREATE_SCRIPT} {}", record());
        assert!(!has_run_id(&msg));
    }

    #[test]
    fn line_without_date_prefix_is_dropped() {
        assert!(classify_line("Traceback (most recent call last):")
            .unwrap()
            .is_none());
        assert!(classify_line("").unwrap().is_none());
    }

    #[test]
    fn kind_tagging_is_independent_of_cleaning() {
        let line = format!(
            "2024-07-12 08:00:00,123 INFO/SNS.ARCS {REDUX_STARTED} {}",
            record()
        );
        let event = classify_line(&line).unwrap().unwrap();
        assert_eq!(event.kind, EventKind::Started);

        let line = "2024-07-12 08:00:01,456 INFO/SNS.COMMON Starting receiver loop";
        let event = classify_line(line).unwrap().unwrap();
        assert_eq!(event.kind, EventKind::Unknown);
    }
}
