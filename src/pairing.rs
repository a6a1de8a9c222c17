//! Pairing of data-ready and complete events into turnaround samples.
use chrono::NaiveDateTime;
use color_eyre::eyre::{eyre, Result};
use log::warn;

use super::postproc::{Event, EventKind};

/// One reduction turnaround measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct DurationSample {
    /// When the data became ready.
    pub time: NaiveDateTime,
    /// Seconds until the matching complete event.
    pub seconds: f64,
}

/// Bookkeeping from one pairing walk.
#[derive(Debug, Default, Clone, Copy)]
pub struct PairingStats {
    /// Data-ready/complete events considered, after trimming pre-incident noise.
    pub kept: usize,
    /// Every event the node logged.
    pub total: usize,
    /// Orphan events stepped over.
    pub skipped: usize,
    /// Adjacent pairs whose run identifiers disagreed.
    pub mismatches: usize,
}

/// Approximate run identity of a short message: its trailing token group.
///
/// A proper field comparison would need the record kept around; the last
/// four tokens are `facility INSTRUMENT ipts run_number` for every message
/// that matters here.
fn trailing_run_id(message: &str) -> Vec<&str> {
    let tokens: Vec<&str> = message.split_whitespace().collect();
    tokens[tokens.len().saturating_sub(4)..].to_vec()
}

/// Walk a node's event stream and measure data-ready to complete gaps.
///
/// The stream is restricted to the two kinds of interest in their original
/// order, and everything before the first data-ready is discarded. A
/// complete whose run identifier disagrees with the preceding data-ready is
/// reported and the walk advances by one, so the complete is re-examined as
/// a potential new context rather than dropped with its partner.
pub fn pair_durations(
    node: &str,
    events: &[Event],
) -> Result<(Vec<DurationSample>, PairingStats)> {
    let filtered: Vec<&Event> = events
        .iter()
        .filter(|event| matches!(event.kind, EventKind::DataReady | EventKind::Complete))
        .collect();
    println!("BEFORE: {} of {}", filtered.len(), events.len());

    let first_ready = filtered
        .iter()
        .position(|event| event.kind == EventKind::DataReady)
        .ok_or_else(|| eyre!("no data-ready events for {node}"))?;
    let filtered = &filtered[first_ready..];

    let mut stats = PairingStats {
        kept: filtered.len(),
        total: events.len(),
        ..PairingStats::default()
    };
    let mut samples = Vec::new();

    let mut counter = 0;
    while counter + 1 < filtered.len() {
        let current = filtered[counter];
        let next = filtered[counter + 1];
        if current.kind == EventKind::DataReady && next.kind == EventKind::Complete {
            let runid = trailing_run_id(&current.message);
            let runid_next = trailing_run_id(&next.message);
            if runid == runid_next {
                samples.push(DurationSample {
                    time: current.time,
                    seconds: (next.time - current.time).num_seconds() as f64,
                });
                counter += 2;
            } else {
                warn!(
                    "SOMETHING IS WRONG with {node} {} {runid:?} {runid_next:?}",
                    current.time
                );
                stats.mismatches += 1;
                counter += 1;
            }
        } else {
            stats.skipped += 1;
            counter += 1;
        }
    }
    println!("AFTER: {} skipped {}", filtered.len(), stats.skipped);

    Ok((samples, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn event(kind: EventKind, seconds: i64, run: &str) -> Event {
        let base = NaiveDate::from_ymd_opt(2024, 7, 12)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        Event {
            time: base + chrono::Duration::seconds(seconds),
            message: format!("INFO /queue/x: SNS ARCS IPTS-1234 {run}"),
            kind,
        }
    }

    #[test]
    fn clean_alternation_yields_one_sample_per_pair() {
        let events = vec![
            event(EventKind::DataReady, 0, "100"),
            event(EventKind::Complete, 30, "100"),
            event(EventKind::DataReady, 60, "101"),
            event(EventKind::Complete, 150, "101"),
        ];
        let (samples, stats) = pair_durations("AR1", &events).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].seconds, 30.0);
        assert_eq!(samples[1].seconds, 90.0);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.mismatches, 0);
    }

    #[test]
    fn mismatched_run_ids_emit_nothing_and_resume_at_the_complete() {
        let events = vec![
            event(EventKind::DataReady, 0, "100"),
            event(EventKind::Complete, 30, "999"),
            event(EventKind::DataReady, 60, "101"),
            event(EventKind::Complete, 90, "101"),
        ];
        let (samples, stats) = pair_durations("AR2", &events).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].seconds, 30.0);
        assert_eq!(stats.mismatches, 1);
        // the stray complete is stepped over after re-examination
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn intervening_events_are_tolerated() {
        let events = vec![
            event(EventKind::Started, 0, "100"),
            event(EventKind::DataReady, 10, "100"),
            event(EventKind::DataReady, 20, "101"),
            event(EventKind::Complete, 50, "101"),
        ];
        let (samples, stats) = pair_durations("AR4", &events).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].seconds, 30.0);
        // the orphaned first data-ready is counted, not paired
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn events_before_the_first_data_ready_are_discarded() {
        let events = vec![
            event(EventKind::Complete, 0, "099"),
            event(EventKind::DataReady, 10, "100"),
            event(EventKind::Complete, 25, "100"),
        ];
        let (samples, stats) = pair_durations("AR1", &events).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].seconds, 15.0);
        assert_eq!(stats.kept, 2);
    }

    #[test]
    fn no_data_ready_at_all_is_an_error() {
        let events = vec![event(EventKind::Complete, 0, "100")];
        assert!(pair_durations("AR1", &events).is_err());
    }
}
