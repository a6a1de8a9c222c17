//! Parser for the manually collected list of autoreducer restarts.
//!
//! The file is a hand-edited capture: a node-name header line (with the
//! facility domain still attached) followed by comma-delimited timestamp
//! lines, repeated per node. Anything else in the file is ignored.
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDateTime;
use color_eyre::eyre::{eyre, Result};
use rustc_hash::FxHashMap;

use super::postproc::{DATE_PREFIX, TIME_FORMAT};

pub type RestartMap = FxHashMap<String, Vec<NaiveDateTime>>;

pub fn load_restarts(path: &Path) -> Result<RestartMap> {
    parse_restarts(BufReader::new(File::open(path)?))
}

fn parse_restarts<R: BufRead>(reader: R) -> Result<RestartMap> {
    let mut restarts = RestartMap::default();
    let mut key = String::from("junk");
    for line in reader.lines() {
        // strip whitespace and the facility domain
        let line = line?.trim().replace(".sns.gov:", "");
        if line.starts_with("autoreducer") {
            key = line;
            restarts.insert(key.clone(), Vec::new());
        } else if line.starts_with(DATE_PREFIX) {
            let stamp = line.split(',').next().unwrap_or(&line);
            let stamp = NaiveDateTime::parse_from_str(stamp, TIME_FORMAT)?;
            restarts
                .get_mut(&key)
                .ok_or_else(|| eyre!("restart timestamp before any node header"))?
                .push(stamp);
        }
        // don't bother with the other lines
    }
    Ok(restarts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Cursor;

    #[test]
    fn headers_lose_the_domain_and_collect_timestamps() {
        let text = "\
autoreducer1.sns.gov:
2024-07-11 22:15:03,456 systemd restart
2024-07-12 01:00:00

autoreducer2.sns.gov:
some operator note
2024-07-13 05:06:07,000
";
        let restarts = parse_restarts(Cursor::new(text)).unwrap();
        assert_eq!(restarts.len(), 2);
        assert_eq!(
            restarts["autoreducer1"],
            vec![
                NaiveDate::from_ymd_opt(2024, 7, 11)
                    .unwrap()
                    .and_hms_opt(22, 15, 3)
                    .unwrap(),
                NaiveDate::from_ymd_opt(2024, 7, 12)
                    .unwrap()
                    .and_hms_opt(1, 0, 0)
                    .unwrap(),
            ]
        );
        assert_eq!(restarts["autoreducer2"].len(), 1);
    }

    #[test]
    fn timestamp_before_any_header_is_an_error() {
        let text = "2024-07-11 22:15:03\nautoreducer1:\n";
        assert!(parse_restarts(Cursor::new(text)).is_err());
    }
}
