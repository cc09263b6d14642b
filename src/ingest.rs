use std::io::{self, BufRead};

use rollstat_core::stats::{StatsEvent, StatsSender};
use tracing::{debug, warn};

pub const DEFAULT_METRIC: &str = "default";

#[derive(Debug, Clone, PartialEq)]
pub struct MetricValue {
    pub metric: String,
    pub value: f64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseLineError {
    #[error("Expected \"<value>\" or \"<metric> <value>\".")]
    UnexpectedFieldCount,

    #[error("Value {0:?} is not a finite number.")]
    InvalidValue(String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub accepted: usize,
    pub rejected: usize,
}

/// Parses `<value>` or `<metric> <value>`. Blank lines and `#` comments
/// yield `None`.
pub fn parse_line(line: &str) -> Result<Option<MetricValue>, ParseLineError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    let (metric, raw_value) = match fields.as_slice() {
        [value] => (DEFAULT_METRIC, *value),
        [metric, value] => (*metric, *value),
        _ => return Err(ParseLineError::UnexpectedFieldCount),
    };
    let value = raw_value
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ParseLineError::InvalidValue(raw_value.to_string()))?;

    Ok(Some(MetricValue {
        metric: metric.to_string(),
        value,
    }))
}

/// Feeds every valid line of `reader` into the monitor. Malformed lines are
/// logged and skipped.
pub fn ingest<R: BufRead>(reader: R, sender: &StatsSender) -> io::Result<IngestSummary> {
    let mut summary = IngestSummary::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        match parse_line(&line) {
            Ok(Some(MetricValue { metric, value })) => {
                let event = StatsEvent::Observation { metric, value };
                if sender.send_blocking(event).is_err() {
                    warn!("Stats processor stopped, ignoring remaining input");
                    break;
                }
                summary.accepted += 1;
            }
            Ok(None) => (),
            Err(err) => {
                warn!(line = index + 1, %err, "Skipping malformed line");
                summary.rejected += 1;
            }
        }
    }
    debug!(?summary, "Input finished");
    Ok(summary)
}
