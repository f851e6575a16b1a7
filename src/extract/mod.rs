//! Field scraping for benchmark output.
//!
//! A benchmark reports its results as `<label>: <value>` lines mixed in with
//! arbitrary progress text. Each matching line becomes one entry of a
//! [`FieldRecord`]; everything else is skipped without comment.

use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, trace};

use crate::error::SweepError;
use crate::report::SweepRow;
use crate::sweep::SweepPoint;

/// Matches `<label>: <value>` where value is a decimal, an integer or a boolean.
///
/// The label capture is greedy, so for `a: 1: 2` the label is `a: 1`.
/// Only the start of the line is anchored; trailing units are ignored.
/// Digits are ASCII only and the fractional separator must be a literal `.`.
pub const LINE_PATTERN: &str = r"^\s*(.*):\s([0-9]+\.[0-9]+|[0-9]+|true|false)";

fn line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(LINE_PATTERN).expect("LINE_PATTERN is a valid regex"))
}

/// Returns the label and the literal value text of a matching line.
pub fn extract_field(line: &str) -> Option<(String, String)> {
    let caps = line_regex().captures(line)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// The fields every run must report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    BytesPerTransfer,
    FpgaThroughput,
}

impl Field {
    /// Output column order.
    pub const ALL: [Field; 2] = [Field::BytesPerTransfer, Field::FpgaThroughput];

    /// The label as printed by the benchmark.
    pub fn label(&self) -> &'static str {
        match self {
            Field::BytesPerTransfer => "Bytes per Transfer",
            Field::FpgaThroughput => "FPGA Throughput",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fields scraped from a single run, keyed by label.
#[derive(Debug, Default, Clone)]
pub struct FieldRecord {
    fields: HashMap<String, String>,
}

impl FieldRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the field on `line`, if any. Later lines win for repeated labels.
    pub fn record_line(&mut self, line: &str) {
        match extract_field(line) {
            Some((label, value)) => {
                debug!(label = %label, value = %value, "matched field");
                self.fields.insert(label, value);
            }
            None => trace!(line, "ignored line"),
        }
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.get_label(field.label())
    }

    pub fn get_label(&self, label: &str) -> Option<&str> {
        self.fields.get(label).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Builds the output row for `point`, failing on the first absent field.
    pub fn into_row(mut self, point: &SweepPoint) -> Result<SweepRow, SweepError> {
        let mut take = |field: Field| {
            self.fields
                .remove(field.label())
                .ok_or_else(|| SweepError::MissingField { index: point.index, field })
        };

        let bytes_per_transfer = take(Field::BytesPerTransfer)?;
        let fpga_throughput = take(Field::FpgaThroughput)?;

        Ok(SweepRow {
            index: point.index,
            buffer_size: point.buffer_size,
            bytes_transferred: point.bytes_transferred,
            bytes_per_transfer,
            fpga_throughput,
        })
    }
}

impl<'a> FromIterator<&'a str> for FieldRecord {
    fn from_iter<I: IntoIterator<Item = &'a str>>(lines: I) -> Self {
        let mut record = FieldRecord::new();
        for line in lines {
            record.record_line(line);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(line: &str) -> Option<(String, String)> {
        extract_field(line)
    }

    #[test]
    fn integer_and_decimal_values() {
        assert_eq!(field("Bytes per Transfer: 512"), Some(("Bytes per Transfer".into(), "512".into())));
        assert_eq!(field("FPGA Throughput: 12.34"), Some(("FPGA Throughput".into(), "12.34".into())));
    }

    #[test]
    fn boolean_value_stays_text() {
        assert_eq!(field("Enabled: true"), Some(("Enabled".into(), "true".into())));
        assert_eq!(field("Enabled: false"), Some(("Enabled".into(), "false".into())));
    }

    #[test]
    fn leading_whitespace_is_dropped() {
        assert_eq!(field("   \tLatency: 7"), Some(("Latency".into(), "7".into())));
    }

    #[test]
    fn trailing_units_are_ignored() {
        assert_eq!(field("FPGA Throughput: 10.5 GB/s"), Some(("FPGA Throughput".into(), "10.5".into())));
    }

    #[test]
    fn label_capture_is_greedy() {
        assert_eq!(field("a: 1: 2"), Some(("a: 1".into(), "2".into())));
    }

    #[test]
    fn fraction_needs_a_literal_dot() {
        assert_eq!(field("Time: 1:30"), Some(("Time".into(), "1".into())));
        assert_eq!(field("Size: 12,5"), Some(("Size".into(), "12".into())));
        assert_eq!(field("Rate: 3.x"), Some(("Rate".into(), "3".into())));
    }

    #[test]
    fn only_ascii_digits_count() {
        assert_eq!(field("Count: \u{0663}"), None);
        assert_eq!(field("Count: \u{FF17}2"), None);
    }

    #[test]
    fn non_matching_lines() {
        assert_eq!(field("INFO starting up"), None);
        assert_eq!(field("Some debug info"), None);
        assert_eq!(field("Warning: something went wrong"), None);
        assert_eq!(field("Ratio:3"), None);
        assert_eq!(field(""), None);
    }

    #[test]
    fn record_ignores_noise_and_keeps_last_value() {
        let record: FieldRecord = [
            "Some debug info",
            "FPGA Throughput: 1.0",
            "INFO starting up",
            "Bytes per Transfer: 512",
            "FPGA Throughput: 12.34",
        ]
        .into_iter()
        .collect();

        assert_eq!(record.len(), 2);
        assert_eq!(record.get(Field::BytesPerTransfer), Some("512"));
        assert_eq!(record.get(Field::FpgaThroughput), Some("12.34"));
    }

    #[test]
    fn into_row_copies_captured_text() {
        let record: FieldRecord = ["FPGA Throughput: 12.34", "Bytes per Transfer: 512"]
            .into_iter()
            .collect();
        let row = record.into_row(&SweepPoint::new(8)).unwrap();

        assert_eq!(row.bytes_per_transfer, "512");
        assert_eq!(row.fpga_throughput, "12.34");
        assert_eq!(row.buffer_size, 256);
        assert_eq!(row.bytes_transferred, 16384);
    }

    #[test]
    fn into_row_reports_missing_field() {
        let record: FieldRecord = ["Bytes per Transfer: 512"].into_iter().collect();
        match record.into_row(&SweepPoint::new(11)) {
            Err(SweepError::MissingField { index, field }) => {
                assert_eq!(index, 11);
                assert_eq!(field, Field::FpgaThroughput);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
