use prettytable::{row, Table};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::SweepError;

/// Header line of the results file. Column names are quoted.
pub const CSV_HEADER: &str = "\"Bytes per Transfer\", \"FPGA Throughput\"";

/// One completed run. Field values are kept as the text the benchmark printed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SweepRow {
    pub index: u32,
    pub buffer_size: u64,
    pub bytes_transferred: u64,
    pub bytes_per_transfer: String,
    pub fpga_throughput: String,
}

impl SweepRow {
    /// The data line written for this run, without the newline.
    pub fn csv_line(&self) -> String {
        format!("{}, {}", self.bytes_per_transfer, self.fpga_throughput)
    }
}

/// Results file writer. The header goes out on creation; each row is flushed
/// as soon as it is written so completed runs survive a later failure.
pub struct CsvWriter {
    out: BufWriter<File>,
}

impl CsvWriter {
    /// Creates (or truncates) `path` and writes the header line.
    pub fn create(path: &Path) -> Result<Self, SweepError> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "{}", CSV_HEADER)?;
        out.flush()?;
        Ok(Self { out })
    }

    pub fn write_row(&mut self, row: &SweepRow) -> Result<(), SweepError> {
        writeln!(self.out, "{}", row.csv_line())?;
        self.out.flush()?;
        Ok(())
    }
}

pub fn write_json_results(rows: &[SweepRow], file_path: &Path) -> Result<(), SweepError> {
    let json = serde_json::to_string_pretty(rows)?;
    fs::write(file_path, json)?;
    Ok(())
}

pub fn read_json_results(file_path: &Path) -> Result<Vec<SweepRow>, SweepError> {
    let file_content = fs::read_to_string(file_path)?;
    Ok(serde_json::from_str(&file_content)?)
}

/// Mean of the throughput values that parse as numbers.
pub fn average_throughput(rows: &[SweepRow]) -> Option<f64> {
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|r| r.fpga_throughput.parse::<f64>().ok())
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn build_results_table(rows: &[SweepRow]) -> Table {
    let mut table = Table::new();
    table.add_row(row![
        "Exponent",
        "Buffer Size",
        "Bytes Transferred",
        "Bytes per Transfer",
        "FPGA Throughput"
    ]);

    for result in rows {
        table.add_row(row![
            result.index,
            result.buffer_size,
            result.bytes_transferred,
            &result.bytes_per_transfer,
            &result.fpga_throughput,
        ]);
    }

    let average = average_throughput(rows)
        .map(|avg| format!("{:.2}", avg))
        .unwrap_or_else(|| "-".to_string());
    table.add_row(row!["AVERAGE", "", "", "", average]);

    table
}

pub fn print_sweep_results(rows: &[SweepRow]) {
    println!("\nSweep results ({} runs)", rows.len());
    build_results_table(rows).printstd();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(index: u32, bytes: &str, throughput: &str) -> SweepRow {
        SweepRow {
            index,
            buffer_size: 1 << index,
            bytes_transferred: (1u64 << index) * 512 / 8,
            bytes_per_transfer: bytes.to_string(),
            fpga_throughput: throughput.to_string(),
        }
    }

    #[test]
    fn csv_line_is_comma_space_separated() {
        assert_eq!(row(8, "512", "10.0").csv_line(), "512, 10.0");
    }

    #[test]
    fn writer_emits_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");

        let mut writer = CsvWriter::create(&path).unwrap();
        writer.write_row(&row(8, "512", "10.0")).unwrap();
        writer.write_row(&row(9, "1024", "20.0")).unwrap();

        // Rows are on disk before the writer is dropped.
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "\"Bytes per Transfer\", \"FPGA Throughput\"\n512, 10.0\n1024, 20.0\n");
    }

    #[test]
    fn create_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(&path, "stale\nstale\nstale\n").unwrap();

        drop(CsvWriter::create(&path).unwrap());

        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{}\n", CSV_HEADER));
    }

    #[test]
    fn average_skips_non_numeric_values() {
        let rows = vec![row(8, "512", "10.0"), row(9, "1024", "true"), row(10, "2048", "30")];
        assert_eq!(average_throughput(&rows), Some(20.0));
        assert_eq!(average_throughput(&[]), None);
    }

    #[test]
    fn table_has_header_and_average_rows() {
        let rows = vec![row(8, "512", "10.0"), row(9, "1024", "20.0")];
        let table = build_results_table(&rows);
        assert_eq!(table.len(), rows.len() + 2);
    }

    #[test]
    fn json_results_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let rows = vec![row(8, "512", "10.0")];

        write_json_results(&rows, &path).unwrap();
        assert_eq!(read_json_results(&path).unwrap(), rows);
    }
}
