//! Parameter sweep over an external benchmark executable.
//!
//! For every exponent `i` in the configured range the benchmark is launched
//! once as `<executable> <extra_args...> <i>`. Its stdout is scraped for the
//! required fields and one CSV row is written per run, strictly in order and
//! one process at a time.

use std::io::{BufRead, BufReader, Read};
use std::ops::Range;
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::affinity::set_affinity;
use crate::error::SweepError;
use crate::extract::FieldRecord;
use crate::report::{write_json_results, CsvWriter, SweepRow};

pub const DEFAULT_RANGE: Range<u32> = 8..20;
pub const DEFAULT_EXECUTABLE: &str = "./pass";
pub const DEFAULT_BITSTREAM: &str =
    "../xclbin/pass.hw.xilinx_aws-vu9p-f1-04261818_dynamic_5_0.awsxclbin";
pub const DEFAULT_OUTPUT: &str = "results.csv";

/// Bits moved per buffer element.
const TRANSFER_BITS: u64 = 512;

/// Exponents must stay below this so `bytes_transferred` fits in a `u64`.
pub const EXPONENT_LIMIT: u32 = u64::BITS - TRANSFER_BITS.trailing_zeros();

#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Exponents to run, end exclusive.
    pub range: Range<u32>,
    pub executable: PathBuf,
    /// Passed before the exponent on every launch.
    pub extra_args: Vec<String>,
    pub output: PathBuf,
    pub json_output: Option<PathBuf>,
    /// Per-run limit. `None` waits for the benchmark forever.
    pub timeout: Option<Duration>,
    pub core_id: Option<usize>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            range: DEFAULT_RANGE,
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            extra_args: vec![DEFAULT_BITSTREAM.to_string()],
            output: PathBuf::from(DEFAULT_OUTPUT),
            json_output: None,
            timeout: None,
            core_id: None,
        }
    }
}

/// One value of the sweep parameter and the sizes derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPoint {
    pub index: u32,
    pub buffer_size: u64,
    pub bytes_transferred: u64,
}

impl SweepPoint {
    /// `index` must be below [`EXPONENT_LIMIT`]; [`validate_range`] checks
    /// this for a whole sweep.
    pub fn new(index: u32) -> Self {
        let buffer_size = 1u64 << index;
        SweepPoint {
            index,
            buffer_size,
            bytes_transferred: buffer_size * TRANSFER_BITS / 8,
        }
    }
}

pub fn validate_range(range: &Range<u32>) -> Result<(), SweepError> {
    let invalid = |reason| SweepError::InvalidRange { start: range.start, end: range.end, reason };

    if range.start > range.end {
        return Err(invalid("start is after end"));
    }
    if range.end > EXPONENT_LIMIT {
        return Err(invalid("bytes transferred would overflow a u64"));
    }
    Ok(())
}

/// Runs the whole sweep, (re)writing `config.output`.
///
/// Stops at the first failing run. Rows of earlier runs stay in the file.
pub fn run_sweep(config: &SweepConfig) -> Result<Vec<SweepRow>, SweepError> {
    validate_range(&config.range)?;

    // Launched benchmarks inherit the mask.
    if let Some(core_id) = config.core_id {
        set_affinity(core_id)?;
    }

    let mut writer = CsvWriter::create(&config.output)?;
    let mut rows = Vec::with_capacity(config.range.len());
    let mut pending = PendingRuns::default();

    for index in config.range.clone() {
        let point = SweepPoint::new(index);
        info!(
            "Running with argument {} transfers {} bytes",
            point.index, point.bytes_transferred
        );

        pending.poll();
        let record = run_iteration(config, &point, &mut pending)?;
        let row = record.into_row(&point)?;
        writer.write_row(&row)?;
        rows.push(row);
    }

    pending.finish();
    info!(runs = rows.len(), output = %config.output.display(), "sweep complete");

    if let Some(ref json_path) = config.json_output {
        write_json_results(&rows, json_path)?;
        debug!(path = %json_path.display(), "wrote JSON results");
    }
    Ok(rows)
}

/// Launches the benchmark once and collects the fields it prints.
///
/// Once stdout is exhausted the process is handed to `pending`; the sweep
/// does not wait for it to exit. A run that fails while reading is killed.
pub fn run_iteration(
    config: &SweepConfig,
    point: &SweepPoint,
    pending: &mut PendingRuns,
) -> Result<FieldRecord, SweepError> {
    let mut child = Command::new(&config.executable)
        .args(&config.extra_args)
        .arg(point.index.to_string())
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| SweepError::Launch {
            executable: config.executable.clone(),
            source,
        })?;

    let stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => {
            stop_child(&mut child, point.index);
            return Err(SweepError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "benchmark stdout was not captured",
            )));
        }
    };

    let read = match config.timeout {
        None => read_fields(stdout),
        Some(limit) => read_fields_with_timeout(stdout, point.index, limit),
    };
    settle(read, child, point.index, pending)
}

fn settle(
    read: Result<FieldRecord, SweepError>,
    mut child: Child,
    index: u32,
    pending: &mut PendingRuns,
) -> Result<FieldRecord, SweepError> {
    match read {
        Ok(record) => {
            pending.push(index, child);
            Ok(record)
        }
        Err(e) => {
            stop_child(&mut child, index);
            Err(e)
        }
    }
}

/// Kills and reaps a run that is being abandoned.
fn stop_child(child: &mut Child, index: u32) -> Option<ExitStatus> {
    if let Err(e) = child.kill() {
        warn!(index, error = %e, "failed to kill benchmark");
    }
    match child.wait() {
        Ok(status) => {
            debug!(index, %status, "benchmark stopped");
            Some(status)
        }
        Err(e) => {
            warn!(index, error = %e, "failed to reap benchmark");
            None
        }
    }
}

/// Runs whose stdout is exhausted but which have not been reaped yet.
///
/// The exit status is informational only; a run is judged by its output.
/// Anything still pending when this is dropped is waited for.
#[derive(Debug, Default)]
pub struct PendingRuns {
    children: Vec<(u32, Child)>,
    observed: Vec<(u32, ExitStatus)>,
}

impl PendingRuns {
    pub fn push(&mut self, index: u32, child: Child) {
        self.children.push((index, child));
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Reaps the runs that have already exited, without blocking.
    pub fn poll(&mut self) {
        let observed = &mut self.observed;
        self.children.retain_mut(|(index, child)| match child.try_wait() {
            Ok(Some(status)) => {
                log_exit_status(*index, status);
                observed.push((*index, status));
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(index = *index, error = %e, "failed to query benchmark status");
                false
            }
        });
    }

    /// Waits for every remaining run. Returns all observed statuses in run order.
    pub fn finish(&mut self) -> Vec<(u32, ExitStatus)> {
        for (index, mut child) in self.children.drain(..) {
            match child.wait() {
                Ok(status) => {
                    log_exit_status(index, status);
                    self.observed.push((index, status));
                }
                Err(e) => warn!(index, error = %e, "failed to reap benchmark"),
            }
        }

        let mut observed = std::mem::take(&mut self.observed);
        observed.sort_by_key(|(index, _)| *index);
        observed
    }
}

impl Drop for PendingRuns {
    fn drop(&mut self) {
        if !self.children.is_empty() {
            self.finish();
        }
    }
}

/// Reads until end of stream, however long that takes.
fn read_fields<R: Read>(stream: R) -> Result<FieldRecord, SweepError> {
    let mut reader = BufReader::new(stream);
    let mut record = FieldRecord::new();
    let mut buf = Vec::new();

    while let Some(line) = next_line(&mut reader, &mut buf)? {
        record.record_line(&line);
    }

    Ok(record)
}

/// Same as [`read_fields`] but gives up once `limit` has elapsed.
fn read_fields_with_timeout(
    stdout: ChildStdout,
    index: u32,
    limit: Duration,
) -> Result<FieldRecord, SweepError> {
    let (tx, rx) = mpsc::channel();

    // The reader thread exits on end of stream, on a read error, or once the
    // receiver is gone and a send fails.
    thread::spawn(move || {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        loop {
            let next = next_line(&mut reader, &mut buf);
            let done = !matches!(next, Ok(Some(_)));
            if tx.send(next).is_err() || done {
                break;
            }
        }
    });

    let deadline = Instant::now() + limit;
    let mut record = FieldRecord::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(Ok(Some(line))) => record.record_line(&line),
            Ok(Ok(None)) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(Err(e)) => return Err(e),
            Err(RecvTimeoutError::Timeout) => {
                warn!(index, ?limit, "benchmark timed out, killing it");
                return Err(SweepError::Timeout { index, after: limit });
            }
        }
    }

    Ok(record)
}

/// Reads one line, tolerating invalid UTF-8. `None` at end of stream.
fn next_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> Result<Option<String>, SweepError> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }

    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(&['\n', '\r'][..]).to_string()))
}

fn log_exit_status(index: u32, status: ExitStatus) {
    if status.success() {
        debug!(index, %status, "benchmark exited");
    } else {
        warn!(index, %status, "benchmark exited unsuccessfully");
    }
}
