use anyhow::{bail, Context};
use clap::Parser;
use fpga_sweep_rs::report::print_sweep_results;
use fpga_sweep_rs::sweep::{
    run_sweep, SweepConfig, DEFAULT_BITSTREAM, DEFAULT_EXECUTABLE, DEFAULT_OUTPUT, DEFAULT_RANGE,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Runs an FPGA benchmark once per buffer-size exponent and collects the
/// reported transfer size and throughput into a CSV file.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// First exponent (buffer size is 2^exponent)
    #[arg(long, default_value_t = DEFAULT_RANGE.start)]
    start: u32,

    /// Exponent to stop before
    #[arg(long, default_value_t = DEFAULT_RANGE.end)]
    end: u32,

    /// Benchmark executable
    #[arg(short, long, default_value = DEFAULT_EXECUTABLE)]
    executable: PathBuf,

    /// CSV results file, overwritten on every run
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Also write the results as JSON once the sweep completes
    #[arg(long)]
    json: Option<PathBuf>,

    /// Kill a run that has not finished after this many seconds
    #[arg(long = "timeout-secs")]
    timeout_secs: Option<u64>,

    /// Pin the harness, and so every benchmark run, to this CPU core
    #[arg(long = "core-id")]
    core_id: Option<usize>,

    /// Arguments passed before the exponent, the bitstream path by default
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, default_values_t = [DEFAULT_BITSTREAM.to_string()])]
    extra_args: Vec<String>,
}

impl Args {
    fn into_config(self) -> SweepConfig {
        SweepConfig {
            range: self.start..self.end,
            executable: self.executable,
            extra_args: self.extra_args,
            output: self.output,
            json_output: self.json,
            timeout: self.timeout_secs.map(Duration::from_secs),
            core_id: self.core_id,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.timeout_secs == Some(0) {
        bail!("--timeout-secs must be greater than zero");
    }

    let config = args.into_config();
    let rows = run_sweep(&config)
        .with_context(|| format!("sweep aborted, partial results in {}", config.output.display()))?;

    print_sweep_results(&rows);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_flags_reproduce_fixed_sweep() {
        let config = Args::try_parse_from(["run_sweep"]).unwrap().into_config();
        let default = SweepConfig::default();

        assert_eq!(config.range, default.range);
        assert_eq!(config.executable, default.executable);
        assert_eq!(config.extra_args, default.extra_args);
        assert_eq!(config.output, default.output);
        assert!(config.timeout.is_none());
        assert!(config.core_id.is_none());
    }

    #[test]
    fn trailing_args_replace_bitstream() {
        let config = Args::try_parse_from([
            "run_sweep", "--start", "8", "--end", "10", "--timeout-secs", "30", "-e", "./bench",
            "kernel.xclbin", "--verbose",
        ])
        .unwrap()
        .into_config();

        assert_eq!(config.range, 8..10);
        assert_eq!(config.executable, PathBuf::from("./bench"));
        assert_eq!(config.extra_args, vec!["kernel.xclbin".to_string(), "--verbose".to_string()]);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
    }
}
