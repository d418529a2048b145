use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use stream_entropy::stream::{exact_entropy, read_file_tokens, zipf_stream};
use stream_entropy::{calibrate, Estimator, NaiveEstimator, SlowEstimator};

#[derive(Parser)]
#[command(name = "stream-entropy")]
#[command(about = "Sublinear-space streaming estimation of empirical Shannon entropy")]
#[command(version = "1.0.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Variant {
    /// Shared-sample engine, amortized O(log c) per token
    Fast,
    /// Primary samples only
    Naive,
    /// O(c) per token, no sharing
    Slow,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the entropy of one stream
    Estimate {
        /// Estimator variant
        #[arg(short, long, value_enum, default_value = "fast")]
        variant: Variant,

        /// Length of the synthetic stream
        #[arg(short, long, default_value_t = 100_000)]
        length: usize,

        /// Token range of the synthetic stream (tokens are 1..=range)
        #[arg(short, long, default_value_t = 99_999)]
        range: u32,

        /// Zipf exponent of the synthetic stream
        #[arg(short, long, default_value_t = 1.1)]
        zipf: f64,

        /// Read the stream from this file instead of synthesizing one
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Bytes per token when reading from a file (1-4, little-endian)
        #[arg(short, long, default_value_t = 1)]
        bytes: usize,

        /// Accuracy target epsilon (used when -c/-k are not given)
        #[arg(short, long, default_value_t = 0.1)]
        epsilon: f64,

        /// Failure probability delta (used when -c/-k are not given)
        #[arg(short, long, default_value_t = 0.1)]
        delta: f64,

        /// Number of samplers (overrides the epsilon/delta calibration)
        #[arg(short = 'c', long)]
        samplers: Option<usize>,

        /// Misra-Gries counter budget (overrides the calibration)
        #[arg(short = 'k', long)]
        counters: Option<usize>,

        /// Seed of the sampling randomness
        #[arg(short, long, default_value_t = 44_545)]
        seed: u64,
    },

    /// Run the estimator over a grid of stream lengths and Zipf exponents,
    /// printing one result row per run
    Sweep {
        /// Estimator variant
        #[arg(short, long, value_enum, default_value = "fast")]
        variant: Variant,

        /// Accuracy target epsilon
        #[arg(short, long, default_value_t = 1.0)]
        epsilon: f64,

        /// Failure probability delta
        #[arg(short, long, default_value_t = 1.0)]
        delta: f64,

        /// Token range of the synthetic streams
        #[arg(short, long, default_value_t = 99_999)]
        range: u32,

        /// Skip grid entries longer than this
        #[arg(long, default_value_t = 1_048_576)]
        max_length: usize,

        /// Seed of the sampling randomness
        #[arg(short, long, default_value_t = 44_545)]
        seed: u64,

        /// Emit JSON rows instead of a TSV table
        #[arg(long)]
        json: bool,
    },
}

/// One sweep measurement, in the shape of the original harness output.
#[derive(Serialize)]
struct SweepRow {
    zipf: f64,
    length: usize,
    time_ms: u128,
    space_bytes: usize,
    exact_entropy: f64,
    estimated_entropy: f64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Estimate {
            variant,
            length,
            range,
            zipf,
            file,
            bytes,
            epsilon,
            delta,
            samplers,
            counters,
            seed,
        } => estimate(
            variant, length, range, zipf, file, bytes, epsilon, delta, samplers, counters, seed,
        ),
        Commands::Sweep {
            variant,
            epsilon,
            delta,
            range,
            max_length,
            seed,
            json,
        } => sweep(variant, epsilon, delta, range, max_length, seed, json),
    }
}

#[allow(clippy::too_many_arguments)]
fn estimate(
    variant: Variant,
    length: usize,
    range: u32,
    zipf: f64,
    file: Option<PathBuf>,
    bytes: usize,
    epsilon: f64,
    delta: f64,
    samplers: Option<usize>,
    counters: Option<usize>,
    seed: u64,
) -> Result<()> {
    let (tokens, synthetic) = match file {
        Some(path) => (read_file_tokens(&path, bytes)?, false),
        None => (zipf_stream(length, range, zipf, seed)?, true),
    };
    if tokens.is_empty() {
        bail!("the stream is empty");
    }

    let (cal_c, cal_k) = calibrate(epsilon, delta, tokens.len() as u64)?;
    let c = samplers.unwrap_or(cal_c);
    let k = counters.unwrap_or(cal_k);

    if synthetic {
        println!("exact entropy is {:.6}", exact_entropy(&tokens));
    }

    let (estimate, space, elapsed) = run_variant(variant, &tokens, c, k, seed)?;
    println!(
        "took {} and used {} bytes (c={}, k={})",
        humantime::format_duration(elapsed),
        space,
        c,
        k
    );
    println!("Estimated entropy is: {:.6}", estimate);
    Ok(())
}

fn sweep(
    variant: Variant,
    epsilon: f64,
    delta: f64,
    range: u32,
    max_length: usize,
    seed: u64,
    json: bool,
) -> Result<()> {
    const MB: usize = 1_048_576;
    let lengths = [100_000, 500_000, MB, 3 * MB, 5 * MB, 10 * MB];
    let zipfs = [1.001, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0];

    if !json {
        println!("zipf\tlength\ttime_ms\tspace\texact_entropy\testimated_entropy");
    }
    for &exponent in &zipfs {
        for &length in lengths.iter().filter(|&&l| l <= max_length) {
            let tokens = zipf_stream(length, range, exponent, seed)?;
            let (c, k) = calibrate(epsilon, delta, length as u64)?;
            let (estimate, space, elapsed) = run_variant(variant, &tokens, c, k, seed)?;
            let row = SweepRow {
                zipf: exponent,
                length,
                time_ms: elapsed.as_millis(),
                space_bytes: space,
                exact_entropy: exact_entropy(&tokens),
                estimated_entropy: estimate,
            };
            if json {
                println!("{}", serde_json::to_string(&row)?);
            } else {
                println!(
                    "{:.3}\t{}\t{}\t{}\t{:.6}\t{:.6}",
                    row.zipf,
                    row.length,
                    row.time_ms,
                    row.space_bytes,
                    row.exact_entropy,
                    row.estimated_entropy
                );
            }
        }
    }
    Ok(())
}

fn run_variant(
    variant: Variant,
    tokens: &[i32],
    c: usize,
    k: usize,
    seed: u64,
) -> Result<(f64, usize, std::time::Duration)> {
    match variant {
        Variant::Fast => {
            let mut est = Estimator::new(c, k, seed)?;
            let start = Instant::now();
            for &token in tokens {
                est.update(token);
            }
            let estimate = est.finalize();
            Ok((estimate, est.size_bytes(), start.elapsed()))
        }
        Variant::Naive => {
            let mut est = NaiveEstimator::new(c, k, seed)?;
            let start = Instant::now();
            for &token in tokens {
                est.update(token);
            }
            let estimate = est.finalize();
            Ok((estimate, est.size_bytes(), start.elapsed()))
        }
        Variant::Slow => {
            let mut est = SlowEstimator::new(c, k, seed)?;
            let start = Instant::now();
            for &token in tokens {
                est.update(token);
            }
            let estimate = est.finalize();
            Ok((estimate, est.size_bytes(), start.elapsed()))
        }
    }
}
