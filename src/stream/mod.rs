//! Token-stream sources for the CLI driver, benchmarks and tests:
//! synthetic Zipf streams with an exact-entropy reference, and byte-packed
//! token files.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Zipf;

/// Synthetic stream of `length` tokens drawn Zipf-distributed with the given
/// exponent from [1, range]. Deterministic for a fixed seed.
pub fn zipf_stream(length: usize, range: u32, exponent: f64, seed: u64) -> Result<Vec<i32>> {
    if range < 1 {
        bail!("token range must be at least 1, got {}", range);
    }
    let dist = Zipf::new(range as u64, exponent)
        .map_err(|e| anyhow!("bad Zipf exponent {}: {:?}", exponent, e))?;
    let mut rng = StdRng::seed_from_u64(seed);
    Ok((0..length)
        .map(|_| rng.sample(dist).round() as i32)
        .collect())
}

/// Exact empirical Shannon entropy of a token slice, in bits. Linear space;
/// only for validating the estimators on reference streams.
pub fn exact_entropy(tokens: &[i32]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<i32, u64> = HashMap::new();
    for &token in tokens {
        *counts.entry(token).or_insert(0) += 1;
    }
    let m = tokens.len() as f64;
    counts
        .values()
        .map(|&n| {
            let p = n as f64 / m;
            -p * p.log2()
        })
        .sum()
}

/// Read a stream from a file, packing `bytes` (1..=4) little-endian bytes
/// into each token. A short tail chunk is packed as-is.
pub fn read_file_tokens(path: &Path, bytes: usize) -> Result<Vec<i32>> {
    if !(1..=4).contains(&bytes) {
        bail!("bytes per token must be between 1 and 4, got {}", bytes);
    }
    let data =
        fs::read(path).with_context(|| format!("reading stream from {}", path.display()))?;
    Ok(data
        .chunks(bytes)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0i32, |token, (i, &b)| token + ((b as i32) << (8 * i)))
        })
        .collect())
}
