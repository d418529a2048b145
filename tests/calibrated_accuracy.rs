//! Accuracy under the (epsilon, delta) calibration formulas.

mod common;

use common::run_fast;
use stream_entropy::calibrate;
use stream_entropy::stream::{exact_entropy, zipf_stream};

#[test]
fn test_calibrated_run_medium_stream() {
    let length = 100_000;
    let (c, k) = calibrate(0.3, 0.1, length as u64).unwrap();
    let tokens = zipf_stream(length, 99_999, 1.5, 17).unwrap();
    let exact = exact_entropy(&tokens);
    let estimate = run_fast(&tokens, c, k, 17);
    assert!(
        (estimate - exact).abs() <= 0.3 * exact,
        "calibrated estimate {} outside eps*H of exact {} (c={}, k={})",
        estimate,
        exact,
        c,
        k
    );
}

// Full-scale calibration run from the benchmark harness; minutes of work,
// so opt in with --ignored.
#[test]
#[ignore]
fn test_calibrated_zipf_million() {
    let length = 1_000_000;
    let (c, k) = calibrate(0.1, 0.1, length as u64).unwrap();
    let tokens = zipf_stream(length, 99_999, 1.5, 17).unwrap();
    let exact = exact_entropy(&tokens);
    let estimate = run_fast(&tokens, c, k, 17);
    assert!(
        (estimate - exact).abs() <= 0.1 * exact,
        "calibrated estimate {} more than 10% from exact {} (c={}, k={})",
        estimate,
        exact,
        c,
        k
    );
}
