//! Per-sample destruction and its running total.
//!
//! The running total is carried in a single accumulator that starts at the
//! caller's seed, so accumulating a sequence in one call or in consecutive
//! batches (each seeded with the previous batch's last total) produces
//! bit-identical results.

use crate::types::{DestructionRecord, SensorSample};

const NM_PER_MNM: f64 = 1_000_000.0;
const RPM_PER_RPS: f64 = 60.0;
const DESTRUCTION_DIVISOR: f64 = 5_000_000.0;

/// Instantaneous destruction increment for one sample.
///
/// Negative oil temperatures can make this negative; the formula is kept
/// as-is and callers must not assume a monotonic total.
pub fn destruction(sample: &SensorSample) -> f64 {
    let torque_mnm = sample.torque / NM_PER_MNM;
    let speed_rps = sample.speed / RPM_PER_RPS;
    (torque_mnm * speed_rps + sample.oil_temperature) / DESTRUCTION_DIVISOR
}

/// Sort `samples` by timestamp and emit one record per sample with the
/// running total continued from `seed`.
pub fn accumulate(mut samples: Vec<SensorSample>, seed: f64) -> Vec<DestructionRecord> {
    samples.sort_by_key(|s| s.timestamp);
    let mut total = seed;
    samples
        .iter()
        .map(|s| {
            let d = destruction(s);
            total += d;
            DestructionRecord {
                timestamp: s.timestamp,
                destruction: d,
                accumulated_destruction: total,
            }
        })
        .collect()
}

/// Running total over precomputed increments (model output), continued from `seed`.
pub fn accumulate_increments(increments: &[(i64, f64)], seed: f64) -> Vec<DestructionRecord> {
    let mut total = seed;
    increments
        .iter()
        .map(|&(timestamp, d)| {
            total += d;
            DestructionRecord {
                timestamp,
                destruction: d,
                accumulated_destruction: total,
            }
        })
        .collect()
}
