//! Delayed accuracy check of stored predictions against realized results.

use crate::error::{Result, TwinError};
use crate::store::RecordStore;
use crate::types::{BatchWindow, DestructionRecord};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub samples: usize,
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

/// Regression metrics of `predicted` against `actual`. Both must be non-empty
/// and of equal length.
///
/// R² follows the usual convention for a constant target: 1.0 for a perfect
/// fit, 0.0 otherwise.
pub fn accuracy(actual: &[f64], predicted: &[f64]) -> AccuracyReport {
    debug_assert_eq!(actual.len(), predicted.len());
    let n = actual.len() as f64;
    let (sq, abs) = actual
        .iter()
        .zip(predicted)
        .fold((0.0, 0.0), |(sq, abs), (a, p)| {
            let e = a - p;
            (sq + e * e, abs + e.abs())
        });
    let mean = actual.iter().sum::<f64>() / n;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let r2 = if ss_tot > 0.0 {
        1.0 - sq / ss_tot
    } else if sq == 0.0 {
        1.0
    } else {
        0.0
    };
    let mse = sq / n;
    AccuracyReport {
        samples: actual.len(),
        mse,
        rmse: mse.sqrt(),
        mae: abs / n,
        r2,
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// Not enough history past the training window this run.
    NotDue,
    /// No predictions stored for the window yet.
    NothingToCheck { window: BatchWindow },
    Checked {
        window: BatchWindow,
        report: AccuracyReport,
    },
    /// Realized and predicted counts differed; validation was abandoned
    /// for this window only.
    LengthMismatch {
        window: BatchWindow,
        realized: usize,
        predicted: usize,
    },
}

/// Enough history exists beyond the training window to hold a matured prediction.
pub fn validation_due(
    available_span: i64,
    training_batch_size: i64,
    calculations_batch_size: i64,
) -> bool {
    available_span - training_batch_size >= calculations_batch_size
}

/// Window starting at the first timestamp of the current results batch.
pub fn validation_window(first_results_timestamp: i64, predictions_batch_size: i64) -> BatchWindow {
    BatchWindow::new(
        first_results_timestamp,
        first_results_timestamp + predictions_batch_size,
    )
}

fn sorted(mut rows: Vec<DestructionRecord>) -> Vec<DestructionRecord> {
    rows.sort_by_key(|r| r.timestamp);
    rows
}

/// Compare accumulated destruction of results and predictions over `window`.
///
/// Returns `Ok(NothingToCheck)` when no predictions exist for the window and
/// `Err(LengthMismatch)` when the two series differ in length.
pub fn validate_window<R: RecordStore, P: RecordStore>(
    results: &R,
    predictions: &P,
    window: BatchWindow,
) -> Result<ValidationOutcome> {
    let predicted = sorted(predictions.load_range(window.start, window.stop)?);
    if predicted.is_empty() {
        return Ok(ValidationOutcome::NothingToCheck { window });
    }
    let realized = sorted(results.load_range(window.start, window.stop)?);
    if realized.len() != predicted.len() {
        return Err(TwinError::LengthMismatch {
            start: window.start,
            stop: window.stop,
            realized: realized.len(),
            predicted: predicted.len(),
        });
    }
    let actual: Vec<f64> = realized.iter().map(|r| r.accumulated_destruction).collect();
    let forecast: Vec<f64> = predicted.iter().map(|r| r.accumulated_destruction).collect();
    Ok(ValidationOutcome::Checked {
        window,
        report: accuracy(&actual, &forecast),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
