//! Regression capability and on-disk model artifacts.
//!
//! The pipeline only needs `fit` and `predict` over rows of `f64` features;
//! any backend implementing [`Regressor`] and serde can be swapped in. The
//! stock backend is an ordinary least squares fit with intercept.

use crate::error::{Result, TwinError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DESTRUCTION_MODEL: &str = "destruction_model";
pub const ACC_DESTRUCTION_MODEL: &str = "acc_destruction_model";

// ---------------------------------------------------------------------------
// Regressor
// ---------------------------------------------------------------------------

pub trait Regressor {
    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<()>;
    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>>;
}

// ---------------------------------------------------------------------------
// LinearRegressor
// ---------------------------------------------------------------------------

/// Ridge term added to the normal-equation diagonal so collinear or constant
/// features still produce a solvable system.
const RIDGE: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressor {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    /// Per-feature mean and scale used to standardise inputs.
    means: Vec<f64>,
    scales: Vec<f64>,
    pub samples_seen: usize,
}

impl LinearRegressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.samples_seen > 0
    }

    fn standardise(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }
}

impl Regressor for LinearRegressor {
    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<()> {
        if features.is_empty() {
            return Err(TwinError::Model("cannot fit on zero samples".into()));
        }
        if features.len() != targets.len() {
            return Err(TwinError::Model(format!(
                "{} feature rows but {} targets",
                features.len(),
                targets.len()
            )));
        }
        let width = features[0].len();
        if features.iter().any(|r| r.len() != width) {
            return Err(TwinError::Model("ragged feature rows".into()));
        }

        let n = features.len() as f64;
        let means: Vec<f64> = (0..width)
            .map(|j| features.iter().map(|r| r[j]).sum::<f64>() / n)
            .collect();
        let scales: Vec<f64> = (0..width)
            .map(|j| {
                let var = features.iter().map(|r| (r[j] - means[j]).powi(2)).sum::<f64>() / n;
                if var > 0.0 {
                    var.sqrt()
                } else {
                    1.0
                }
            })
            .collect();
        self.means = means;
        self.scales = scales;

        // Centred targets: the intercept is the target mean on standardised inputs.
        let y_mean = targets.iter().sum::<f64>() / n;
        let mut xtx = vec![vec![0.0; width]; width];
        let mut xty = vec![0.0; width];
        for (row, &y) in features.iter().zip(targets) {
            let z = self.standardise(row);
            for i in 0..width {
                xty[i] += z[i] * (y - y_mean);
                for j in 0..width {
                    xtx[i][j] += z[i] * z[j];
                }
            }
        }
        for (i, row) in xtx.iter_mut().enumerate() {
            row[i] += RIDGE * n;
        }

        let coefficients = solve(xtx, xty)?;
        if !y_mean.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(TwinError::Model(
                "fit produced non-finite coefficients".into(),
            ));
        }
        self.coefficients = coefficients;
        self.intercept = y_mean;
        self.samples_seen = features.len();
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>> {
        if !self.is_fitted() {
            return Err(TwinError::Model("model has not been fitted".into()));
        }
        features
            .iter()
            .map(|row| {
                if row.len() != self.coefficients.len() {
                    return Err(TwinError::Model(format!(
                        "expected {} features, got {}",
                        self.coefficients.len(),
                        row.len()
                    )));
                }
                let z = self.standardise(row);
                Ok(self.intercept
                    + z.iter()
                        .zip(&self.coefficients)
                        .map(|(x, b)| x * b)
                        .sum::<f64>())
            })
            .collect()
    }
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < f64::EPSILON {
            return Err(TwinError::Model("singular design matrix".into()));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

/// Round half-to-even to `decimals` digits, matching decimal quantisation.
pub fn round_to_decimals(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round_ties_even() / factor
}

// ---------------------------------------------------------------------------
// ModelArtifacts
// ---------------------------------------------------------------------------

/// Directory of JSON-serialised models, one file per model name.
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    dir: PathBuf,
}

impl ModelArtifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    pub fn save<M: Serialize>(&self, name: &str, model: &M) -> Result<PathBuf> {
        let path = self.path_for(name);
        let data = serde_json::to_vec_pretty(model)?;
        crate::io::atomic_write(&path, &data)?;
        Ok(path)
    }

    pub fn load<M: DeserializeOwned>(&self, name: &str) -> Result<M> {
        let path = self.path_for(name);
        if !path.exists() {
            return Err(TwinError::ModelNotFound(path));
        }
        let data = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
