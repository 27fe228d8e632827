//! Ridge regression on standardized inputs

use crate::error::{Result, ValuationError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Solve symmetric positive-definite system Ax = b using Cholesky decomposition.
/// Returns `None` if the matrix is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    // A = L * L^T
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // Forward substitution: L * y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T * x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Matrix inversion by Gauss-Jordan elimination with partial pivoting (fallback)
fn matrix_inverse(m: &Array2<f64>) -> Option<Array2<f64>> {
    let n = m.nrows();
    if n != m.ncols() {
        return None;
    }

    // Augmented matrix [M | I]
    let mut aug = Array2::<f64>::zeros((n, 2 * n));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = m[[i, j]];
        }
        aug[[i, n + i]] = 1.0;
    }

    for col in 0..n {
        let mut max_row = col;
        for row in col + 1..n {
            if aug[[row, col]].abs() > aug[[max_row, col]].abs() {
                max_row = row;
            }
        }
        if max_row != col {
            for j in 0..2 * n {
                aug.swap([col, j], [max_row, j]);
            }
        }
        if aug[[col, col]].abs() < 1e-10 {
            return None;
        }

        let pivot = aug[[col, col]];
        for j in 0..2 * n {
            aug[[col, j]] /= pivot;
        }
        for row in 0..n {
            if row != col {
                let factor = aug[[row, col]];
                for j in 0..2 * n {
                    aug[[row, j]] -= factor * aug[[col, j]];
                }
            }
        }
    }

    let mut inv = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            inv[[i, j]] = aug[[i, n + j]];
        }
    }
    Some(inv)
}

/// L2-regularized linear regression.
///
/// Inputs are standardized with the training mean and standard deviation
/// before the penalty is applied; coefficients are reported on the original
/// feature scale so `predict` takes raw features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeRegression {
    /// Coefficients on the original feature scale
    pub coefficients: Option<Array1<f64>>,
    pub intercept: Option<f64>,
    /// L2 regularization strength
    pub alpha: f64,
    /// Training column means
    pub feature_means: Option<Array1<f64>>,
    feature_scales: Option<Array1<f64>>,
    pub is_fitted: bool,
}

impl Default for RidgeRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            coefficients: None,
            intercept: None,
            alpha,
            feature_means: None,
            feature_scales: None,
            is_fitted: false,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if n_samples != y.len() {
            return Err(ValuationError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(ValuationError::TrainingError("cannot fit ridge on zero rows".to_string()));
        }
        if !(self.alpha >= 0.0 && self.alpha.is_finite()) {
            return Err(ValuationError::invalid_param("alpha", self.alpha, "must be finite and non-negative"));
        }

        let x_mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| ValuationError::ComputationError("empty feature matrix".to_string()))?;
        // Constant columns keep a unit scale and end up with a zero coefficient
        let x_scale = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 1e-12 { s } else { 1.0 });
        let y_mean = y.mean().unwrap_or(0.0);

        let x_std = (x - &x_mean.view().insert_axis(Axis(0))) / &x_scale.view().insert_axis(Axis(0));
        let y_c = y - y_mean;

        let mut xtx = x_std.t().dot(&x_std);
        for i in 0..n_features {
            xtx[[i, i]] += self.alpha;
        }
        let xty = x_std.t().dot(&y_c);

        let weights = match cholesky_solve(&xtx, &xty) {
            Some(w) => w,
            None => match matrix_inverse(&xtx) {
                Some(inv) => inv.dot(&xty),
                None => return Err(ValuationError::ComputationError("Singular matrix".to_string())),
            },
        };

        let coefficients = &weights / &x_scale;
        self.intercept = Some(y_mean - coefficients.dot(&x_mean));
        self.coefficients = Some(coefficients);
        self.feature_means = Some(x_mean);
        self.feature_scales = Some(x_scale);
        self.is_fitted = true;
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(ValuationError::ModelNotFitted)?;
        if x.ncols() != coefficients.len() {
            return Err(ValuationError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.dot(coefficients) + self.intercept.unwrap_or(0.0))
    }

    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let p = self.predict(x)?;
        let ym = y.mean().unwrap_or(0.0);
        let ss_res = (&p - y).mapv(|v| v * v).sum();
        let ss_tot = y.mapv(|v| (v - ym).powi(2)).sum();
        Ok(if ss_tot == 0.0 { 1.0 } else { 1.0 - ss_res / ss_tot })
    }

    /// Absolute standardized coefficients, normalized to sum to one
    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        let coef = self.coefficients.as_ref()?;
        let scale = self.feature_scales.as_ref()?;
        let magnitude = (coef * scale).mapv(f64::abs);
        let total = magnitude.sum();
        Some(if total > 0.0 { magnitude / total } else { magnitude })
    }
}
