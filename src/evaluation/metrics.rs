//! Held-out regression metrics

use crate::data::record::median_in_place;
use crate::error::{Result, ValuationError};
use crate::training::{ModelFamily, TrainedModel};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tolerance bands reported as "share of predictions within"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Absolute error bands in dollars
    pub dollar_thresholds: Vec<f64>,
    /// Relative error bands as fractions of the true value
    pub pct_thresholds: Vec<f64>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            dollar_thresholds: vec![50_000.0, 100_000.0],
            pct_thresholds: vec![0.10, 0.20],
        }
    }
}

/// Share of predictions inside one tolerance band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdHit {
    pub threshold: f64,
    /// Percentage in [0, 100]
    pub pct_within: f64,
}

/// Metrics of one trained model on the test partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub family: ModelFamily,
    pub n_samples: usize,
    pub n_features: usize,
    pub r2: f64,
    /// Absent when `n - p - 1 <= 0`
    pub adjusted_r2: Option<f64>,
    pub rmse: f64,
    pub mae: f64,
    pub median_ae: f64,
    /// Percentage over non-zero targets; absent when every target is zero
    pub mape: Option<f64>,
    pub within_dollars: Vec<ThresholdHit>,
    pub within_pct: Vec<ThresholdHit>,
}

impl EvaluationReport {
    /// Flat metric name -> value map
    pub fn metrics(&self) -> BTreeMap<String, f64> {
        let mut m = BTreeMap::new();
        m.insert("r2".to_string(), self.r2);
        if let Some(v) = self.adjusted_r2 {
            m.insert("adjusted_r2".to_string(), v);
        }
        m.insert("rmse".to_string(), self.rmse);
        m.insert("mae".to_string(), self.mae);
        m.insert("median_ae".to_string(), self.median_ae);
        if let Some(v) = self.mape {
            m.insert("mape".to_string(), v);
        }
        for hit in &self.within_dollars {
            m.insert(format!("pct_within_${}", hit.threshold), hit.pct_within);
        }
        for hit in &self.within_pct {
            m.insert(format!("pct_within_{}pct", hit.threshold * 100.0), hit.pct_within);
        }
        m
    }
}

/// Compute every metric from true and predicted values
pub fn regression_report(
    family: ModelFamily,
    y_true: &Array1<f64>,
    y_pred: &Array1<f64>,
    n_features: usize,
    config: &EvaluationConfig,
) -> Result<EvaluationReport> {
    let n = y_true.len();
    if n == 0 {
        return Err(ValuationError::EvaluationError("no samples to evaluate".to_string()));
    }
    if y_pred.len() != n {
        return Err(ValuationError::ShapeError {
            expected: format!("{} predictions", n),
            actual: format!("{} predictions", y_pred.len()),
        });
    }
    if y_pred.iter().any(|p| !p.is_finite()) {
        return Err(ValuationError::EvaluationError("non-finite prediction".to_string()));
    }

    let errors: Vec<f64> = y_true.iter().zip(y_pred.iter()).map(|(t, p)| t - p).collect();
    let mut abs_errors: Vec<f64> = errors.iter().map(|e| e.abs()).collect();
    let nf = n as f64;

    let ss_res: f64 = errors.iter().map(|e| e * e).sum();
    let mean = y_true.sum() / nf;
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    let r2 = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };

    let dof = n as i64 - n_features as i64 - 1;
    let adjusted_r2 = (dof > 0).then(|| 1.0 - (1.0 - r2) * (nf - 1.0) / dof as f64);

    let mae = abs_errors.iter().sum::<f64>() / nf;
    // RMSE >= MAE holds exactly; rounding in the two sums must not break it
    let rmse = (ss_res / nf).sqrt().max(mae);

    let relative: Vec<Option<f64>> = y_true
        .iter()
        .zip(abs_errors.iter())
        .map(|(t, e)| (*t != 0.0).then(|| e / t.abs()))
        .collect();
    let nonzero: Vec<f64> = relative.iter().flatten().copied().collect();
    let mape = (!nonzero.is_empty()).then(|| 100.0 * nonzero.iter().sum::<f64>() / nonzero.len() as f64);

    let pct = |count: usize| 100.0 * count as f64 / nf;
    let within_dollars = config
        .dollar_thresholds
        .iter()
        .map(|&threshold| ThresholdHit {
            threshold,
            pct_within: pct(abs_errors.iter().filter(|&&e| e <= threshold).count()),
        })
        .collect();
    let within_pct = config
        .pct_thresholds
        .iter()
        .map(|&threshold| ThresholdHit {
            threshold,
            pct_within: pct(relative.iter().filter(|r| r.map_or(false, |r| r <= threshold)).count()),
        })
        .collect();

    let median_ae = median_in_place(&mut abs_errors).unwrap_or(0.0);

    Ok(EvaluationReport {
        family,
        n_samples: n,
        n_features,
        r2,
        adjusted_r2,
        rmse,
        mae,
        median_ae,
        mape,
        within_dollars,
        within_pct,
    })
}

/// Score a trained model on held-out rows
pub fn evaluate(
    model: &TrainedModel,
    x_test: &Array2<f64>,
    y_test: &Array1<f64>,
    config: &EvaluationConfig,
) -> Result<EvaluationReport> {
    if x_test.nrows() != y_test.len() {
        return Err(ValuationError::ShapeError {
            expected: format!("{} targets", x_test.nrows()),
            actual: format!("{} targets", y_test.len()),
        });
    }
    if x_test.nrows() == 0 {
        return Err(ValuationError::EvaluationError("no samples to evaluate".to_string()));
    }
    let preds = model.predict(x_test)?;
    regression_report(model.family, y_test, &preds, x_test.ncols(), config)
}
