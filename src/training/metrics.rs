//! Regression metrics for speed and travel-time predictions

use ndarray::{Array, Array1, Dimension};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Error and fit metrics of one prediction task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error over non-zero labels
    pub mape: Option<f64>,
    /// Pearson correlation
    pub correlation: f64,
    /// R-squared
    pub r2: f64,
    pub n_samples: usize,
}

impl RegressionMetrics {
    pub fn calculate(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        Self {
            mae: Self::mean_absolute_error(y_true, y_pred),
            rmse: Self::root_mean_squared_error(y_true, y_pred),
            mape: Self::mean_absolute_percentage_error(y_true, y_pred),
            correlation: Self::correlation(y_true, y_pred),
            r2: Self::r_squared(y_true, y_pred),
            n_samples: y_true.len(),
        }
    }

    /// Flatten arrays of any rank in logical order, then calculate
    pub fn from_arrays<D: Dimension>(y_true: &Array<f64, D>, y_pred: &Array<f64, D>) -> Self {
        let t: Array1<f64> = y_true.iter().copied().collect();
        let p: Array1<f64> = y_pred.iter().copied().collect();
        Self::calculate(&t, &p)
    }

    pub fn mean_absolute_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
        if y_true.is_empty() {
            return 0.0;
        }
        (y_true - y_pred).mapv(f64::abs).sum() / y_true.len() as f64
    }

    pub fn root_mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
        if y_true.is_empty() {
            return 0.0;
        }
        ((y_true - y_pred).mapv(|e| e * e).sum() / y_true.len() as f64).sqrt()
    }

    /// MAPE = (100/n) * Σ|y_true - y_pred| / |y_true|
    pub fn mean_absolute_percentage_error(
        y_true: &Array1<f64>,
        y_pred: &Array1<f64>,
    ) -> Option<f64> {
        let (sum, count) = y_true
            .iter()
            .zip(y_pred.iter())
            .filter(|(&t, _)| t.abs() > 1e-10)
            .fold((0.0, 0usize), |(sum, count), (&t, &p)| {
                (sum + ((t - p) / t).abs(), count + 1)
            });

        (count > 0).then(|| sum / count as f64 * 100.0)
    }

    /// Pearson correlation, 0.0 when either side is constant
    pub fn correlation(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
        let mean_true = y_true.mean().unwrap_or(0.0);
        let mean_pred = y_pred.mean().unwrap_or(0.0);
        let std_true = y_true.std(0.0);
        let std_pred = y_pred.std(0.0);

        if std_true < 1e-10 || std_pred < 1e-10 {
            return 0.0;
        }

        let cov = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(&t, &p)| (t - mean_true) * (p - mean_pred))
            .sum::<f64>()
            / y_true.len() as f64;

        cov / (std_true * std_pred)
    }

    /// R² = 1 - SS_res / SS_tot
    pub fn r_squared(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
        let y_mean = y_true.mean().unwrap_or(0.0);
        let ss_res = (y_true - y_pred).mapv(|e| e * e).sum();
        let ss_tot = y_true.mapv(|t| (t - y_mean).powi(2)).sum();

        if ss_tot < 1e-10 {
            return 0.0;
        }

        1.0 - ss_res / ss_tot
    }

    /// Emit one log line for a named task
    pub fn log(&self, task: &str) {
        info!(
            "{} prediction: mae {:.6} | rmse {:.6} | mape {} | cor {:.6} | r2 {:.6}",
            task,
            self.mae,
            self.rmse,
            self.mape
                .map(|m| format!("{:.4}%", m))
                .unwrap_or_else(|| "n/a".to_string()),
            self.correlation,
            self.r2
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_perfect_prediction() {
        let y = array![1.0, 2.0, 3.0, 4.0];
        let m = RegressionMetrics::calculate(&y, &y);
        assert_relative_eq!(m.mae, 0.0);
        assert_relative_eq!(m.rmse, 0.0);
        assert_relative_eq!(m.r2, 1.0, epsilon = 1e-12);
        assert_relative_eq!(m.correlation, 1.0, epsilon = 1e-12);
        assert_eq!(m.n_samples, 4);
    }

    #[test]
    fn test_errors() {
        let y_true = array![2.0, 4.0, 0.0];
        let y_pred = array![1.0, 6.0, 3.0];
        let m = RegressionMetrics::calculate(&y_true, &y_pred);
        assert_relative_eq!(m.mae, 2.0, epsilon = 1e-12);
        assert_relative_eq!(m.rmse, (14.0f64 / 3.0).sqrt(), epsilon = 1e-12);
        // zero label skipped: (0.5 + 0.5) / 2
        assert_relative_eq!(m.mape.unwrap(), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_from_arrays_flattens() {
        let y_true = array![[1.0, 2.0], [3.0, 4.0]];
        let y_pred = array![[1.0, 2.0], [3.0, 6.0]];
        let m = RegressionMetrics::from_arrays(&y_true, &y_pred);
        assert_eq!(m.n_samples, 4);
        assert_relative_eq!(m.mae, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_prediction_has_zero_correlation() {
        let y_true = array![1.0, 2.0, 3.0];
        let y_pred = array![2.0, 2.0, 2.0];
        assert_eq!(RegressionMetrics::correlation(&y_true, &y_pred), 0.0);
        assert!(RegressionMetrics::calculate(&y_true, &y_pred).mape.is_some());
    }
}
