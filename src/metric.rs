//! Fit quality per element

use nalgebra::{Matrix3xX, Matrix4};
use serde::{Deserialize, Serialize};

use crate::math::AffineExt;

/// Element a [`Metric`] describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricElement {
    X,
    Y,
    Z,
    /// Difference of total-field magnitudes
    #[serde(rename = "dF")]
    DF,
}

/// Mean absolute error and standard deviation of `expected - predicted`
///
/// Serialised as `absmean` and `stddev`; `mae` and `std` are accepted when
/// deserialising.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub element: MetricElement,
    /// Mean absolute error
    #[serde(alias = "mae")]
    pub absmean: f64,
    /// Population standard deviation of the residuals
    #[serde(alias = "std")]
    pub stddev: f64,
}

impl Metric {
    /// Compare expected and predicted values for one element
    ///
    /// Both are `NaN` when there is nothing to compare.
    ///
    /// # Example
    /// ```
    /// use geomag_adjusted::{Metric, MetricElement};
    ///
    /// let metric = Metric::calculate(MetricElement::X, &[1.0, 2.0, 3.0], &[2.0, 2.0, 4.0]);
    /// assert!((metric.absmean - 2.0 / 3.0).abs() < 1e-12);
    /// ```
    pub fn calculate(element: MetricElement, expected: &[f64], predicted: &[f64]) -> Self {
        let residuals: Vec<f64> = expected.iter().zip(predicted).map(|(e, p)| e - p).collect();
        if residuals.is_empty() {
            return Self {
                element,
                absmean: f64::NAN,
                stddev: f64::NAN,
            };
        }

        let n = residuals.len() as f64;
        let mean = residuals.iter().sum::<f64>() / n;
        let variance = residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        Self {
            element,
            absmean: residuals.iter().map(|r| r.abs()).sum::<f64>() / n,
            stddev: variance.sqrt(),
        }
    }
}

/// X, Y, Z and dF metrics of `matrix` applied to `ordinates`
pub(crate) fn metrics(
    matrix: &Matrix4<f64>,
    ordinates: &Matrix3xX<f64>,
    absolutes: &Matrix3xX<f64>,
) -> Vec<Metric> {
    let predicted = matrix.apply(ordinates);
    let mut metrics: Vec<Metric> = [MetricElement::X, MetricElement::Y, MetricElement::Z]
        .into_iter()
        .enumerate()
        .map(|(axis, element)| {
            let expected: Vec<f64> = absolutes.row(axis).iter().copied().collect();
            let fitted: Vec<f64> = predicted.row(axis).iter().copied().collect();
            Metric::calculate(element, &expected, &fitted)
        })
        .collect();

    let expected: Vec<f64> = absolutes.column_iter().map(|c| c.norm()).collect();
    let fitted: Vec<f64> = predicted.column_iter().map(|c| c.norm()).collect();
    metrics.push(Metric::calculate(MetricElement::DF, &expected, &fitted));
    metrics
}
