//! Weighted interquartile-range outlier rejection
//!
//! Values are judged against weighted 25th, 50th and 75th percentiles: a value
//! is "good" while it lies no more than `threshold` lower (upper) quartile
//! ranges below (above) the weighted median. The quantiles are re-estimated
//! from the surviving values until the mask stops changing.

use tracing::warn;

/// Default threshold, in quartile ranges, used on baseline series
pub const DEFAULT_THRESHOLD: f64 = 3.0;

/// Upper bound on fixed-point iterations of [`filter_iqr`]
const MAX_ITERATIONS: usize = 50;

/// Weighted quantile of `data`
///
/// Values are sorted and each is placed at cumulative weight fraction
/// `(cumsum - 0.5·w) / total`; the quantile is linearly interpolated between
/// those positions and clamped to the extreme values outside them.
///
/// Returns `NaN` for empty input or zero total weight.
pub fn weighted_quantile(data: &[f64], weights: &[f64], quantile: f64) -> f64 {
    let mut pairs: Vec<(f64, f64)> = data.iter().copied().zip(weights.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let total: f64 = pairs.iter().map(|p| p.1).sum();
    if pairs.is_empty() || total <= 0.0 {
        return f64::NAN;
    }

    let mut cumulative = 0.0;
    let positions: Vec<f64> = pairs
        .iter()
        .map(|&(_, w)| {
            cumulative += w;
            (cumulative - 0.5 * w) / total
        })
        .collect();

    interpolate(quantile, &positions, &pairs)
}

/// Piecewise-linear interpolation with end clamping
fn interpolate(x: f64, xp: &[f64], pairs: &[(f64, f64)]) -> f64 {
    let last = xp.len() - 1;
    if x <= xp[0] {
        return pairs[0].0;
    }
    if x >= xp[last] {
        return pairs[last].0;
    }
    let upper = xp.partition_point(|&p| p <= x);
    let lower = upper - 1;
    let span = xp[upper] - xp[lower];
    if span == 0.0 {
        return pairs[upper].0;
    }
    let fraction = (x - xp[lower]) / span;
    pairs[lower].0 + fraction * (pairs[upper].0 - pairs[lower].0)
}

/// Identify "good" elements of `series`
///
/// Starts from every element with positive weight and iterates to a fixed
/// point. The previous mask stays on the right-hand side of each update so the
/// iteration cannot oscillate between two equally good solutions.
///
/// # Arguments
/// * `series` - Observations to screen
/// * `weights` - Weight of each observation; zero-weight entries are never good
/// * `threshold` - Allowed distance from the median, in quartile ranges
///
/// # Example
/// ```
/// use geomag_adjusted::filter_iqr;
///
/// let series = [1.0, 1.1, 0.9, 1.05, 0.95, 25.0];
/// let good = filter_iqr(&series, &[1.0; 6], 3.0);
/// assert_eq!(good, vec![true, true, true, true, true, false]);
/// ```
pub fn filter_iqr(series: &[f64], weights: &[f64], threshold: f64) -> Vec<bool> {
    let mut good: Vec<bool> = weights.iter().map(|&w| w > 0.0).collect();
    if good.len() <= 1 {
        return good;
    }

    for _ in 0..MAX_ITERATIONS {
        let (values, kept): (Vec<f64>, Vec<f64>) = series
            .iter()
            .zip(weights)
            .zip(&good)
            .filter(|(_, g)| **g)
            .map(|((&s, &w), _)| (s, w))
            .unzip();
        if values.is_empty() {
            return good;
        }

        let q25 = weighted_quantile(&values, &kept, 0.25);
        let q50 = weighted_quantile(&values, &kept, 0.50);
        let q75 = weighted_quantile(&values, &kept, 0.75);
        let lower = q50 - threshold * (q50 - q25);
        let upper = q50 + threshold * (q75 - q50);

        let next: Vec<bool> = series
            .iter()
            .zip(&good)
            .map(|(&s, &g)| g && s >= lower && s <= upper)
            .collect();
        if next == good {
            return good;
        }
        good = next;
    }

    warn!("Outlier filter did not converge after {} iterations", MAX_ITERATIONS);
    good
}

/// Screen several series at once and zero the weights of any outlier
///
/// An element survives only if it is good in every series.
pub fn filter_iqrs(multiseries: &[&[f64]], weights: &[f64], threshold: f64) -> Vec<f64> {
    let mut good = vec![true; weights.len()];
    for series in multiseries {
        for (g, keep) in good.iter_mut().zip(filter_iqr(series, weights, threshold)) {
            *g &= keep;
        }
    }
    weights
        .iter()
        .zip(good)
        .map(|(&w, g)| if g { w } else { 0.0 })
        .collect()
}
