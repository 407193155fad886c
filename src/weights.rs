//! Exponential time-decay weights centred on a target epoch

/// Calculate time-dependent weights by exponential decay
///
/// Each weight is `exp(-|t - epoch| / memory)`: 1 at the epoch, about 0.37 one
/// memory away and about 0.05 three memories away. An infinite memory gives
/// equal weights. Unless `acausal` is set, times after the epoch get zero
/// weight.
///
/// # Arguments
/// * `times` - Observation times in seconds
/// * `memory` - Decay time constant in seconds, or `f64::INFINITY`
/// * `epoch` - Time at which weights peak, in seconds
/// * `acausal` - Whether observations after the epoch may contribute
///
/// # Example
/// ```
/// use geomag_adjusted::time_weights;
///
/// let weights = time_weights(&[0.0, 10.0, 20.0], 10.0, 10.0, false);
/// assert!((weights[0] - (-1.0f64).exp()).abs() < 1e-12);
/// assert_eq!(weights[1], 1.0);
/// assert_eq!(weights[2], 0.0);
/// ```
pub fn time_weights(times: &[f64], memory: f64, epoch: f64, acausal: bool) -> Vec<f64> {
    times
        .iter()
        .map(|&t| {
            if !acausal && t > epoch {
                0.0
            } else if memory.is_infinite() {
                1.0
            } else {
                (-(t - epoch).abs() / memory).exp()
            }
        })
        .collect()
}
