//! Windowed, multi-stage adjusted matrix calculation
//!
//! For every window the configured transforms run in order. Each stage fits
//! the ordinates left by the previous stages, so later stages refine what
//! earlier ones could not explain. The stage matrices are then multiplied into
//! one matrix for the window.

use chrono::{DateTime, TimeDelta, Utc};
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adjusted_matrix::AdjustedMatrix;
use crate::error::{AdjustedError, Result};
use crate::math::{AffineExt, SECONDS_PER_DAY, epoch_seconds, nan_matrix, weighted_mean};
use crate::metric::metrics;
use crate::observations::Observations;
use crate::outliers::{DEFAULT_THRESHOLD, filter_iqrs};
use crate::transform::{Transform, TransformKind};
use crate::types::{HorizontalOrdinate, Reading};

/// Default window length, one week
pub const DEFAULT_UPDATE_INTERVAL: i64 = 7 * 86_400;

/// Adjusted matrix request for one observatory
///
/// Missing fields take their defaults when deserialised.
///
/// # Example
/// ```
/// use geomag_adjusted::Affine;
///
/// let affine: Affine = serde_json::from_str(r#"{
///     "observatory": "BOU",
///     "starttime": "2024-01-01T00:00:00Z",
///     "endtime": "2024-02-01T00:00:00Z",
///     "update_interval": null,
///     "transforms": [{"type": "RotationTranslation3D"}]
/// }"#).unwrap();
/// assert!(affine.update_interval.is_none());
/// assert!(!affine.acausal);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Affine {
    /// Observatory code, e.g. `BOU`
    pub observatory: String,
    /// Start of the first window
    pub starttime: DateTime<Utc>,
    /// Windows start strictly before this time
    pub endtime: DateTime<Utc>,
    /// Window length in seconds; `None` gives one window over the whole range
    pub update_interval: Option<i64>,
    /// Allow readings after a window's start to contribute to it
    pub acausal: bool,
    pub h_ordinate: HorizontalOrdinate,
    /// Stages, fitted in order
    pub transforms: Vec<Transform>,
}

impl Default for Affine {
    /// The past week with a rotation stage followed by a translation stage
    fn default() -> Self {
        let endtime = Utc::now();
        Self {
            observatory: String::new(),
            starttime: endtime - TimeDelta::seconds(DEFAULT_UPDATE_INTERVAL),
            endtime,
            update_interval: Some(DEFAULT_UPDATE_INTERVAL),
            acausal: false,
            h_ordinate: HorizontalOrdinate::default(),
            transforms: vec![
                Transform::new(TransformKind::RotationTranslationXY)
                    .with_memory(100.0 * SECONDS_PER_DAY)
                    .with_acausal(true),
                Transform::new(TransformKind::TranslateOrigins)
                    .with_memory(10.0 * SECONDS_PER_DAY)
                    .with_acausal(true),
            ],
        }
    }
}

impl Affine {
    /// Default request over `[starttime, endtime)`
    pub fn new(
        observatory: impl Into<String>,
        starttime: DateTime<Utc>,
        endtime: DateTime<Utc>,
    ) -> Self {
        Self {
            observatory: observatory.into(),
            starttime,
            endtime,
            ..Self::default()
        }
    }

    pub fn with_update_interval(mut self, seconds: Option<i64>) -> Self {
        self.update_interval = seconds;
        self
    }

    pub fn with_transforms(mut self, transforms: Vec<Transform>) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn with_acausal(mut self, acausal: bool) -> Self {
        self.acausal = acausal;
        self
    }

    /// Check the request before any computation
    ///
    /// # Errors
    /// [`AdjustedError::InvalidTimeRange`], [`AdjustedError::InvalidUpdateInterval`],
    /// [`AdjustedError::EmptyTransforms`] or [`AdjustedError::InvalidMemory`]
    pub fn validate(&self) -> Result<()> {
        if self.endtime <= self.starttime {
            return Err(AdjustedError::InvalidTimeRange {
                starttime: self.starttime,
                endtime: self.endtime,
            });
        }
        let interval = self.interval()?;
        if self.starttime.checked_add_signed(interval).is_none() {
            return Err(self.interval_error(interval));
        }
        if self.transforms.is_empty() {
            return Err(AdjustedError::EmptyTransforms);
        }
        self.transforms.iter().try_for_each(Transform::validate)
    }

    /// Window length
    fn interval(&self) -> Result<TimeDelta> {
        match self.update_interval {
            Some(seconds) => TimeDelta::try_seconds(seconds)
                .filter(|interval| *interval > TimeDelta::zero())
                .ok_or(AdjustedError::InvalidUpdateInterval { seconds }),
            None => Ok(self.endtime - self.starttime),
        }
    }

    fn interval_error(&self, interval: TimeDelta) -> AdjustedError {
        AdjustedError::InvalidUpdateInterval {
            seconds: self.update_interval.unwrap_or(interval.num_seconds()),
        }
    }

    /// Calculate one adjusted matrix per window
    ///
    /// Windows start at `starttime` and step by the update interval while the
    /// start is before `endtime`. A window without usable readings gets a
    /// `NaN` matrix rather than an error.
    ///
    /// # Errors
    /// Any [`Affine::validate`] failure
    pub fn calculate(&self, readings: &[Reading]) -> Result<Vec<AdjustedMatrix>> {
        self.validate()?;

        let observations = Observations::from_readings(readings, self.h_ordinate);
        let times = observations.epoch_times();
        let interval = self.interval()?;
        debug!(
            "Calculating {} matrices from {} of {} readings",
            self.observatory,
            observations.len(),
            readings.len()
        );

        let mut matrices = Vec::new();
        let mut start = self.starttime;
        while start < self.endtime {
            let end = start
                .checked_add_signed(interval)
                .ok_or_else(|| self.interval_error(interval))?;
            let mut adjusted = self.calculate_window(&observations, &times, start)?;
            adjusted.starttime = Some(start);
            adjusted.endtime = Some(end);
            matrices.push(adjusted);
            start = end;
        }
        Ok(matrices)
    }

    /// Fit all stages for the window starting at `epoch`
    fn calculate_window(
        &self,
        observations: &Observations,
        times: &[f64],
        epoch: DateTime<Utc>,
    ) -> Result<AdjustedMatrix> {
        let epoch_time = epoch_seconds(&epoch);
        let baselines: Vec<&[f64]> = observations.baselines.iter().map(Vec::as_slice).collect();

        let mut inputs = observations.ordinates.clone();
        let mut stages = Vec::with_capacity(self.transforms.len());
        let mut weights = Vec::new();

        for transform in &self.transforms {
            weights = transform.weights(times, epoch_time, self.acausal);
            weights = filter_iqrs(&baselines, &weights, DEFAULT_THRESHOLD);

            let total: f64 = weights.iter().sum();
            debug!("{}: {:?} total weight {:.3}", epoch, transform.kind, total);
            if total == 0.0 {
                warn!("No valid observations for {:?} at {}", transform.kind, epoch);
                stages.push(nan_matrix());
                continue;
            }

            let matrix =
                transform.calculate(&inputs, &observations.absolutes, Some(weights.as_slice()))?;
            inputs = matrix.apply(&inputs);
            stages.push(matrix);
        }

        // the last stage acts last, so it sits leftmost in the product
        let matrix = stages.iter().rev().fold(Matrix4::identity(), |composed, m| composed * m);

        Ok(AdjustedMatrix {
            matrix,
            pier_correction: weighted_mean(&observations.pier_corrections, &weights),
            starttime: None,
            endtime: None,
            metrics: metrics(&matrix, &observations.ordinates, &observations.absolutes),
        })
    }
}
