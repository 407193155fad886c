//! Conversion of calibration readings into ordinate/absolute vector pairs
//!
//! Each retained reading contributes one column to every array:
//!
//! - ordinates `(H, E, Z)` in the variometer frame, rebuilt as
//!   `absolute - baseline` with `E = H_abs · D_ord` (radians)
//! - absolutes `(X, Y, Z)` in geographic Cartesian form,
//!   `X = H cos D`, `Y = H sin D`
//! - baselines `(H, D, Z)` used for outlier screening
//! - the reading time (end of the H absolute) and its pier correction
//!
//! A reading whose H absolute is exactly zero marks an instrument change.
//! Everything that ended at or before such a marker is discarded.

use chrono::{DateTime, Utc};
use nalgebra::{Matrix3xX, Vector3};
use tracing::{info, warn};

use crate::math::{epoch_seconds, stack_columns};
use crate::types::{Absolute, Element, HorizontalOrdinate, Reading};

/// Parallel arrays extracted from a batch of readings
#[derive(Debug, Clone)]
pub struct Observations {
    /// Variometer `(H, E, Z)` ordinates, one column per reading
    pub ordinates: Matrix3xX<f64>,
    /// Geographic `(X, Y, Z)` absolutes, one column per reading
    pub absolutes: Matrix3xX<f64>,
    /// H, D and Z baseline series
    pub baselines: [Vec<f64>; 3],
    /// Reading times (end of the H absolute)
    pub times: Vec<DateTime<Utc>>,
    pub pier_corrections: Vec<f64>,
}

impl Observations {
    /// Filter `readings` and extract their vectors
    ///
    /// Readings are taken in time order. Incomplete or invalid readings are
    /// skipped, as is any reading with an absolute ending at or before the
    /// latest reset marker. A reading whose vectors are not finite, such as a
    /// `Total` H ordinate with `|E| > |H|`, is skipped with a warning.
    ///
    /// # Example
    /// ```
    /// use chrono::{TimeDelta, TimeZone, Utc};
    /// use geomag_adjusted::{Absolute, Element, HorizontalOrdinate, Observations, Reading};
    ///
    /// let start = Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap();
    /// let end = start + TimeDelta::minutes(30);
    /// let reading = Reading::new(
    ///     vec![
    ///         Absolute::new(Element::D, 10.0, 0.0, start, end),
    ///         Absolute::new(Element::H, 20000.0, 50.0, start, end),
    ///         Absolute::new(Element::Z, 45000.0, -20.0, start, end),
    ///     ],
    ///     1.5,
    /// );
    ///
    /// let observations = Observations::from_readings(&[reading], HorizontalOrdinate::Component);
    /// assert_eq!(observations.len(), 1);
    /// assert_eq!(observations.ordinates[(0, 0)], 19950.0);
    /// ```
    pub fn from_readings(readings: &[Reading], h_ordinate: HorizontalOrdinate) -> Self {
        let mut ordered: Vec<&Reading> = readings.iter().filter(|r| r.time().is_some()).collect();
        ordered.sort_by_key(|r| r.time());

        let first = readings
            .iter()
            .flat_map(|r| r.absolutes.iter().map(|a| a.starttime))
            .min();
        let last_epoch = ordered
            .iter()
            .filter_map(|r| r.absolute(Element::H))
            .filter(|h| h.absolute == 0.0)
            .map(|h| h.endtime)
            .fold(first, |cursor, t| cursor.max(Some(t)));

        if let Some(epoch) = last_epoch.filter(|&e| Some(e) != first) {
            info!("Magnetometer altered, discarding measurements prior to {}", epoch);
        }

        let mut ordinates = Vec::new();
        let mut absolutes = Vec::new();
        let mut baselines = [Vec::new(), Vec::new(), Vec::new()];
        let mut times = Vec::new();
        let mut pier_corrections = Vec::new();

        for reading in ordered {
            let Some((d, h, z)) = complete_absolutes(reading) else {
                continue;
            };
            let after_reset = [d, h, z]
                .iter()
                .all(|a| last_epoch.is_none_or(|epoch| a.endtime > epoch));
            if !after_reset {
                continue;
            }

            let ordinate = ordinate_vector(d, h, z, h_ordinate);
            let absolute = absolute_vector(d, h, z);
            if !ordinate.iter().chain(absolute.iter()).all(|v| v.is_finite()) {
                warn!("Skipping reading at {}: non-finite ordinate or absolute", h.endtime);
                continue;
            }

            ordinates.push(ordinate);
            absolutes.push(absolute);
            baselines[0].push(h.baseline);
            baselines[1].push(d.baseline);
            baselines[2].push(z.baseline);
            times.push(h.endtime);
            pier_corrections.push(reading.pier_correction);
        }

        Self {
            ordinates: stack_columns(&ordinates),
            absolutes: stack_columns(&absolutes),
            baselines,
            times,
            pier_corrections,
        }
    }

    /// Number of retained readings
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Reading times as seconds since the Unix epoch
    pub fn epoch_times(&self) -> Vec<f64> {
        self.times.iter().map(epoch_seconds).collect()
    }
}

/// Valid D, H and Z absolutes of a reading, or `None` if any is missing
fn complete_absolutes(reading: &Reading) -> Option<(&Absolute, &Absolute, &Absolute)> {
    if !reading.is_valid() {
        return None;
    }
    Some((
        reading.absolute(Element::D)?,
        reading.absolute(Element::H)?,
        reading.absolute(Element::Z)?,
    ))
}

/// Variometer `(H, E, Z)` from absolutes and baselines
fn ordinate_vector(
    d: &Absolute,
    h: &Absolute,
    z: &Absolute,
    h_ordinate: HorizontalOrdinate,
) -> Vector3<f64> {
    let e_ord = h.absolute * d.ordinate().to_radians();
    let h_ord = match h_ordinate {
        HorizontalOrdinate::Component => h.ordinate(),
        HorizontalOrdinate::Total => (h.ordinate().powi(2) - e_ord.powi(2)).sqrt(),
    };
    Vector3::new(h_ord, e_ord, z.ordinate())
}

/// Geographic `(X, Y, Z)` from cylindrical `(H, D, Z)`
fn absolute_vector(d: &Absolute, h: &Absolute, z: &Absolute) -> Vector3<f64> {
    let declination = d.absolute.to_radians();
    Vector3::new(
        h.absolute * declination.cos(),
        h.absolute * declination.sin(),
        z.absolute,
    )
}
