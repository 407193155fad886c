//! Core types and conventions for adjusted matrix calculations

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Geomagnetic element measured by an absolute observation
///
/// # Elements
/// - **D**: declination in decimal degrees
/// - **H**: horizontal field intensity in nT
/// - **Z**: vertical field intensity in nT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Element {
    /// Declination, degrees east of geographic north
    D,
    /// Horizontal intensity, nT
    H,
    /// Vertical intensity, nT
    Z,
}

/// How the H ordinate is recovered from an H absolute and baseline
///
/// Most observatories store the H baseline against the H component of the
/// variometer, so `absolute - baseline` is already the raw H ordinate. Some
/// stations (DED and CMO among them) store it against the total horizontal
/// field, so the E component has to be removed in quadrature.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use geomag_adjusted::{Affine, HorizontalOrdinate};
///
/// let mut affine = Affine::new(
///     "CMO",
///     Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
///     Utc.with_ymd_and_hms(2021, 2, 1, 0, 0, 0).unwrap(),
/// );
/// affine.h_ordinate = HorizontalOrdinate::Total;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalOrdinate {
    /// `H_ord = H_abs - H_baseline`
    #[default]
    Component,
    /// `H_ord = sqrt((H_abs - H_baseline)² - E_ord²)`
    Total,
}

/// One absolute value derived from a calibration session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Absolute {
    /// Element this absolute describes
    pub element: Element,
    /// Absolute value (nT for H and Z, degrees for D)
    pub absolute: f64,
    /// Offset between the absolute and the variometer ordinate
    pub baseline: f64,
    /// Start of the measurements this absolute was computed from
    pub starttime: DateTime<Utc>,
    /// End of the measurements this absolute was computed from
    pub endtime: DateTime<Utc>,
    /// Whether an observer accepted this absolute
    #[serde(default = "default_valid")]
    pub valid: bool,
}

fn default_valid() -> bool {
    true
}

impl Absolute {
    /// Create a valid absolute
    pub fn new(
        element: Element,
        absolute: f64,
        baseline: f64,
        starttime: DateTime<Utc>,
        endtime: DateTime<Utc>,
    ) -> Self {
        Self {
            element,
            absolute,
            baseline,
            starttime,
            endtime,
            valid: true,
        }
    }

    /// Variometer ordinate implied by this absolute
    pub fn ordinate(&self) -> f64 {
        self.absolute - self.baseline
    }
}

/// Kind of raw theodolite measurement within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeasurementType {
    FirstMarkUp,
    FirstMarkDown,
    WestDown,
    EastDown,
    WestUp,
    EastUp,
    SecondMarkUp,
    SecondMarkDown,
    SouthDown,
    NorthUp,
    SouthUp,
    NorthDown,
    Temperature,
}

/// Raw measurement taken during a calibration session
///
/// These are carried for provenance; the matrix calculation only uses the
/// absolutes derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub measurement_type: MeasurementType,
    /// Theodolite angle in decimal degrees
    #[serde(default)]
    pub angle: f64,
    /// Residual field along the sensor axis, nT
    #[serde(default)]
    pub residual: Option<f64>,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub endtime: Option<DateTime<Utc>>,
    /// Variometer ordinates at the time of the measurement
    #[serde(default)]
    pub h: Option<f64>,
    #[serde(default)]
    pub e: Option<f64>,
    #[serde(default)]
    pub z: Option<f64>,
    #[serde(default)]
    pub f: Option<f64>,
}

/// One calibration session
///
/// A reading is usable only when its D, H and Z absolutes are all present and
/// valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(default)]
    pub absolutes: Vec<Absolute>,
    #[serde(default)]
    pub measurements: Vec<Measurement>,
    /// Pier correction in nT
    #[serde(default)]
    pub pier_correction: f64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Reading {
    /// Create a reading from its absolutes
    pub fn new(absolutes: Vec<Absolute>, pier_correction: f64) -> Self {
        Self {
            absolutes,
            pier_correction,
            ..Default::default()
        }
    }

    /// First absolute for `element`, if any
    pub fn absolute(&self, element: Element) -> Option<&Absolute> {
        self.absolutes.iter().find(|a| a.element == element)
    }

    /// Measurements of one kind, in recorded order
    pub fn measurements(&self, kind: MeasurementType) -> impl Iterator<Item = &Measurement> {
        self.measurements
            .iter()
            .filter(move |m| m.measurement_type == kind)
    }

    /// Canonical time of the reading: the end time of its H absolute
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.absolute(Element::H).map(|h| h.endtime)
    }

    /// Whether D, H and Z absolutes are all present and valid
    pub fn is_valid(&self) -> bool {
        [Element::D, Element::H, Element::Z]
            .iter()
            .all(|&e| self.absolute(e).is_some_and(|a| a.valid))
    }
}
