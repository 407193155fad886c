use chrono::{DateTime, TimeDelta, Utc};
use geomag_adjusted::{
    Absolute, AdjustedError, Affine, AffineExt, Element, HorizontalOrdinate, MetricElement,
    Observations, Reading, Transform, TransformKind,
};
use nalgebra::{Matrix3, Matrix4, Vector3};
use serde::Deserialize;
use std::error::Error;

/// One row of `testdata/synthetic_readings.csv`
///
/// Generated from random ordinates mapped through a fixed rotation
/// (0.8° about Z, 0.3° about Y, -0.5° about X) and translation.
#[derive(Debug, Deserialize)]
struct SyntheticReading {
    starttime: DateTime<Utc>,
    endtime: DateTime<Utc>,
    d_absolute: f64,
    d_baseline: f64,
    h_absolute: f64,
    h_baseline: f64,
    z_absolute: f64,
    z_baseline: f64,
    pier_correction: f64,
}

impl SyntheticReading {
    fn into_reading(self) -> Reading {
        let (start, end) = (self.starttime, self.endtime);
        Reading::new(
            vec![
                Absolute::new(Element::D, self.d_absolute, self.d_baseline, start, end),
                Absolute::new(Element::H, self.h_absolute, self.h_baseline, start, end),
                Absolute::new(Element::Z, self.z_absolute, self.z_baseline, start, end),
            ],
            self.pier_correction,
        )
    }
}

fn load_readings() -> Result<Vec<Reading>, Box<dyn Error>> {
    let mut reader = csv::Reader::from_path("testdata/synthetic_readings.csv")?;
    let mut readings = Vec::new();
    for result in reader.deserialize() {
        let record: SyntheticReading = result?;
        readings.push(record.into_reading());
    }
    Ok(readings)
}

fn hidden_transform() -> Matrix4<f64> {
    #[rustfmt::skip]
    let rotation = Matrix3::new(
        0.9998888175929077, -0.01400733607248772, 0.005113412638268541,
        0.0139619889490318, 0.9998638128275725, 0.008798787558312074,
        -0.00523596383141958, -0.008726415877184502, 0.9999482158335473,
    );
    Matrix4::from_parts(rotation, Vector3::new(150.0, -80.0, 40.0))
}

const MEAN_PIER_CORRECTION: f64 = -1.503135;

fn first_time(readings: &[Reading]) -> DateTime<Utc> {
    readings[0].time().unwrap()
}

#[test]
fn test_end_to_end_rotation_translation() -> Result<(), Box<dyn Error>> {
    let readings = load_readings()?;
    assert_eq!(readings.len(), 20);
    let start = first_time(&readings);

    // the single window is centred on the first reading, so causal weighting
    // would leave only that reading to fit
    let affine = Affine::new("SYN", start, start + TimeDelta::days(30))
        .with_update_interval(None)
        .with_acausal(true)
        .with_transforms(vec![Transform::new(TransformKind::RotationTranslation3D)]);
    let matrices = affine.calculate(&readings)?;

    assert_eq!(matrices.len(), 1);
    let adjusted = &matrices[0];
    assert!(adjusted.is_valid());
    assert_eq!(adjusted.starttime, Some(start));
    assert_eq!(adjusted.endtime, Some(start + TimeDelta::days(30)));

    let error = (adjusted.matrix - hidden_transform()).abs().max();
    assert!(error < 1e-3, "matrix off by {}:\n{}", error, adjusted.matrix);
    assert!((adjusted.pier_correction - MEAN_PIER_CORRECTION).abs() < 1e-9);

    assert_eq!(adjusted.metrics.len(), 4);
    assert_eq!(adjusted.metrics[3].element, MetricElement::DF);
    for metric in &adjusted.metrics {
        assert!(metric.absmean < 1e-3, "{:?}", metric);
    }
    Ok(())
}

#[test]
fn test_weekly_windows() -> Result<(), Box<dyn Error>> {
    let readings = load_readings()?;
    let start = first_time(&readings);

    // default two-stage configuration, one matrix per week
    let affine = Affine::new("SYN", start, start + TimeDelta::days(30));
    let matrices = affine.calculate(&readings)?;

    assert_eq!(matrices.len(), 5);
    for (i, adjusted) in matrices.iter().enumerate() {
        let window_start = start + TimeDelta::days(7 * i as i64);
        assert_eq!(adjusted.starttime, Some(window_start));
        assert_eq!(adjusted.endtime, Some(window_start + TimeDelta::days(7)));
        assert!(adjusted.is_valid(), "window {} invalid", i);
        assert!(adjusted.pier_correction < -1.4 && adjusted.pier_correction > -1.6);
    }
    Ok(())
}

#[test]
fn test_stages_compose_in_reverse_order() -> Result<(), Box<dyn Error>> {
    let readings = load_readings()?;
    let start = first_time(&readings);
    let rescale = Transform::new(TransformKind::Rescale3D);
    let translate = Transform::new(TransformKind::TranslateOrigins);

    let affine = Affine::new("SYN", start, start + TimeDelta::days(30))
        .with_update_interval(None)
        .with_acausal(true)
        .with_transforms(vec![rescale, translate]);
    let composed = affine.calculate(&readings)?[0].matrix;

    // replay the stages by hand; every reading has unit weight here
    let observations = Observations::from_readings(&readings, HorizontalOrdinate::Component);
    let first = rescale.calculate(&observations.ordinates, &observations.absolutes, None)?;
    let intermediate = first.apply(&observations.ordinates);
    let second = translate.calculate(&intermediate, &observations.absolutes, None)?;

    assert!((composed - second * first).abs().max() < 1e-9);

    // the composed matrix reproduces the staged result on the raw ordinates
    let staged = second.apply(&intermediate);
    assert!((composed.apply(&observations.ordinates) - staged).abs().max() < 1e-6);
    Ok(())
}

#[test]
fn test_reset_marker_discards_earlier_readings() -> Result<(), Box<dyn Error>> {
    let mut readings = load_readings()?;
    let start = first_time(&readings);

    // instrument change ten days in
    let marker_start = start + TimeDelta::days(10);
    let marker_end = marker_start + TimeDelta::minutes(30);
    readings.push(Reading::new(
        vec![
            Absolute::new(Element::D, 1.6, 1.7, marker_start, marker_end),
            Absolute::new(Element::H, 0.0, 400.0, marker_start, marker_end),
            Absolute::new(Element::Z, 47000.0, -70.0, marker_start, marker_end),
        ],
        0.0,
    ));

    let observations = Observations::from_readings(&readings, HorizontalOrdinate::Component);
    assert_eq!(observations.len(), 13);
    assert!(observations.times.iter().all(|t| *t > marker_end));

    // what remains still pins down the transform
    let affine = Affine::new("SYN", start, start + TimeDelta::days(30))
        .with_update_interval(None)
        .with_acausal(true)
        .with_transforms(vec![Transform::new(TransformKind::RotationTranslation3D)]);
    let adjusted = &affine.calculate(&readings)?[0];
    assert!((adjusted.matrix - hidden_transform()).abs().max() < 1e-3);
    Ok(())
}

#[test]
fn test_invalid_readings_are_skipped() -> Result<(), Box<dyn Error>> {
    let mut readings = load_readings()?;
    readings[3].absolutes[0].valid = false;
    readings[8].absolutes.retain(|a| a.element != Element::Z);

    let observations = Observations::from_readings(&readings, HorizontalOrdinate::Component);
    assert_eq!(observations.len(), 18);
    assert_eq!(observations.ordinates.ncols(), 18);
    assert_eq!(observations.baselines[2].len(), 18);
    Ok(())
}

#[test]
fn test_causal_window_without_history_is_nan() -> Result<(), Box<dyn Error>> {
    let readings = load_readings()?;
    let start = first_time(&readings) - TimeDelta::days(1);

    let affine = Affine::new("SYN", start, start + TimeDelta::days(14))
        .with_update_interval(Some(7 * 86_400))
        .with_transforms(vec![Transform::new(TransformKind::RotationTranslation3D)]);
    let matrices = affine.calculate(&readings)?;

    assert_eq!(matrices.len(), 2);
    // nothing precedes the first window's start
    assert!(!matrices[0].is_valid());
    assert!(matrices[0].matrix.iter().all(|v| v.is_nan()));
    assert!(matrices[0].pier_correction.is_nan());
    // the first six days of readings precede the second
    assert!(matrices[1].is_valid());
    assert!((matrices[1].matrix - hidden_transform()).abs().max() < 1e-3);
    Ok(())
}

#[test]
fn test_future_unusable_reading_leaves_causal_window_alone() -> Result<(), Box<dyn Error>> {
    let mut readings = load_readings()?;
    readings.truncate(6);
    let start = first_time(&readings);

    let mut affine = Affine::new("SYN", start + TimeDelta::days(9), start + TimeDelta::days(10))
        .with_update_interval(None)
        .with_transforms(vec![Transform::new(TransformKind::TranslateOrigins)]);
    affine.h_ordinate = HorizontalOrdinate::Total;
    let before = affine.calculate(&readings)?;

    // three days after the window start, with a declination ordinate large
    // enough that the total H ordinate has no real value
    let t0 = start + TimeDelta::days(12);
    let t1 = t0 + TimeDelta::minutes(30);
    readings.push(Reading::new(
        vec![
            Absolute::new(Element::D, 80.0, 1.7, t0, t1),
            Absolute::new(Element::H, 20900.0, 400.0, t0, t1),
            Absolute::new(Element::Z, 47200.0, -70.0, t0, t1),
        ],
        -1.5,
    ));
    let after = affine.calculate(&readings)?;

    assert!(before[0].is_valid());
    assert!(after[0].is_valid());
    assert_eq!(after[0].matrix, before[0].matrix);
    assert_eq!(after[0].pier_correction, before[0].pier_correction);
    Ok(())
}

#[test]
fn test_nan_stage_poisons_window() -> Result<(), Box<dyn Error>> {
    let readings = load_readings()?;
    let start = first_time(&readings);

    // a lone reading cannot fix a rotation, the second stage could fit on its own
    let affine = Affine::new("SYN", start, start + TimeDelta::days(1))
        .with_transforms(vec![
            Transform::new(TransformKind::RotationTranslation3D),
            Transform::new(TransformKind::TranslateOrigins),
        ]);
    let matrices = affine.calculate(&readings)?;
    assert_eq!(matrices.len(), 1);
    assert!(matrices[0].matrix.iter().all(|v| v.is_nan()));
    Ok(())
}

#[test]
fn test_configuration_errors() {
    let start = DateTime::parse_from_rfc3339("2023-03-01T00:00:00Z").unwrap().to_utc();
    let affine = Affine::new("SYN", start, start + TimeDelta::days(7));

    assert_eq!(
        affine.clone().with_update_interval(Some(-60)).calculate(&[]),
        Err(AdjustedError::InvalidUpdateInterval { seconds: -60 })
    );
    assert_eq!(
        affine.clone().with_transforms(vec![]).calculate(&[]),
        Err(AdjustedError::EmptyTransforms)
    );
    // roughly 317 000 years, past the last representable date
    assert_eq!(
        affine.clone().with_update_interval(Some(10_000_000_000_000)).calculate(&[]),
        Err(AdjustedError::InvalidUpdateInterval { seconds: 10_000_000_000_000 })
    );
    let backwards = Affine::new("SYN", start, start - TimeDelta::days(1));
    assert!(matches!(backwards.calculate(&[]), Err(AdjustedError::InvalidTimeRange { .. })));
}

#[test]
fn test_json_configuration() -> Result<(), Box<dyn Error>> {
    let affine: Affine = serde_json::from_str(
        r#"{
            "observatory": "CMO",
            "starttime": "2023-03-01T00:00:00Z",
            "endtime": "2023-03-31T00:00:00Z",
            "update_interval": 1209600,
            "acausal": true,
            "h_ordinate": "total",
            "transforms": [
                {"type": "ZRotationHscaleZbaseline", "memory": 8640000.0, "acausal": true},
                {"type": "TranslateOrigins", "memory": 864000.0}
            ]
        }"#,
    )?;
    assert_eq!(affine.observatory, "CMO");
    assert_eq!(affine.update_interval, Some(14 * 86_400));
    assert_eq!(affine.h_ordinate, HorizontalOrdinate::Total);
    assert_eq!(affine.transforms[0].kind, TransformKind::ZRotationHscaleZbaseline);
    assert!(!affine.transforms[1].acausal);
    assert!(affine.validate().is_ok());

    let defaults: Affine = serde_json::from_str(r#"{"observatory": "BOU"}"#)?;
    assert_eq!(defaults.update_interval, Some(7 * 86_400));
    assert_eq!(defaults.transforms.len(), 2);
    assert_eq!(defaults.h_ordinate, HorizontalOrdinate::Component);

    let readings = load_readings()?;
    let matrices = affine.calculate(&readings)?;
    let json = serde_json::to_value(&matrices[0])?;
    assert_eq!(json["metrics"].as_array().map(Vec::len), Some(4));
    assert_eq!(json["metrics"][3]["element"], "dF");
    assert!(json["starttime"].is_string());
    Ok(())
}
