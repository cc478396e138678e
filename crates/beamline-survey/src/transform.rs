//! Re-projection of local track samples into global and Frenet coordinates
//!
//! Both passes resolve each element once, then transform every row of that
//! element independently. A pass either fills its column on every row or
//! leaves the table untouched.

use std::collections::HashMap;

use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::element::FrameChoice;
use crate::error::{Result, SurveyError};
use crate::geometry::Geometry;
use crate::sequence::Sequence;
use crate::tracks::{FrenetCoordinates, GlobalCoordinates, TrackSample, TrackTable};

/// Where one element's samples live.
struct Resolved<'a> {
    /// Pose of the samples' frame in the target frame.
    pose: Isometry3<f64>,
    geometry: &'a Geometry,
    s_entry: f64,
}

/// Fills the `global` column of every row.
///
/// Samples are taken to be local to the `choice` frame of their element.
pub fn global_coordinates(table: &mut TrackTable, sequence: &Sequence, choice: FrameChoice) -> Result<()> {
    let tree = sequence.tree();
    let global = tree.global();
    let resolved = resolve(table, sequence, |index| {
        tree.pose(sequence.elements()[index].frame(choice)?, global)
    })?;

    let coordinates = map_rows(table.rows(), |row| {
        let element = &resolved[row.label.as_str()];
        let frame = element.pose * element.geometry.partial(row.x)?;
        let position = frame * Point3::new(0.0, row.y, row.z);
        let (t, p) = angles(&(frame.rotation * direction(row.t, row.p)));
        Ok(GlobalCoordinates {
            x: position.x,
            y: position.y,
            z: position.z,
            t,
            p,
        })
    })?;

    for (row, value) in table.rows_mut().iter_mut().zip(coordinates) {
        row.global = Some(value);
    }
    report("Global", table, resolved.len());
    Ok(())
}

/// Fills the `frenet` column of every row.
///
/// Each sample is expressed relative to the element's reference trajectory
/// from the survey, so `s` and the transverse offsets stay continuous from
/// one element to the next.
pub fn frenet_coordinates(table: &mut TrackTable, sequence: &Sequence, choice: FrameChoice) -> Result<()> {
    let tree = sequence.tree();
    let resolved = resolve(table, sequence, |index| {
        let reference = sequence.frenet_reference(index)?;
        tree.relative_pose(sequence.elements()[index].frame(choice)?, reference)
    })?;

    let coordinates = map_rows(table.rows(), |row| {
        let element = &resolved[row.label.as_str()];
        let frame = element.pose * element.geometry.partial(row.x)?;
        let position = frame * Point3::new(0.0, row.y, row.z);

        let s = element.geometry.project(&position)?;
        let path = element.geometry.partial(s)?;
        let offset = path.inverse_transform_point(&position);
        let heading = path.rotation.inverse() * frame.rotation * direction(row.t, row.p);
        let (t, p) = angles(&heading);
        Ok(FrenetCoordinates {
            s: element.s_entry + s,
            y: offset.y,
            z: offset.z,
            t,
            p,
        })
    })?;

    for (row, value) in table.rows_mut().iter_mut().zip(coordinates) {
        row.frenet = Some(value);
    }
    report("Frenet", table, resolved.len());
    Ok(())
}

/// Resolves every label of `table` once; unknown labels and non-finite
/// samples reject the pass.
fn resolve<'a, F>(table: &TrackTable, sequence: &'a Sequence, pose: F) -> Result<HashMap<String, Resolved<'a>>>
where
    F: Fn(usize) -> Result<Isometry3<f64>>,
{
    sequence.record()?;
    if let Some(row) = table.rows().iter().find(|row| !row.is_finite()) {
        return Err(SurveyError::InvalidSample {
            label: row.label.clone(),
            particle: row.particle,
        });
    }
    let mut resolved = HashMap::new();
    for (label, count) in table.label_counts() {
        let index = sequence
            .index_of(label)
            .ok_or_else(|| SurveyError::LabelMismatch {
                label: label.to_string(),
            })?;
        debug!("Resolving {} samples of {}", count, label);
        resolved.insert(
            label.to_string(),
            Resolved {
                pose: pose(index)?,
                geometry: sequence.elements()[index].geometry(),
                s_entry: sequence.s_entry(index)?,
            },
        );
    }
    Ok(resolved)
}

#[cfg(feature = "parallel")]
fn map_rows<T, F>(rows: &[TrackSample], f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(&TrackSample) -> Result<T> + Sync + Send,
{
    rows.par_iter().map(f).collect()
}

#[cfg(not(feature = "parallel"))]
fn map_rows<T, F>(rows: &[TrackSample], f: F) -> Result<Vec<T>>
where
    F: Fn(&TrackSample) -> Result<T>,
{
    rows.iter().map(f).collect()
}

/// Unit propagation direction for local angles `t` (horizontal) and `p`
/// (vertical): the inverse of `Rz(-t) * Ry(p)` applied to the longitudinal axis.
pub fn direction(t: f64, p: f64) -> Vector3<f64> {
    let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -t)
        * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), p);
    rotation.inverse() * Vector3::x()
}

/// Horizontal and vertical angles of a unit direction.
fn angles(direction: &Vector3<f64>) -> (f64, f64) {
    (
        direction.y.atan2(direction.x),
        direction.z.clamp(-1.0, 1.0).asin(),
    )
}

fn report(pass: &str, table: &TrackTable, elements: usize) {
    info!("{} coordinates for {} samples over {} elements", pass, table.len(), elements);
    let lost = table.lost();
    if lost > 0 {
        warn!("{} samples belong to lost particles", lost);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::frame::Frame;
    use crate::geometry::Misalignment;
    use crate::sequence::{Survey, SurveyMode};
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2, FRAC_PI_4};

    fn surveyed(elements: Vec<Element>, survey: &Survey) -> Sequence {
        let mut sequence = Sequence::new(elements).unwrap();
        sequence.survey(survey).unwrap();
        sequence
    }

    fn drift_and_bend() -> Sequence {
        surveyed(
            vec![
                Element::new("D1", Geometry::straight(2.0)),
                Element::new("B1", Geometry::sector_bend(FRAC_PI_2, 1.0)),
            ],
            &Survey::default(),
        )
    }

    #[test]
    fn test_direction_convention() {
        assert_relative_eq!(direction(0.0, 0.0), Vector3::x(), epsilon = 1e-15);
        let d = direction(0.1, 0.0);
        assert_relative_eq!(d, Vector3::new(0.1f64.cos(), 0.1f64.sin(), 0.0), epsilon = 1e-15);
        let d = direction(0.0, 0.2);
        assert_relative_eq!(d, Vector3::new(0.2f64.cos(), 0.0, 0.2f64.sin()), epsilon = 1e-15);
    }

    #[test]
    fn test_zero_sample_lands_on_entry() {
        let mut origin = Frame::new();
        origin.translate(Vector3::new(5.0, 0.0, 0.0));
        let sequence = surveyed(
            vec![Element::new("D1", Geometry::straight(1.0))],
            &Survey::default().with_origin(origin),
        );
        let mut table = TrackTable::from(vec![TrackSample::new("D1", 1)]);

        global_coordinates(&mut table, &sequence, FrameChoice::EntryPatched).unwrap();

        let g = table.rows()[0].global.unwrap();
        assert_eq!((g.x, g.y, g.z), (5.0, 0.0, 0.0));
        assert_eq!((g.t, g.p), (0.0, 0.0));
    }

    #[test]
    fn test_bend_sample_in_global_frame() {
        let sequence = drift_and_bend();
        let mut table = TrackTable::from(vec![
            TrackSample::new("B1", 1).with_position(FRAC_PI_4, 0.1, 0.02),
        ]);

        global_coordinates(&mut table, &sequence, FrameChoice::EntryPatched).unwrap();

        let g = table.rows()[0].global.unwrap();
        // on a circle of radius 0.9 around the curvature center (2, 1)
        assert_relative_eq!(g.x, 2.0 + 0.9 * FRAC_1_SQRT_2, epsilon = 1e-12);
        assert_relative_eq!(g.y, 1.0 - 0.9 * FRAC_1_SQRT_2, epsilon = 1e-12);
        assert_relative_eq!(g.z, 0.02, epsilon = 1e-12);
        assert_relative_eq!(g.t, FRAC_PI_4, epsilon = 1e-12);
    }

    #[test]
    fn test_unknown_label_transforms_nothing() {
        let sequence = drift_and_bend();
        let mut table = TrackTable::from(vec![
            TrackSample::new("D1", 1),
            TrackSample::new("Q9", 1),
        ]);

        let err = global_coordinates(&mut table, &sequence, FrameChoice::EntryPatched).unwrap_err();
        assert_eq!(err, SurveyError::LabelMismatch { label: "Q9".to_string() });
        assert!(table.rows().iter().all(|row| row.global.is_none()));

        assert!(frenet_coordinates(&mut table, &sequence, FrameChoice::EntryPatched).is_err());
        assert!(table.rows().iter().all(|row| row.frenet.is_none()));
    }

    #[test]
    fn test_non_finite_sample_transforms_nothing() {
        let sequence = drift_and_bend();
        for bad in [
            TrackSample::new("D1", 7).with_position(0.5, f64::NAN, 0.0),
            TrackSample::new("B1", 7).with_angles(f64::INFINITY, 0.0),
        ] {
            let mut table = TrackTable::from(vec![TrackSample::new("D1", 1), bad.clone()]);
            let expected = SurveyError::InvalidSample {
                label: bad.label.clone(),
                particle: 7,
            };

            assert_eq!(
                global_coordinates(&mut table, &sequence, FrameChoice::EntryPatched).unwrap_err(),
                expected
            );
            assert_eq!(
                frenet_coordinates(&mut table, &sequence, FrameChoice::EntryPatched).unwrap_err(),
                expected
            );
            assert!(table.rows().iter().all(|row| row.global.is_none() && row.frenet.is_none()));
        }
    }

    #[test]
    fn test_unsurveyed_sequence_is_rejected() {
        let sequence = Sequence::new([Element::new("D1", Geometry::straight(1.0))]).unwrap();
        let mut table = TrackTable::from(vec![TrackSample::new("D1", 1)]);
        assert_eq!(
            global_coordinates(&mut table, &sequence, FrameChoice::Entry).unwrap_err(),
            SurveyError::NotSurveyed
        );
    }

    #[test]
    fn test_frenet_is_continuous_across_bend_entry() {
        let sequence = drift_and_bend();
        let mut table = TrackTable::from(vec![
            TrackSample::new("D1", 1).with_position(2.0, 0.003, -0.001).with_angles(0.01, 0.0),
            TrackSample::new("B1", 1).with_position(0.0, 0.003, -0.001).with_angles(0.01, 0.0),
            TrackSample::new("B1", 1).with_position(FRAC_PI_2, 0.003, -0.001).with_angles(0.01, 0.0),
        ]);

        frenet_coordinates(&mut table, &sequence, FrameChoice::EntryPatched).unwrap();

        let rows: Vec<FrenetCoordinates> = table.rows().iter().map(|r| r.frenet.unwrap()).collect();
        assert_relative_eq!(rows[0].s, 2.0, epsilon = 1e-12);
        assert_relative_eq!(rows[1].s, 2.0, epsilon = 1e-12);
        assert_relative_eq!(rows[2].s, 2.0 + FRAC_PI_2, epsilon = 1e-12);
        for row in &rows {
            assert_relative_eq!(row.y, 0.003, epsilon = 1e-12);
            assert_relative_eq!(row.z, -0.001, epsilon = 1e-12);
            assert_relative_eq!(row.t, 0.01, epsilon = 1e-12);
            assert_relative_eq!(row.p, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_frenet_sees_misalignment_as_offset() {
        let survey = Survey::new(SurveyMode::Patched);
        let sequence = surveyed(
            vec![
                Element::new("Q1", Geometry::straight(1.0))
                    .with_misalignment(Misalignment::new(Vector3::new(0.0, 0.002, 0.0), 0.0)),
                Element::new("D1", Geometry::straight(1.0)),
            ],
            &survey,
        );
        let mut table = TrackTable::from(vec![
            TrackSample::new("Q1", 1).with_position(0.5, 0.0, 0.0),
            TrackSample::new("D1", 1).with_position(0.5, 0.0, 0.0),
        ]);

        frenet_coordinates(&mut table, &sequence, FrameChoice::EntryPatched).unwrap();

        let q1 = table.rows()[0].frenet.unwrap();
        assert_relative_eq!(q1.s, 0.5, epsilon = 1e-12);
        assert_relative_eq!(q1.y, 0.002, epsilon = 1e-12);
        // the patched chain carries the offset downstream
        let d1 = table.rows()[1].frenet.unwrap();
        assert_relative_eq!(d1.s, 1.5, epsilon = 1e-12);
        assert_relative_eq!(d1.y, 0.002, epsilon = 1e-12);
    }

    #[test]
    fn test_rows_keep_input_order() {
        let sequence = drift_and_bend();
        let mut table = TrackTable::from(vec![
            TrackSample::new("B1", 2).with_position(0.5, 0.0, 0.0),
            TrackSample::new("D1", 1).with_position(1.0, 0.0, 0.0),
            TrackSample::new("B1", 1).with_position(1.0, 0.0, 0.0),
        ]);

        frenet_coordinates(&mut table, &sequence, FrameChoice::Entry).unwrap();

        let s: Vec<f64> = table.rows().iter().map(|r| r.frenet.unwrap().s).collect();
        assert_relative_eq!(s[0], 2.5, epsilon = 1e-12);
        assert_relative_eq!(s[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(s[2], 3.0, epsilon = 1e-12);
        assert_eq!(table.rows()[0].particle, 2);
    }
}
