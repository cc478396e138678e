//! Placement geometry for the element catalogue
//!
//! Local frame axes: `x` longitudinal, `y` horizontal transverse, `z`
//! vertical. A positive bend angle turns the trajectory towards `+y`
//! (counter-clockwise about `+z`); negative angles are handled by the same
//! formulas through the signed radius `rho = sign(angle) * radius`.

use std::f64::consts::TAU;

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SurveyError};

/// Geometric description of one element kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Geometry {
    /// Zero-length marker.
    Marker,
    /// Drifts, quadrupoles and other straight magnets.
    #[serde(alias = "drift", alias = "quadrupole", alias = "multipole")]
    Straight { length: f64 },
    /// Polar-frame magnet: circular reference arc of `radius` turning by `angle`.
    #[serde(alias = "bend")]
    SectorBend { angle: f64, radius: f64 },
    /// Zero-length reference change: shift by `offset`, then turn by `angle` about `z`.
    #[serde(alias = "changref")]
    ChangeRef {
        #[serde(default)]
        offset: [f64; 3],
        #[serde(default)]
        angle: f64,
    },
    /// Zero-length roll of the reference about `x`.
    #[serde(rename = "srotation")]
    SRotation { angle: f64 },
}

impl Geometry {
    pub fn straight(length: f64) -> Self {
        Self::Straight { length }
    }

    pub fn sector_bend(angle: f64, radius: f64) -> Self {
        Self::SectorBend { angle, radius }
    }

    /// Sector bend described by its arc length instead of its radius.
    pub fn sector_bend_from_arc(length: f64, angle: f64) -> Result<Self> {
        if angle == 0.0 {
            if length != 0.0 {
                return Err(SurveyError::degenerate(format!(
                    "sector bend of arc length {length} has no bend angle"
                )));
            }
            return Ok(Self::SectorBend { angle, radius: 0.0 });
        }
        Ok(Self::SectorBend {
            angle,
            radius: length / angle.abs(),
        })
    }

    /// Short kind name used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Marker => "marker",
            Self::Straight { .. } => "straight",
            Self::SectorBend { .. } => "sector_bend",
            Self::ChangeRef { .. } => "change_ref",
            Self::SRotation { .. } => "srotation",
        }
    }

    /// Physical path length along the reference trajectory.
    pub fn length(&self) -> f64 {
        match *self {
            Self::Straight { length } => length,
            Self::SectorBend { angle, radius } if angle != 0.0 => angle.abs() * radius,
            _ => 0.0,
        }
    }

    /// Rejects parameters that would produce NaN or infinite transforms, or a
    /// straight element running backwards.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Marker => Ok(()),
            Self::Straight { length } => {
                finite("straight length", length)?;
                if length < 0.0 {
                    return Err(SurveyError::degenerate(format!(
                        "straight element has negative length {length}"
                    )));
                }
                Ok(())
            }
            Self::SectorBend { angle, radius } => {
                finite("bend angle", angle)?;
                if angle != 0.0 && !(radius.is_finite() && radius > 0.0) {
                    return Err(SurveyError::degenerate(format!(
                        "sector bend of angle {angle} rad has radius {radius}"
                    )));
                }
                Ok(())
            }
            Self::ChangeRef { offset, angle } => {
                offset.iter().try_for_each(|v| finite("reference change offset", *v))?;
                finite("reference change angle", angle)
            }
            Self::SRotation { angle } => finite("roll angle", angle),
        }
    }

    /// Rigid transform from the entry frame to the exit frame.
    pub fn transform(&self) -> Result<Isometry3<f64>> {
        self.validate()?;
        Ok(match *self {
            Self::Straight { length } => translation_x(length),
            Self::SectorBend { angle, radius } => arc(angle, radius, angle),
            Self::ChangeRef { offset, angle } => Isometry3::from_parts(
                Translation3::new(offset[0], offset[1], offset[2]),
                UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle),
            ),
            Self::SRotation { angle } => Isometry3::from_parts(
                Translation3::identity(),
                UnitQuaternion::from_axis_angle(&Vector3::x_axis(), angle),
            ),
            Self::Marker => Isometry3::identity(),
        })
    }

    /// Transform from the entry frame to the element's center frame.
    ///
    /// Straight elements place it at mid-length. Bends place it on the
    /// curvature center, turned by half the bend angle.
    pub fn center(&self) -> Result<Isometry3<f64>> {
        self.validate()?;
        Ok(match *self {
            Self::Straight { length } => translation_x(0.5 * length),
            Self::SectorBend { angle, radius } if angle != 0.0 => Isometry3::from_parts(
                Translation3::new(0.0, radius.copysign(angle), 0.0),
                UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.5 * angle),
            ),
            _ => Isometry3::identity(),
        })
    }

    /// Transform from the entry frame to the reference trajectory at path
    /// length `s` inside the element. Zero-length kinds stay on the entry.
    pub fn partial(&self, s: f64) -> Result<Isometry3<f64>> {
        self.validate()?;
        finite("path length", s)?;
        Ok(match *self {
            Self::Straight { .. } => translation_x(s),
            Self::SectorBend { angle, radius } if angle != 0.0 => {
                arc(angle, radius, s / radius.copysign(angle))
            }
            _ => Isometry3::identity(),
        })
    }

    /// Path length of the reference point closest to `point`, given in the
    /// entry frame.
    pub fn project(&self, point: &Point3<f64>) -> Result<f64> {
        self.validate()?;
        Ok(match *self {
            Self::Straight { .. } => point.x,
            Self::SectorBend { angle, radius } if angle != 0.0 => {
                let mut phi = point.x.atan2(radius - angle.signum() * point.y);
                if phi < 0.0 {
                    phi += TAU;
                }
                // split the unused part of the circle between both ends of the arc
                if phi > 0.5 * (angle.abs() + TAU) {
                    phi -= TAU;
                }
                radius * phi
            }
            _ => 0.0,
        })
    }
}

/// As-built misalignment of an element.
///
/// Applied at the entry as a shift by `offset` followed by a roll `tilt`
/// about the longitudinal axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Misalignment {
    #[serde(default)]
    pub offset: [f64; 3],
    #[serde(default)]
    pub tilt: f64,
}

impl Misalignment {
    pub fn new(offset: Vector3<f64>, tilt: f64) -> Self {
        Self {
            offset: [offset.x, offset.y, offset.z],
            tilt,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.offset.iter().all(|v| *v == 0.0) && self.tilt == 0.0
    }

    /// Entry-side patch transform.
    pub fn patch(&self) -> Result<Isometry3<f64>> {
        self.offset.iter().try_for_each(|v| finite("misalignment offset", *v))?;
        finite("misalignment tilt", self.tilt)?;
        Ok(Isometry3::from_parts(
            Translation3::new(self.offset[0], self.offset[1], self.offset[2]),
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.tilt),
        ))
    }
}

fn finite(what: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SurveyError::degenerate(format!("{what} is {value}")))
    }
}

fn translation_x(length: f64) -> Isometry3<f64> {
    Isometry3::translation(length, 0.0, 0.0)
}

/// Arc of `theta` radians on the circle of a bend whose total angle is
/// `angle`; the translation is the chord between both tangent points.
fn arc(angle: f64, radius: f64, theta: f64) -> Isometry3<f64> {
    if theta == 0.0 {
        return Isometry3::identity();
    }
    let rho = radius.copysign(angle);
    let half = 0.5 * theta;
    // 1 - cos(theta) written as 2 sin^2(theta / 2) for small angles
    let chord = Vector3::new(rho * theta.sin(), 2.0 * rho * half.sin() * half.sin(), 0.0);
    Isometry3::from_parts(
        Translation3::from(chord),
        UnitQuaternion::from_axis_angle(&Vector3::z_axis(), theta),
    )
}
