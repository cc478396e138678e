//! Per-particle track sample tables

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Position and angles of a sample in the global Cartesian frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalCoordinates {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Horizontal angle of the direction, `atan2(dy, dx)`.
    pub t: f64,
    /// Vertical angle of the direction, `asin(dz)`.
    pub p: f64,
}

/// Position and angles of a sample relative to the reference trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrenetCoordinates {
    /// Path length along the reference trajectory, continuous across elements.
    pub s: f64,
    pub y: f64,
    pub z: f64,
    pub t: f64,
    pub p: f64,
}

/// One sample of one particle inside one element.
///
/// `x` is the path length along the element's reference trajectory (arc
/// length for bends); `y` and `z` are the transverse offsets and `t`, `p`
/// the horizontal and vertical angles in the local frame at `x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSample {
    pub label: String,
    #[serde(default)]
    pub particle: u32,
    #[serde(default)]
    pub pass: u32,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub t: f64,
    #[serde(default)]
    pub p: f64,
    /// Relative momentum offset.
    #[serde(default)]
    pub d: f64,
    #[serde(default = "alive")]
    pub alive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalCoordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frenet: Option<FrenetCoordinates>,
}

fn alive() -> bool {
    true
}

impl TrackSample {
    pub fn new(label: impl Into<String>, particle: u32) -> Self {
        Self {
            label: label.into(),
            particle,
            pass: 0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            t: 0.0,
            p: 0.0,
            d: 0.0,
            alive: true,
            global: None,
            frenet: None,
        }
    }

    pub fn with_position(mut self, x: f64, y: f64, z: f64) -> Self {
        self.x = x;
        self.y = y;
        self.z = z;
        self
    }

    pub fn with_angles(mut self, t: f64, p: f64) -> Self {
        self.t = t;
        self.p = p;
        self
    }

    /// True when every coordinate, angle and the momentum offset are finite.
    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.z, self.t, self.p, self.d]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Ordered table of track samples, keyed by element label.
///
/// Coordinate passes only fill the `global` / `frenet` columns; rows are
/// never reordered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackTable {
    rows: Vec<TrackSample>,
}

impl From<Vec<TrackSample>> for TrackTable {
    fn from(rows: Vec<TrackSample>) -> Self {
        Self { rows }
    }
}

impl FromIterator<TrackSample> for TrackTable {
    fn from_iter<I: IntoIterator<Item = TrackSample>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl TrackTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[TrackSample] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [TrackSample] {
        &mut self.rows
    }

    pub fn into_rows(self) -> Vec<TrackSample> {
        self.rows
    }

    /// Distinct labels in order of first appearance.
    pub fn labels(&self) -> Vec<&str> {
        self.label_counts().into_iter().map(|(label, _)| label).collect()
    }

    /// Distinct labels in order of first appearance, with their row counts.
    pub fn label_counts(&self) -> Vec<(&str, usize)> {
        let mut slots: HashMap<&str, usize> = HashMap::new();
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for row in &self.rows {
            match slots.entry(row.label.as_str()) {
                Entry::Occupied(slot) => counts[*slot.get()].1 += 1,
                Entry::Vacant(slot) => {
                    slot.insert(counts.len());
                    counts.push((row.label.as_str(), 1));
                }
            }
        }
        counts
    }

    pub fn rows_for<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a TrackSample> + 'a {
        self.rows.iter().filter(move |row| row.label == label)
    }

    /// Number of samples of lost particles.
    pub fn lost(&self) -> usize {
        self.rows.iter().filter(|row| !row.alive).count()
    }
}
