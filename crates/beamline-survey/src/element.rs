//! Patchable beamline elements

use serde::{Deserialize, Serialize};

use crate::error::{Result, SurveyError};
use crate::frame::{FrameId, FrameTree};
use crate::geometry::{Geometry, Misalignment};

/// The five frames of a placed element.
///
/// Built all at once by [`Element::place`]; a new placement replaces the
/// whole snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub entry: FrameId,
    pub entry_patched: FrameId,
    pub exit: FrameId,
    pub exit_patched: FrameId,
    pub center: FrameId,
}

/// Selects one of the five placed frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameChoice {
    Entry,
    #[default]
    EntryPatched,
    Exit,
    ExitPatched,
    Center,
}

impl Placement {
    pub fn frame(&self, choice: FrameChoice) -> FrameId {
        match choice {
            FrameChoice::Entry => self.entry,
            FrameChoice::EntryPatched => self.entry_patched,
            FrameChoice::Exit => self.exit,
            FrameChoice::ExitPatched => self.exit_patched,
            FrameChoice::Center => self.center,
        }
    }
}

/// A labelled element with its geometry, misalignment and placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub label: String,
    #[serde(flatten)]
    geometry: Geometry,
    #[serde(default)]
    misalignment: Misalignment,
    #[serde(skip)]
    placement: Option<Placement>,
}

impl Element {
    pub fn new(label: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            label: label.into(),
            geometry,
            misalignment: Misalignment::default(),
            placement: None,
        }
    }

    pub fn with_misalignment(mut self, misalignment: Misalignment) -> Self {
        self.misalignment = misalignment;
        self.placement = None;
        self
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn misalignment(&self) -> &Misalignment {
        &self.misalignment
    }

    /// Replaces the misalignment; any placement becomes stale and is dropped.
    pub fn set_misalignment(&mut self, misalignment: Misalignment) {
        self.misalignment = misalignment;
        self.placement = None;
    }

    /// Replaces the geometry; any placement becomes stale and is dropped.
    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = geometry;
        self.placement = None;
    }

    pub fn length(&self) -> f64 {
        self.geometry.length()
    }

    /// Places the element with its nominal entry on `entry` and builds
    /// every derived frame.
    ///
    /// - `entry_patched = entry * patch`
    /// - `exit = entry * geometry`
    /// - `exit_patched = entry_patched * geometry`
    /// - `center = entry * half-geometry`
    pub fn place(&mut self, tree: &mut FrameTree, entry: FrameId) -> Result<&Placement> {
        self.placement = None;
        tree.get(entry)?;

        let body = self.geometry.transform()?;
        let center = self.geometry.center()?;
        let patch = self.misalignment.patch()?;

        let entry_patched = if self.misalignment.is_zero() {
            entry
        } else {
            tree.attach(entry, &patch)?
        };
        let exit = tree.attach(entry, &body)?;
        let exit_patched = if entry_patched == entry {
            exit
        } else {
            tree.attach(entry_patched, &body)?
        };
        let center = tree.attach(entry, &center)?;

        tracing::debug!(
            "Placed {} ({}) on frame {}",
            self.label,
            self.geometry.kind(),
            entry.index()
        );

        Ok(&*self.placement.insert(Placement {
            entry,
            entry_patched,
            exit,
            exit_patched,
            center,
        }))
    }

    /// Drops the placement snapshot.
    pub fn clear(&mut self) {
        self.placement = None;
    }

    pub fn is_placed(&self) -> bool {
        self.placement.is_some()
    }

    pub fn placement(&self) -> Result<&Placement> {
        self.placement.as_ref().ok_or_else(|| SurveyError::NotPlaced {
            label: self.label.clone(),
        })
    }

    pub fn frame(&self, choice: FrameChoice) -> Result<FrameId> {
        Ok(self.placement()?.frame(choice))
    }

    pub fn entry(&self) -> Result<FrameId> {
        self.frame(FrameChoice::Entry)
    }

    pub fn entry_patched(&self) -> Result<FrameId> {
        self.frame(FrameChoice::EntryPatched)
    }

    pub fn exit(&self) -> Result<FrameId> {
        self.frame(FrameChoice::Exit)
    }

    pub fn exit_patched(&self) -> Result<FrameId> {
        self.frame(FrameChoice::ExitPatched)
    }

    pub fn center(&self) -> Result<FrameId> {
        self.frame(FrameChoice::Center)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_accessors_before_place() {
        let element = Element::new("Q1", Geometry::straight(0.5));
        assert!(!element.is_placed());
        assert_eq!(
            element.exit().unwrap_err(),
            SurveyError::NotPlaced { label: "Q1".to_string() }
        );
        assert!(element.center().is_err());
    }

    #[test]
    fn test_aligned_element_shares_patched_frames() {
        let mut tree = FrameTree::new();
        let global = tree.global();
        let mut element = Element::new("D1", Geometry::straight(2.0));
        let placement = *element.place(&mut tree, global).unwrap();

        assert_eq!(placement.entry, global);
        assert_eq!(placement.entry_patched, placement.entry);
        assert_eq!(placement.exit_patched, placement.exit);
        assert_eq!(tree.origin(placement.exit, global).unwrap(), Vector3::new(2.0, 0.0, 0.0));
        assert_eq!(tree.origin(placement.center, global).unwrap(), Vector3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_misalignment_only_moves_patched_frames() {
        let mut tree = FrameTree::new();
        let global = tree.global();
        let mut element = Element::new("Q1", Geometry::straight(1.0))
            .with_misalignment(Misalignment::new(Vector3::new(0.0, 0.01, 0.0), 0.0));
        let placement = *element.place(&mut tree, global).unwrap();

        assert_eq!(tree.origin(placement.exit, global).unwrap(), Vector3::new(1.0, 0.0, 0.0));
        let patched = tree.origin(placement.exit_patched, global).unwrap();
        assert_relative_eq!(patched, Vector3::new(1.0, 0.01, 0.0), epsilon = 1e-15);
        let entry = tree.origin(placement.entry_patched, global).unwrap();
        assert_relative_eq!(entry, Vector3::new(0.0, 0.01, 0.0), epsilon = 1e-15);
    }

    #[test]
    fn test_misaligned_bend_exit_patch() {
        let mut tree = FrameTree::new();
        let global = tree.global();
        let geometry = Geometry::sector_bend(0.4, 3.0);
        let misalignment = Misalignment::new(Vector3::new(0.0, 0.002, -0.001), 0.01);
        let mut element = Element::new("B1", geometry.clone()).with_misalignment(misalignment);
        let placement = *element.place(&mut tree, global).unwrap();

        let body = geometry.transform().unwrap();
        let patch = misalignment.patch().unwrap();
        let exit = tree.pose(placement.exit, global).unwrap();
        let exit_patched = tree.pose(placement.exit_patched, global).unwrap();

        // the exit-side patch is the entry patch carried through the body
        let expected = exit * (body.inverse() * patch * body);
        assert_relative_eq!(exit_patched, expected, epsilon = 1e-12);
        assert!((exit_patched.translation.vector - (exit * patch).translation.vector).norm() > 1e-4);
    }

    #[test]
    fn test_place_again_replaces_snapshot() {
        let mut tree = FrameTree::new();
        let global = tree.global();
        let mut element = Element::new("B1", Geometry::sector_bend(0.2, 5.0));
        let first = *element.place(&mut tree, global).unwrap();
        let second = *element.place(&mut tree, first.exit).unwrap();

        assert_eq!(second.entry, first.exit);
        assert_ne!(second.exit, first.exit);
        assert_eq!(element.placement().unwrap(), &second);
    }

    #[test]
    fn test_failed_place_leaves_element_unplaced() {
        let mut tree = FrameTree::new();
        let global = tree.global();
        let mut element = Element::new("B1", Geometry::straight(1.0));
        element.place(&mut tree, global).unwrap();

        element.set_geometry(Geometry::sector_bend(0.2, 0.0));
        assert!(element.place(&mut tree, global).is_err());
        assert!(!element.is_placed());
    }
}
