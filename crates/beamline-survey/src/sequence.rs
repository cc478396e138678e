//! Element sequences and the survey pass
//!
//! A survey is a strict left-to-right scan: element 0 sits on the origin
//! frame, every following element sits on the exit of its upstream
//! neighbour. Rigid transforms compose associatively, so the pass is a
//! prefix composition over the element transforms seeded by the origin.

use std::collections::HashMap;

use nalgebra::{Isometry3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::element::{Element, FrameChoice};
use crate::error::{Result, SurveyError};
use crate::frame::{Frame, FrameId, FrameTree};

/// Which exit frame the next element is chained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyMode {
    /// Idealized layout: chain on `exit`.
    #[default]
    Nominal,
    /// As-built layout: chain on `exit_patched`.
    Patched,
}

/// Survey parameters.
#[derive(Debug, Clone, Default)]
pub struct Survey {
    pub mode: SurveyMode,
    /// Initial reference frame, always relative to the global origin.
    origin: Frame,
}

impl Survey {
    pub fn new(mode: SurveyMode) -> Self {
        Self {
            mode,
            origin: Frame::new(),
        }
    }

    /// Sets the initial reference frame. Only its local pose is kept: the
    /// origin always hangs off the global frame of the surveyed tree, so any
    /// parent handle on `origin` is dropped.
    pub fn with_origin(mut self, origin: Frame) -> Self {
        self.origin = Frame::from_pose(&origin.local(), None);
        self
    }

    pub fn origin(&self) -> &Frame {
        &self.origin
    }
}

/// Result of the last survey of a [`Sequence`].
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyRecord {
    pub mode: SurveyMode,
    pub origin: FrameId,
    /// Per element: entry of the path-following reference trajectory.
    pub frenet: Vec<FrameId>,
    /// Per element: path length at the entry.
    pub s: Vec<f64>,
    pub length: f64,
}

/// Origin of a serialized beamline.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OriginDescription {
    #[serde(default)]
    pub position: [f64; 3],
    /// Rotation vector (axis scaled by angle, radians).
    #[serde(default)]
    pub angles: [f64; 3],
}

impl OriginDescription {
    pub fn to_frame(&self) -> Frame {
        let mut frame = Frame::new();
        frame
            .rotate(Vector3::from(self.angles))
            .translate(Vector3::from(self.position));
        frame
    }
}

/// Serialized beamline: an origin and an ordered list of elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamlineDescription {
    #[serde(default)]
    pub origin: Option<OriginDescription>,
    pub elements: Vec<Element>,
}

/// Position and rotation vector of one frame in the global frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PoseReport {
    pub position: [f64; 3],
    pub angles: [f64; 3],
}

impl From<Isometry3<f64>> for PoseReport {
    fn from(pose: Isometry3<f64>) -> Self {
        let angles = pose.rotation.scaled_axis();
        Self {
            position: pose.translation.vector.into(),
            angles: angles.into(),
        }
    }
}

/// Per-element summary handed to rendering and analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementReport {
    pub label: String,
    pub kind: &'static str,
    pub length: f64,
    pub s_entry: f64,
    pub s_exit: f64,
    pub entry: PoseReport,
    pub entry_patched: PoseReport,
    pub exit: PoseReport,
    pub exit_patched: PoseReport,
    pub center: PoseReport,
}

/// Ordered, label-unique list of elements with the frames of their last
/// survey.
#[derive(Debug, Clone)]
pub struct Sequence {
    elements: Vec<Element>,
    index: HashMap<String, usize>,
    tree: FrameTree,
    record: Option<SurveyRecord>,
}

impl Default for Sequence {
    fn default() -> Self {
        Self {
            elements: Vec::new(),
            index: HashMap::new(),
            tree: FrameTree::new(),
            record: None,
        }
    }
}

impl Sequence {
    pub fn new(elements: impl IntoIterator<Item = Element>) -> Result<Self> {
        let mut sequence = Self::default();
        for element in elements {
            sequence.push(element)?;
        }
        Ok(sequence)
    }

    /// Builds the sequence and the survey parameters of a serialized beamline.
    pub fn from_description(description: BeamlineDescription, mode: SurveyMode) -> Result<(Self, Survey)> {
        let origin = description.origin.unwrap_or_default().to_frame();
        let sequence = Self::new(description.elements)?;
        Ok((sequence, Survey::new(mode).with_origin(origin)))
    }

    /// Appends an element; the previous survey is discarded.
    pub fn push(&mut self, element: Element) -> Result<()> {
        if self.index.contains_key(&element.label) {
            return Err(SurveyError::DuplicateLabel {
                label: element.label,
            });
        }
        self.invalidate();
        self.index.insert(element.label.clone(), self.elements.len());
        self.elements.push(element);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    pub fn get(&self, label: &str) -> Option<&Element> {
        self.index_of(label).map(|i| &self.elements[i])
    }

    /// Sum of the physical lengths of all elements.
    pub fn total_length(&self) -> f64 {
        self.elements.iter().map(Element::length).sum()
    }

    pub fn tree(&self) -> &FrameTree {
        &self.tree
    }

    /// Edits one element in place; the previous survey is discarded.
    pub fn update<F>(&mut self, label: &str, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Element),
    {
        let index = self.index_of(label).ok_or_else(|| SurveyError::LabelMismatch {
            label: label.to_string(),
        })?;
        self.invalidate();
        let element = &mut self.elements[index];
        edit(element);
        // the label index must stay in sync
        if element.label != label {
            let renamed = element.label.clone();
            if self.index.contains_key(&renamed) {
                self.elements[index].label = label.to_string();
                return Err(SurveyError::DuplicateLabel { label: renamed });
            }
            self.index.remove(label);
            self.index.insert(renamed, index);
        }
        Ok(())
    }

    /// Drops every placement and frame of the previous survey.
    pub fn invalidate(&mut self) {
        for element in &mut self.elements {
            element.clear();
        }
        self.tree = FrameTree::new();
        self.record = None;
    }

    /// Places every element, replacing any previous survey.
    ///
    /// On error the sequence is left unsurveyed rather than partially placed.
    pub fn survey(&mut self, survey: &Survey) -> Result<&SurveyRecord> {
        self.invalidate();
        match self.place_all(survey) {
            Ok(record) => Ok(&*self.record.insert(record)),
            Err(err) => {
                self.invalidate();
                Err(err)
            }
        }
    }

    fn place_all(&mut self, survey: &Survey) -> Result<SurveyRecord> {
        let tree = &mut self.tree;
        let global = tree.global();
        let origin = tree.insert(Frame::from_pose(&survey.origin.local(), Some(global)))?;

        let mut frenet = Vec::with_capacity(self.elements.len());
        let mut s = Vec::with_capacity(self.elements.len());
        let mut entry = origin;
        let mut reference = origin;
        let mut path = 0.0;

        for element in &mut self.elements {
            let placement = *element.place(tree, entry)?;
            s.push(path);
            path += element.length();

            match survey.mode {
                SurveyMode::Nominal => {
                    frenet.push(placement.entry);
                    entry = placement.exit;
                }
                SurveyMode::Patched => {
                    // the reference trajectory ignores misalignment
                    frenet.push(reference);
                    reference = tree.attach(reference, &element.geometry().transform()?)?;
                    entry = placement.exit_patched;
                }
            }
            debug!("Surveyed {} at s = {:.6}", element.label, path);
        }

        info!(
            "Survey ({:?}) placed {} elements over {:.6} length units, {} frames",
            survey.mode,
            self.elements.len(),
            path,
            tree.len()
        );

        Ok(SurveyRecord {
            mode: survey.mode,
            origin,
            frenet,
            s,
            length: path,
        })
    }

    pub fn record(&self) -> Result<&SurveyRecord> {
        self.record.as_ref().ok_or(SurveyError::NotSurveyed)
    }

    pub fn is_surveyed(&self) -> bool {
        self.record.is_some()
    }

    /// Entry of the path-following reference trajectory for element `index`.
    pub fn frenet_reference(&self, index: usize) -> Result<FrameId> {
        self.record()?
            .frenet
            .get(index)
            .copied()
            .ok_or(SurveyError::NotSurveyed)
    }

    /// Path length at the entry of element `index`.
    pub fn s_entry(&self, index: usize) -> Result<f64> {
        self.record()?.s.get(index).copied().ok_or(SurveyError::NotSurveyed)
    }

    /// Pose of one placed frame of `label` in the global frame.
    pub fn global_pose(&self, label: &str, choice: FrameChoice) -> Result<Isometry3<f64>> {
        let element = self.get(label).ok_or_else(|| SurveyError::LabelMismatch {
            label: label.to_string(),
        })?;
        self.tree.pose(element.frame(choice)?, self.tree.global())
    }

    /// Global placement summary of every element.
    pub fn report(&self) -> Result<Vec<ElementReport>> {
        let record = self.record()?;
        let global = self.tree.global();
        self.elements
            .iter()
            .zip(&record.s)
            .map(|(element, &s_entry)| {
                let placement = element.placement()?;
                let pose = |frame| self.tree.pose(frame, global).map(PoseReport::from);
                Ok(ElementReport {
                    label: element.label.clone(),
                    kind: element.geometry().kind(),
                    length: element.length(),
                    s_entry,
                    s_exit: s_entry + element.length(),
                    entry: pose(placement.entry)?,
                    entry_patched: pose(placement.entry_patched)?,
                    exit: pose(placement.exit)?,
                    exit_patched: pose(placement.exit_patched)?,
                    center: pose(placement.center)?,
                })
            })
            .collect()
    }
}
