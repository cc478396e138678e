//! Hierarchical reference frames
//!
//! Frames live in a [`FrameTree`] arena and are addressed by [`FrameId`]
//! handles. A [`Frame`] value is only a builder: it can be rotated and
//! translated freely, but once inserted into a tree it is frozen, so a
//! descendant can never observe a parent that changed after it was read.
//! Children can only name parents that were inserted before them, which
//! keeps every tree acyclic by construction.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

use crate::error::{Result, SurveyError};

/// Handle to a frame stored in a [`FrameTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(usize);

impl FrameId {
    /// Position of the frame in its arena.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A rigid-body pose (unit quaternion + translation), optionally relative
/// to a parent frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    rotation: UnitQuaternion<f64>,
    translation: Vector3<f64>,
    parent: Option<FrameId>,
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl Frame {
    /// Identity frame without a parent.
    pub fn new() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
            parent: None,
        }
    }

    /// Identity frame attached to `parent`.
    pub fn with_parent(parent: FrameId) -> Self {
        Self {
            parent: Some(parent),
            ..Self::new()
        }
    }

    /// Frame whose local transform is `pose`.
    pub fn from_pose(pose: &Isometry3<f64>, parent: Option<FrameId>) -> Self {
        Self {
            rotation: pose.rotation,
            translation: pose.translation.vector,
            parent,
        }
    }

    /// Left-multiplies the rotation by the rotation vector `axis_angle`
    /// (axis scaled by the angle in radians).
    pub fn rotate(&mut self, axis_angle: Vector3<f64>) -> &mut Self {
        self.rotation = UnitQuaternion::from_scaled_axis(axis_angle) * self.rotation;
        self
    }

    /// Adds `offset` to the translation.
    pub fn translate(&mut self, offset: Vector3<f64>) -> &mut Self {
        self.translation += offset;
        self
    }

    pub fn parent(&self) -> Option<FrameId> {
        self.parent
    }

    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.rotation
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.translation
    }

    /// Transform from this frame to its parent.
    pub fn local(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.translation), self.rotation)
    }
}

/// Arena owning every frame of one survey.
///
/// Index 0 always holds the canonical global-origin frame.
#[derive(Debug, Clone)]
pub struct FrameTree {
    frames: Vec<Frame>,
}

impl Default for FrameTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTree {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::new()],
        }
    }

    /// The canonical global-origin frame.
    pub fn global(&self) -> FrameId {
        FrameId(0)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false: a tree holds at least the global frame.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Freezes `frame` into the tree and returns its handle.
    pub fn insert(&mut self, mut frame: Frame) -> Result<FrameId> {
        if let Some(parent) = frame.parent {
            self.get(parent)?;
        }
        // keep the unit-norm invariant against accumulated rounding
        frame.rotation = UnitQuaternion::new_normalize(frame.rotation.into_inner());
        let id = FrameId(self.frames.len());
        self.frames.push(frame);
        Ok(id)
    }

    /// Inserts a child of `parent` whose local transform is `local`.
    pub fn attach(&mut self, parent: FrameId, local: &Isometry3<f64>) -> Result<FrameId> {
        self.insert(Frame::from_pose(local, Some(parent)))
    }

    pub fn get(&self, id: FrameId) -> Result<&Frame> {
        self.frames.get(id.0).ok_or(SurveyError::UnknownFrame(id))
    }

    /// Pose of `frame` expressed in `reference`, which must be `frame`
    /// itself or one of its ancestors.
    pub fn pose(&self, frame: FrameId, reference: FrameId) -> Result<Isometry3<f64>> {
        self.get(reference)?;
        let mut pose = Isometry3::identity();
        let mut current = frame;
        // parents always precede children, so a walk never exceeds the arena size
        for _ in 0..=self.frames.len() {
            if current == reference {
                return Ok(pose);
            }
            let node = self.get(current)?;
            pose = node.local() * pose;
            match node.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Err(SurveyError::ReferenceNotInChain { frame, reference })
    }

    /// Origin of `frame` expressed in `reference`.
    pub fn origin(&self, frame: FrameId, reference: FrameId) -> Result<Vector3<f64>> {
        Ok(self.pose(frame, reference)?.translation.vector)
    }

    /// Orientation of `frame` relative to `reference`.
    pub fn rotation(&self, frame: FrameId, reference: FrameId) -> Result<UnitQuaternion<f64>> {
        Ok(self.pose(frame, reference)?.rotation)
    }

    /// Topmost ancestor of `frame`.
    pub fn root(&self, frame: FrameId) -> Result<FrameId> {
        let mut current = frame;
        while let Some(parent) = self.get(current)?.parent {
            current = parent;
        }
        Ok(current)
    }

    /// Pose of `frame` expressed in `reference` for any two frames that
    /// share a root, whether or not one is an ancestor of the other.
    pub fn relative_pose(&self, frame: FrameId, reference: FrameId) -> Result<Isometry3<f64>> {
        let root = self.root(frame)?;
        if self.root(reference)? != root {
            return Err(SurveyError::ReferenceNotInChain { frame, reference });
        }
        Ok(self.pose(reference, root)?.inverse() * self.pose(frame, root)?)
    }

    pub fn x(&self, frame: FrameId, reference: FrameId) -> Result<f64> {
        Ok(self.origin(frame, reference)?.x)
    }

    pub fn y(&self, frame: FrameId, reference: FrameId) -> Result<f64> {
        Ok(self.origin(frame, reference)?.y)
    }

    pub fn z(&self, frame: FrameId, reference: FrameId) -> Result<f64> {
        Ok(self.origin(frame, reference)?.z)
    }

    /// Rotation-vector components `(tx, ty, tz)` of `frame` relative to
    /// `reference`. Reporting only: compose with [`FrameTree::rotation`].
    pub fn angles(&self, frame: FrameId, reference: FrameId) -> Result<Vector3<f64>> {
        Ok(self.rotation(frame, reference)?.scaled_axis())
    }
}
