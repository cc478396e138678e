//! Error taxonomy for surveys and coordinate transformations

use thiserror::Error;

use crate::frame::FrameId;

/// Errors raised by the survey core.
///
/// Every variant is a programmer or data-integrity error: nothing here is
/// transient, so callers abort the current pass instead of retrying.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SurveyError {
    /// The requested reference is not reachable by walking parent links.
    #[error("frame {frame:?} is not resolvable relative to {reference:?}: reference is not in its parent chain")]
    ReferenceNotInChain { frame: FrameId, reference: FrameId },

    /// A handle that does not belong to the frame tree it was used with.
    #[error("unknown frame handle {0:?}")]
    UnknownFrame(FrameId),

    /// A derived frame was requested before the element was placed.
    #[error("element '{label}' has not been placed")]
    NotPlaced { label: String },

    /// Geometry parameters that would produce an undefined transform.
    #[error("degenerate geometry: {reason}")]
    GeometryDegenerate { reason: String },

    /// A track row references a label absent from the surveyed sequence.
    #[error("track samples reference unknown element '{label}'")]
    LabelMismatch { label: String },

    /// A track sample with a non-finite coordinate, angle or momentum offset.
    #[error("track sample of particle {particle} in '{label}' has a non-finite value")]
    InvalidSample { label: String, particle: u32 },

    /// Two elements of one sequence share a label.
    #[error("duplicate element label '{label}' in sequence")]
    DuplicateLabel { label: String },

    /// A coordinate pass was requested on a sequence that was never surveyed.
    #[error("sequence has not been surveyed")]
    NotSurveyed,
}

impl SurveyError {
    pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
        Self::GeometryDegenerate {
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = SurveyError> = std::result::Result<T, E>;
