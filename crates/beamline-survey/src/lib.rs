//! beamline-survey: place beamline elements in 3D and re-express tracking
//! samples in global and path-following coordinates
//!
//! This crate provides:
//! - A frame tree with immutable, parent-relative rigid-body poses
//! - Placement geometry for straight elements, sector bends and reference changes
//! - The survey pass chaining each element on its upstream neighbour
//! - Global and Frenet re-projection of per-particle track samples
//!
//! Lengths are in one consistent unit chosen by the caller; angles are radians.

pub mod element;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod sequence;
pub mod tracks;
pub mod transform;

pub use element::{Element, FrameChoice, Placement};
pub use error::SurveyError;
pub use frame::{Frame, FrameId, FrameTree};
pub use geometry::{Geometry, Misalignment};
pub use sequence::{BeamlineDescription, ElementReport, Sequence, Survey, SurveyMode, SurveyRecord};
pub use tracks::{FrenetCoordinates, GlobalCoordinates, TrackSample, TrackTable};
pub use transform::{frenet_coordinates, global_coordinates};

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

/// Configuration for one survey-and-transform run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurveyConfig {
    /// Chain on nominal or misaligned exits
    pub mode: SurveyMode,
    /// Frame the track samples are local to
    pub frame: FrameChoice,
    /// Fill the global coordinate columns
    pub global: bool,
    /// Fill the Frenet coordinate columns
    pub frenet: bool,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            mode: SurveyMode::Nominal,
            frame: FrameChoice::EntryPatched,
            global: true,
            frenet: true,
        }
    }
}

/// Survey report plus the augmented track table, if one was given
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub mode: SurveyMode,
    pub length: f64,
    pub elements: Vec<ElementReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracks: Option<TrackTable>,
}

/// Main entry point: survey a serialized beamline and transform its tracks
pub fn run(beamline_json: &str, tracks_json: Option<&str>, config: &SurveyConfig) -> Result<PipelineOutput> {
    let description: BeamlineDescription =
        serde_json::from_str(beamline_json).context("Invalid beamline description")?;
    let tracks = tracks_json
        .map(|json| serde_json::from_str::<TrackTable>(json).context("Invalid track table"))
        .transpose()?;
    process(description, tracks, config)
}

/// Surveys `description` and, when given, augments `tracks` in place
pub fn process(
    description: BeamlineDescription,
    mut tracks: Option<TrackTable>,
    config: &SurveyConfig,
) -> Result<PipelineOutput> {
    let (mut sequence, survey) = Sequence::from_description(description, config.mode)?;
    let length = sequence.survey(&survey).context("Survey failed")?.length;

    if let Some(table) = tracks.as_mut() {
        if config.global {
            global_coordinates(table, &sequence, config.frame).context("Global coordinate pass failed")?;
        }
        if config.frenet {
            frenet_coordinates(table, &sequence, config.frame).context("Frenet coordinate pass failed")?;
        }
    }

    Ok(PipelineOutput {
        mode: config.mode,
        length,
        elements: sequence.report()?,
        tracks,
    })
}

/// Read a beamline description from a JSON file
pub fn load_beamline(path: &Path) -> Result<BeamlineDescription> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read beamline file: {:?}", path))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid beamline description in {:?}", path))
}

/// Read a track sample table from a JSON file
pub fn load_tracks(path: &Path) -> Result<TrackTable> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read track file: {:?}", path))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid track table in {:?}", path))
}
