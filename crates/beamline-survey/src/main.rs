//! survey-tracks: CLI tool for surveying a beamline and transforming its tracks

use anyhow::{Context, Result};
use beamline_survey::{load_beamline, load_tracks, process, FrameChoice, SurveyConfig, SurveyMode};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "survey-tracks")]
#[command(about = "Survey a beamline and re-express track samples in global and Frenet coordinates")]
#[command(version)]
struct Args {
    /// Input JSON file (beamline description)
    #[arg(short, long)]
    input: PathBuf,

    /// Track sample table (JSON) to augment
    #[arg(short, long)]
    tracks: Option<PathBuf>,

    /// Output JSON file
    #[arg(short, long, required_unless_present = "stdout")]
    output: Option<PathBuf>,

    /// Chain elements on their misaligned exits
    #[arg(long)]
    patched: bool,

    /// Frame the track samples are local to
    #[arg(long, value_enum, default_value = "entry-patched")]
    frame: FrameArg,

    /// Skip the global coordinate pass
    #[arg(long)]
    no_global: bool,

    /// Skip the Frenet coordinate pass
    #[arg(long)]
    no_frenet: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log: String,

    /// Print the result to stdout instead of a file
    #[arg(long)]
    stdout: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FrameArg {
    Entry,
    EntryPatched,
    Exit,
    ExitPatched,
    Center,
}

impl From<FrameArg> for FrameChoice {
    fn from(arg: FrameArg) -> Self {
        match arg {
            FrameArg::Entry => FrameChoice::Entry,
            FrameArg::EntryPatched => FrameChoice::EntryPatched,
            FrameArg::Exit => FrameChoice::Exit,
            FrameArg::ExitPatched => FrameChoice::ExitPatched,
            FrameArg::Center => FrameChoice::Center,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log).context("Invalid log level")?)
        .with_writer(std::io::stderr)
        .init();

    // Read inputs
    let description = load_beamline(&args.input)?;
    let tracks = args.tracks.as_deref().map(load_tracks).transpose()?;

    // Build config
    let config = SurveyConfig {
        mode: if args.patched {
            SurveyMode::Patched
        } else {
            SurveyMode::Nominal
        },
        frame: args.frame.into(),
        global: !args.no_global,
        frenet: !args.no_frenet,
    };

    let output = process(description, tracks, &config).context("Survey failed")?;
    let json = serde_json::to_string_pretty(&output)?;

    // Output
    match args.output {
        Some(path) if !args.stdout => {
            fs::write(&path, &json)
                .with_context(|| format!("Failed to write output file: {:?}", path))?;
            info!("Wrote survey of {} elements to {:?}", output.elements.len(), path);
        }
        _ => println!("{}", json),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_defaults_to_info() {
        let args = Args::try_parse_from(["survey-tracks", "-i", "line.json", "--stdout"]).unwrap();
        assert_eq!(args.log, "info");
        assert!(EnvFilter::try_new(&args.log).is_ok());

        let args = Args::try_parse_from([
            "survey-tracks",
            "-i",
            "line.json",
            "-o",
            "out.json",
            "--log",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.log, "debug");
    }

    #[test]
    fn test_output_or_stdout_is_required() {
        assert!(Args::try_parse_from(["survey-tracks", "-i", "line.json"]).is_err());
    }
}
