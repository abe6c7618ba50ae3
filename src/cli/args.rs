//! Command-line argument definitions.
//!
//! Parsed with clap's derive API. The positional inputs accept files,
//! directories, and `-` for stdin; everything else maps directly onto
//! [`crate::config::Settings`].

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use log::LevelFilter;

use crate::config::{EncodeMode, Settings};
use crate::format::ContainerFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Chain candidate processors; each stage feeds the next.
    Pipe,
    /// Run candidates independently and keep the smallest result.
    Parallel,
}

impl From<ModeArg> for EncodeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Pipe => EncodeMode::Pipe,
            ModeArg::Parallel => EncodeMode::Parallel,
        }
    }
}

/// Lossless file optimizer.
#[derive(Debug, Parser)]
#[command(
    name = "chisel",
    version,
    about = "Rewrites files into a smaller byte representation while preserving their decoded content"
)]
pub struct Args {
    /// Input files or directories (use '-' to read from stdin).
    #[arg(required = true, value_name = "PATH")]
    pub inputs: Vec<PathBuf>,

    /// Recurse into directory inputs.
    #[arg(short, long)]
    pub recursive: bool,

    /// Write optimized files to DIR instead of replacing in place.
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Number of worker threads (default: half the hardware parallelism).
    #[arg(short, long, value_name = "N")]
    pub threads: Option<usize>,

    /// Candidate dispatch strategy.
    #[arg(long, value_enum, default_value_t = ModeArg::Pipe)]
    pub mode: ModeArg,

    /// Log what would happen without touching any file.
    #[arg(long)]
    pub dry_run: bool,

    /// Verify decoded-content checksums before replacing a file.
    #[arg(long)]
    pub verify_checksums: bool,

    /// Preserve format metadata and file attributes (default).
    #[arg(long, overrides_with = "no_preserve_metadata", action = ArgAction::SetTrue)]
    pub preserve_metadata: bool,

    /// Strip format metadata during recompression.
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_preserve_metadata: bool,

    /// Container format to repack into when the source format is
    /// read-only (e.g. `zip` for RAR inputs).
    #[arg(long, value_name = "FMT")]
    pub fallback: Option<ContainerFormat>,

    /// Console log verbosity.
    #[arg(long, value_name = "LVL", default_value = "info", value_parser = parse_log_level)]
    pub log_level: LevelFilter,

    /// Suppress console output (the log file is still written).
    #[arg(short, long)]
    pub quiet: bool,

    /// Write a CSV report of the run to FILE.
    #[arg(long, value_name = "FILE")]
    pub output_csv: Option<PathBuf>,

    /// Re-install the bundled MIME magic table.
    #[arg(long)]
    pub regenerate_magic: bool,
}

fn parse_log_level(s: &str) -> Result<LevelFilter, String> {
    s.parse::<LevelFilter>()
        .map_err(|e| format!("invalid log level '{s}': {e}"))
}

impl Args {
    /// Effective metadata-preservation flag: on by default, turned off by
    /// `--no-preserve-metadata`.
    pub fn effective_preserve_metadata(&self) -> bool {
        !self.no_preserve_metadata
    }

    /// Build executor settings from the parsed arguments.
    pub fn to_settings(&self) -> Settings {
        let mut settings = Settings {
            preserve_metadata: self.effective_preserve_metadata(),
            verify_checksums: self.verify_checksums,
            dry_run: self.dry_run,
            output_dir: self.output.clone(),
            encode_mode: self.mode.into(),
            fallback_format: self.fallback.unwrap_or(ContainerFormat::Unknown),
            ..Settings::default()
        };
        if let Some(threads) = self.threads {
            settings.num_threads = threads.max(1);
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn minimal_invocation_uses_defaults() {
        let args = parse(&["chisel", "photo.png"]);
        let settings = args.to_settings();
        assert!(settings.preserve_metadata);
        assert!(!settings.dry_run);
        assert_eq!(settings.encode_mode, EncodeMode::Pipe);
        assert_eq!(settings.fallback_format, ContainerFormat::Unknown);
        assert_eq!(args.log_level, LevelFilter::Info);
    }

    #[test]
    fn inputs_are_required() {
        assert!(Args::try_parse_from(["chisel"]).is_err());
    }

    #[test]
    fn flags_map_onto_settings() {
        let args = parse(&[
            "chisel",
            "--dry-run",
            "--verify-checksums",
            "--mode",
            "parallel",
            "--threads",
            "4",
            "--output",
            "out",
            "--fallback",
            "zip",
            "a.gz",
            "b.png",
        ]);
        let settings = args.to_settings();
        assert!(settings.dry_run);
        assert!(settings.verify_checksums);
        assert_eq!(settings.encode_mode, EncodeMode::Parallel);
        assert_eq!(settings.num_threads, 4);
        assert_eq!(settings.output_dir.as_deref(), Some(std::path::Path::new("out")));
        assert_eq!(settings.fallback_format, ContainerFormat::Zip);
        assert_eq!(args.inputs.len(), 2);
    }

    #[test]
    fn no_preserve_metadata_wins() {
        let args = parse(&["chisel", "--no-preserve-metadata", "x.gz"]);
        assert!(!args.to_settings().preserve_metadata);
        let args = parse(&["chisel", "--preserve-metadata", "x.gz"]);
        assert!(args.to_settings().preserve_metadata);
    }

    #[test]
    fn zero_threads_is_clamped() {
        let args = parse(&["chisel", "--threads", "0", "x.gz"]);
        assert_eq!(args.to_settings().num_threads, 1);
    }

    #[test]
    fn stdin_marker_is_accepted_as_input() {
        let args = parse(&["chisel", "-"]);
        assert_eq!(args.inputs[0].as_os_str(), "-");
    }
}
