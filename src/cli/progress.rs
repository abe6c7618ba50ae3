//! Console progress display driven by bus events.
//!
//! A single progress bar tracks terminal events across Phase 2 and Phase
//! 3. Extracted containers extend the bar length by their child count so
//! the denominator stays honest. Per-file completion lines are printed
//! above the bar.

use std::sync::Arc;

use console::style;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

use crate::config::Settings;
use crate::event_bus::EventBus;
use crate::events::{
    ContainerFinalizeComplete, ContainerFinalizeError, FileAnalyzeComplete, FileProcessComplete,
    FileProcessError, FileProcessSkipped,
};

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Create the run progress bar and wire it to `bus`. Returns the bar so
/// the caller can finish it after the run.
pub fn attach(bus: &Arc<EventBus>, total: u64, settings: &Settings, visible: bool) -> ProgressBar {
    let bar = if visible {
        ProgressBar::new(total)
    } else {
        ProgressBar::hidden()
    };
    bar.set_style(
        ProgressStyle::with_template("[{bar:40}] {percent:>3}% ({pos}/{len}) elapsed: {elapsed}")
            .expect("static progress template")
            .progress_chars("=> "),
    );

    // Containers add one finalize step per extraction plus their children.
    {
        let bar = bar.clone();
        bus.subscribe::<FileAnalyzeComplete>(move |e| {
            if e.extracted {
                bar.inc_length(e.num_children);
            }
        });
    }

    // Files dropped at analysis never reach Phase 2; count them here so
    // the bar still completes.
    {
        let bar = bar.clone();
        bus.subscribe::<crate::events::FileAnalyzeSkipped>(move |e| {
            bar.println(format!(
                "{} {} ({})",
                style("skip").yellow(),
                file_name(&e.path),
                e.reason
            ));
            bar.inc(1);
        });
    }
    {
        let bar = bar.clone();
        bus.subscribe::<crate::events::FileAnalyzeError>(move |e| {
            bar.println(format!(
                "{} {}: {}",
                style("fail").red().bold(),
                file_name(&e.path),
                e.message
            ));
            bar.inc(1);
        });
    }

    {
        let bar = bar.clone();
        let dry_run = settings.dry_run;
        let to_output_dir = settings.output_dir.is_some();
        bus.subscribe::<FileProcessComplete>(move |e| {
            let status = if dry_run {
                "[dry-run]"
            } else if !e.replaced {
                "[kept]"
            } else if to_output_dir {
                "[written]"
            } else {
                "[replaced]"
            };
            let line = format!(
                "{} {} ({} -> {}) {}",
                style("done").green().bold(),
                file_name(&e.path),
                HumanBytes(e.original_size),
                HumanBytes(e.new_size),
                status,
            );
            bar.println(line);
            bar.inc(1);
        });
    }

    {
        let bar = bar.clone();
        bus.subscribe::<FileProcessError>(move |e| {
            bar.println(format!(
                "{} {}: {}",
                style("fail").red().bold(),
                file_name(&e.path),
                e.message
            ));
            bar.inc(1);
        });
    }

    {
        let bar = bar.clone();
        bus.subscribe::<FileProcessSkipped>(move |e| {
            bar.println(format!(
                "{} {} ({})",
                style("skip").yellow(),
                file_name(&e.path),
                e.reason
            ));
            bar.inc(1);
        });
    }

    {
        let bar = bar.clone();
        bus.subscribe::<ContainerFinalizeComplete>(move |e| {
            bar.println(format!(
                "{} {} ({})",
                style("pack").cyan().bold(),
                file_name(&e.path),
                HumanBytes(e.final_size),
            ));
            bar.inc(1);
        });
    }

    {
        let bar = bar.clone();
        bus.subscribe::<ContainerFinalizeError>(move |e| {
            bar.println(format!(
                "{} {}: {}",
                style("fail").red().bold(),
                file_name(&e.path),
                e.message
            ));
            bar.inc(1);
        });
    }

    bar
}
