//! Binary entry point for the `chisel` command-line tool.
//!
//! Wires the library together: argument parsing, log sinks, input
//! scanning, progress display, the CSV report, and signal handling.
//! Exit codes: 0 on success, 1 on configuration or input errors, 130
//! when the run was cancelled by a signal.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;

use chisel::cli::args::Args;
use chisel::cli::{progress, report::ReportCollector};
use chisel::event_bus::EventBus;
use chisel::executor::Executor;
use chisel::logging::{self, ConsoleSink, FileSink};
use chisel::registry::ProcessorRegistry;
use chisel::util::collect_input_files;
use chisel::util::temp::remove_file_quiet;

const EXIT_OK: i32 = 0;
const EXIT_CONFIG: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_CONFIG } else { EXIT_OK };
            let _ = e.print();
            std::process::exit(code);
        }
    };
    std::process::exit(run(args));
}

fn run(args: Args) -> i32 {
    logging::init();
    match FileSink::new(Path::new("chisel.log"), false) {
        Ok(sink) => {
            logging::add_sink(Box::new(sink));
        }
        Err(e) => eprintln!("chisel: cannot open chisel.log: {e}"),
    }
    if !args.quiet {
        logging::add_sink(Box::new(ConsoleSink::new(args.log_level)));
    }

    // Install the magic table on first run; --regenerate-magic forces a
    // fresh copy.
    if let Err(e) = chisel::mime::install_magic_table(args.regenerate_magic) {
        log::warn!("could not install magic table: {e}");
    }

    let settings = args.to_settings();

    let inputs = match collect_input_files(&args.inputs, args.recursive) {
        Ok(set) => set,
        Err(e) => {
            log::error!("failed to scan inputs: {e}");
            return EXIT_CONFIG;
        }
    };
    if inputs.files.is_empty() {
        log::error!("no valid input files");
        return EXIT_CONFIG;
    }

    let registry = Arc::new(ProcessorRegistry::with_builtin());
    let bus = Arc::new(EventBus::new());

    let collector = ReportCollector::new();
    if args.output_csv.is_some() {
        collector.attach(&bus);
    }

    let show_progress = !args.quiet && !inputs.from_stdin;
    let bar = progress::attach(&bus, inputs.files.len() as u64, &settings, show_progress);

    let executor = match Executor::new(registry, settings.clone(), Arc::clone(&bus)) {
        Ok(executor) => Arc::new(executor),
        Err(e) => {
            log::error!("{e}");
            return EXIT_CONFIG;
        }
    };

    // SIGINT / SIGTERM set the stop flag and forward to the executor.
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        let executor = Arc::clone(&executor);
        let quiet = args.quiet;
        if let Err(e) = ctrlc::set_handler(move || {
            if !quiet {
                eprintln!("\ninterrupt received; waiting for workers to finish...");
            }
            interrupted.store(true, Ordering::SeqCst);
            executor.request_stop();
        }) {
            log::warn!("could not install signal handler: {e}");
        }
    }

    let start = Instant::now();
    executor.run(&inputs.files);
    let total_seconds = start.elapsed().as_secs_f64();
    bar.finish_and_clear();

    if inputs.from_stdin {
        stream_stdin_result(&inputs.files[0], &settings);
    }

    if let Some(csv) = &args.output_csv {
        if let Err(e) = collector.write_csv(csv, total_seconds, settings.encode_mode) {
            log::error!("failed to write CSV report {}: {e}", csv.display());
        }
    }

    if interrupted.load(Ordering::SeqCst) {
        return EXIT_INTERRUPTED;
    }
    EXIT_OK
}

/// Pipe mode: stream the optimized bytes to stdout and drop the spool
/// file(s).
fn stream_stdin_result(spool: &Path, settings: &chisel::Settings) {
    if !settings.dry_run {
        let result_path = match &settings.output_dir {
            Some(dir) => dir.join(spool.file_name().unwrap_or_default()),
            None => spool.to_path_buf(),
        };
        match std::fs::File::open(&result_path) {
            Ok(mut file) => {
                let mut stdout = std::io::stdout().lock();
                if let Err(e) = std::io::copy(&mut file, &mut stdout) {
                    log::error!("failed to stream result to stdout: {e}");
                }
            }
            Err(e) => log::error!("failed to open optimized result: {e}"),
        }
        if result_path != spool {
            remove_file_quiet(&result_path);
        }
    }
    remove_file_quiet(spool);
}
