//! Command-line interface for Confab
//!
//! Handles argument parsing and logging configuration.

use clap::Parser;
use log::LevelFilter;

/// Confab - Voice conversation panel
#[derive(Parser, Debug)]
#[command(name = "confab")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase logging verbosity
    /// -v = info, -vv = debug, -vvv = trace (includes session wire traffic), -vvvv = all deps
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Get the log level filter based on verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    /// Check if session wire traffic should be logged
    /// Only at trace level (-vvv) do we show the WebSocket internals
    pub fn wire_verbose(&self) -> bool {
        self.verbose >= 3
    }
}

/// Initialize the logging system based on CLI arguments
pub fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    // Base level for all modules - keep at warn to suppress noisy deps
    builder.filter_level(LevelFilter::Warn);

    // Set confab modules to requested verbosity level
    builder.filter_module("confab", args.log_level());

    // WebSocket internals only at -vvv
    if args.wire_verbose() {
        builder.filter_module("tungstenite", args.log_level());
        builder.filter_module("tokio_tungstenite", args.log_level());
    }

    // GUI framework modules only at -vvvv (very verbose)
    if args.verbose >= 4 {
        builder.filter_module("naga", args.log_level());
        builder.filter_module("blade_graphics", args.log_level());
        builder.filter_module("gpui", args.log_level());
        builder.filter_module("fontdb", args.log_level());
    }

    builder.format_timestamp_millis().init();
}
