use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Headless front end for the Cutline decode/cache/playback engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Engine config (JSON). Missing sections use defaults.
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Use generated color-bar sources instead of FFmpeg
    #[arg(long = "synthetic", global = true)]
    pub synthetic: bool,

    /// Increase logging verbosity (default: info, -v: debug, -vv+: trace).
    /// CUTLINE_LOG overrides this.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play files back to back on one track and report render statistics
    Play {
        /// Media files, placed one after another
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Stop after this many seconds of wall-clock time
        #[arg(long = "seconds", value_name = "N", default_value_t = 5.0)]
        seconds: f64,

        /// Timeline position to start from
        #[arg(long = "from", value_name = "MS", default_value_t = 0)]
        from_ms: i64,
    },

    /// Extract one frame as a PNG, bypassing the decoder pool
    Thumb {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Source time in milliseconds
        #[arg(long = "at", value_name = "MS", default_value_t = 0)]
        at_ms: i64,

        /// Output width (0 keeps aspect ratio)
        #[arg(long = "width", default_value_t = 320)]
        width: u32,

        /// Output height (0 keeps aspect ratio)
        #[arg(long = "height", default_value_t = 0)]
        height: u32,

        #[arg(short = 'o', long = "output", value_name = "PNG")]
        output: PathBuf,
    },

    /// Print ffprobe metadata as JSON
    Probe {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the effective engine config as JSON
    Config,
}
