use clap::Parser;
use std::path::PathBuf;

use crate::entities::session_io::{FORMAT_MAJOR, FORMAT_MINOR};

// Build version with stream backend info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Session format: v", FORMAT_MAJOR, ".", FORMAT_MINOR, "\n",
    "Streams: still images (png, jpeg), generated patterns\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Live video mixer, headless runner
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Session file to open (.mix) - optional, starts empty otherwise
    #[arg(value_name = "FILE")]
    pub session: Option<PathBuf>,

    /// Media or session files to insert as sources (can be specified multiple times)
    #[arg(short = 'i', long = "import", value_name = "FILE")]
    pub imports: Vec<PathBuf>,

    /// Number of frames to run before exiting
    #[arg(long = "frames", value_name = "N", default_value_t = 60)]
    pub frames: u32,

    /// Frame rate of the headless loop
    #[arg(long = "fps", value_name = "FPS", default_value_t = 60.0)]
    pub fps: f32,

    /// Save the session to this file before exiting
    #[arg(long = "save", value_name = "FILE")]
    pub save: Option<PathBuf>,

    /// Enable debug logging to file (default: mixa.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}
