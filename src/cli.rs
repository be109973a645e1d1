//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Incrementally mirror a Gumroad library to a local directory.
///
/// Downloads only files that are new or whose size changed since the last
/// run. Session cookies and defaults are read from the config file.
#[derive(Parser, Debug)]
#[command(name = "gumroad-mirror")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/gumroad-mirror/config.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Mirror root directory (overrides `output_dir` from the config file)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

impl Args {
    /// Default tracing filter when `RUST_LOG` is not set.
    #[must_use]
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}
