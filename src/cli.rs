use clap::{Parser, Subcommand};

use crate::pack::ParseOptions;
use crate::worker::WorkerConfig;

#[derive(Parser, Debug)]
#[command(name = "multipack")]
#[command(version)]
#[command(about = "Browse and extract files from BFPK packs", long_about = None)]
#[command(after_help = "Examples:\n  \
  multipack data.packed tree              show the directory tree\n  \
  multipack data.packed list              list files with their index\n  \
  multipack data.packed cat 3 --size 64   print the first 64 bytes of file 3\n  \
  multipack https://example.com/data.packed tree --json")]
pub struct Cli {
    /// Pack file path or HTTP URL
    #[arg(value_name = "SOURCE")]
    pub source: String,

    #[command(subcommand)]
    pub command: Command,

    /// Quiet mode, only errors are logged
    #[arg(short = 'q', global = true)]
    pub quiet: bool,

    /// More log output (-vv => debug)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Lower-case all paths in the tree
    #[arg(long, global = true)]
    pub case_insensitive: bool,

    /// Depth of the worker request and response queues
    #[arg(long, value_name = "N", default_value_t = 64, global = true)]
    pub queue_depth: usize,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the directory tree
    Tree {
        /// Print the tree payload as JSON
        #[arg(long)]
        json: bool,
    },

    /// List files with their index and size
    List,

    /// Write a byte range of one file to stdout
    Cat {
        /// Index of the file, as shown by `list`
        file_index: u32,

        /// First byte to write, relative to the file start
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Number of bytes to write (default: to end of file)
        #[arg(long)]
        size: Option<u64>,

        /// Bytes fetched per request when streaming to end of file
        #[arg(long, value_name = "BYTES", default_value_t = 1 << 20)]
        chunk: u64,
    },
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.source.starts_with("http://") || self.source.starts_with("https://")
    }

    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            queue_depth: self.queue_depth,
            parse_options: ParseOptions {
                case_insensitive: self.case_insensitive,
                ..ParseOptions::default()
            },
        }
    }
}
