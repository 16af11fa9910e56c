//! Command-line interface definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use compdb_ipc::compdb::parser::DEFAULT_BUFFER_SIZE;
use compdb_ipc::logging::{LogConfig, LogFormat};

/// Stream compile commands and run indexer workers over named JSON queues.
#[derive(Parser, Debug)]
#[command(name = "compdb-ipc")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    pub quiet: bool,

    /// Log format (pretty, compact, json).
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Logging configuration: command-line flags first, then environment.
    pub fn log_config(&self) -> LogConfig {
        let mut config = match self.command {
            Commands::Worker(_) => LogConfig::for_worker(),
            _ => LogConfig::default(),
        };
        let level = match (self.quiet, self.verbose) {
            (true, _) => Some("error"),
            (_, 0) => None,
            (_, 1) => Some("info"),
            (_, 2) => Some("debug"),
            _ => Some("trace"),
        };
        if let Some(level) = level {
            config = config.with_filter(format!("compdb_ipc={}", level));
        }
        config = config.with_env_overrides();
        if let Some(format) = self.log_format {
            config = config.with_format(format);
        }
        config
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print every valid compile command as one JSON line.
    Parse(ParseArgs),

    /// Report the size and job count of a compilation database.
    Count(CountArgs),

    /// Serve tasks from queues created by a driver.
    Worker(WorkerArgs),
}

#[derive(Parser, Debug)]
pub struct ParseArgs {
    /// Path to compile_commands.json.
    pub compdb: PathBuf,

    /// Commands pulled per batch.
    #[arg(short = 'n', long, default_value_t = 64)]
    pub batch_size: usize,

    /// Read buffer size in bytes.
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE, hide = true)]
    pub buffer_size: usize,

    /// Emit the tokenized invocation as `arguments` even for `command` entries.
    #[arg(long)]
    pub split: bool,
}

#[derive(Parser, Debug)]
pub struct CountArgs {
    /// Path to compile_commands.json.
    pub compdb: PathBuf,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Run identifier the driver used to name the queues.
    #[arg(long, env = "COMPDB_IPC_DRIVER_ID")]
    pub driver_id: String,

    /// Index of this worker within the run.
    #[arg(long, env = "COMPDB_IPC_WORKER_ID")]
    pub worker_id: u32,

    /// Seconds to wait for each task.
    #[arg(long, env = "COMPDB_IPC_RECEIVE_TIMEOUT_SECS")]
    pub receive_timeout_secs: Option<u64>,

    /// Exit after this many consecutive timeouts.
    #[arg(long)]
    pub max_idle_timeouts: Option<u32>,
}
