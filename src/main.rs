//! compdb-ipc command-line entry point.

mod cli;

use std::io::{BufWriter, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use compdb_ipc::compdb::{CompilationDatabaseFile, CompileCommand, ResumableParser};
use compdb_ipc::ipc::{IpcOptions, MessageQueuePair, run_worker};
use compdb_ipc::logging;
use tracing::info;

use cli::{Cli, Commands, CountArgs, ParseArgs, WorkerArgs};

fn main() {
    let cli = Cli::parse();
    logging::init_with_file(cli.log_config());

    let result = match &cli.command {
        Commands::Parse(args) => cmd_parse(args),
        Commands::Count(args) => cmd_count(args),
        Commands::Worker(args) => cmd_worker(args),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        for cause in e.chain().skip(1) {
            eprintln!("  caused by: {}", cause);
        }
        std::process::exit(1);
    }
}

/// Stream the database to stdout, one JSON object per line.
///
/// Records emitted before a syntax error stay on stdout; the error is
/// reported afterwards.
fn cmd_parse(args: &ParseArgs) -> Result<()> {
    let compdb = CompilationDatabaseFile::open(&args.compdb)?;
    let mut parser = ResumableParser::with_buffer_size(args.buffer_size);
    parser.initialize(compdb, args.batch_size)?;

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut batch: Vec<CompileCommand> = Vec::with_capacity(args.batch_size);
    let mut total = 0usize;
    let mut batches = 0usize;

    while !parser.is_exhausted() {
        batch.clear();
        let result = parser.parse_more(&mut batch);
        batches += 1;
        for command in batch.iter_mut() {
            if args.split && command.arguments.is_empty() {
                command.arguments = command.arguments_or_split();
                command.command = None;
            }
            serde_json::to_writer(&mut out, &*command)?;
            out.write_all(b"\n")?;
        }
        total += batch.len();
        if let Err(e) = result {
            out.flush()?;
            return Err(e).with_context(|| {
                format!(
                    "Failed to parse {} after {} commands",
                    args.compdb.display(),
                    total
                )
            });
        }
    }
    out.flush()?;

    info!(total, batches, "Finished parsing compilation database");
    Ok(())
}

fn cmd_count(args: &CountArgs) -> Result<()> {
    let mut compdb = CompilationDatabaseFile::open(&args.compdb)?;
    let estimated = compdb.num_jobs();
    let jobs = compdb
        .count_jobs()
        .with_context(|| format!("Failed to count jobs in {}", args.compdb.display()))?;

    if args.json {
        let report = serde_json::json!({
            "path": compdb.path(),
            "size_bytes": compdb.size_in_bytes(),
            "estimated_jobs": estimated,
            "jobs": jobs,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Path:           {}", compdb.path().display());
        println!("Size:           {} bytes", compdb.size_in_bytes());
        println!("Estimated jobs: {}", estimated);
        println!("Jobs:           {}", jobs);
    }
    Ok(())
}

fn cmd_worker(args: &WorkerArgs) -> Result<()> {
    let mut options = IpcOptions::default()
        .with_env_overrides()
        .with_driver_id(args.driver_id.clone())
        .with_worker_id(args.worker_id);
    if let Some(secs) = args.receive_timeout_secs {
        options = options.with_receive_timeout(Duration::from_secs(secs));
    }
    if let Some(count) = args.max_idle_timeouts {
        options = options.with_max_idle_timeouts(count);
    }

    let mut pair = MessageQueuePair::for_worker(&options).with_context(|| {
        format!(
            "Worker {} could not attach to queues of driver '{}'",
            options.worker_id, options.driver_id
        )
    })?;
    let report = run_worker(&mut pair, &options)?;

    info!(
        worker_id = options.worker_id,
        reason = ?report.reason,
        indexed = report.indexed,
        failed = report.failed,
        "Worker finished"
    );
    Ok(())
}
