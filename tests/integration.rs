//! Integration tests for the compdb-ipc CLI.
//!
//! These run the binary end-to-end against compilation databases on disk and
//! against real named queues shared with a worker subprocess.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use assert_cmd::Command;
#[allow(deprecated)]
use assert_cmd::cargo::CommandCargoExt;
use compdb_ipc::compdb::CompileCommand;
use compdb_ipc::ipc::{DriverToWorker, IpcOptions, MessageQueuePair, WorkerToDriver};
use predicates::prelude::*;
use tempfile::{TempDir, tempdir};

const TWO_RECORDS: &str = r#"[{"directory":"/a","file":"/a/x.cpp","arguments":["clang++","x.cpp"]}, {"directory":"/a","file":"/a/y.cpp","command":"clang++ y.cpp"}]"#;

/// Get a command for the compdb-ipc binary.
fn compdb_ipc() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("compdb-ipc").unwrap()
}

/// Write `contents` to `compile_commands.json` in a fresh temp dir.
fn write_compdb(contents: &str) -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("compile_commands.json");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

fn parse_lines(stdout: &[u8]) -> Vec<CompileCommand> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn run_parse(path: &Path, extra: &[&str]) -> Vec<CompileCommand> {
    let output = compdb_ipc()
        .arg("parse")
        .arg(path)
        .args(extra)
        .output()
        .unwrap();
    assert!(output.status.success(), "{:?}", output);
    parse_lines(&output.stdout)
}

#[test]
fn test_help_lists_subcommands() {
    compdb_ipc()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("parse"))
        .stdout(predicate::str::contains("count"))
        .stdout(predicate::str::contains("worker"));
}

#[test]
fn test_parse_emits_json_lines() {
    let (_dir, path) = write_compdb(TWO_RECORDS);

    let records = run_parse(&path, &[]);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].file, "/a/x.cpp");
    assert_eq!(records[0].arguments, vec!["clang++", "x.cpp"]);
    assert_eq!(records[1].command.as_deref(), Some("clang++ y.cpp"));
}

#[test]
fn test_parse_batch_size_does_not_change_output() {
    let entries: Vec<String> = (0..25)
        .map(|i| format!(r#"{{"directory": "/p", "file": "s{i}.c", "command": "cc -c s{i}.c"}}"#))
        .collect();
    let (_dir, path) = write_compdb(&format!("[{}]", entries.join(",")));

    let whole = run_parse(&path, &["--batch-size", "25"]);
    assert_eq!(whole.len(), 25);
    for batch in ["1", "4", "24"] {
        assert_eq!(run_parse(&path, &["-n", batch]), whole, "batch {}", batch);
    }
}

#[test]
fn test_parse_split_tokenizes_command() {
    let (_dir, path) = write_compdb(TWO_RECORDS);

    compdb_ipc()
        .args(["parse", "--split"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""arguments":["clang++","y.cpp"]"#))
        .stdout(predicate::str::contains(r#""command""#).not());
}

#[test]
fn test_parse_drops_malformed_records() {
    let (_dir, path) = write_compdb(
        r#"[
            {"directory": "/a", "file": "1.c", "command": "cc 1.c"},
            {"directory": "/a", "file": "2.c"},
            {"directory": "/a", "file": "3.c", "arguments": ["cc", "3.c"]}
        ]"#,
    );

    let records = run_parse(&path, &["-n", "1"]);
    let files: Vec<&str> = records.iter().map(|r| r.file.as_str()).collect();
    assert_eq!(files, vec!["1.c", "3.c"]);
}

#[test]
fn test_parse_syntax_error_keeps_earlier_output() {
    let (_dir, path) = write_compdb(
        r#"[{"directory": "/a", "file": "1.c", "command": "cc 1.c"}, {"directory": "/a", "file": ]"#,
    );

    compdb_ipc()
        .arg("parse")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#""file":"1.c""#))
        .stderr(predicate::str::contains("Failed to parse"))
        .stderr(predicate::str::contains("caused by"));
}

#[test]
fn test_parse_missing_file() {
    let dir = tempdir().unwrap();

    compdb_ipc()
        .arg("parse")
        .arg(dir.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open compilation database"));
}

#[test]
fn test_count_reports_exact_jobs() {
    let (_dir, path) = write_compdb(TWO_RECORDS);

    compdb_ipc()
        .arg("count")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Jobs:           2"))
        .stdout(predicate::str::contains(format!(
            "Size:           {} bytes",
            TWO_RECORDS.len()
        )));
}

#[test]
fn test_count_json() {
    let (_dir, path) = write_compdb(TWO_RECORDS);

    let output = compdb_ipc()
        .args(["count", "--json"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["jobs"], 2);
    assert_eq!(report["size_bytes"], TWO_RECORDS.len());
}

#[test]
fn test_count_rejects_non_array() {
    let (_dir, path) = write_compdb(r#"{"directory": "/a"}"#);

    compdb_ipc()
        .arg("count")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to count jobs"));
}

#[test]
fn test_worker_without_driver_queues_fails() {
    compdb_ipc()
        .args(["worker", "--driver-id"])
        .arg(IpcOptions::new_driver_id())
        .args(["--worker-id", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not attach"));
}

#[test]
fn test_worker_reads_ids_from_env() {
    let driver_id = IpcOptions::new_driver_id();

    compdb_ipc()
        .arg("worker")
        .env("COMPDB_IPC_DRIVER_ID", &driver_id)
        .env("COMPDB_IPC_WORKER_ID", "5")
        .env("COMPDB_IPC_RECEIVE_TIMEOUT_SECS", "1")
        .assert()
        .failure()
        .stderr(predicate::str::contains(format!(
            "Worker 5 could not attach to queues of driver '{}'",
            driver_id
        )));
}

#[test]
fn test_driver_and_worker_processes_exchange_messages() {
    let options = IpcOptions::new(IpcOptions::new_driver_id(), 0);
    let mut queues = MessageQueuePair::create_for_driver(&options).unwrap();

    #[allow(deprecated)]
    let mut worker = std::process::Command::cargo_bin("compdb-ipc")
        .unwrap()
        .args(["-q", "worker", "--driver-id", &options.driver_id])
        .args(["--worker-id", "0", "--receive-timeout-secs", "10"])
        .stdout(Stdio::null())
        .spawn()
        .unwrap();

    let wait = Duration::from_secs(10);
    let ready: WorkerToDriver = queues.to_driver.timed_receive(wait).unwrap();
    assert_eq!(ready, WorkerToDriver::Ready { worker_id: 0 });

    let command = CompileCommand {
        directory: "/a".into(),
        file: "x.cpp".into(),
        arguments: vec!["clang++".into(), "-c".into(), "x.cpp".into()],
        ..Default::default()
    };
    queues
        .to_worker
        .send(&DriverToWorker::index(41, command))
        .unwrap();
    let reply: WorkerToDriver = queues.to_driver.timed_receive(wait).unwrap();
    assert_eq!(
        reply,
        WorkerToDriver::Indexed {
            job_id: 41,
            file: "/a/x.cpp".into(),
            argument_count: 3
        }
    );

    // A value the worker does not understand is consumed and reported.
    queues
        .to_worker
        .send(&serde_json::json!({"task": "index", "file": "/a/x.cpp"}))
        .unwrap();
    let reply: WorkerToDriver = queues.to_driver.timed_receive(wait).unwrap();
    assert!(matches!(reply, WorkerToDriver::Rejected { .. }));

    queues.to_worker.send(&DriverToWorker::Shutdown).unwrap();
    let status = worker.wait().unwrap();
    assert!(status.success());

    // The worker detached without removing the driver's queues.
    assert_eq!(queues.to_worker.pending().unwrap(), 0);
    assert!(MessageQueuePair::for_worker(&options).is_ok());
}
