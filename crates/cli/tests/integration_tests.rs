/// End-to-end tests for the shell: spawn the binary, pipe commands on stdin,
/// read stdout.
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use tempfile::tempdir;

fn spawn_cli(base_dir: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_cli"))
        .env("SHARDSTORE_DIR", base_dir)
        .env("SHARDSTORE_SYNC", "false")
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn cli")
}

/// Runs `commands` followed by EXIT and returns stdout.
fn run_cli(base_dir: &Path, commands: &str) -> String {
    let mut child = spawn_cli(base_dir);
    {
        let stdin = child.stdin.as_mut().expect("failed to open stdin");
        stdin.write_all(commands.as_bytes()).unwrap();
        stdin.write_all(b"EXIT\n").unwrap();
    }
    let output = child.wait_with_output().expect("failed to read output");
    assert!(output.status.success(), "cli exited with {}", output.status);
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Output lines with the prompt stripped.
fn replies(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|l| l.trim_start_matches("> ").to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

// -------------------- Metadata --------------------

#[test]
fn metadata_survives_across_processes() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("db");

    let out = run_cli(
        &db,
        "BEGIN WRITE\nPUTMETA 1 http://a.example First page\nPUTMETA 2 http://b.example\nCOMMIT\n",
    );
    assert_eq!(replies(&out).iter().filter(|l| *l == "OK").count(), 3);

    let out = run_cli(&db, "BEGIN READ\nGETMETA 1\nGETMETA 2\nGETMETA 3\nCOUNTS\n");
    let lines = replies(&out);
    assert!(lines.contains(&"url=http://a.example title=First page size=0 domainid=0".to_string()));
    assert!(lines.contains(&"url=http://b.example title=- size=0 domainid=0".to_string()));
    assert!(lines.contains(&"(nil)".to_string()));
    assert!(lines.contains(&"documents=2 domains=0 keywords=0".to_string()));
}

#[test]
fn deleted_metadata_is_gone_after_commit() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("db");

    run_cli(
        &db,
        "BEGIN WRITE\nSETCOUNT documents 3\nPUTMETA 1 hello\nPUTMETA 2 world\nDELMETA 1\nCOMMIT\n",
    );
    let out = run_cli(&db, "BEGIN READ\nGETMETA 1\nGETMETA 2\n");
    let lines = replies(&out);
    assert!(lines.contains(&"(nil)".to_string()));
    assert!(lines.iter().any(|l| l.starts_with("url=world")));
}

#[test]
fn read_session_rejects_writes() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("db");
    run_cli(&db, "BEGIN WRITE\nCOMMIT\n");

    let out = run_cli(&db, "BEGIN READ\nPUTMETA 1 nope\nDELETE 1\n");
    let errors: Vec<_> = replies(&out)
        .into_iter()
        .filter(|l| l.starts_with("ERR"))
        .collect();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|l| l.contains("read-only")));
}

#[test]
fn read_of_missing_directory_fails() {
    let dir = tempdir().unwrap();
    let out = run_cli(&dir.path().join("missing"), "BEGIN READ\n");
    assert!(out.contains("ERR"));
    assert!(out.contains("does not exist"));
}

// -------------------- Postings --------------------

#[test]
fn postings_roundtrip_and_fetch_across_shards() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("db");

    run_cli(
        &db,
        "BEGIN WRITE\nSHARD 0\nADDPOS 7 1 3 9\nADDPOS 7 2 4\nSHARD 1\nADDPOS 7 5 1\nCOMMIT\n",
    );

    let out = run_cli(&db, "BEGIN READ\nSHARD 0\nGETPOS 7\nGETPOS 8\nFETCH 7 0 1 2\n");
    let lines = replies(&out);
    assert!(lines.contains(&"1: 3 9".to_string()));
    assert!(lines.contains(&"2: 4".to_string()));
    assert!(lines.contains(&"(2 docs)".to_string()));
    assert!(lines.contains(&"(nil)".to_string()));
    assert!(lines.iter().any(|l| l.starts_with("shard 0: ")));
    assert!(lines.iter().any(|l| l.starts_with("shard 1: ")));
    assert!(!lines.iter().any(|l| l.starts_with("shard 2: ")));
}

#[test]
fn shard_header_tracks_documents() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("db");

    run_cli(&db, "BEGIN WRITE\nSHARD 3\nADDPOS 2 10 1\nADDPOS 4 6 1\nCOMMIT\n");
    let out = run_cli(&db, "BEGIN READ\nSHARD 3\nSHARD 4\n");
    let lines = replies(&out);
    assert!(lines.contains(&"OK (pos_num=4, fileindex=6..=10)".to_string()));
    assert!(lines.contains(&"(nil)".to_string()));
}

// -------------------- Tombstones and cache --------------------

#[test]
fn live_filters_deleted_and_out_of_range() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("db");

    run_cli(
        &db,
        "BEGIN WRITE\nSETCOUNT documents 10\nDELETE 3\nDELETE 9\nCOMMIT\n",
    );
    let out = run_cli(&db, "BEGIN READ\nLIVE 1 3 9 16\nDELETED 3\nDELETED 4\n");
    let lines = replies(&out);
    assert!(lines.contains(&"1".to_string()));
    assert!(lines.contains(&"yes".to_string()));
    assert!(lines.contains(&"no".to_string()));
}

#[test]
fn attributes_roundtrip() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("db");

    run_cli(&db, "BEGIN WRITE\nATTR score 2 0.5\nATTR urllen 2 31\nCOMMIT\n");
    let out = run_cli(&db, "BEGIN READ\nATTR score 2\nATTR urllen 2\nATTR size 9\n");
    let lines = replies(&out);
    assert!(lines.contains(&"0.5".to_string()));
    assert!(lines.contains(&"31".to_string()));
    assert!(lines.contains(&"(nil)".to_string()));
}

// -------------------- Session lifecycle --------------------

#[test]
fn exit_without_commit_discards_writes() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("db");

    run_cli(&db, "BEGIN WRITE\nPUTMETA 1 kept\nCOMMIT\n");
    run_cli(&db, "BEGIN WRITE\nPUTMETA 1 dropped\n");

    let out = run_cli(&db, "STALE\nBEGIN READ\nGETMETA 1\n");
    let lines = replies(&out);
    assert!(lines.contains(&"(none)".to_string()));
    assert!(lines.iter().any(|l| l.starts_with("url=kept")));
}

#[test]
fn killed_writer_leaves_primaries_readable() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("db");
    run_cli(&db, "BEGIN WRITE\nPUTMETA 1 before\nCOMMIT\n");

    let mut child = spawn_cli(&db);
    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());
    stdin
        .write_all(b"BEGIN WRITE\nPUTMETA 1 after\nPUTMETA 2 extra\n")
        .unwrap();
    stdin.flush().unwrap();

    let mut oks = 0;
    let mut line = String::new();
    while oks < 3 {
        line.clear();
        assert_ne!(stdout.read_line(&mut line).unwrap(), 0, "cli exited early");
        if line.trim_start_matches("> ").starts_with("OK") {
            oks += 1;
        }
    }
    child.kill().unwrap();
    child.wait().unwrap();

    let out = run_cli(&db, "STALE\nBEGIN READ\nGETMETA 1\nGETMETA 2\n");
    let lines = replies(&out);
    assert!(lines.iter().any(|l| l.ends_with("filedata_tmp")));
    assert!(lines.iter().any(|l| l.starts_with("url=before")));
    assert!(lines.contains(&"(nil)".to_string()));

    let out = run_cli(&db, "BEGIN WRITE\nGETMETA 1\nCOMMIT\nSTALE\n");
    let lines = replies(&out);
    assert!(lines.iter().any(|l| l.starts_with("url=after")));
    assert!(lines.contains(&"(none)".to_string()));
}

#[test]
fn command_errors_do_not_end_the_shell() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("db");

    let out = run_cli(&db, "FROB\nGETMETA 1\nBEGIN\nBEGIN WRITE\nBEGIN WRITE\nGETPOS 1\nDELETE x\nABORT\n");
    let lines = replies(&out);
    assert!(lines.contains(&"ERR unknown command: FROB".to_string()));
    assert!(lines.iter().any(|l| l.contains("no open session")));
    assert!(lines.iter().any(|l| l.contains("usage: BEGIN")));
    assert!(lines.iter().any(|l| l.contains("already open")));
    assert!(lines.iter().any(|l| l.contains("no shard selected")));
    assert!(lines.iter().any(|l| l.contains("invalid <doc>")));
    assert_eq!(lines.last().map(String::as_str), Some("bye"));
}
