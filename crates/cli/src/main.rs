//! # CLI - shard directory shell
//!
//! A REPL over one base directory. Reads commands from stdin, runs them
//! through the engine, and prints results to stdout. Logs go to stderr, so
//! piping commands in and reading stdout works for scripted tests.
//!
//! ## Commands
//!
//! ```text
//! BEGIN READ|WRITE           Open a base session
//! COMMIT                     Close the shard and session, publishing writes
//! ABORT                      Discard the session's shadows
//! SHARD id                   Select postings shard pos/<id>
//! ADDPOS kw doc pos...       Merge positions into a keyword's postings
//! GETPOS kw                  Print a keyword's postings
//! DELPOS kw                  Delete a keyword's postings
//! FETCH kw shard...          Gather one keyword across shards under the query budget
//! PUTMETA doc url [title]    Store document metadata
//! GETMETA doc                Print document metadata (or "(nil)")
//! DELMETA doc                Delete document metadata
//! DELETE / UNDELETE doc      Set / clear a tombstone
//! DELETED doc                Print "yes" or "no"
//! LIVE doc...                Filter IDs through the read cache
//! ATTR name id [value]       Read or write an attribute array
//! COUNTS                     Print filenum / domainnum / keywordnum
//! SETCOUNT which n           Set documents, domains or keywords
//! STALE                      List shadow files left by unfinished writers
//! STATS                      Print configuration and session state
//! EXIT / QUIT                Abort anything uncommitted and exit
//! ```
//!
//! ## Configuration
//!
//! ```text
//! SHARDSTORE_DIR                  base directory          (default: "data")
//! SHARDSTORE_MAX_POSTINGS_BLOB    postings blob cap bytes (default: 16 MiB)
//! SHARDSTORE_MAX_FILEDATA_RECORD  filedata record cap     (default: 16 MiB)
//! SHARDSTORE_MAX_QUERY_BYTES      postings per query      (default: 64 MiB)
//! SHARDSTORE_SYNC                 fsync on close          (default: "true")
//! RUST_LOG                        log filter              (default: "info")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ SHARDSTORE_DIR=/tmp/db cargo run -p cli
//! shardstore started (dir=/tmp/db, sync=true)
//! > BEGIN WRITE
//! OK (mode=Write, documents=0)
//! > PUTMETA 1 http://example.com Example
//! OK
//! > COMMIT
//! OK
//! > EXIT
//! bye
//! ```

mod shell;

use anyhow::Result;
use config::EngineConfig;
use shell::{Flow, Shell};
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let mut shell = Shell::new(EngineConfig::from_env());
    println!(
        "shardstore started (dir={}, sync={})",
        shell.config().base_dir.display(),
        shell.config().sync_on_close
    );
    println!("Type HELP for commands.");
    prompt();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match shell.execute(&line) {
            Ok(Flow::Continue(lines)) => {
                for l in lines {
                    println!("{l}");
                }
            }
            Ok(Flow::Exit) => {
                println!("bye");
                return Ok(());
            }
            Err(e) => println!("ERR {e:#}"),
        }
        prompt();
    }

    // stdin closed without EXIT
    shell.shutdown()?;
    Ok(())
}

fn prompt() {
    print!("> ");
    io::stdout().flush().ok();
}
