//! # CLI - reftable stack shell
//!
//! A REPL-style command-line interface over a stack directory. Reads
//! commands from stdin, executes them against the stack, and prints
//! results to stdout. Designed for both interactive use and scripted
//! testing (pipe commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! REF name            Read the live value bound to a ref
//! LOG name            Read the most recent log entry for a ref
//! SYMREF name target  Bind name as a symbolic ref to target
//! DEL name            Delete a ref (writes a tombstone)
//! LIST                Print the manifest, oldest table first
//! COMPACT             Merge the entire stack into one table
//! CLEAN               Remove orphaned table files
//! STATS               Print compaction counters
//! NEXT                Print the next update index
//! EXIT / QUIT         Shut down
//! ```
//!
//! ## Configuration
//!
//! ```text
//! REFSTACK_DIR   Stack directory        (default: "data/refs")
//! REFSTACK_MODE  Octal file mode chmod  (default: unset)
//! ```

use anyhow::{Context, Result};
use record::{Error, LogValue, RefRecord, RefValue, WriteOptions};
use stack::Stack;
use std::io::{self, BufRead, Write};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Adds a single-ref table, reloading and retrying once if another
/// process committed in between.
fn add_one_ref(st: &mut Stack, rec: RefRecord) -> Result<()> {
    let attempt = |st: &mut Stack, mut rec: RefRecord| {
        rec.update_index = st.next_update_index();
        let idx = rec.update_index;
        st.add(move |writer| {
            writer.set_limits(idx, idx)?;
            writer.add_ref(rec)
        })
    };
    match attempt(st, rec.clone()) {
        Err(Error::Outdated) => {
            st.reload()?;
            attempt(st, rec).context("retry after reload failed")
        }
        other => Ok(other?),
    }
}

fn print_ref(rec: &RefRecord) {
    match &rec.value {
        RefValue::Symref(target) => println!("{}: ref -> {}", rec.refname, target),
        RefValue::Val1(hash) => println!("{}: {}", rec.refname, hex(hash)),
        RefValue::Val2 {
            value,
            target_value,
        } => println!("{}: {} peeled {}", rec.refname, hex(value), hex(target_value)),
        RefValue::Deletion => println!("{}: (deleted)", rec.refname),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn main() -> Result<()> {
    let dir = env_or("REFSTACK_DIR", "data/refs");
    let mode = std::env::var("REFSTACK_MODE")
        .ok()
        .and_then(|m| u32::from_str_radix(&m, 8).ok());

    let opts = WriteOptions {
        default_permissions: mode,
        ..Default::default()
    };
    let mut st = Stack::open(&dir, opts)?;

    println!(
        "reftable stack at {} ({} tables, next_update_index={})",
        dir,
        st.table_count(),
        st.next_update_index()
    );
    println!("Commands: REF name | LOG name | SYMREF name target | DEL name");
    println!("          LIST | COMPACT | CLEAN | STATS | NEXT | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "REF" => match parts.next() {
                    Some(name) => match st.read_ref(name)? {
                        Some(rec) => print_ref(&rec),
                        None => println!("(not found)"),
                    },
                    None => println!("ERR usage: REF name"),
                },
                "LOG" => match parts.next() {
                    Some(name) => match st.read_log(name)? {
                        Some(rec) => match rec.value {
                            LogValue::Update {
                                message,
                                email,
                                time,
                                ..
                            } => println!(
                                "{}@{}: {} <{}> {}",
                                rec.refname,
                                rec.update_index,
                                message.trim_end(),
                                email,
                                time
                            ),
                            LogValue::Deletion => println!("(deleted)"),
                        },
                        None => println!("(not found)"),
                    },
                    None => println!("ERR usage: LOG name"),
                },
                "SYMREF" => match (parts.next(), parts.next()) {
                    (Some(name), Some(target)) => {
                        add_one_ref(
                            &mut st,
                            RefRecord {
                                refname: name.to_string(),
                                update_index: 0,
                                value: RefValue::Symref(target.to_string()),
                            },
                        )?;
                        println!("OK");
                    }
                    _ => println!("ERR usage: SYMREF name target"),
                },
                "DEL" => match parts.next() {
                    Some(name) => {
                        add_one_ref(
                            &mut st,
                            RefRecord {
                                refname: name.to_string(),
                                update_index: 0,
                                value: RefValue::Deletion,
                            },
                        )?;
                        println!("OK");
                    }
                    None => println!("ERR usage: DEL name"),
                },
                "LIST" => {
                    for name in st.table_names() {
                        println!("{name}");
                    }
                    println!("({} tables)", st.table_count());
                }
                "COMPACT" => match st.compact_all(None) {
                    Ok(()) => println!("OK ({} tables)", st.table_count()),
                    Err(Error::Lock) => println!("ERR stack is locked, try again"),
                    Err(e) => return Err(e.into()),
                },
                "CLEAN" => {
                    st.clean()?;
                    println!("OK");
                }
                "STATS" => println!("{:?}", st.compaction_stats()),
                "NEXT" => println!("{}", st.next_update_index()),
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => println!("ERR unknown command: {other}"),
            }
        }
        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
