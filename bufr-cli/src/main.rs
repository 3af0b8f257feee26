//! Thin CLI over `bufr-codec`: decode, inspect, and path-query subcommands.
//! Argument parsing is hand-rolled — three subcommands each taking one or
//! two positional arguments does not need a parsing crate.

mod render;

use bufr_codec::{query_path, section, Error};
use bufr_tables::standard::seed_table_set;
use std::env;
use std::process::ExitCode;

static LOGGER: StderrLogger = StderrLogger;
struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::Level::Warn
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("{}: {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

fn usage() -> &'static str {
    "usage:\n  bufr decode <file> [--compiled]\n  bufr inspect <file>\n  bufr query <file> <path-expr>"
}

fn main() -> ExitCode {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Warn);
    }

    let args: Vec<String> = env::args().collect();

    let result = match args.get(1).map(String::as_str) {
        Some("decode") => run_decode(&args[2..]),
        Some("inspect") => run_inspect(&args[2..]),
        Some("query") => run_query(&args[2..]),
        _ => {
            eprintln!("{}", usage());
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::FAILURE
        }
    }
}

/// Scan `bytes` for every complete message, resynchronizing at the next
/// `BUFR` magic after a parse failure rather than aborting the whole file.
fn split_messages(bytes: &[u8]) -> Vec<(usize, Result<&[u8], Error>)> {
    let mut out = Vec::new();
    let mut pos = 0;

    while let Some(offset) = find_magic(&bytes[pos..]) {
        let start = pos + offset;

        match section::read_message(&bytes[start..]) {
            Ok((_, _, total_len)) => {
                out.push((start, Ok(&bytes[start..start + total_len])));
                pos = start + total_len;
            }
            Err(e) => {
                out.push((start, Err(e)));
                pos = start + 4;
            }
        }
    }

    out
}

fn find_magic(bytes: &[u8]) -> Option<usize> {
    bytes.windows(4).position(|w| w == b"BUFR")
}

fn run_decode(args: &[String]) -> Result<(), String> {
    let path = args.first().ok_or_else(|| usage().to_string())?;
    let compiled = args.iter().any(|a| a == "--compiled");

    if compiled {
        log::info!("template compilation requested; decoding interpretively (no cross-message cache in this CLI invocation)");
    }

    let bytes = std::fs::read(path).map_err(|e| format!("reading {path}: {e}"))?;
    let tables = seed_table_set();

    for (offset, message) in split_messages(&bytes) {
        match message {
            Ok(raw) => match bufr_codec::decode(raw, &tables) {
                Ok(decoded) => {
                    let rendered = render::render_message(&decoded);
                    println!("{}", serde_json::to_string(&rendered).unwrap());
                }
                Err(e) => log::warn!("message at byte {offset}: {e}"),
            },
            Err(e) => log::warn!("resynchronizing after byte {offset}: {e}"),
        }
    }

    Ok(())
}

fn run_inspect(args: &[String]) -> Result<(), String> {
    let path = args.first().ok_or_else(|| usage().to_string())?;
    let bytes = std::fs::read(path).map_err(|e| format!("reading {path}: {e}"))?;

    for (offset, message) in split_messages(&bytes) {
        match message {
            Ok(raw) => match section::read_message(raw) {
                Ok((frame, _, total_len)) => {
                    println!(
                        "{}",
                        serde_json::json!({
                            "offset": offset,
                            "total_len": total_len,
                            "edition": frame.edition,
                            "master_table_version": frame.master_table_version,
                            "originating_centre": frame.originating_centre,
                            "n_subsets": frame.n_subsets,
                            "compressed": frame.compressed,
                            "descriptor_count": frame.descriptors.len(),
                        })
                    );
                }
                Err(e) => log::warn!("message at byte {offset}: {e}"),
            },
            Err(e) => log::warn!("resynchronizing after byte {offset}: {e}"),
        }
    }

    Ok(())
}

fn run_query(args: &[String]) -> Result<(), String> {
    let path = args.first().ok_or_else(|| usage().to_string())?;
    let expr = args.get(1).ok_or_else(|| usage().to_string())?;

    let bytes = std::fs::read(path).map_err(|e| format!("reading {path}: {e}"))?;
    let tables = seed_table_set();

    let (_, raw) = split_messages(&bytes)
        .into_iter()
        .next()
        .ok_or_else(|| "no BUFR message found".to_string())?;
    let raw = raw.map_err(|e| e.to_string())?;

    let message = bufr_codec::decode(raw, &tables).map_err(|e| e.to_string())?;
    let found = query_path(&message, expr).map_err(|e| e.to_string())?;

    let rendered: Vec<_> = found.iter().map(|n| render::render_node(n)).collect();
    println!("{}", serde_json::to_string(&rendered).unwrap());

    Ok(())
}
