use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use journal_stream::{
    AttrMatch, Cursor, DirectoryWatcher, FilterExpr, JournalReader, ReaderOptions, Record,
};
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, Level};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Line,
    Json,
    JsonLine,
}

#[derive(Parser, Debug)]
#[command(name = "jtail")]
#[command(about = "Read, follow and filter systemd journal files", long_about = None)]
struct Args {
    /// Journal files to read
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Glob patterns to monitor for journal files (implies --follow)
    #[arg(short = 'I', long = "include", value_name = "GLOB")]
    include: Vec<String>,

    /// Resume reading right after this cursor
    #[arg(short = 'c', long, value_name = "CURSOR")]
    cursor: Option<String>,

    /// Keep files open and wait for new entries
    #[arg(short = 'f', long)]
    follow: bool,

    /// Poll interval in milliseconds while following
    #[arg(long, value_name = "MS", default_value_t = 200)]
    poll_interval: u64,

    /// Only show entries with a matching KEY=VALUE attribute. Repeated
    /// matches for the same key are ORed, different keys are ANDed.
    #[arg(short = 'm', long = "match", value_name = "KEY=VALUE")]
    matches: Vec<String>,

    /// Output format for log entries
    #[arg(long, value_enum, default_value_t = OutputFormat::Line)]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if args.files.is_empty() && args.include.is_empty() {
        bail!("nothing to read: pass journal files or --include patterns");
    }

    let cursor = args
        .cursor
        .as_deref()
        .map(str::parse::<Cursor>)
        .transpose()
        .context("invalid cursor")?;

    let mut options =
        ReaderOptions::new().with_poll_interval(Duration::from_millis(args.poll_interval));
    if let Some(filter) = build_filter(&args.matches)? {
        options = options.with_filter(filter);
    }
    if let Some(cursor) = cursor.clone() {
        options = options.with_start_cursor(cursor);
    }

    if args.follow || !args.include.is_empty() {
        follow(&args, options).await
    } else {
        read_once(&args, cursor)
    }
}

/// Build one filter leaf per distinct key; several values for the same key
/// widen that leaf into a value set.
fn build_filter(matches: &[String]) -> Result<Option<FilterExpr>> {
    let mut by_key: BTreeMap<&str, Vec<Vec<u8>>> = BTreeMap::new();

    for kv_pair in matches {
        let (key, value) = kv_pair
            .split_once('=')
            .with_context(|| format!("match '{kv_pair}' is not of the form KEY=VALUE"))?;
        by_key
            .entry(key)
            .or_default()
            .push(value.as_bytes().to_vec());
    }

    let leaves: Vec<FilterExpr> = by_key
        .into_iter()
        .map(|(key, values)| FilterExpr::Match(AttrMatch::new(key, values)))
        .collect();

    Ok(match leaves.len() {
        0 => None,
        1 => leaves.into_iter().next(),
        _ => Some(FilterExpr::Conjunction(leaves)),
    })
}

/// One pass over the given files, without tailing.
fn read_once(args: &Args, cursor: Option<Cursor>) -> Result<()> {
    let filter = build_filter(&args.matches)?;

    for path in &args.files {
        let mut reader = JournalReader::open(path, ReaderOptions::new())
            .with_context(|| format!("failed to open journal file: {}", path.display()))?;

        if let Some(cursor) = &cursor {
            reader
                .seek_to_cursor(cursor)
                .with_context(|| format!("cursor not found in {}", path.display()))?;
        }

        while let Some(entry) = reader.next_entry()? {
            let record = reader.read_data(&entry)?;
            if filter.as_ref().is_none_or(|f| f.matches(&record)) {
                print_record(&record, args.format)?;
            }
        }
    }

    Ok(())
}

/// Tail files and/or include patterns until cancelled.
async fn follow(args: &Args, options: ReaderOptions) -> Result<()> {
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
        });
    }

    let (tx, mut rx) = tokio::sync::mpsc::channel(256);

    for path in &args.files {
        let reader = JournalReader::open(path, options.clone())
            .with_context(|| format!("failed to open journal file: {}", path.display()))?;
        tokio::spawn(reader.read_all(tx.clone(), cancel.clone()));
    }

    if !args.include.is_empty() {
        let watcher = DirectoryWatcher::new(args.include.clone(), options)?;
        tokio::spawn(watcher.run(tx.clone(), cancel.clone()));
    }
    drop(tx);

    while let Some(record) = rx.recv().await {
        match record {
            Ok(record) => print_record(&record, args.format)?,
            Err(err) => error!(error = %err, "journal stream failed"),
        }
    }

    Ok(())
}

fn print_record(record: &Record, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Line => {
            let line: Vec<String> = record
                .attributes()
                .iter()
                .map(|(key, value)| format!("{}={}", key, String::from_utf8_lossy(value)))
                .collect();
            println!("{}", line.join(" "));
        }
        OutputFormat::Json => {
            let json = to_json(record);
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::JsonLine => {
            let json = to_json(record);
            println!("{}", serde_json::to_string(&json)?);
        }
    }

    Ok(())
}

fn to_json(record: &Record) -> JsonValue {
    record
        .attributes()
        .iter()
        .map(|(key, value)| (key.clone(), json!(String::from_utf8_lossy(value))))
        .collect()
}
