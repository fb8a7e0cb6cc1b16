//! Interactive driver for the connectivity tracker.
//!
//! ```text
//!   stdin ──▶ parse_command ──▶ TrackerHandle ──▶ tracker task ──▶ stdout
//!   start                       notify_stream_started            state changes
//!   fail <cause>                notify_stream_failed             (text or JSON)
//!   set <state>                 override_state
//!   status                      snapshot
//! ```
//!
//! Exits on `quit`, end of input, SIGINT or SIGTERM.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use connectivity_tracker::config::{load_config, TrackerConfig};
use connectivity_tracker::connectivity::{ConnectivityState, TrackerHandle, TrackerService, TrackerSnapshot};
use connectivity_tracker::lifecycle::{signals, Shutdown};
use connectivity_tracker::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "connectivity-tracker")]
#[command(about = "Drive a connectivity tracker from stream events typed on stdin", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print state changes and snapshots as JSON lines.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Start,
    Fail(String),
    Set(ConnectivityState),
    Status,
    Quit,
}

fn parse_command(line: &str) -> Result<Option<Input>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let input = match word.to_ascii_lowercase().as_str() {
        "start" => Input::Start,
        "fail" if rest.is_empty() => Input::Fail("unspecified error".to_string()),
        "fail" => Input::Fail(rest.to_string()),
        "set" if rest.is_empty() => return Err("usage: set <online|offline|unknown>".to_string()),
        "set" => Input::Set(rest.parse().map_err(|e| format!("{}", e))?),
        "status" => Input::Status,
        "quit" | "exit" => Input::Quit,
        other => {
            return Err(format!(
                "unknown command {:?} (expected start, fail, set, status or quit)",
                other
            ))
        }
    };
    Ok(Some(input))
}

fn print_state(state: ConnectivityState, json: bool) {
    if json {
        println!("{}", serde_json::json!({ "event": "state_changed", "state": state }));
    } else {
        println!("state changed: {}", state);
    }
}

fn print_snapshot(snapshot: &TrackerSnapshot, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
    } else {
        println!(
            "state={} failures={} timeout_pending={} warning_armed={} warnings_emitted={}",
            snapshot.state,
            snapshot.failures,
            snapshot.timeout_pending,
            snapshot.warning_armed,
            snapshot.warnings_emitted
        );
    }
    Ok(())
}

async fn execute(handle: &TrackerHandle, input: Input, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    match input {
        Input::Start => handle.notify_stream_started().await?,
        Input::Fail(cause) => handle.notify_stream_failed(cause).await?,
        Input::Set(state) => handle.override_state(state).await?,
        Input::Status => print_snapshot(&handle.snapshot().await?, json)?,
        Input::Quit => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => TrackerConfig::default(),
    };

    logging::init_logging(&config.observability)?;

    tracing::info!(
        max_failures = config.tracker.max_failures,
        online_timeout_ms = config.tracker.online_timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();
    let json = cli.json;
    let (handle, task) = TrackerService::spawn(
        &config.tracker,
        move |state| print_state(state, json),
        shutdown.subscribe(),
    );

    let signal = signals::wait_for_shutdown_signal();
    tokio::pin!(signal);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Ok(Some(Input::Quit)) => break,
                    Ok(Some(input)) => execute(&handle, input, json).await?,
                    Ok(None) => {}
                    Err(message) => eprintln!("error: {}", message),
                }
            }
            _ = &mut signal => break,
        }
    }

    shutdown.trigger();
    task.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
