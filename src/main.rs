// src/main.rs

//! The `keyscope` command-line tool: counts, enumerates and inspects the keys
//! of a Redis-protocol store.

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use keyscope::config::Config;
use keyscope::{Connection, KeyEntry, ScanDriver, ScanSession};
use std::env;
use std::fs::File;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*};

const USAGE: &str = "Usage: keyscope [-c] [--config file] [--debug] [--pattern p] \
[--page-size n] [--rounds n] [--fetch key] [--version] [uri]";

/// Command-line flags, applied on top of the configuration file.
#[derive(Debug, Default)]
struct Args {
    config_path: Option<String>,
    cluster: bool,
    debug: bool,
    pattern: Option<String>,
    page_size: Option<usize>,
    rounds: Option<usize>,
    fetch: Option<String>,
    uri: Option<String>,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args::default();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("{flag} flag requires a value"))
        };
        match arg.as_str() {
            "-c" | "--cluster" => parsed.cluster = true,
            "--debug" => parsed.debug = true,
            "--config" => parsed.config_path = Some(value("--config")?),
            "--pattern" => parsed.pattern = Some(value("--pattern")?),
            "--fetch" => parsed.fetch = Some(value("--fetch")?),
            "--page-size" => {
                let raw = value("--page-size")?;
                parsed.page_size = Some(
                    raw.parse()
                        .with_context(|| format!("Invalid page size: {raw}"))?,
                );
            }
            "--rounds" => {
                let raw = value("--rounds")?;
                parsed.rounds = Some(
                    raw.parse()
                        .with_context(|| format!("Invalid round count: {raw}"))?,
                );
            }
            flag if flag.starts_with('-') => return Err(anyhow!("Unknown flag: {flag}")),
            uri => parsed.uri = Some(uri.to_string()),
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();
    if args.contains(&"--version".to_string()) {
        println!("keyscope version {VERSION}");
        return Ok(());
    }

    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            std::process::exit(2);
        }
    };

    let mut config = match &cli.config_path {
        Some(path) => match Config::from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from \"{path}\": {e:#}");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(uri) = &cli.uri {
        config.uri = uri.clone();
    }
    if cli.cluster {
        config.cluster = true;
    }
    if let Some(page_size) = cli.page_size {
        config.page_size = page_size;
    }
    if cli.debug && config.debug_log.is_none() {
        config.debug_log = Some("debug.log".to_string());
    }
    config.validate()?;

    init_logging(&config)?;

    if let Err(e) = run(&config, &cli).await {
        error!("keyscope failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}

/// Logs to stderr, or to `debug_log` when one is configured. `RUST_LOG` takes
/// precedence over the configured level.
fn init_logging(config: &Config) -> Result<()> {
    let level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());

    let file_layer = match &config.debug_log {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create debug log at '{path}'"))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = config.debug_log.is_none().then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(true)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(EnvFilter::new(level))
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

async fn run(config: &Config, cli: &Args) -> Result<()> {
    let conn = Connection::open_with(&config.uri, config.cluster, config.client_options())
        .await
        .with_context(|| format!("Failed to connect to {}", config.uri))?;
    info!("connected to {}", conn.addr());

    let total = conn.total_key_count().await.context("Failed to count keys")?;
    println!("{total} keys");

    let mut driver = ScanDriver::new(conn.clone());
    if let Some(throttle) = config.throttle() {
        driver = driver.with_throttle(throttle);
    }

    let pattern = cli.pattern.as_deref().unwrap_or("*");
    let session = ScanSession::new(pattern, config.page_size);
    for round in 1..=cli.rounds.unwrap_or(1) {
        let (mut stream, _cancel) = driver.run_async(&session);
        while let Some(entry) = stream.next().await {
            print_entry(&entry);
        }
        info!(
            "round {} done, {} keys discovered so far",
            round,
            session.discovered()
        );
        if !session.has_more() {
            break;
        }
    }

    if let Some(key) = &cli.fetch {
        let lookup = ScanSession::new(key.clone(), 1);
        let (mut stream, _cancel) = driver.run_async(&lookup);
        match stream.recv().await {
            Some(entry) if entry.is_error() => eprintln!("{}", entry.name),
            Some(entry) => {
                let rendered = conn
                    .fetch_value(&entry)
                    .await
                    .with_context(|| format!("Failed to fetch '{key}'"))?;
                println!("{rendered}");
            }
            None => eprintln!("key not found: {key}"),
        }
    }

    conn.close().await.context("Failed to close the connection")?;
    Ok(())
}

fn print_entry(entry: &KeyEntry) {
    if entry.is_error() {
        eprintln!("error: {}", entry.name);
    } else {
        println!(
            "{}\t{}\t{}\t{}",
            entry.name,
            entry.key_type,
            entry.ttl_string(),
            entry.size_string()
        );
    }
}
