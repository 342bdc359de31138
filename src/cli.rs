use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tabled::{Table, Tabled};

use rdpgate::config::Config;
use rdpgate::{parse_hex, scan_capture, RdpGateProxy, Resolution};

#[derive(Parser)]
#[command(name = "rdpgate")]
#[command(author, version, about = "RDP routing-token gate and session router")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the routing proxy
    Serve,

    /// Extract the session identifier from a captured client preamble
    Scan {
        /// File holding the client -> server bytes
        file: PathBuf,

        /// File is a hex dump instead of raw bytes
        #[arg(long)]
        hex: bool,

        /// Feed the capture in chunks of this many bytes (0 = whole file)
        #[arg(long, default_value = "0")]
        chunk: usize,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List configured routes
    Routes {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Generate default configuration file
    GenConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Table row for the route list
#[derive(Tabled)]
struct RouteRow {
    #[tabled(rename = "Session")]
    session: String,
    #[tabled(rename = "Upstream")]
    upstream: String,
}

pub async fn run_command(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    match cli.command {
        Commands::Serve => cmd_serve(config).await,
        Commands::Scan {
            file,
            hex,
            chunk,
            json,
        } => cmd_scan(config, file, hex, chunk, json),
        Commands::Routes { json } => cmd_routes(config, json),
        Commands::GenConfig { output } => cmd_gen_config(output),
    }
}

async fn cmd_serve(config: Config) -> Result<()> {
    let proxy = RdpGateProxy::new(&config)?;

    tokio::select! {
        result = proxy.run() => result,
        _ = tokio::signal::ctrl_c() => {
            println!("Shutting down");
            Ok(())
        }
    }
}

fn cmd_scan(config: Config, file: PathBuf, hex: bool, chunk: usize, json: bool) -> Result<()> {
    let raw = std::fs::read(&file)
        .with_context(|| format!("Failed to read capture: {}", file.display()))?;

    let data = if hex {
        let text = String::from_utf8_lossy(&raw);
        parse_hex(&text).with_context(|| format!("Invalid hex dump: {}", file.display()))?
    } else {
        raw
    };

    let scan = scan_capture(&data, chunk, config.scanner.max_token_len);

    if json {
        println!("{}", serde_json::to_string_pretty(&scan.report())?);
        return Ok(());
    }

    if !rdpgate::protocols::rdp::is_tpkt(&data) {
        println!("{}", "Warning: capture does not start with a TPKT header".yellow());
    }

    let signals: Vec<&str> = scan.results.iter().map(|r| r.signal()).collect();

    println!("Chunks:     {} ({})", scan.results.len(), signals.join(" "));
    println!("Resolution: {}", scan.scanner.resolution());

    match scan.scanner.resolution() {
        Resolution::Token | Resolution::Truncated => {
            println!(
                "{} \"{}\"",
                "Session ID:".green().bold(),
                scan.scanner.session_id()
            );
            if let Some(token) = scan.scanner.routing_token() {
                println!("Token:      {}", token);
                let routes = config.route_table()?;
                match routes.resolve(Some(&token)) {
                    Some(upstream) => println!("Upstream:   {}", upstream),
                    None => println!("Upstream:   {}", "none".red()),
                }
            }
        }
        Resolution::Absent => {
            println!("{}", "No session ID in this connection".yellow().bold());
        }
        Resolution::Pending | Resolution::Scanning => {
            println!(
                "{} (scanned so far: \"{}\")",
                "Capture ends before the routing token is complete".red().bold(),
                scan.scanner.session_id()
            );
        }
    }

    Ok(())
}

fn cmd_routes(config: Config, json: bool) -> Result<()> {
    let routes = config.route_table()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config.routes)?);
        return Ok(());
    }

    if let Some(default) = routes.default_upstream() {
        println!("{} {}", "Default upstream:".green().bold(), default);
    }

    if routes.is_empty() {
        println!("No session routes");
        return Ok(());
    }

    let rows: Vec<RouteRow> = routes
        .iter()
        .map(|(session, upstream)| RouteRow {
            session: session.to_string(),
            upstream: upstream.to_string(),
        })
        .collect();

    println!("{}", Table::new(rows));

    Ok(())
}

fn cmd_gen_config(output: Option<PathBuf>) -> Result<()> {
    let config = Config::default();
    let toml_str = toml::to_string_pretty(&config)?;

    match output {
        Some(path) => {
            std::fs::write(&path, &toml_str)?;
            println!("Configuration written to {}", path.display());
        }
        None => {
            println!("{}", toml_str);
        }
    }

    Ok(())
}
