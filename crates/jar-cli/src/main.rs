mod oracle;
mod runtime;
mod server;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use jar_core::{
    MemoryKind, MemoryRecord, OracleStatus, PointerEvent, PopRequest, PopTrigger, Shape,
    now_unix_millis, unix_millis_to_iso8601,
};
use jar_store::resolve_base_dir;
use rmcp::{ServiceExt, transport::stdio};

use crate::oracle::GeminiOracle;
use crate::runtime::JarRuntime;

#[derive(Parser)]
#[command(name = "vaporjar", about = "A memory jar you shake to pop a random memory")]
struct Cli {
    /// Data directory (default: $VAPORJAR_DATA_DIR, then ~/.vaporjar)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Put a new memory in the jar
    #[command(group(ArgGroup::new("payload").required(true).args(["text", "drawing", "audio"])))]
    Add {
        /// Text memory
        #[arg(long)]
        text: Option<String>,

        /// Drawing as a data URI or file reference
        #[arg(long)]
        drawing: Option<String>,

        /// Audio clip as a data URI or file reference
        #[arg(long)]
        audio: Option<String>,

        /// rect, circle, star or heart
        #[arg(long, default_value = "rect", value_parser = parse_shape)]
        shape: Shape,
    },

    /// Shake the jar and pop a random memory
    Pop {
        /// Ask the oracle about the popped memory
        #[arg(long)]
        oracle: bool,
    },

    /// Replay a recorded pointer trace (JSON array of start/move/end events)
    Shake {
        trace: PathBuf,

        /// Ask the oracle about the popped memory
        #[arg(long)]
        oracle: bool,
    },

    /// List every memory, oldest first
    List,

    /// Show jar statistics
    Stats,

    /// Export all memories to a JSON file
    Export {
        /// Output file path
        path: PathBuf,
    },

    /// Replace all memories with the contents of a JSON file
    Import {
        /// Input file path
        path: PathBuf,
    },

    /// Start MCP server on stdio transport
    Serve,
}

fn parse_shape(s: &str) -> std::result::Result<Shape, String> {
    Shape::parse(s).ok_or_else(|| format!("unknown shape '{s}' (expected rect, circle, star or heart)"))
}

fn open_runtime(cli: &Cli) -> Result<JarRuntime> {
    let base = resolve_base_dir(cli.data_dir.as_deref());
    JarRuntime::open(&base).context("failed to open jar")
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Add {
            text,
            drawing,
            audio,
            shape,
        } => {
            let (kind, payload) = match (text, drawing, audio) {
                (Some(t), _, _) => (MemoryKind::Text, t),
                (_, Some(d), _) => (MemoryKind::Drawing, d),
                (_, _, Some(a)) => (MemoryKind::Audio, a),
                _ => anyhow::bail!("one of --text, --drawing or --audio is required"),
            };
            cmd_add(&cli, kind, payload, *shape)
        }
        Commands::Pop { oracle } => cmd_pop(&cli, *oracle).await,
        Commands::Shake { trace, oracle } => cmd_shake(&cli, trace, *oracle).await,
        Commands::List => cmd_list(&cli),
        Commands::Stats => cmd_stats(&cli),
        Commands::Export { path } => cmd_export(&cli, path),
        Commands::Import { path } => cmd_import(&cli, path),
        Commands::Serve => cmd_serve(&cli).await,
    }
}

async fn cmd_serve(cli: &Cli) -> Result<()> {
    let runtime = open_runtime(cli)?;
    let oracle = GeminiOracle::from_env(&runtime.config.oracle).context("failed to set up oracle")?;
    if !oracle.has_key() {
        tracing::info!("no oracle API key set; readings will fall back");
    }
    tracing::info!("starting MCP server with {} memories", runtime.store.len());

    let server = server::JarServer::new(runtime, oracle);
    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server")?;
    service.waiting().await?;
    Ok(())
}

fn cmd_add(cli: &Cli, kind: MemoryKind, payload: &str, shape: Shape) -> Result<()> {
    let mut rt = open_runtime(cli)?;
    let record = rt.create(kind, payload, shape)?;
    println!(
        "saved {} ({}, {}). memories={}",
        record.id(),
        record.kind().as_str(),
        record.shape().as_str(),
        rt.store.len()
    );
    Ok(())
}

async fn cmd_pop(cli: &Cli, oracle: bool) -> Result<()> {
    let mut rt = open_runtime(cli)?;
    let request = rt.session.request_pop(&rt.store, now_unix_millis());
    finish(&mut rt, request, oracle).await
}

async fn cmd_shake(cli: &Cli, trace: &Path, oracle: bool) -> Result<()> {
    let json = std::fs::read_to_string(trace)
        .with_context(|| format!("failed to read {}", trace.display()))?;
    let events: Vec<PointerEvent> =
        serde_json::from_str(&json).with_context(|| format!("invalid trace {}", trace.display()))?;

    let mut rt = open_runtime(cli)?;
    let mut peak_tilt: f64 = 0.0;
    let mut peak_energy: f64 = 0.0;
    let mut triggers = Vec::new();
    let mut request = None;

    for event in &events {
        if let Some((trigger, req)) = rt.feed(*event) {
            triggers.push(match trigger {
                PopTrigger::Shake => "shake",
                PopTrigger::Tap => "tap",
            });
            if request.is_none() && !matches!(req, PopRequest::AlreadyShaking) {
                request = Some(req);
            }
        }
        if rt.drag.tilt().abs() > peak_tilt.abs() {
            peak_tilt = rt.drag.tilt();
        }
        peak_energy = peak_energy.max(rt.drag.energy());
    }

    println!("events:      {}", events.len());
    println!("peak tilt:   {peak_tilt:.1}°");
    println!("peak energy: {peak_energy:.0}");
    if triggers.is_empty() {
        println!("triggers:    none");
    } else {
        println!("triggers:    {}", triggers.join(", "));
    }

    match request {
        Some(req) => finish(&mut rt, req, oracle).await,
        None => {
            println!("the jar did not pop");
            Ok(())
        }
    }
}

/// Run a pop request to completion: wait out the shake, show the memory and
/// optionally its oracle reading.
async fn finish(rt: &mut JarRuntime, request: PopRequest, oracle: bool) -> Result<()> {
    let ready_at = match request {
        PopRequest::Started { ready_at } => ready_at,
        PopRequest::EmptyJar => {
            println!("the jar is empty. add a memory first");
            return Ok(());
        }
        PopRequest::AlreadyShaking | PopRequest::NotIdle => {
            println!("the jar is busy");
            return Ok(());
        }
    };

    let wait = ready_at.saturating_sub(now_unix_millis());
    if wait > 0 {
        tokio::time::sleep(Duration::from_millis(wait)).await;
    }
    let Some(record) = rt.finish_pop(ready_at)? else {
        println!("the jar did not pop");
        return Ok(());
    };
    print_record(&record);

    if oracle {
        consult(rt).await?;
    }
    rt.session.close();
    Ok(())
}

async fn consult(rt: &mut JarRuntime) -> Result<()> {
    let oracle = GeminiOracle::from_env(&rt.config.oracle).context("failed to set up oracle")?;
    let Some((ticket, request)) = rt.session.consult_oracle() else {
        return Ok(());
    };
    let result = oracle.consult(&request).await;
    if let Err(e) = &result {
        tracing::warn!("oracle unavailable, using fallback reading: {e}");
    }
    rt.session.resolve_oracle(&ticket, result);

    if let Some(OracleStatus::Resolved(reading)) = rt.session.viewing().map(|v| v.oracle()) {
        println!("oracle:  {}", reading.interpretation);
        println!("mood:    {}", reading.mood);
    }
    Ok(())
}

fn print_record(record: &MemoryRecord) {
    println!("id:      {}", record.id());
    println!("type:    {}", record.kind().as_str());
    println!("shape:   {}", record.shape().as_str());
    println!("color:   {}", record.display_color());
    println!("created: {}", unix_millis_to_iso8601(record.created_at()));
    println!("content: {}", record.preview(200));
}

fn cmd_list(cli: &Cli) -> Result<()> {
    let rt = open_runtime(cli)?;
    if rt.store.is_empty() {
        println!("(jar is empty)");
        return Ok(());
    }
    for record in rt.store.records() {
        println!(
            "{}  {:<7} {:<6} {}",
            unix_millis_to_iso8601(record.created_at()),
            record.kind().as_str(),
            record.shape().as_str(),
            record.preview(60)
        );
    }
    Ok(())
}

fn cmd_stats(cli: &Cli) -> Result<()> {
    let rt = open_runtime(cli)?;
    let stats = rt.stats_json();
    let stored = stats["stored_bytes"].as_u64().unwrap_or(0);
    let max = stats["max_bytes"].as_u64().unwrap_or(0);

    println!("memories:  {}", stats["memories"]);
    println!("text:      {}", stats["text"]);
    println!("drawing:   {}", stats["drawing"]);
    println!("audio:     {}", stats["audio"]);
    println!(
        "stored:    {:.1}KB / {:.1}KB",
        stored as f64 / 1024.0,
        max as f64 / 1024.0
    );
    println!("last write: {}", stats["last_write"].as_str().unwrap_or("never"));
    Ok(())
}

fn cmd_export(cli: &Cli, path: &Path) -> Result<()> {
    let rt = open_runtime(cli)?;
    rt.store
        .export_json_file(path)
        .context("failed to export memories")?;
    println!("exported {} memories to {}", rt.store.len(), path.display());
    Ok(())
}

fn cmd_import(cli: &Cli, path: &Path) -> Result<()> {
    let mut rt = open_runtime(cli)?;
    let n = rt
        .store
        .import_json_file(path)
        .context("failed to import JSON")?;
    println!("imported {n} memories from {}", path.display());
    Ok(())
}
