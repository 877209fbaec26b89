//! `perceptor-cli` – command line entry point.
//!
//! ```text
//! perceptor run [--count N] [--seed S]   publish, mirror and assert detections
//! perceptor detect [--seed S]            one request to the dummy detector service
//! perceptor config                       show the effective settings
//! ```
//!
//! Settings come from `~/.perceptor/config.toml` (written with defaults on
//! first use) and `PERCEPTOR_*` environment variables. Ctrl-C shuts the
//! session down; running loops finish their current step and exit.

mod config;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use perceptor_detector::DetectionGenerator;
use perceptor_knowledge::{HttpKnowledgeStore, KnowledgeStore, LoggingKnowledgeStore};
use perceptor_middleware::Session;
use perceptor_runtime::telemetry::{TelemetryConfig, init_tracing};
use perceptor_runtime::{DetectionPipeline, DummyClient, DummyDetectorService, PipelineReport};

#[derive(Parser)]
#[command(name = "perceptor", version, about = "Dummy object detection and knowledge-base updates")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the producer, listener and updater until Ctrl-C.
    Run {
        /// Stop after this many detections.
        #[arg(long)]
        count: Option<u64>,
        /// Seed the detection generator (default: wall clock).
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Call the dummy detector service once and print the result.
    Detect {
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the effective configuration.
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Before the runtime exists: the span exporter must not depend on it.
    let _telemetry = match init_tracing(&TelemetryConfig::from_env("perceptor")) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}: {}", "Logging setup failed".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let cfg = match load_or_create_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start the async runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Run { count, seed } => {
            print_banner();
            runtime.block_on(run(&cfg, count, seed))
        }
        Command::Detect { seed } => runtime.block_on(detect(&cfg, seed)),
        Command::Config => show_config(&cfg),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

async fn run(cfg: &config::Config, count: Option<u64>, seed: Option<u64>) -> Result<(), String> {
    let pipeline_cfg = cfg.pipeline(seed, count)?;
    let store = build_store(cfg)?;
    let session = Session::new("perceptor");
    install_ctrlc(&session);

    println!(
        "  Publishing on {} every {} ms",
        cfg.topic.bold(),
        cfg.publish_interval_ms
    );
    match &cfg.kb_url {
        Some(url) => println!("  Asserting into {}", url.bold()),
        None => println!("  {}", "No kb_url configured; assertions are only logged.".dimmed()),
    }
    println!("  Press {} to stop.\n", "Ctrl-C".bold());

    let handle = DetectionPipeline::spawn(&session, pipeline_cfg, store).map_err(|e| e.to_string())?;
    let report = handle.finish().await;
    print_report(&report);

    if report.errors.is_empty() {
        Ok(())
    } else {
        Err(report.errors.join("; "))
    }
}

async fn detect(cfg: &config::Config, seed: Option<u64>) -> Result<(), String> {
    let session = Session::new("perceptor-detect");
    let generator = match seed {
        Some(seed) => DetectionGenerator::with_seed(seed),
        None => DetectionGenerator::from_wall_clock(),
    };
    let _server = DummyDetectorService::new(generator)
        .advertise(&session, &cfg.service_name)
        .map_err(|e| e.to_string())?;
    let client = DummyClient::connect(&session, &cfg.service_name, cfg.service_timeout())
        .map_err(|e| e.to_string())?;

    let (detection, transform) = client
        .detect_object_transform()
        .await
        .map_err(|e| e.to_string())?;
    session.shutdown();

    let p = detection.pose.pose.position;
    println!();
    println!("  {} {}", "Detected".green().bold(), detection.object_type.to_string().bold());
    println!("  frame    {}", detection.pose.header.frame_id);
    println!("  stamp    {}", detection.stamp().to_rfc3339());
    println!("  position ({:.3}, {:.3}, {:.3})", p.x, p.y, p.z);
    println!("  transform");
    for row in transform.0 {
        println!(
            "    [{:>8.4} {:>8.4} {:>8.4} {:>8.4}]",
            row[0], row[1], row[2], row[3]
        );
    }
    println!();
    Ok(())
}

fn show_config(cfg: &config::Config) -> Result<(), String> {
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    println!("# {}", config::config_path().display().to_string().dimmed());
    println!("{raw}");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn load_or_create_config() -> Result<config::Config, String> {
    if let Some(cfg) = config::load()? {
        info!(path = %config::config_path().display(), "config loaded");
        return Ok(cfg);
    }
    let mut cfg = config::Config::default();
    match config::save(&cfg) {
        Ok(()) => println!(
            "  {} Default config written to {}",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => warn!(error = %e, "could not write default config"),
    }
    config::apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn build_store(cfg: &config::Config) -> Result<Arc<dyn KnowledgeStore>, String> {
    match &cfg.kb_url {
        Some(url) => {
            let timeout = cfg.service_timeout().max(Duration::from_millis(1));
            let store = HttpKnowledgeStore::new(url.as_str(), timeout).map_err(|e| e.to_string())?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(LoggingKnowledgeStore)),
    }
}

fn install_ctrlc(session: &Session) {
    let session = session.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        session.shutdown();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; stop the process another way");
    }
}

fn print_report(report: &PipelineReport) {
    println!();
    println!("  {}", "Summary".bold());
    println!("    published {}", report.published);
    println!("    forwarded {}", report.forwarded);
    println!("    asserted  {}", report.updater.processed.to_string().green());
    if report.updater.failed > 0 {
        println!("    failed    {}", report.updater.failed.to_string().red());
    }
    println!();
}

fn print_banner() {
    println!();
    println!("{}", r#"   ___                     __           "#.bold().cyan());
    println!("{}", r#"  / _ \___ ___________ ___/ /____  ____ "#.bold().cyan());
    println!("{}", r#" / ___/ -_) __/ __/ -_) _  / __/ _ \/ __/"#.bold().cyan());
    println!("{}", r#"/_/   \__/_/  \__/\__/ .__/\__/\___/_/   "#.bold().cyan());
    println!("{}", r#"                    /_/                 "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Perceptor".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Dummy object detection pipeline");
    println!();
}
