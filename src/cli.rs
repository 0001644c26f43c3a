use crate::{
    config::Config,
    engine::{OcrEngine, tesseract::TesseractEngine},
    pipeline::{BatchEvent, Pipeline, clear_workspace},
    report::{ReportBuilder, ReportConfig},
    staging::StagingStore,
    util::ensure_dir,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "scan-ledger")]
#[command(about = "Batch OCR of scanned images into an append-only spreadsheet ledger")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./scan-ledger.toml if present, else defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check the OCR engine and list its installed languages.
    Doctor {},
    /// Copy files into the staging directory.
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List staged files.
    List {},
    /// OCR the given files, or everything staged, into the report.
    Process {
        files: Vec<PathBuf>,
        /// Override ocr.language for this batch.
        #[arg(long)]
        lang: Option<String>,
    },
    /// Delete staged files and the report.
    Clear {},
}

pub fn dispatch(args: Args) -> Result<()> {
    let mut cfg = load_config(args.config.as_deref())?;
    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    match args.cmd {
        Command::Doctor {} => doctor(&cfg),
        Command::Ingest { files } => ingest(&cfg, &files),
        Command::List {} => list(&cfg),
        Command::Process { files, lang } => {
            if let Some(lang) = lang {
                cfg.override_language(lang)?;
            }
            process(&cfg, files)
        }
        Command::Clear {} => clear(&cfg),
    }
}

fn load_config(user: Option<&Path>) -> Result<Config> {
    if let Some(p) = user {
        return Config::load(p);
    }
    let default = PathBuf::from("scan-ledger.toml");
    if default.exists() {
        Config::load(&default)
    } else {
        Ok(Config::default())
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the JSON summaries, so logs go to stderr
    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file || cfg.logging.file_path.is_empty() {
        return None;
    }
    Some(PathBuf::from(&cfg.logging.file_path))
}

fn doctor(cfg: &Config) -> Result<()> {
    let engine = TesseractEngine::new(cfg)?;
    let diag = engine.doctor()?;
    println!("{}", serde_json::to_string_pretty(&diag)?);
    if !diag.ok {
        return Err(anyhow!(
            "OCR engine not usable: {}",
            diag.error.as_deref().unwrap_or("unknown error")
        ));
    }
    Ok(())
}

fn ingest(cfg: &Config, files: &[PathBuf]) -> Result<()> {
    let staging = StagingStore::from_config(cfg)?;
    let mut staged = Vec::new();
    for file in files {
        match staging.ingest(file) {
            Ok(path) => staged.push(path),
            // A bad file shouldn't sink the rest of the drop.
            Err(e) => warn!("not staged: {e}"),
        }
    }
    if staged.len() < files.len() {
        warn!("staged {} of {} files", staged.len(), files.len());
    }
    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "staging_dir": staging.dir(),
                "staged": staged,
                "failed": files.len() - staged.len(),
            }))?
        );
    }
    Ok(())
}

fn list(cfg: &Config) -> Result<()> {
    let staging = StagingStore::from_config(cfg)?;
    for file in staging.list()? {
        println!("{}", file.display());
    }
    Ok(())
}

fn process(cfg: &Config, files: Vec<PathBuf>) -> Result<()> {
    let engine = TesseractEngine::new(cfg)?;
    let pipeline = Arc::new(Pipeline::new(cfg, engine)?);
    let handle = pipeline.submit(files);

    for event in handle.events().iter() {
        match event {
            BatchEvent::Started { total } => info!("processing {total} files"),
            BatchEvent::Progress {
                file,
                processed,
                total,
                percent,
            } => info!("[{percent:>3}%] {processed}/{total} {file}"),
            BatchEvent::Skipped { file, reason } => warn!("skipped {file}: {reason}"),
            BatchEvent::Completed(_) | BatchEvent::Failed { .. } => break,
        }
    }

    let summary = handle.join().context("batch failed")?;
    if cfg.global.print_summary {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

fn clear(cfg: &Config) -> Result<()> {
    // Needs no engine; a single CLI process never overlaps a batch.
    let staging = StagingStore::from_config(cfg)?;
    let report = clear_workspace(&staging, &ReportBuilder::new(ReportConfig::from_config(cfg)));
    if cfg.global.print_summary {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if !report.is_clean() {
        warn!("cleanup finished with {} failures", report.failures.len());
    }
    Ok(())
}
