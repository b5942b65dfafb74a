use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use shuttle::cli::DaemonOpts;
use shuttle::config::DaemonConfig;
use shuttle::disk::FixedSpace;
use shuttle::journal::TransferJournal;
use shuttle::logger::{Logger, NoopLogger, TeeLogger, TextLogger};
use shuttle::server::{self, ServerContext};

fn main() -> Result<()> {
    let opts = DaemonOpts::parse();

    let config = match &opts.config {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };
    let settings = config.merge_cli(&opts);

    // Validate root directory exists and is a directory
    if !settings.root.exists() {
        anyhow::bail!("Root directory does not exist: {}", settings.root.display());
    }
    if !settings.root.is_dir() {
        anyhow::bail!("Root path is not a directory: {}", settings.root.display());
    }

    let mut loggers: Vec<Arc<dyn Logger>> = Vec::new();
    if !settings.quiet {
        loggers.push(Arc::new(TextLogger::stderr()));
    }
    if let Some(ref p) = settings.log_file {
        let file_logger = TextLogger::new(p)
            .with_context(|| format!("Failed to open log file: {}", p.display()))?;
        loggers.push(Arc::new(file_logger));
    }
    let logger: Arc<dyn Logger> = match loggers.len() {
        0 => Arc::new(NoopLogger),
        1 => loggers.remove(0),
        _ => Arc::new(TeeLogger::new(loggers)),
    };

    let mut ctx = ServerContext::new(&settings.root)?.with_logger(logger);
    let journal = settings
        .journal
        .as_deref()
        .map(|p| Arc::new(TransferJournal::new(p)));
    if let Some(ref journal) = journal {
        ctx = ctx.with_journal(Arc::clone(journal));
    }
    if let Some(bytes) = settings.free_space {
        ctx = ctx.with_space(Arc::new(FixedSpace(bytes)));
    }

    println!("Starting shuttle daemon:");
    println!("  Root: {}", ctx.root().display());
    println!("  Bind: {}", settings.bind);
    if let Some(ref journal) = journal {
        println!("  Journal: {}", journal.path().display());
    }
    if let Some(bytes) = settings.free_space {
        println!("  Free space: {} bytes (simulated)", bytes);
    }
    if settings.bind.starts_with("0.0.0.0") {
        eprintln!("WARNING: Binding to 0.0.0.0 exposes the daemon to all network interfaces");
        eprintln!("   Transfers are unencrypted and unauthenticated; use on trusted networks only");
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    rt.block_on(server::serve(&settings.bind, ctx))
}
