//! shuttle - send a file to, or fetch a file from, a shuttled daemon

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::time::Instant;

use shuttle::checksum::to_hex;
use shuttle::cli::{Action, ClientOpts};
use shuttle::client::{self, LocalSource};
use shuttle::conn::Connection;
use shuttle::progress::transfer_bar;
use shuttle::url::parse_server_addr;

fn main() {
    // Set up Ctrl-C handler
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // 128 + SIGINT
        std::process::exit(130);
    }) {
        eprintln!("Warning: could not install Ctrl-C handler: {}", e);
    }

    let opts = ClientOpts::parse();
    if let Err(e) = run(&opts) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(opts: &ClientOpts) -> Result<()> {
    let addr = parse_server_addr(&opts.server)?;
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let (result, timing) = timed(opts.action, || {
        rt.block_on(async {
            match opts.action {
                Action::Put => put(&addr.dial_string(), &opts.file, opts.progress).await,
                Action::Get => {
                    get(&addr.dial_string(), &opts.file, &opts.dir, opts.progress).await
                }
            }
        })
    });
    // Reported whether or not the transfer succeeded
    println!("{}", timing);
    result
}

/// Run `op` and describe how long it took
fn timed<T>(action: Action, op: impl FnOnce() -> Result<T>) -> (Result<T>, String) {
    let start = Instant::now();
    let result = op();
    let line = format!("{} operation took {:?}", action, start.elapsed());
    (result, line)
}

async fn put(server: &str, path: &Path, show_progress: bool) -> Result<()> {
    // Local problems are reported without ever dialing the server
    let source = LocalSource::open(path).await?;
    println!("PUT {} ({} bytes) -> {}", source.name(), source.size(), server);

    let mut conn = Connection::connect(server).await?;
    let pb = show_progress.then(|| transfer_bar(source.size(), source.name()));
    let result = client::put(&mut conn, source, pb.as_ref()).await;
    conn.close().await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let report = result?;
    println!("Storage complete! md5={}", to_hex(&report.checksum));
    Ok(())
}

async fn get(server: &str, name: &Path, dir: &Path, show_progress: bool) -> Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("Destination is not a directory: {}", dir.display());
    }
    let name = name
        .to_str()
        .with_context(|| format!("File name is not valid UTF-8: {}", name.display()))?;
    println!("GET {} <- {}", name, server);

    let mut conn = Connection::connect(server).await?;
    let pb = show_progress.then(|| transfer_bar(0, name));
    let result = client::get(&mut conn, name, dir, pb.as_ref()).await;
    conn.close().await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let report = result?;
    println!(
        "Retrieved {} ({} bytes) md5={}",
        report.path.display(),
        report.bytes,
        to_hex(&report.checksum)
    );
    Ok(())
}
