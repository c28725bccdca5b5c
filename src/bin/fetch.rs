use anyhow::Context;
use clap::Parser;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use pollserve::client;
use pollserve::config::DEFAULT_PORT;

/// Download the served resource into a local file
#[derive(Debug, Parser)]
#[command(name = "fetch")]
struct Args {
    /// Server host name or address
    host: String,

    /// File to write the received bytes to
    file: PathBuf,

    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "LISTEN_PORT")]
    port: u16,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();

    let file = File::create(&args.file)
        .with_context(|| format!("failed to create {}", args.file.display()))?;
    let mut out = BufWriter::new(file);

    let report = client::fetch(&args.host, args.port, &mut out)?;
    out.into_inner()
        .map_err(|e| e.into_error())
        .context("failed to flush the output file")?;

    tracing::info!(
        peer = %report.peer,
        bytes = report.bytes,
        seconds = report.elapsed.as_secs_f64(),
        "Transfer finished"
    );

    Ok(())
}
