//! Firma command-line signer
//!
//! Thin wrapper over `firma_core::sign`: argument parsing, password prompt
//! and user-facing messages. The stamp's UTC offset is taken from the local
//! zone here; the core only sees the resulting `FixedOffset`.

use anyhow::{bail, Context};
use chrono::{Local, Offset};
use clap::Parser;
use firma_core::{default_output_path, sign, SignRequest, SignerConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "firma")]
#[command(version, about = "Embed a PAdES-style digital signature into a PDF")]
struct Args {
    /// Path to input PDF file
    #[arg(short, long)]
    input: PathBuf,

    /// Path to .p12/.pfx certificate file
    #[arg(short, long)]
    cert: PathBuf,

    /// Certificate password (prompted when omitted)
    #[arg(short, long)]
    password: Option<String>,

    /// Path to output signed PDF file (default: <input>_signed.pdf)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Add visible signature stamp
    #[arg(long)]
    visible: bool,

    /// Place visible signature vertically on the left margin
    #[arg(long)]
    vertical_left: bool,

    /// Stamp every page instead of only the first
    #[arg(long)]
    all_pages: bool,

    /// TOML file with reason, location, signature size and stamp layout
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error during signing: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    if !args.input.exists() {
        bail!("Input PDF not found: {}", args.input.display());
    }
    if !args.cert.exists() {
        bail!("Certificate file not found: {}", args.cert.display());
    }

    let config = match &args.config {
        Some(path) => SignerConfig::from_file(path)?,
        None => SignerConfig::default(),
    };

    let password = match args.password {
        Some(password) => password,
        None => rpassword::prompt_password("Enter certificate password: ")
            .context("Failed to read password")?,
    };

    let output = args
        .output
        .unwrap_or_else(|| default_output_path(&args.input));
    let request = SignRequest::new(&args.input, &args.cert, password)
        .with_output(&output)
        .with_visible(args.visible)
        .with_vertical_left(args.vertical_left)
        .with_all_pages(args.all_pages)
        .with_utc_offset(Local::now().offset().fix());

    println!("Signing {}...", args.input.display());
    let written = sign(&request, &config)?;
    println!("Success! Signed file saved to: {}", written.display());
    Ok(())
}
