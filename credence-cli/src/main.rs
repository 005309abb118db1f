//! Credence CLI - sign and verify content credentials.

use std::path::PathBuf;
use std::process::ExitCode as ProcessExit;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success (verify: manifest trusted)
  64  Usage error
  65  Verification failed, no manifest or invalid input
  66  Input file not found
  74  Cannot write output
  77  Manifest valid but not trusted, or ingredient missing
  78  Configuration or signing credential error";

#[derive(Parser)]
#[command(name = "credence")]
#[command(author, version, about = "Content credential signing and verification", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Suppress human-readable output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign a file and embed (or side-car) its manifest store
    Sign {
        /// Path to the asset to sign
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output path (defaults to signing in place)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Manifest definition JSON (defaults to a single `c2pa.created` action)
        #[arg(short, long, value_name = "JSON")]
        manifest: Option<PathBuf>,

        /// PEM private key (defaults to CREDENCE_SIGNING_KEY)
        #[arg(long, requires = "cert")]
        key: Option<PathBuf>,

        /// PEM certificate chain, leaf first (defaults to CREDENCE_SIGNING_CERT)
        #[arg(long, requires = "key")]
        cert: Option<PathBuf>,

        /// Signing algorithm for --key/--cert: es256, es384, es512, ps256, ps384, ps512, ed25519
        #[arg(long, default_value = "es256")]
        alg: String,

        /// Write the store to <OUTPUT>.crd instead of embedding it
        #[arg(long)]
        sidecar: bool,

        /// Show what would be done without signing
        #[arg(long)]
        dry_run: bool,
    },

    /// Verify a file's manifest store
    Verify {
        /// Path to the asset
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// PEM bundle of trust anchors (defaults to CREDENCE_TRUST_ANCHORS)
        #[arg(long, value_name = "PEM")]
        anchors: Option<PathBuf>,

        /// Accept valid chains that do not reach a trust anchor
        #[arg(long)]
        no_trust_check: bool,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version and supported formats
    Info,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "credence=debug,credence_core=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ProcessExit {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Sign {
            file,
            output,
            manifest,
            key,
            cert,
            alg,
            sidecar,
            dry_run,
        } => commands::sign::execute(commands::sign::SignArgs {
            file,
            output,
            manifest,
            key,
            cert,
            alg,
            sidecar,
            dry_run,
            quiet: cli.quiet,
        }),
        Commands::Verify {
            file,
            anchors,
            no_trust_check,
            json,
        } => commands::verify::execute(file, anchors, no_trust_check, json, cli.quiet),
        Commands::Info => commands::info::execute(),
    };

    let exit = result.unwrap_or_else(|err| {
        if !cli.quiet {
            eprintln!("{} {err:#}", "error:".red().bold());
        }
        ExitCode::from_anyhow(&err)
    });
    ProcessExit::from(exit.code)
}
