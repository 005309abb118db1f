//! Sign command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use credence_core::api::{add_manifest_with, AddManifestOptions};
use credence_core::container;
use credence_core::{CredenceError, PemSigner, Settings, SigningAlg};
use tracing::info;

use crate::exit_codes::ExitCode;
use crate::utils::load_definition;

pub struct SignArgs {
    pub file: PathBuf,
    pub output: Option<PathBuf>,
    pub manifest: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub alg: String,
    pub sidecar: bool,
    pub dry_run: bool,
    pub quiet: bool,
}

/// Execute the sign command.
pub fn execute(args: SignArgs) -> Result<ExitCode> {
    let output = args.output.clone().unwrap_or_else(|| args.file.clone());
    let definition = load_definition(args.manifest.as_deref(), &args.file)?;

    if args.dry_run {
        println!("{}", "[DRY RUN] Would perform the following:".cyan().bold());
        println!();
        println!("   {} {}", "Input file:".dimmed(), args.file.display());
        println!("   {} {}", "Output file:".dimmed(), output.display());
        if args.sidecar {
            println!(
                "   {} {}",
                "Sidecar:".dimmed(),
                container::sidecar_path(&output).display()
            );
        }
        println!("   {} {}", "Algorithm:".dimmed(), args.alg);
        println!(
            "   {} {}",
            "Signing key:".dimmed(),
            args.key
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "from CREDENCE_SIGNING_KEY env".to_string())
        );
        println!(
            "   {} {}",
            "Assertions:".dimmed(),
            definition.assertions.len()
        );
        return Ok(ExitCode::success());
    }

    let signer = match (&args.key, &args.cert) {
        (Some(key), Some(cert)) => {
            let alg: SigningAlg = args
                .alg
                .parse()
                .map_err(CredenceError::InvalidDefinition)?;
            PemSigner::from_files(key, cert, alg)
                .map_err(CredenceError::from)
                .context("Failed to load signing credentials from files")?
        }
        _ => PemSigner::from_env().map_err(CredenceError::from).context(
            "Failed to load signing credentials from environment. \
             Set CREDENCE_SIGNING_KEY and CREDENCE_SIGNING_CERT",
        )?,
    };

    let settings = Settings::from_env();
    let options = AddManifestOptions {
        sidecar: args.sidecar,
    };
    let outcome = add_manifest_with(&args.file, &output, definition, &signer, &options, &settings)
        .with_context(|| format!("Failed to sign {}", args.file.display()))?;

    info!(
        manifest = %outcome.manifest_id,
        output = %outcome.dest.display(),
        store_bytes = outcome.store_size,
        "Signed"
    );

    if !args.quiet {
        println!();
        println!("{}", "Manifest signed!".green().bold());
        println!();
        println!("   {} {}", "Manifest:".dimmed(), outcome.manifest_id);
        println!("   {} {}", "Output file:".dimmed(), outcome.dest.display());
        if let Some(sidecar) = &outcome.sidecar {
            println!("   {} {}", "Sidecar:".dimmed(), sidecar.display());
        }
        println!("   {} {} bytes", "Store size:".dimmed(), outcome.store_size);
        println!(
            "   {}",
            format!("Verify with: credence verify {}", outcome.dest.display()).dimmed()
        );
    }

    Ok(ExitCode::success())
}
