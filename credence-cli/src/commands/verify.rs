//! Verify command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use credence_core::api::{verify_from_path, NO_MANIFEST_STATE};
use credence_core::{Settings, TrustStatus};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::exit_codes::{self, ExitCode};
use crate::utils::format_timestamp;

/// Execute the verify command.
pub fn execute(
    file: PathBuf,
    anchors: Option<PathBuf>,
    no_trust_check: bool,
    json: bool,
    quiet: bool,
) -> Result<ExitCode> {
    let mut settings = Settings::from_env();
    if let Some(anchors) = anchors {
        settings = settings.with_trust_anchors(anchors);
    }
    if no_trust_check {
        settings.verify_trust = false;
    }
    debug!(?settings, "Verification settings");

    let report = verify_from_path(&file, &settings, Utc::now())
        .with_context(|| format!("Failed to verify {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if report["validation_state"] == NO_MANIFEST_STATE {
        warn!(path = %file.display(), "No manifest found");
        if !quiet && !json {
            banner("NO MANIFEST", |s| s.yellow());
            println!("   {}", "The file carries no content credentials.".dimmed());
        }
        return Ok(ExitCode::new(exit_codes::VERIFICATION_FAILED));
    }

    let status: TrustStatus = serde_json::from_value(report["validation_state"].clone())
        .context("Unexpected validation state")?;
    let validation: Vec<Value> = report["validation"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    info!(
        path = %file.display(),
        status = ?status,
        manifests = validation.len(),
        "Verification complete"
    );

    if !quiet && !json {
        match status {
            TrustStatus::Trusted => banner("TRUSTED", |s| s.green()),
            TrustStatus::ValidButUntrusted => banner("VALID, UNTRUSTED", |s| s.yellow()),
            TrustStatus::MissingIngredient => banner("INCOMPLETE", |s| s.yellow()),
            TrustStatus::InvalidSignature | TrustStatus::HashMismatch => {
                banner("TAMPERED", |s| s.red())
            }
        }
        for entry in &validation {
            print_manifest(&report, entry);
        }
    }

    Ok(ExitCode::from_status(status))
}

fn banner(title: &str, paint: impl Fn(&str) -> ColoredString) {
    println!();
    println!("{}", paint("╔════════════════════════════════════════╗"));
    println!("{}", paint(&format!("║{title:^40}║")).bold());
    println!("{}", paint("╚════════════════════════════════════════╝"));
}

fn print_manifest(report: &Value, entry: &Value) {
    let Some(id) = entry["manifest_id"].as_str() else {
        return;
    };
    let claim = &report["manifests"][id]["claim"];

    println!();
    println!("   {} {}", "Manifest:".dimmed(), id);
    if let Some(title) = claim["title"].as_str() {
        println!("   {} {}", "Title:".dimmed(), title);
    }
    if let Some(generator) = claim["claim_generator"].as_str() {
        println!("   {} {}", "Generator:".dimmed(), generator);
    }
    if let Some(created) = claim["created"]
        .as_str()
        .and_then(|c| c.parse::<DateTime<Utc>>().ok())
    {
        println!("   {} {}", "Signed at:".dimmed(), format_timestamp(&created));
    }
    if let Ok(status) = serde_json::from_value::<TrustStatus>(entry["status"].clone()) {
        println!("   {} {}", "Status:".dimmed(), paint_status(status));
    }
    for reason in entry["reasons"].as_array().into_iter().flatten() {
        println!(
            "     {} {} {}",
            "-".dimmed(),
            reason["code"].as_str().unwrap_or_default().red(),
            reason["explanation"].as_str().unwrap_or_default()
        );
    }
}

fn paint_status(status: TrustStatus) -> ColoredString {
    let text = format!("{status:?}");
    match status {
        TrustStatus::Trusted => text.green(),
        TrustStatus::ValidButUntrusted | TrustStatus::MissingIngredient => text.yellow(),
        TrustStatus::InvalidSignature | TrustStatus::HashMismatch => text.red(),
    }
}
