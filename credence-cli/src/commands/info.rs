//! Info command implementation.

use anyhow::Result;
use colored::Colorize;
use credence_core::api;

use crate::exit_codes::ExitCode;

/// Print library version and the formats that can carry an embedded store.
pub fn execute() -> Result<ExitCode> {
    println!("{} {}", "Library:".dimmed(), api::version());
    println!(
        "{} {}",
        "Embeddable formats:".dimmed(),
        api::supported_formats().join(", ")
    );
    println!(
        "{} {}",
        "Other formats:".dimmed(),
        "sidecar (<file>.crd)"
    );
    Ok(ExitCode::success())
}
