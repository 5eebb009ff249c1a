//! Scheduled jobs for the vial project.

#![warn(clippy::all, clippy::pedantic)]

use anyhow::{Context, Result};
use clap::Parser;
use vial_common::Config;
use vial_common::audit::{self, AuditReport};
use vial_common::config::ConfigArgs;
use vial_common::db_util;

/// Re-check validated annotations against everything volunteers submitted.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Write a validated value for notes that reach the threshold without one.
    /// Existing validated values are never changed.
    #[arg(long)]
    promote: bool,
}

fn print_report(report: &AuditReport) {
    println!("=== DISPUTED ===");
    for dispute in &report.disputed {
        println!(
            "Note #{} {}: validated {:?} ({} votes) but {:?} has {} votes",
            dispute.note_id,
            dispute.property,
            dispute.validated_value,
            dispute.validated_support,
            dispute.majority_value,
            dispute.majority_support
        );
    }

    println!();
    println!("=== MISSING ===");
    for missing in &report.missing {
        println!(
            "Note #{} {}: {:?} has {} votes",
            missing.note_id, missing.property, missing.value, missing.support
        );
    }

    println!();
    println!(
        "{} disputed, {} missing, {} promoted.",
        report.disputed.len(),
        report.missing.len(),
        report.promoted
    );
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config::from_args(&cli.config).context("Invalid configuration")?;

    // get db connection
    let mut conn = db_util::get_database_connection()?;
    log::info!("Database connection established. Scheduled jobs started.");

    let report = audit::run_audit(&mut conn, &config, cli.promote)?;
    print_report(&report);

    if !report.disputed.is_empty() {
        log::warn!(
            "{} validated values disagree with the majority and need review",
            report.disputed.len()
        );
    }
    Ok(())
}
