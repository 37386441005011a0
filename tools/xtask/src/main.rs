//! Workspace automation tasks.
//!
//! Run with: `cargo xtask <command>`

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::Path;
use std::process::Command;

/// Attributes every library crate root must carry.
const REQUIRED_CRATE_ATTRS: &[&str] = &["#![forbid(unsafe_code)]", "#![deny(missing_docs)]"];

#[derive(Parser)]
#[command(name = "xtask", about = "pcs-storage workspace automation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all CI checks locally
    Ci,
    /// Validate workspace conventions
    Lint,
    /// Re-run the mutex contention tests to shake out timing flakes
    Soak {
        /// Number of rounds
        #[arg(long, default_value_t = 20)]
        rounds: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ci => run_ci(),
        Commands::Lint => run_lint(),
        Commands::Soak { rounds } => run_soak(rounds),
    }
}

fn run_ci() -> Result<()> {
    println!("Running CI checks...\n");

    run_cmd("cargo", &["fmt", "--check"])?;
    run_cmd("cargo", &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])?;
    run_cmd("cargo", &["test", "--workspace"])?;
    run_cmd("cargo", &["doc", "--workspace", "--no-deps"])?;
    run_lint()?;

    println!("\nAll CI checks passed!");
    Ok(())
}

fn run_lint() -> Result<()> {
    println!("Validating workspace conventions...\n");

    for entry in std::fs::read_dir("crates")? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with("pcs-storage-") {
            anyhow::bail!("Crate '{}' does not follow pcs-storage-* naming", name);
        }
        check_crate_attrs(&entry.path().join("src/lib.rs"))?;
    }

    println!("All conventions validated!");
    Ok(())
}

fn check_crate_attrs(lib_rs: &Path) -> Result<()> {
    let source = std::fs::read_to_string(lib_rs)
        .with_context(|| format!("Failed to read {}", lib_rs.display()))?;
    for attr in REQUIRED_CRATE_ATTRS {
        if !source.contains(attr) {
            anyhow::bail!("{} is missing {}", lib_rs.display(), attr);
        }
    }
    Ok(())
}

fn run_soak(rounds: u32) -> Result<()> {
    for round in 1..=rounds {
        println!("Soak round {round}/{rounds}");
        run_cmd(
            "cargo",
            &["test", "-p", "pcs-storage-core", "--test", "mutex_contention", "--quiet"],
        )?;
    }
    println!("\n{rounds} rounds passed");
    Ok(())
}

fn run_cmd(cmd: &str, args: &[&str]) -> Result<()> {
    println!("$ {} {}", cmd, args.join(" "));
    let status = Command::new(cmd)
        .args(args)
        .status()
        .with_context(|| format!("Failed to run: {} {}", cmd, args.join(" ")))?;

    if !status.success() {
        anyhow::bail!("Command failed: {} {}", cmd, args.join(" "));
    }
    Ok(())
}
