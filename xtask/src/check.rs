use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::step::{cargo, OnFailure};

pub fn run(target: &str) -> Result<()> {
    println!();
    println!("{}", "🔍 Checking SMI stream crates...".cyan().bold());
    println!();

    let total_start = Instant::now();

    // Host build with mocks
    cargo(
        "Host check (std)",
        &["check", "--workspace", "--all-targets", "--features", "smi-stream/std"],
        OnFailure::Fail,
    )?;

    // Both library crates must stay no_std + alloc
    for krate in ["smi-platform", "smi-stream"] {
        cargo(
            &format!("{krate} no_std check ({target})"),
            &["check", "-p", krate, "--target", target, "--no-default-features"],
            OnFailure::Fail,
        )?;
    }

    cargo(
        &format!("defmt derives ({target})"),
        &["check", "-p", "smi-stream", "--target", target, "--features", "defmt"],
        OnFailure::Fail,
    )?;

    // Clippy and rustfmt report, they don't block
    cargo(
        "Clippy",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
        OnFailure::Warn,
    )?;
    let fmt = cargo("Formatting check", &["fmt", "--all", "--check"], OnFailure::Warn)?;
    if !fmt.status.success() {
        eprintln!("     Run 'cargo fmt --all' to fix");
    }

    println!(
        "{}",
        format!(
            "✓ All checks completed in {:.2}s",
            total_start.elapsed().as_secs_f64()
        )
        .green()
        .bold()
    );
    println!();

    Ok(())
}
