use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::step::{cargo, OnFailure};

/// Integration test binaries, per crate.
const INTEGRATION: &[(&str, &[&str])] = &[
    ("smi-platform", &["geometry", "geometry_proptest"]),
    ("smi-stream", &["scenarios", "concurrency", "queue_props"]),
];

pub fn run(unit_only: bool, integration_only: bool) -> Result<()> {
    println!();
    println!("{}", "🧪 Running tests...".cyan().bold());
    println!();

    let total_start = Instant::now();

    if !integration_only {
        cargo("Unit tests", &["test", "--lib", "--workspace"], OnFailure::Fail)?;
    }

    if !unit_only {
        for &(krate, tests) in INTEGRATION {
            let mut args = vec!["test", "-p", krate];
            for &t in tests {
                args.extend(["--test", t]);
            }
            cargo(&format!("{krate} integration tests"), &args, OnFailure::Fail)?;
        }
    }

    cargo("Doc tests", &["test", "--doc", "--workspace"], OnFailure::Warn)?;

    println!(
        "{}",
        format!(
            "✓ All tests completed in {:.2}s",
            total_start.elapsed().as_secs_f64()
        )
        .green()
        .bold()
    );
    println!();

    Ok(())
}
