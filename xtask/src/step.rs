use anyhow::{Context, Result};
use colored::Colorize;
use std::process::{Command, Output};
use std::time::Instant;

/// How a failing step affects the task.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    /// Abort the task.
    Fail,
    /// Report and carry on.
    Warn,
}

/// Run `cargo <args>` as one named step and report its outcome.
///
/// Returns the captured output when the command ran, whatever its status.
pub fn cargo(label: &str, args: &[&str], on_failure: OnFailure) -> Result<Output> {
    println!("{}", format!("  {label}...").cyan());
    let start = Instant::now();

    let output = Command::new("cargo")
        .args(args)
        .output()
        .with_context(|| format!("Failed to run cargo {}", args.join(" ")))?;

    if output.status.success() {
        let summary = extract_test_summary(&String::from_utf8_lossy(&output.stdout));
        println!(
            "{}",
            format!(
                "  ✓ {label} passed{} in {:.2}s",
                summary.map(|s| format!(" ({s})")).unwrap_or_default(),
                start.elapsed().as_secs_f64()
            )
            .green()
        );
    } else {
        match on_failure {
            OnFailure::Fail => {
                eprintln!("{}", format!("  ✗ {label} failed").red().bold());
                eprintln!();
                eprintln!("{}", String::from_utf8_lossy(&output.stdout));
                eprintln!("{}", String::from_utf8_lossy(&output.stderr));
                anyhow::bail!("{label} failed");
            }
            OnFailure::Warn => {
                eprintln!("{}", format!("  ⚠ {label} reported problems").yellow().bold());
                eprintln!();
                eprintln!("{}", String::from_utf8_lossy(&output.stderr));
            }
        }
    }
    println!();
    Ok(output)
}

/// Sum every "test result:" line of a cargo test run.
pub fn extract_test_summary(output: &str) -> Option<String> {
    let mut passed = 0u64;
    let mut failed = 0u64;
    let mut seen = false;
    for line in output.lines() {
        let Some(result) = line.split("test result:").nth(1) else {
            continue;
        };
        seen = true;
        for part in result.split(';') {
            let mut words = part.split_whitespace().rev();
            let (Some(kind), Some(count)) = (words.next(), words.next()) else {
                continue;
            };
            let count: u64 = count.parse().unwrap_or(0);
            match kind {
                "passed" => passed = passed.saturating_add(count),
                "failed" => failed = failed.saturating_add(count),
                _ => {}
            }
        }
    }
    seen.then(|| format!("{passed} passed; {failed} failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_sums_every_binary() {
        let out = "\
running 3 tests
test result: ok. 3 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out
running 2 tests
test result: ok. 2 passed; 0 failed; 1 ignored; 0 measured; 0 filtered out
";
        assert_eq!(
            extract_test_summary(out).as_deref(),
            Some("5 passed; 0 failed")
        );
    }

    #[test]
    fn test_summary_absent_without_results() {
        assert_eq!(extract_test_summary("Compiling smi-stream"), None);
    }
}
