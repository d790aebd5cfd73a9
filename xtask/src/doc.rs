use anyhow::Result;
use colored::Colorize;

use crate::step::{cargo, OnFailure};

pub fn run(open: bool) -> Result<()> {
    println!();
    println!("{}", "📚 Building documentation...".cyan().bold());
    println!();

    let mut args = vec!["doc", "--workspace", "--no-deps", "--features", "smi-stream/std"];
    if open {
        args.push("--open");
    }
    cargo("Documentation", &args, OnFailure::Fail)?;

    if !open {
        println!(
            "   {}",
            "Open target/doc/smi_stream/index.html in your browser".dimmed()
        );
        println!(
            "   {}",
            "Or run 'cargo run -p xtask -- doc --open'".dimmed()
        );
        println!();
    }

    Ok(())
}
