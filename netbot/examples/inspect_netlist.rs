//! Inspect a netlist: parse it and show how the bot would limit it.

use netbot::{InspectOptions, NetbotCore, NetbotError};
use std::path::Path;

fn main() -> Result<(), NetbotError> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tests/fixtures/rc_long_tran.net".to_string());
    let path = Path::new(&path);

    if !path.exists() {
        eprintln!("File not found: {}", path.display());
        eprintln!("Usage: cargo run --example inspect_netlist [path/to/circuit.net]");
        std::process::exit(1);
    }

    let report = NetbotCore::inspect_file(path, &InspectOptions::default())?;

    println!("Netlist: {}", path.display());
    if let Some(title) = &report.title {
        println!("Title: {}", title);
    }
    println!("{} elements, {} nodes", report.elements, report.nodes);
    println!("Analysis: {} ({})", report.directive, report.analysis);

    if let Some(reason) = &report.rejection {
        println!("\nThe bot would refuse this netlist:\n{}", reason);
        std::process::exit(1);
    }

    match &report.advisory {
        Some(advisory) => println!("\n{}", advisory),
        None => println!("\nRuns unchanged."),
    }
    Ok(())
}
