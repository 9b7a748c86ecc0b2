//! Validate command implementation.

use anyhow::Result;
use luafront_core::{LuaEngine, ScriptCatalog, ScriptRecord, Verdict};
use owo_colors::OwoColorize;

use super::Workspace;
use crate::cli::Cli;

/// Scan the script folder and print every record
pub fn run(cli: &Cli, json: bool) -> Result<()> {
    let workspace = Workspace::open(cli, &LuaEngine::new())?;

    if json {
        println!("{}", workspace.scripts.export_json()?);
        return Ok(());
    }

    println!("Scripts in {}", workspace.script_dir.display());
    print_records(&workspace.scripts);
    Ok(())
}

/// Print the record table followed by the scan summary.
pub fn print_records(scripts: &ScriptCatalog) {
    if !scripts.is_loaded() {
        println!("  {}", "Script folder not found".red());
        return;
    }
    if scripts.is_empty() {
        println!("  (no scripts)");
        return;
    }

    for (index, record) in scripts.records().iter().enumerate() {
        let mark = if record.enabled { "[x]" } else { "[ ]" };
        println!(
            "{:>3} {} {:<24} {}",
            index,
            mark,
            record.name,
            status(record)
        );
        println!(
            "        {} / {}",
            record.author.dimmed(),
            record.description.dimmed()
        );
        if let Some(error) = &record.error {
            println!("        {}", error.red());
        }
    }

    let summary = scripts.summary();
    println!(
        "{} scripts: {} valid ({} with warnings), {} invalid, {} will run",
        summary.total, summary.valid, summary.warnings, summary.invalid, summary.enabled
    );
}

fn status(record: &ScriptRecord) -> String {
    let text = record.status_text();
    match (record.verdict, record.warning) {
        (Verdict::Valid, None) => text.green().to_string(),
        (Verdict::Valid, Some(_)) => text.yellow().to_string(),
        _ => text.red().to_string(),
    }
}
