use anyhow::{Context, Result};
use colored::*;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Table, presets::UTF8_FULL};
use std::io::{self, Write};
use xmerge_core::{MergeSummary, RestoreSummary};

pub fn write_to_stdout(content: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(content.as_bytes())
        .context("Failed to write to stdout")?;
    if !content.ends_with('\n') {
        handle
            .write_all(b"\n")
            .context("Failed to write newline to stdout")?;
    }
    handle.flush().context("Failed to flush stdout")?;
    Ok(())
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn count_row(label: &str, value: usize, color: Color) -> Vec<Cell> {
    vec![
        Cell::new(label).fg(Color::Green),
        Cell::new(value)
            .set_alignment(CellAlignment::Right)
            .fg(if value == 0 { Color::DarkGrey } else { color }),
    ]
}

pub fn print_merge_summary(summary: &MergeSummary) {
    println!();
    println!("{}", " Merge Summary ".green().bold().underline());
    let mut table = new_table();
    table.set_header(vec![
        Cell::new("Files").fg(Color::Green),
        Cell::new("Count").fg(Color::Green),
    ]);
    table.add_row(count_row("Embedded", summary.embedded, Color::Cyan));
    table.add_row(count_row("Too large", summary.too_large, Color::Yellow));
    table.add_row(count_row("Binary", summary.binary, Color::Yellow));
    table.add_row(count_row("Read errors", summary.errors, Color::Red));
    println!("{table}");

    if !summary.skipped.is_empty() {
        println!("\n{}", " Recorded Without Content ".yellow().bold().underline());
        let mut skipped = new_table();
        skipped.set_header(vec![
            Cell::new("Path").fg(Color::Green),
            Cell::new("Status").fg(Color::Green),
        ]);
        for (path, status) in &summary.skipped {
            skipped.add_row(vec![
                Cell::new(path).fg(Color::Cyan),
                Cell::new(status).fg(Color::DarkGrey),
            ]);
        }
        println!("{skipped}");
    }

    if let Some(path) = &summary.output_path {
        println!(
            "\n{} Report saved to: {} ({} bytes)",
            "✅".green(),
            path.display().to_string().blue(),
            summary.bytes_written
        );
    }
    println!();
}

pub fn print_restore_summary(summary: &RestoreSummary) {
    println!();
    println!("{}", " Restore Summary ".green().bold().underline());
    let mut table = new_table();
    table.set_header(vec![
        Cell::new("Files").fg(Color::Green),
        Cell::new("Count").fg(Color::Green),
    ]);
    table.add_row(count_row("Restored", summary.restored, Color::Cyan));
    table.add_row(count_row("Attempted", summary.attempted, Color::Cyan));
    table.add_row(count_row("Status-only (skipped)", summary.skipped, Color::Yellow));
    table.add_row(count_row("Failed", summary.failures.len(), Color::Red));
    println!("{table}");

    if !summary.failures.is_empty() {
        println!("\n{}", " Failed Files ".red().bold().underline());
        let mut failures = new_table();
        failures.set_header(vec![
            Cell::new("Path").fg(Color::Green),
            Cell::new("Reason").fg(Color::Green),
        ]);
        for (path, reason) in &summary.failures {
            failures.add_row(vec![Cell::new(path).fg(Color::Cyan), Cell::new(reason).fg(Color::Red)]);
        }
        println!("{failures}");
    }

    println!(
        "\n{} Restored {}/{} file(s) into: {}",
        if summary.failures.is_empty() { "✅".green() } else { "⚠️".yellow() },
        summary.restored,
        summary.attempted,
        summary.destination.display().to_string().blue()
    );
    println!();
}

pub fn print_tree_summary(manifest: &str, selected: usize, total: usize) {
    print!("{}", manifest);
    println!(
        "\n{} of {} file(s) selected",
        selected.to_string().cyan().bold(),
        total.to_string().cyan()
    );
}
