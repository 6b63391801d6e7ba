//! Terminal output helpers.
//!
//! Primary output goes to stdout; errors, warnings and diagnostics go to
//! stderr so `--quiet` output stays machine readable.

#![allow(clippy::disallowed_macros)]

use colored::Colorize;
use comfy_table::{Cell, Color, ContentArrangement, Table};

use crate::grastate::ReplicaStateRecord;
use crate::resolver::{Diagnostic, ResolutionResult};

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), message.yellow());
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}

pub fn print_hint(message: &str) {
    eprintln!("{} {}", "hint:".cyan().bold(), message);
}

/// Plain-text form of a diagnostic, prefixed by its severity.
pub fn diagnostic_line(diagnostic: &Diagnostic) -> String {
    let severity = if diagnostic.is_error() { "error" } else { "warning" };
    format!("{severity}: {diagnostic}")
}

/// Everything quiet mode writes to stderr: diagnostics first, then every
/// record when the result needs a human look.
pub fn quiet_report(result: &ResolutionResult) -> Vec<String> {
    let mut lines: Vec<String> = result.diagnostics.iter().map(diagnostic_line).collect();
    if result.needs_attention() {
        lines.extend(result.per_replica_records.iter().map(record_line));
    }
    lines
}

pub fn print_diagnostic(diagnostic: &Diagnostic) {
    if diagnostic.is_error() {
        print_error(&diagnostic.to_string());
    } else {
        print_warning(&diagnostic.to_string());
    }
}

fn yes_no(flag: bool) -> Cell {
    if flag {
        Cell::new("yes").fg(Color::Green)
    } else {
        Cell::new("no").fg(Color::DarkGrey)
    }
}

/// Per-replica table with the chosen bootstrap source marked.
pub fn replica_table(result: &ResolutionResult) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("PVC Name").fg(Color::Cyan),
        Cell::new("UUID").fg(Color::Cyan),
        Cell::new("SeqNo").fg(Color::Cyan),
        Cell::new("Safe?").fg(Color::Cyan),
        Cell::new("Recovered?").fg(Color::Cyan),
        Cell::new("Best").fg(Color::Cyan),
    ]);

    for record in &result.per_replica_records {
        let best = if result.is_chosen(&record.replica_id) {
            Cell::new("*").fg(Color::Green)
        } else {
            Cell::new("")
        };
        let seqno = if record.has_known_position() {
            Cell::new(record.sequence_number)
        } else {
            Cell::new(record.sequence_number).fg(Color::Red)
        };

        table.add_row(vec![
            Cell::new(&record.replica_id),
            Cell::new(&record.cluster_uuid),
            seqno,
            yes_no(record.safe_to_bootstrap),
            yes_no(record.recovered),
            best,
        ]);
    }

    table
}

/// One-line form of a record for stderr dumps.
pub fn record_line(record: &ReplicaStateRecord) -> String {
    format!(
        "{}: uuid={} seqno={} safe_to_bootstrap={} recovered={}",
        record.replica_id,
        record.cluster_uuid,
        record.sequence_number,
        u8::from(record.safe_to_bootstrap),
        record.recovered
    )
}
