//! Terminal report and CSV/JSON export for benchmark runs.

use std::path::Path;

use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};

use crate::workloads::RunReport;

/// Print the full run report: insert comparison, query traversals, then the
/// raw timing-sample stream.
pub fn print_report(report: &RunReport) {
    println!("\n{}", "━━━ soup benchmark report ━━━".bold().blue());
    println!(
        "  store: {}  entries/soup: {}  target entry size: {}",
        report.store,
        format_count(report.entry_count as u64),
        format_bytes(report.entry_size),
    );

    println!("\n{}", "▶ Inserts".bold().green());
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(vec![
        "Soup",
        "Attempted",
        "Inserted",
        "Elapsed (ms)",
        "Docs/s",
        "p50 (μs)",
        "p99 (μs)",
    ]);

    let best = report
        .soups
        .iter()
        .map(|s| throughput(s.inserted, s.insert_ms))
        .fold(0.0f64, f64::max);
    for s in &report.soups {
        let tp = throughput(s.inserted, s.insert_ms);
        let is_best = (tp - best).abs() < 0.01 && tp > 0.0;
        let name = if is_best {
            format!("★ {}", s.soup)
        } else {
            s.soup.clone()
        };
        let name_cell = if is_best {
            Cell::new(name).fg(Color::Green)
        } else {
            Cell::new(name)
        };
        table.add_row(vec![
            name_cell,
            Cell::new(format_count(s.attempted as u64)),
            Cell::new(format_count(s.inserted as u64)),
            Cell::new(format!("{:.1}", s.insert_ms)),
            Cell::new(format_throughput(tp)),
            Cell::new(format!("{:.1}", s.insert_p50_us)),
            Cell::new(format!("{:.1}", s.insert_p99_us)),
        ]);
    }
    println!("{table}");

    println!("\n{}", "▶ Paginated queries".bold().green());
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(vec!["Soup", "Page size", "Pages", "Counted", "Elapsed (ms)"]);
    for s in &report.soups {
        for q in &s.queries {
            match &q.error {
                Some(err) => table.add_row(vec![
                    Cell::new(&s.soup),
                    Cell::new(q.page_size),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new(err).fg(Color::Red),
                ]),
                None => table.add_row(vec![
                    Cell::new(&s.soup),
                    Cell::new(q.page_size),
                    Cell::new(q.pages),
                    Cell::new(format_count(q.counted as u64)),
                    Cell::new(format!("{:.1}", q.elapsed_ms)),
                ]),
            };
        }
    }
    println!("{table}");

    for t in &report.timings {
        println!(
            "  {}",
            format!("{} = {:.1} ms ({} entries)", t.event, t.elapsed_ms, t.count).dimmed()
        );
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// CSV / JSON export
// ────────────────────────────────────────────────────────────────────────────────

pub fn export_csv(report: &RunReport, path: &Path) -> std::io::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["event", "elapsed_ms", "entries"])?;
    for t in &report.timings {
        let elapsed = format!("{:.3}", t.elapsed_ms);
        let count = t.count.to_string();
        wtr.write_record([t.event.as_str(), elapsed.as_str(), count.as_str()])?;
    }
    wtr.flush()?;
    println!("  CSV exported to {}", path.display());
    Ok(())
}

pub fn export_json(report: &RunReport, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    std::fs::write(path, json)?;
    println!("  JSON exported to {}", path.display());
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────────
// Formatting helpers
// ────────────────────────────────────────────────────────────────────────────────

fn throughput(inserted: usize, elapsed_ms: f64) -> f64 {
    if elapsed_ms > 0.0 {
        inserted as f64 / (elapsed_ms / 1_000.0)
    } else {
        0.0
    }
}

fn format_throughput(t: f64) -> String {
    if t >= 1_000_000.0 {
        format!("{:.2}M", t / 1_000_000.0)
    } else if t >= 1_000.0 {
        format!("{:.1}K", t / 1_000.0)
    } else {
        format!("{:.0}", t)
    }
}

fn format_count(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        format!("{n}")
    }
}

fn format_bytes(b: u64) -> String {
    if b >= 1_048_576 {
        format!("{:.2} MB", b as f64 / 1_048_576.0)
    } else if b >= 1_024 {
        format!("{:.2} KB", b as f64 / 1_024.0)
    } else {
        format!("{b} B")
    }
}
