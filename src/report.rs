use crate::aggregate::WindowedStats;
use crate::model::{ChangeRecord, ChangeUnit, TimeWindow};
use std::fmt::Write;

pub const ATTACHMENT_NOTE: &str = "Report statistics are included in attachment plots.";

struct Vocabulary {
    total: &'static str,
    change: &'static str,
    changes: &'static str,
    date: &'static str,
}

fn vocabulary(unit: ChangeUnit) -> Vocabulary {
    match unit {
        ChangeUnit::Lines => Vocabulary {
            total: "line changes",
            change: "commit",
            changes: "commits",
            date: "Commit Date",
        },
        ChangeUnit::Words => Vocabulary {
            total: "words added",
            change: "revision",
            changes: "revisions",
            date: "Revision Date",
        },
    }
}

fn change_line(out: &mut String, record: &ChangeRecord, unit: ChangeUnit, date_label: &str) {
    let _ = writeln!(
        out,
        "    - {date_label}: {}, Message: {}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.message.lines().next().unwrap_or("")
    );
    let _ = match unit {
        ChangeUnit::Lines => writeln!(
            out,
            "      Insertions: {}, Deletions: {}",
            record.insertions, record.deletions
        ),
        ChangeUnit::Words => writeln!(out, "      Words added: {}", record.insertions),
    };
}

/// Plain-text section for one repository: per-window author totals, then
/// the individual changes of the narrowest window in chronological order.
pub fn format_repository(
    name: &str,
    stats: &WindowedStats,
    windows: &[TimeWindow],
    unit: ChangeUnit,
    has_chart: bool,
) -> String {
    let words = vocabulary(unit);
    let mut out = String::new();
    let _ = writeln!(out, "Repository: {name}");
    if windows.len() > 1 {
        let _ = writeln!(
            out,
            "Note: windows overlap, so one change is counted in every window that covers it."
        );
    }

    for window in windows {
        let _ = writeln!(
            out,
            "\n{} (since {}): {} {}",
            window.label,
            window.start.format("%Y-%m-%d %H:%M"),
            stats.window_total(&window.label),
            words.total
        );
        let ranked = stats.ranked(&window.label);
        if ranked.is_empty() {
            let _ = writeln!(out, "  no activity");
        }
        for author in ranked {
            let count = author.changes.len();
            let _ = writeln!(
                out,
                "  {}: {} {} in {} {}",
                author.author,
                author.line_changes,
                words.total,
                count,
                if count == 1 { words.change } else { words.changes }
            );
        }
    }

    // Latest start is the narrowest window; ties go to the earlier entry.
    if let Some(narrowest) = windows.iter().rev().max_by_key(|w| w.start) {
        let ranked = stats.ranked(&narrowest.label);
        if !ranked.is_empty() {
            let _ = writeln!(out, "\n{} {}:", narrowest.label, words.changes);
        }
        for author in ranked {
            let _ = writeln!(out, "Author: {}", author.author);
            let _ = writeln!(out, "  Total {}: {}", capitalize(words.total), author.line_changes);
            let mut changes: Vec<&ChangeRecord> = author.changes.iter().collect();
            changes.sort_by_key(|r| r.timestamp);
            for record in changes {
                change_line(&mut out, record, unit, words.date);
            }
        }
    }

    if has_chart {
        let _ = writeln!(out, "\n{ATTACHMENT_NOTE}");
    }
    out
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
