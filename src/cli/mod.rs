//! Terminal front end: page rendering and REPL command parsing.

pub mod commands;

use crate::session::PageSnapshot;
use crate::value::CellValue;

/// Widest a column may render before values are truncated.
const MAX_COL_WIDTH: usize = 40;

/// Render a page snapshot as an ASCII table.
///
/// The first column is the row index used by commands; the second marks selected rows
/// with `x`. Cells with a pending edit carry a trailing `*`.
pub fn render_page(snap: &PageSnapshot) -> String {
    let mut header: Vec<String> = vec!["#".to_string(), "x".to_string()];
    header.extend(snap.columns.iter().map(|c| c.name.clone()));

    let rows: Vec<Vec<String>> = snap
        .rows
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let mut cells = vec![i.to_string(), if r.selected { "x".to_string() } else { String::new() }];
            cells.extend(r.cells.iter().map(|c| {
                let text = cell_text(&c.value);
                if c.pending { format!("{}*", text) } else { text }
            }));
            cells
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|s| display_len(s).min(MAX_COL_WIDTH)).collect();
    for r in &rows {
        for (i, cell) in r.iter().enumerate() {
            let w = display_len(cell);
            if w > widths[i] { widths[i] = w.min(MAX_COL_WIDTH); }
        }
    }

    let mut out = String::new();
    let sep = build_separator(&widths);
    out.push_str(&sep);
    out.push('\n');
    out.push_str(&build_row(&header, &widths));
    out.push('\n');
    out.push_str(&sep);
    out.push('\n');
    for r in &rows {
        out.push_str(&build_row(r, &widths));
        out.push('\n');
    }
    out.push_str(&sep);
    out.push('\n');
    out.push_str(&status_line(snap));
    out
}

/// Footer: position, counters and flags.
pub fn status_line(snap: &PageSnapshot) -> String {
    let mut s = format!(
        "{} | page {}/{} | rows {} | pending {} | selected {}",
        snap.relation,
        snap.page,
        snap.page_count.max(1),
        snap.total_rows,
        snap.pending_count,
        snap.selected_count
    );
    if let Some(sort) = &snap.sort {
        s.push_str(&format!(" | sort {} {}", sort.column, sort.direction.sql().to_ascii_lowercase()));
    }
    if snap.read_only { s.push_str(" | read-only"); }
    if snap.insert_open { s.push_str(" | inserting"); }
    for op in &snap.busy {
        s.push_str(&format!(" | {}...", op.name()));
    }
    s.push_str(&format!(" | {} ms", snap.elapsed_ms));
    if let Some(e) = &snap.last_error {
        s.push_str(&format!("\n! {}", e));
    }
    s
}

fn cell_text(v: &CellValue) -> String {
    // keep table rows single-line
    v.display_text().replace(['\n', '\r'], " ")
}

fn display_len(s: &str) -> usize { s.chars().count() }

fn build_separator(widths: &[usize]) -> String {
    let mut s = String::new();
    s.push('+');
    for w in widths {
        s.push_str(&"-".repeat(*w + 2));
        s.push('+');
    }
    s
}

fn build_row(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::new();
    s.push('|');
    for (i, w) in widths.iter().enumerate() {
        let cell = cells.get(i).map(|c| c.as_str()).unwrap_or("");
        let text = truncate(cell, *w);
        let pad = w.saturating_sub(display_len(&text));
        s.push(' ');
        if is_numeric_like(cell) {
            s.push_str(&" ".repeat(pad));
            s.push_str(&text);
        } else {
            s.push_str(&text);
            s.push_str(&" ".repeat(pad));
        }
        s.push_str(" |");
    }
    s
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max { return s.to_string(); }
    if max <= 1 { return "…".to_string(); }
    s.chars().take(max - 1).collect::<String>() + "…"
}

/// Numbers (optionally with a pending marker) align right.
fn is_numeric_like(s: &str) -> bool {
    let st = s.trim().trim_end_matches('*');
    if st.is_empty() { return false; }
    let mut has_digit = false;
    for ch in st.chars() {
        if ch.is_ascii_digit() { has_digit = true; continue; }
        if ".-+eE".contains(ch) { continue; }
        return false;
    }
    has_digit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RelationRef;
    use crate::remote::PageColumn;
    use crate::session::{CellSnapshot, RowSnapshot};

    fn snap() -> PageSnapshot {
        let cell = |v: CellValue, pending: bool| CellSnapshot { value: v, pending, editing: false };
        PageSnapshot {
            relation: RelationRef::new("public", "users"),
            columns: vec![
                PageColumn { name: "id".into(), data_type: "integer".into() },
                PageColumn { name: "name".into(), data_type: "text".into() },
            ],
            rows: vec![
                RowSnapshot { selected: false, cells: vec![cell(CellValue::int(1), false), cell(CellValue::text("Bea"), true)] },
                RowSnapshot { selected: true, cells: vec![cell(CellValue::int(2), false), cell(CellValue::Null, false)] },
            ],
            page: 1,
            page_size: 10,
            page_count: 1,
            total_rows: 2,
            elapsed_ms: 3,
            sort: None,
            pending_count: 1,
            selected_count: 1,
            read_only: false,
            insert_open: false,
            busy: Vec::new(),
            last_error: None,
        }
    }

    #[test]
    fn table_marks_pending_and_selected() {
        let out = render_page(&snap());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[1], "| # | x | id | name |");
        assert_eq!(lines[3], "| 0 |   |  1 | Bea* |");
        assert_eq!(lines[4], "| 1 | x |  2 | NULL |");
        assert!(lines[6].starts_with("public.users | page 1/1 | rows 2 | pending 1 | selected 1"));
    }

    #[test]
    fn long_values_are_truncated() {
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert!(is_numeric_like("12.5*"));
        assert!(!is_numeric_like("NULL"));
    }
}
