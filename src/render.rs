//! Plain-text grids for terminal listings.

use std::{borrow::Cow, fmt::Write};

/// Lays out `rows` under `headers` in left-aligned columns separated by two
/// spaces, with a dashed rule below the header. Cells past the header count
/// are dropped.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|h| h.chars().count().max(3))
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(flatten(cell).chars().count());
        }
    }

    let mut output = String::new();
    let header = headers.iter().map(|h| Cow::Borrowed(*h)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", grid_line(&header, &widths));
    let rule = widths
        .iter()
        .map(|w| Cow::Owned("-".repeat(*w)))
        .collect::<Vec<_>>();
    let _ = writeln!(output, "{}", grid_line(&rule, &widths));
    for row in rows {
        let cells = row.iter().map(|c| flatten(c)).collect::<Vec<_>>();
        let _ = writeln!(output, "{}", grid_line(&cells, &widths));
    }
    output
}

fn grid_line(cells: &[Cow<'_, str>], widths: &[usize]) -> String {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

/// Control whitespace would break the grid, so it becomes a plain space.
fn flatten(cell: &str) -> Cow<'_, str> {
    if cell.contains(['\n', '\r', '\t']) {
        Cow::Owned(cell.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(cell)
    }
}
