//! Minimal CSV writer for experiment summaries.

use std::fs;
use std::path::Path;

use crate::core::flatten::FlatRow;
use crate::error::{ExpboxError, Result};

const DELIMITER: char = ',';
const QUOTE: char = '"';

/// Quote a field if it contains the delimiter, a quote or a line break.
pub fn quote_field(value: &str) -> String {
    let needs_quoting = value.contains(DELIMITER)
        || value.contains(QUOTE)
        || value.contains('\n')
        || value.contains('\r');
    if needs_quoting {
        format!("{QUOTE}{}{QUOTE}", value.replace(QUOTE, "\"\""))
    } else {
        value.to_string()
    }
}

fn format_line<'a>(cells: impl Iterator<Item = &'a str>) -> String {
    let mut line = cells.map(quote_field).collect::<Vec<_>>().join(",");
    line.push_str("\r\n");
    line
}

/// Render a header plus one line per row; missing columns are empty cells.
///
/// An empty header yields an empty document.
pub fn render_csv(header: &[String], rows: &[FlatRow]) -> String {
    if header.is_empty() {
        return String::new();
    }
    let mut out = format_line(header.iter().map(String::as_str));
    for row in rows {
        out.push_str(&format_line(
            header.iter().map(|key| row.get(key).unwrap_or_default()),
        ));
    }
    out
}

pub fn write_csv(path: &Path, header: &[String], rows: &[FlatRow]) -> Result<()> {
    let context = || format!("write {}", path.display());
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| ExpboxError::persistence(context(), err))?;
    }
    fs::write(path, render_csv(header, rows))
        .map_err(|err| ExpboxError::persistence(context(), err))
}
