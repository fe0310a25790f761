//! Output formatting for query results.
//!
//! Rows are written in one of four formats:
//! - `table` - padded columns for terminals, long cells truncated
//! - `json` / `yaml` - the rows as an array of objects
//! - `csv` - header line plus one line per row

use crate::plugin::Row;
use anyhow::Result;
use clap::ValueEnum;
use serde_json::Value;
use std::io::Write;

/// Longest cell printed in table output
const MAX_CELL_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
    Csv,
}

/// Write `rows` to `out`; `columns` fixes the column order for table and csv
pub fn render<W: Write>(
    rows: &[Row],
    columns: &[String],
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, rows)?;
            writeln!(out)?;
        }
        OutputFormat::Yaml => serde_yaml::to_writer(&mut *out, rows)?,
        OutputFormat::Csv => render_csv(rows, columns, out)?,
        OutputFormat::Table => render_table(rows, columns, out)?,
    }
    Ok(())
}

/// Text of a cell: strings unquoted, `null` empty, everything else as JSON
pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn render_table<W: Write>(rows: &[Row], columns: &[String], out: &mut W) -> Result<()> {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| truncate(&cell_text(row.get(c)).replace('\n', " "), MAX_CELL_WIDTH))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: &[String]| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    writeln!(out, "{}", line(columns))?;
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    writeln!(out, "{}", rule.join("-+-"))?;
    for row in &cells {
        writeln!(out, "{}", line(row.as_slice()))?;
    }
    Ok(())
}

fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn render_csv<W: Write>(rows: &[Row], columns: &[String], out: &mut W) -> Result<()> {
    let header: Vec<String> = columns.iter().map(|c| csv_field(c)).collect();
    writeln!(out, "{}", header.join(","))?;
    for row in rows {
        let fields: Vec<String> = columns
            .iter()
            .map(|c| csv_field(&cell_text(row.get(c))))
            .collect();
        writeln!(out, "{}", fields.join(","))?;
    }
    Ok(())
}
