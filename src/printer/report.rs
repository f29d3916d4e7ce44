//! Positional extraction of fields from the device statistics report.
//!
//! The report page exposes no ids or labels for its values, so each field is
//! located by table/row/cell position. All positions live in [`ReportLayout`];
//! a firmware with a different page layout only needs a different layout value.

use crate::error::{Error, Result};
use scraper::{ElementRef, Html, Selector};

/// Position of an element among its siblings of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Nth(usize),
    Last,
}

impl Position {
    fn pick<'a>(self, items: &[ElementRef<'a>]) -> Option<ElementRef<'a>> {
        match self {
            Position::Nth(i) => items.get(i).copied(),
            Position::Last => items.last().copied(),
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Position::Nth(i) => write!(f, "#{i}"),
            Position::Last => f.write_str("last"),
        }
    }
}

/// Where one field sits: the n-th `table` in document order, a row (`tr`)
/// inside it, and a text cell (`p`) inside that row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLocator {
    pub name: &'static str,
    pub table: usize,
    pub row: Position,
    pub cell: Position,
}

pub const COUNTER: FieldLocator = FieldLocator {
    name: "counter",
    table: 4,
    row: Position::Last,
    cell: Position::Last,
};

pub const SERIAL_NUMBER: FieldLocator = FieldLocator {
    name: "serial number",
    table: 10,
    row: Position::Nth(2),
    cell: Position::Last,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLayout {
    pub counter: FieldLocator,
    pub serial_number: FieldLocator,
}

impl Default for ReportLayout {
    fn default() -> Self {
        Self {
            counter: COUNTER,
            serial_number: SERIAL_NUMBER,
        }
    }
}

/// A parsed report page.
pub struct ReportDocument {
    html: Html,
}

impl ReportDocument {
    pub fn parse(raw: &str) -> Self {
        Self {
            html: Html::parse_document(raw),
        }
    }

    /// Trimmed text of the cell addressed by `locator`.
    pub fn extract(&self, locator: &FieldLocator) -> Result<String> {
        let tables: Vec<_> = self.html.select(&selector("table")?).collect();
        let table = tables.get(locator.table).ok_or_else(|| {
            Error::ReportFormat(format!(
                "{}: table #{} not found, report has {} tables",
                locator.name,
                locator.table,
                tables.len()
            ))
        })?;

        let rows: Vec<_> = table.select(&selector("tr")?).collect();
        let row = locator.row.pick(&rows).ok_or_else(|| {
            Error::ReportFormat(format!(
                "{}: row {} not found in table #{} ({} rows)",
                locator.name,
                locator.row,
                locator.table,
                rows.len()
            ))
        })?;

        let cells: Vec<_> = row.select(&selector("p")?).collect();
        let cell = locator.cell.pick(&cells).ok_or_else(|| {
            Error::ReportFormat(format!(
                "{}: cell {} not found in row {} of table #{}",
                locator.name, locator.cell, locator.row, locator.table
            ))
        })?;

        Ok(cell.text().collect::<String>().trim().to_string())
    }
}

pub fn extract_counter(document: &ReportDocument, layout: &ReportLayout) -> Result<String> {
    document.extract(&layout.counter)
}

pub fn extract_serial_number(document: &ReportDocument, layout: &ReportLayout) -> Result<String> {
    document.extract(&layout.serial_number)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::ReportFormat(format!("invalid selector {css:?}: {e:?}")))
}

#[cfg(test)]
pub(crate) const FIXTURE: &str = include_str!("../../tests/fixtures/devicestatistics.html");
