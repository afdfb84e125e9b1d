//! Raw spreadsheet grid model

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// One untyped spreadsheet cell
///
/// The Sheets API returns JSON scalars (numbers stay numbers when requested
/// unformatted); CSV exports only ever produce text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Cell {
    /// Empty, or text that is only whitespace
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Render the cell as text, without a trailing `.0` on whole numbers
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(Cow::Borrowed(s.as_str())),
            Cell::Bool(b) => Some(Cow::Owned(b.to_string())),
            Cell::Number(n) => Some(Cow::Owned(format_number(*n))),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

static EMPTY_CELL: Cell = Cell::Empty;

/// One data row with the 1-based sheet row number it was read from
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub number: usize,
    pub cells: Vec<Cell>,
}

impl RawRow {
    /// Cell at a column index; columns past the end of the row are empty
    pub fn cell(&self, index: usize) -> &Cell {
        self.cells.get(index).unwrap_or(&EMPTY_CELL)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(Cell::is_blank)
    }
}

/// Header plus data rows of one sheet tab
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetGrid {
    pub header: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl SheetGrid {
    /// Build a grid from the full list of sheet rows
    ///
    /// The first non-blank row is the header. Blank rows are dropped but
    /// row numbers keep pointing at the original sheet position.
    pub fn from_values(values: Vec<Vec<Cell>>) -> Self {
        let mut header: Option<Vec<String>> = None;
        let mut rows = Vec::new();

        for (idx, cells) in values.into_iter().enumerate() {
            let row = RawRow { number: idx + 1, cells };
            if row.is_blank() {
                continue;
            }
            if header.is_none() {
                header = Some(
                    row.cells
                        .iter()
                        .map(|c| c.as_text().map(|t| t.trim().to_string()).unwrap_or_default())
                        .collect(),
                );
                continue;
            }
            rows.push(row);
        }

        Self {
            header: header.unwrap_or_default(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_row(cells: &[&str]) -> Vec<Cell> {
        cells.iter().map(|c| Cell::from(*c)).collect()
    }

    #[test]
    fn test_header_is_consumed() {
        let grid = SheetGrid::from_values(vec![
            text_row(&["Company", "Amount"]),
            text_row(&["Acme FC", "$5,000,000"]),
        ]);
        assert_eq!(grid.header, vec!["Company", "Amount"]);
        assert_eq!(grid.rows.len(), 1);
        assert_eq!(grid.rows[0].number, 2);
    }

    #[test]
    fn test_header_only_gives_no_rows() {
        let grid = SheetGrid::from_values(vec![text_row(&["Company", "Amount"])]);
        assert_eq!(grid.header.len(), 2);
        assert!(grid.rows.is_empty());
        assert!(!grid.is_empty());
    }

    #[test]
    fn test_blank_rows_are_skipped_but_numbering_kept() {
        let grid = SheetGrid::from_values(vec![
            text_row(&["", ""]),
            text_row(&["Company"]),
            text_row(&["  ", ""]),
            vec![],
            text_row(&["Acme FC"]),
        ]);
        assert_eq!(grid.header, vec!["Company"]);
        assert_eq!(grid.rows.len(), 1);
        assert_eq!(grid.rows[0].number, 5);
    }

    #[test]
    fn test_cells_deserialize_from_sheets_json() {
        let cells: Vec<Cell> =
            serde_json::from_str(r#"["Acme FC", 5000000, true, null, 1.5]"#).unwrap();
        assert_eq!(cells[0], Cell::Text("Acme FC".to_string()));
        assert_eq!(cells[1], Cell::Number(5_000_000.0));
        assert_eq!(cells[2], Cell::Bool(true));
        assert_eq!(cells[3], Cell::Empty);
        assert_eq!(cells[1].as_text().unwrap(), "5000000");
        assert_eq!(cells[4].as_text().unwrap(), "1.5");
    }

    #[test]
    fn test_short_rows_pad_with_empty() {
        let row = RawRow { number: 2, cells: vec![Cell::from("Acme FC")] };
        assert_eq!(row.cell(5), &Cell::Empty);
    }
}
