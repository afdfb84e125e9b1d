//! CSV export sheet source
//!
//! Reads a spreadsheet tab that was downloaded as CSV. Useful offline and
//! for replaying a sheet without Google credentials.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::domain::result::{Error, Result};
use crate::domain::{Cell, SheetGrid};
use crate::ports::SheetSource;

/// Sheet source backed by a CSV file or a directory of `<sheet>.csv` files
#[derive(Debug, Clone)]
pub struct CsvSheetSource {
    path: PathBuf,
}

impl CsvSheetSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File holding `sheet_name`
    ///
    /// A file path is the sheet itself; a directory holds one file per tab.
    pub fn resolve(&self, sheet_name: &str) -> PathBuf {
        if self.path.is_dir() {
            self.path.join(format!("{}.csv", sheet_name))
        } else {
            self.path.clone()
        }
    }
}

impl SheetSource for CsvSheetSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch_grid(&self, _spreadsheet_id: &str, sheet_name: &str) -> Result<SheetGrid> {
        let path = self.resolve(sheet_name);
        if !path.is_file() {
            return Err(Error::not_found(format!("CSV sheet not found: {}", path.display())));
        }
        let file = File::open(&path)?;
        read_grid(file, &path)
    }
}

/// Parse CSV content into a grid; ragged rows are allowed
pub fn read_grid<R: Read>(reader: R, origin: &Path) -> Result<SheetGrid> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut values = Vec::new();
    for record in rdr.records() {
        let record = record
            .map_err(|e| Error::Other(format!("Invalid CSV in {}: {}", origin.display(), e)))?;
        let cells: Vec<Cell> = record
            .iter()
            .map(|field| {
                let field = field.trim_start_matches('\u{feff}');
                if field.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(field.to_string())
                }
            })
            .collect();
        values.push(cells);
    }

    Ok(SheetGrid::from_values(values))
}
