// Primitives for reading Excel workbooks.

use calamine::{open_workbook, DataType, Reader, Xlsx};
use log::{debug, info};
use snafu::prelude::*;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use allocation_table::{Cell, Table};

use crate::pivot::{io_common::display_path, io_csv::CsvStore, *};

/// Reads tables from the worksheets of a workbook. The workbook itself is
/// never modified: tables are written as CSV files in the output directory.
pub struct ExcelStore {
    path: PathBuf,
    workbook: Option<Xlsx<BufReader<File>>>,
    output: CsvStore,
}

impl ExcelStore {
    pub fn new(path: PathBuf, output_dir: PathBuf) -> ExcelStore {
        let input_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        ExcelStore {
            path,
            workbook: None,
            output: CsvStore::new(input_dir, output_dir),
        }
    }

    fn workbook(&mut self) -> PivotResult<&mut Xlsx<BufReader<File>>> {
        if self.workbook.is_none() {
            let p = display_path(&self.path);
            info!("Attempting to read workbook {:?}", p);
            let wb: Xlsx<_> = open_workbook(&self.path).context(OpeningExcelSnafu { path: p })?;
            self.workbook = Some(wb);
        }
        match self.workbook.as_mut() {
            Some(wb) => Ok(wb),
            None => whatever!("Workbook {:?} could not be kept open", self.path),
        }
    }
}

pub fn cell_from_calamine(cell: &DataType) -> Cell {
    match cell {
        DataType::Empty => Cell::Empty,
        DataType::String(s) => Cell::from(s.as_str()),
        DataType::Float(f) => Cell::Number(*f),
        DataType::Int(i) => Cell::Number(*i as f64),
        // Booleans, dates and error cells are kept as they are displayed.
        c => Cell::Text(c.to_string()),
    }
}

impl TableStore for ExcelStore {
    fn read_rows(&mut self, name: &str) -> PivotResult<Vec<Vec<Cell>>> {
        let path = display_path(&self.path);
        let wrange = self
            .workbook()?
            .worksheet_range(name)
            .context(MissingWorksheetSnafu {
                name,
                path: path.clone(),
            })?
            .context(OpeningExcelSnafu { path })?;
        let rows: Vec<Vec<Cell>> = wrange
            .rows()
            .map(|row| row.iter().map(cell_from_calamine).collect())
            .collect();
        debug!("read_rows: worksheet {:?}: {} rows", name, rows.len());
        Ok(rows)
    }

    fn write_table(&mut self, name: &str, table: &Table) -> PivotResult<String> {
        self.output.write_table(name, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells() {
        assert_eq!(cell_from_calamine(&DataType::Empty), Cell::Empty);
        assert_eq!(
            cell_from_calamine(&DataType::String("".to_string())),
            Cell::Empty
        );
        assert_eq!(
            cell_from_calamine(&DataType::String("Java".to_string())),
            Cell::Text("Java".to_string())
        );
        assert_eq!(cell_from_calamine(&DataType::Float(0.8)), Cell::Number(0.8));
        assert_eq!(cell_from_calamine(&DataType::Int(2)), Cell::Number(2.0));
        assert_eq!(
            cell_from_calamine(&DataType::Bool(true)),
            Cell::Text("true".to_string())
        );
    }

    #[test]
    fn missing_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ExcelStore::new(dir.path().join("nope.xlsx"), dir.path().to_path_buf());
        assert!(matches!(
            store.read_rows("Allocations"),
            Err(PivotError::OpeningExcel { .. })
        ));
    }
}
