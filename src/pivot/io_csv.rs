// Primitives for reading and writing CSV files.

use log::{debug, info};
use snafu::prelude::*;

use std::fs;
use std::path::PathBuf;

use allocation_table::{Cell, Table};

use crate::pivot::{
    io_common::{cell_from_text, display_path, table_records},
    *,
};

/// A directory of tables, one `<name>.csv` file per table.
///
/// Tables are read from `input_dir` and written to `output_dir`.
pub struct CsvStore {
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl CsvStore {
    pub fn new(input_dir: PathBuf, output_dir: PathBuf) -> CsvStore {
        CsvStore {
            input_dir,
            output_dir,
        }
    }
}

fn table_path(dir: &std::path::Path, name: &str) -> PathBuf {
    dir.join(format!("{}.csv", name))
}

pub fn read_csv_rows(path: &str) -> PivotResult<Vec<Vec<Cell>>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let mut res: Vec<Vec<Cell>> = Vec::new();
    for (idx, line_r) in rdr.into_records().enumerate() {
        let lineno = idx + 1;
        let line = line_r.context(CsvLineParseSnafu { path, lineno })?;
        res.push(line.iter().map(cell_from_text).collect());
    }
    debug!("read_csv_rows: {}: {} rows", path, res.len());
    Ok(res)
}

/// Writes the whole table next to its destination, then moves it in place.
pub fn write_csv_table(path: &std::path::Path, table: &Table) -> PivotResult<()> {
    let final_path = display_path(path);
    let tmp = path.with_extension("csv.tmp");
    let tmp_path = display_path(&tmp);
    {
        let mut wtr = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&tmp)
            .context(CsvWriteSnafu {
                path: tmp_path.clone(),
            })?;
        for record in table_records(table) {
            wtr.write_record(&record).context(CsvWriteSnafu {
                path: tmp_path.clone(),
            })?;
        }
        wtr.flush().context(WritingFileSnafu {
            path: tmp_path.clone(),
        })?;
    }
    fs::rename(&tmp, path).context(WritingFileSnafu { path: final_path })?;
    Ok(())
}

impl TableStore for CsvStore {
    fn read_rows(&mut self, name: &str) -> PivotResult<Vec<Vec<Cell>>> {
        let p = display_path(&table_path(&self.input_dir, name));
        info!("Attempting to read table file {:?}", p);
        read_csv_rows(&p)
    }

    fn write_table(&mut self, name: &str, table: &Table) -> PivotResult<String> {
        fs::create_dir_all(&self.output_dir).context(WritingFileSnafu {
            path: display_path(&self.output_dir),
        })?;
        let p = table_path(&self.output_dir, name);
        write_csv_table(&p, table)?;
        Ok(display_path(&p))
    }
}
