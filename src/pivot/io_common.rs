use std::path::Path;

use allocation_table::{Cell, Table};

pub fn display_path(path: &Path) -> String {
    path.as_os_str().to_string_lossy().to_string()
}

/// A text cell as found in a CSV file: empty fields are blank.
pub fn cell_from_text(s: &str) -> Cell {
    Cell::from(s)
}

/// The records of a table, header first, as written in a CSV file.
pub fn table_records(table: &Table) -> Vec<Vec<String>> {
    let mut records: Vec<Vec<String>> = Vec::with_capacity(table.rows.len() + 1);
    records.push(table.header.clone());
    for row in table.rows.iter() {
        records.push(row.iter().map(|c| c.to_string()).collect());
    }
    records
}
