pub mod config_reader;
mod io_common;
mod io_csv;
mod io_excel;
mod view_store;

use log::{debug, info, warn};

use allocation_table::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use text_diff::print_diff;

use crate::pivot::config_reader::*;
use crate::pivot::io_csv::CsvStore;
use crate::pivot::io_excel::ExcelStore;
use crate::pivot::view_store::JsonViewStore;

/// Suffix appended to the view name to name the normalized table.
pub const RAW_TABLE_SUFFIX: &str = "-raw";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PivotError {
    #[snafu(display("Invalid configuration: {message}"))]
    InvalidConfiguration { message: String },
    #[snafu(display("Error opening file {path}: {source}"))]
    ReadingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON: {source}"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error opening file {path}: {source}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("No worksheet named {name:?} in {path}"))]
    MissingWorksheet { name: String, path: String },
    #[snafu(display("Error opening file {path}: {source}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading line {lineno} of {path}: {source}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("Error writing file {path}: {source}"))]
    CsvWrite { source: csv::Error, path: String },
    #[snafu(display("Error writing file {path}: {source}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(context(false), display("{source}"))]
    Allocation { source: AllocationError },
    #[snafu(context(false), display("{source}"))]
    CrossTab { source: CrossTabError },
    #[snafu(display("The normalized table differs from the reference {path}"))]
    ReferenceMismatch { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

impl PivotError {
    /// The cross-tab service reported a limit: the run may be retried later.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(
            self,
            PivotError::CrossTab {
                source: CrossTabError::QuotaExceeded { .. }
            }
        )
    }
}

pub type PivotResult<T> = Result<T, PivotError>;

/// Reads and writes whole tables by name.
pub trait TableStore {
    /// All the rows of a table, header included.
    fn read_rows(&mut self, name: &str) -> PivotResult<Vec<Vec<Cell>>>;

    /// Replaces the table `name` with `table`. Returns the location written.
    fn write_table(&mut self, name: &str, table: &Table) -> PivotResult<String>;
}

/// What a run did.
#[derive(PartialEq, Debug, Clone)]
pub struct RunSummary {
    pub rows_read: usize,
    pub rows_written: usize,
    pub raw_table_path: String,
    pub view: Option<UpsertOutcome>,
}

pub fn raw_table_name(view_name: &str) -> String {
    format!("{}{}", view_name, RAW_TABLE_SUFFIX)
}

fn open_store(
    config: &PivotConfig,
    input_path: PathBuf,
    out_dir: PathBuf,
) -> PivotResult<Box<dyn TableStore>> {
    let provider = config.provider();
    info!(
        "Opening {} input {:?}, output in {:?}",
        provider, input_path, out_dir
    );
    match provider.as_str() {
        "csv" => Ok(Box::new(CsvStore::new(input_path, out_dir))),
        "xlsx" => Ok(Box::new(ExcelStore::new(input_path, out_dir))),
        x => whatever!("Input type {:?} is not supported (expected csv or xlsx)", x),
    }
}

// The default output is next to the input: in the input directory for CSV
// files, next to the workbook for Excel files.
fn default_output_dir(provider: &str, input_path: &Path) -> PathBuf {
    match provider {
        "xlsx" => input_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".")),
        _ => input_path.to_path_buf(),
    }
}

fn check_reference(written_path: &str, reference_path: &str) -> PivotResult<()> {
    let read = |p: &str| -> PivotResult<String> {
        let s = fs::read_to_string(p).context(ReadingFileSnafu { path: p })?;
        Ok(s.replace("\r\n", "\n").trim_end().to_string())
    };
    let computed = read(written_path)?;
    let reference = read(reference_path)?;
    if computed != reference {
        warn!("Found differences with the reference file {}", reference_path);
        print_diff(reference.as_str(), computed.as_str(), "\n");
        return ReferenceMismatchSnafu {
            path: reference_path,
        }
        .fail();
    }
    info!("The normalized table matches the reference {}", reference_path);
    Ok(())
}

/// Runs the whole pipeline: read, normalize, write the normalized table,
/// then create or update the cross-tab view.
///
/// Relative paths of the configuration are resolved from `base_dir`.
pub fn run_pivot(
    config: &PivotConfig,
    base_dir: &Path,
    reference_path: Option<String>,
) -> PivotResult<RunSummary> {
    // Validate before touching any table.
    let specs = config.validate()?;
    info!("config: {:?}", config);

    let provider = config.provider();
    let input_path = base_dir.join(&config.data_source.file_path);
    let out_dir = match &config.output_directory {
        Some(d) => base_dir.join(d),
        None => default_output_dir(&provider, &input_path),
    };
    let mut store = open_store(config, input_path, out_dir.clone())?;

    let source = Table::from_rows(store.read_rows(&config.source_table_name)?);
    debug!("source header: {:?}", source.header);
    let themes: Option<ThemeTable> = match config.theme_table() {
        Some(name) => {
            let t = ThemeTable::from_rows(&store.read_rows(name)?);
            info!("Read {} theme rows from {:?}", t.rows.len(), name);
            Some(t)
        }
        None => None,
    };

    let normalized = normalize(&specs, &source, themes.as_ref())?;

    let raw_name = raw_table_name(&config.output_view_name);
    let raw_table_path = store.write_table(&raw_name, &normalized)?;
    info!(
        "Wrote {} rows to {}",
        normalized.rows.len(),
        raw_table_path
    );

    let view = if specs.len() >= MIN_CROSS_TAB_COLUMNS {
        let mut views = JsonViewStore::new(out_dir);
        Some(upsert_cross_tab(
            &mut views,
            &config.output_view_name,
            &raw_name,
            &normalized,
            themes.is_some(),
        )?)
    } else {
        info!(
            "{} requested columns: no cross-tab view (at least {} needed)",
            specs.len(),
            MIN_CROSS_TAB_COLUMNS
        );
        None
    };

    if let Some(reference) = reference_path {
        check_reference(&raw_table_path, &reference)?;
    }

    Ok(RunSummary {
        rows_read: source.rows.len(),
        rows_written: normalized.rows.len(),
        raw_table_path,
        view,
    })
}

#[cfg(test)]
fn test_dir(test_name: &str) -> PathBuf {
    [env!("CARGO_MANIFEST_DIR"), "tests", test_name]
        .iter()
        .collect()
}

// Runs the fixture `tests/<name>` with its output redirected to a temporary
// directory, and checks the normalized table against the expected one.
#[cfg(test)]
fn run_fixture(test_name: &str, out_dir: &Path) -> PivotResult<RunSummary> {
    let dir = test_dir(test_name);
    let config_path = dir.join(format!("{}_config.json", test_name));
    let (mut config, base_dir) = read_config(&config_path.display().to_string())?;
    config.output_directory = Some(out_dir.display().to_string());
    let expected = dir.join(format!("{}_expected_raw.csv", test_name));
    let reference = if expected.exists() {
        Some(expected.display().to_string())
    } else {
        None
    };
    run_pivot(&config, &base_dir, reference)
}

#[cfg(test)]
pub fn test_wrapper(test_name: &str) -> RunSummary {
    let _ = env_logger::builder().is_test(true).try_init();
    let out = tempfile::tempdir().unwrap();
    match run_fixture(test_name, out.path()) {
        Ok(summary) => summary,
        Err(e) => panic!("test {} failed: {}", test_name, e),
    }
}
