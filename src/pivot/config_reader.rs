use log::debug;

use allocation_table::ColumnSpec;
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use snafu::prelude::*;

use std::fs;
use std::path::{Path, PathBuf};

use crate::args::Args;
use crate::pivot::*;

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSource {
    /// `csv` or `xlsx`. Guessed from the file path when missing.
    pub provider: Option<String>,
    #[serde(rename = "filePath", default)]
    pub file_path: String,
}

// All the fields have defaults: missing values are reported by `validate`
// as configuration errors rather than as JSON errors.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct PivotConfig {
    #[serde(rename = "columnSpecs", default)]
    pub column_specs: Vec<String>,
    #[serde(rename = "sourceTableName", default)]
    pub source_table_name: String,
    #[serde(rename = "outputViewName", default)]
    pub output_view_name: String,
    #[serde(rename = "themeTableName")]
    pub theme_table_name: Option<String>,
    #[serde(rename = "dataSource", default)]
    pub data_source: DataSource,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
}

impl PivotConfig {
    /// Checks the configuration and returns the requested columns.
    pub fn validate(&self) -> PivotResult<Vec<ColumnSpec>> {
        ensure!(
            !self.column_specs.is_empty(),
            InvalidConfigurationSnafu {
                message: "columnSpecs must contain at least one column"
            }
        );
        let specs: Vec<ColumnSpec> = self
            .column_specs
            .iter()
            .map(|s| ColumnSpec::parse(s))
            .collect();
        if let Some((idx, _)) = specs.iter().enumerate().find(|(_, s)| s.label.is_empty()) {
            return InvalidConfigurationSnafu {
                message: format!(
                    "columnSpecs[{}] ({:?}) has an empty label",
                    idx, self.column_specs[idx]
                ),
            }
            .fail();
        }
        ensure!(
            !self.source_table_name.trim().is_empty(),
            InvalidConfigurationSnafu {
                message: "sourceTableName must not be empty"
            }
        );
        ensure!(
            !self.output_view_name.trim().is_empty(),
            InvalidConfigurationSnafu {
                message: "outputViewName must not be empty"
            }
        );
        ensure!(
            !self.data_source.file_path.trim().is_empty(),
            InvalidConfigurationSnafu {
                message: "no input provided (dataSource.filePath or --input)"
            }
        );
        let provider = self.provider();
        ensure!(
            provider == "csv" || provider == "xlsx",
            InvalidConfigurationSnafu {
                message: format!("unknown input type {:?} (expected csv or xlsx)", provider)
            }
        );
        Ok(specs)
    }

    pub fn provider(&self) -> String {
        match &self.data_source.provider {
            Some(p) => p.trim().to_lowercase(),
            None if self.data_source.file_path.to_lowercase().ends_with(".xlsx") => {
                "xlsx".to_string()
            }
            None => "csv".to_string(),
        }
    }

    /// The theme table, if one is named.
    pub fn theme_table(&self) -> Option<&str> {
        self.theme_table_name
            .as_deref()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// Overrides the configuration with the options passed on the command line.
    ///
    /// Paths given on the command line are relative to `cwd`, not to the
    /// configuration file.
    pub fn apply_args(&mut self, args: &Args, cwd: &Path) {
        if let Some(columns) = &args.columns {
            self.column_specs = columns.clone();
        }
        if let Some(x) = &args.source_table {
            self.source_table_name = x.clone();
        }
        if let Some(x) = &args.view {
            self.output_view_name = x.clone();
        }
        if let Some(x) = &args.theme_table {
            self.theme_table_name = Some(x.clone());
        }
        if let Some(x) = &args.input {
            self.data_source.file_path = cwd.join(x).display().to_string();
        }
        if let Some(x) = &args.input_type {
            self.data_source.provider = Some(x.clone());
        }
        if let Some(x) = &args.out {
            self.output_directory = Some(cwd.join(x).display().to_string());
        }
    }
}

/// Reads a configuration file. Returns the configuration and the directory
/// its relative paths are resolved from.
pub fn read_config(path: &str) -> PivotResult<(PivotConfig, PathBuf)> {
    let contents = fs::read_to_string(path).context(ReadingFileSnafu { path })?;
    let config = parse_config(&contents, path)?;
    debug!("read_config: {:?}", config);
    let base_dir = Path::new(path)
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((config, base_dir))
}

/// Parses the content of a configuration file.
///
/// Well-formed JSON holding fields of the wrong type is a configuration
/// error; malformed JSON is a parsing error.
pub fn parse_config(contents: &str, origin: &str) -> PivotResult<PivotConfig> {
    match serde_json::from_str::<PivotConfig>(contents) {
        Ok(config) => Ok(config),
        Err(e) if e.classify() == Category::Data => InvalidConfigurationSnafu {
            message: format!("{}: {}", origin, e),
        }
        .fail(),
        Err(e) => Err(e).context(ParsingJsonSnafu {}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(js: &str) -> PivotConfig {
        serde_json::from_str(js).unwrap()
    }

    #[test]
    fn parse_full() {
        let c = config(
            r#"{
            "columnSpecs": ["Project Allocation*", "User", "Role"],
            "sourceTableName": "Allocations",
            "outputViewName": "Summary",
            "themeTableName": "Themes",
            "dataSource": { "provider": "csv", "filePath": "tables" },
            "outputDirectory": "out"
        }"#,
        );
        let specs = c.validate().unwrap();
        assert_eq!(specs.len(), 3);
        assert!(specs[0].wildcard);
        assert_eq!(c.theme_table(), Some("Themes"));
        assert_eq!(c.provider(), "csv");
    }

    #[test]
    fn missing_fields_are_configuration_errors() {
        let c = config(r#"{ "sourceTableName": "Allocations" }"#);
        assert!(matches!(
            c.validate(),
            Err(PivotError::InvalidConfiguration { .. })
        ));
        let c = config(
            r#"{ "columnSpecs": ["*"], "sourceTableName": "A", "outputViewName": "B",
                 "dataSource": { "filePath": "x" } }"#,
        );
        assert!(matches!(
            c.validate(),
            Err(PivotError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn mistyped_field_is_a_configuration_error() {
        let res = parse_config(r#"{ "columnSpecs": "Project Allocation*" }"#, "config.json");
        match res {
            Err(PivotError::InvalidConfiguration { message }) => {
                assert!(message.starts_with("config.json: "));
                assert!(message.contains("expected a sequence"));
            }
            x => panic!("expected a configuration error, got {:?}", x),
        }
        let res = parse_config(r#"{ "sourceTableName": 3 }"#, "config.json");
        assert!(matches!(res, Err(PivotError::InvalidConfiguration { .. })));
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        let res = parse_config(r#"{ "columnSpecs": ["User""#, "config.json");
        assert!(matches!(res, Err(PivotError::ParsingJson { .. })));
        let res = parse_config(r#"{ "columnSpecs" ["User"] }"#, "config.json");
        assert!(matches!(res, Err(PivotError::ParsingJson { .. })));
    }

    #[test]
    fn provider_guess() {
        let mut c = PivotConfig::default();
        c.data_source.file_path = "data/Allocations.XLSX".to_string();
        assert_eq!(c.provider(), "xlsx");
        c.data_source.file_path = "data".to_string();
        assert_eq!(c.provider(), "csv");
        c.data_source.provider = Some("ods".to_string());
        assert_eq!(c.provider(), "ods");
    }

    #[test]
    fn args_override() {
        let mut c = PivotConfig::default();
        c.column_specs = vec!["A".to_string()];
        let args = Args {
            config: None,
            reference: None,
            out: Some("out".to_string()),
            input: Some("tables".to_string()),
            input_type: None,
            columns: Some(vec!["P*".to_string(), "User".to_string()]),
            source_table: Some("Allocations".to_string()),
            view: Some("Summary".to_string()),
            theme_table: Some(" ".to_string()),
            verbose: false,
        };
        c.apply_args(&args, Path::new("/work"));
        assert_eq!(c.column_specs.len(), 2);
        assert_eq!(c.output_directory.as_deref(), Some("/work/out"));
        assert_eq!(c.data_source.file_path, "/work/tables");
        assert_eq!(c.theme_table(), None);
        assert!(c.validate().is_ok());
    }
}
