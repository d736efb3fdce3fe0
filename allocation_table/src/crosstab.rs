use log::{debug, info};
use snafu::ResultExt;

use std::collections::{BTreeMap, BTreeSet};

use crate::config::*;

/// A cross-tab view needs at least this many requested columns.
pub const MIN_CROSS_TAB_COLUMNS: usize = 3;

/// The aggregation service holding the cross-tab views.
///
/// Only the two operations needed to create a view or to move its source
/// range are modelled.
pub trait CrossTabService {
    /// Returns the configuration of an existing view, or `None`.
    fn fetch_view(&mut self, name: &str) -> Result<Option<CrossTabConfig>, ServiceError>;

    /// Creates or replaces a view. `data` is the content of the table the
    /// configuration points to.
    fn store_view(
        &mut self,
        name: &str,
        config: &CrossTabConfig,
        data: &Table,
    ) -> Result<(), ServiceError>;
}

/// The configuration of a new view over a normalized table.
///
/// The value column is the first ratio (column 0, or 1 after a theme), the
/// last column is the column grouping and every other column is a row
/// grouping.
pub fn build_cross_tab(raw_table_name: &str, normalized: &Table, has_theme: bool) -> CrossTabConfig {
    let width = normalized.header.len();
    let value_column = if has_theme { 1 } else { 0 };
    let last_column = width.saturating_sub(1);
    let label = |idx: usize| normalized.header.get(idx).cloned().unwrap_or_default();

    let rows: Vec<Dimension> = (0..last_column)
        .filter(|idx| *idx != value_column)
        .map(|idx| Dimension {
            source_column: idx,
            label: label(idx),
        })
        .collect();

    CrossTabConfig {
        source: SourceRange {
            table_name: raw_table_name.to_string(),
            start_row: 0,
            end_row: normalized.rows.len() + 1,
            start_column: 0,
            end_column: width,
        },
        rows,
        columns: vec![Dimension {
            source_column: last_column,
            label: label(last_column),
        }],
        values: vec![ValueSpec {
            source_column: value_column,
            label: label(value_column),
            summarize: Summarize::Sum,
        }],
    }
}

impl CrossTabConfig {
    /// Moves the end of the source range to cover `num_rows` data rows
    /// below the header. Nothing else changes.
    pub fn with_row_count(mut self, num_rows: usize) -> CrossTabConfig {
        self.source.end_row = self.source.start_row + num_rows + 1;
        self
    }
}

/// Creates the view `view_name` over the normalized table, or repoints the
/// existing one to the current number of rows.
pub fn upsert_cross_tab<S: CrossTabService + ?Sized>(
    service: &mut S,
    view_name: &str,
    raw_table_name: &str,
    normalized: &Table,
    has_theme: bool,
) -> Result<UpsertOutcome, CrossTabError> {
    let existing = match service.fetch_view(view_name) {
        Ok(x) => x,
        Err(ServiceError::LimitReached { message }) => {
            return QuotaExceededSnafu {
                view: view_name,
                message,
            }
            .fail();
        }
        Err(e) => return Err(CrossTabError::Service { source: e }),
    };
    let (config, outcome) = match existing {
        Some(c) => {
            debug!("upsert_cross_tab: existing view {:?}: {:?}", view_name, c);
            (c.with_row_count(normalized.rows.len()), UpsertOutcome::Updated)
        }
        None => (
            build_cross_tab(raw_table_name, normalized, has_theme),
            UpsertOutcome::Created,
        ),
    };
    info!(
        "Cross-tab view {:?} {:?}: source rows {}..{}",
        view_name, outcome, config.source.start_row, config.source.end_row
    );
    service
        .store_view(view_name, &config, normalized)
        .context(ServiceSnafu)?;
    Ok(outcome)
}

/// Evaluates a view against the table it points to.
///
/// Row and column keys are sorted. Values that are not numbers are ignored.
/// Rows outside of the source range are not counted.
pub fn summarize(config: &CrossTabConfig, table: &Table) -> CrossTabSummary {
    let first = config.source.start_row.max(1) - 1;
    let last = config.source.end_row.saturating_sub(1).min(table.rows.len());
    let data = if first < last {
        &table.rows[first..last]
    } else {
        &table.rows[0..0]
    };

    let key_of = |row: &[Cell], idx: usize| row.get(idx).map(|c| c.key()).unwrap_or_default();

    let mut cells: BTreeMap<(Vec<String>, String), f64> = BTreeMap::new();
    let mut row_keys: BTreeSet<Vec<String>> = BTreeSet::new();
    let mut column_keys: BTreeSet<String> = BTreeSet::new();
    for row in data.iter() {
        let rk: Vec<String> = config
            .rows
            .iter()
            .map(|d| key_of(row, d.source_column))
            .collect();
        let ck: String = config
            .columns
            .iter()
            .map(|d| key_of(row, d.source_column))
            .collect::<Vec<String>>()
            .join(" / ");
        let value: f64 = config
            .values
            .iter()
            .filter_map(|v| row.get(v.source_column).and_then(|c| c.as_fraction()))
            .sum();
        row_keys.insert(rk.clone());
        column_keys.insert(ck.clone());
        *cells.entry((rk, ck)).or_insert(0.0) += value;
    }

    let row_keys: Vec<Vec<String>> = row_keys.into_iter().collect();
    let column_keys: Vec<String> = column_keys.into_iter().collect();
    let values: Vec<Vec<f64>> = row_keys
        .iter()
        .map(|rk| {
            column_keys
                .iter()
                .map(|ck| cells.get(&(rk.clone(), ck.clone())).cloned().unwrap_or(0.0))
                .collect()
        })
        .collect();
    let row_totals: Vec<f64> = values.iter().map(|l| l.iter().sum()).collect();
    let grand_total = row_totals.iter().sum();
    CrossTabSummary {
        row_keys,
        column_keys,
        values,
        row_totals,
        grand_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MemoryService {
        views: BTreeMap<String, CrossTabConfig>,
        limit_on_fetch: bool,
        stores: usize,
    }

    impl CrossTabService for MemoryService {
        fn fetch_view(&mut self, name: &str) -> Result<Option<CrossTabConfig>, ServiceError> {
            if self.limit_on_fetch {
                return Err(ServiceError::LimitReached {
                    message: "too many requests".to_string(),
                });
            }
            Ok(self.views.get(name).cloned())
        }

        fn store_view(
            &mut self,
            name: &str,
            config: &CrossTabConfig,
            _data: &Table,
        ) -> Result<(), ServiceError> {
            self.stores += 1;
            self.views.insert(name.to_string(), config.clone());
            Ok(())
        }
    }

    fn normalized(num_rows: usize) -> Table {
        let header = vec!["P%", "P", "User", "Role"]
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        let rows = (0..num_rows)
            .map(|i| {
                vec![
                    Cell::Number(0.5),
                    Cell::from(if i % 2 == 0 { "Java" } else { "Rust" }),
                    Cell::from(format!("user{}", i / 2)),
                    Cell::from("Student"),
                ]
            })
            .collect();
        Table { header, rows }
    }

    #[test]
    fn new_view_layout() {
        let c = build_cross_tab("Summary-raw", &normalized(4), false);
        assert_eq!(c.source.end_row, 5);
        assert_eq!(c.source.end_column, 4);
        assert_eq!(
            c.rows.iter().map(|d| d.source_column).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(c.columns[0].source_column, 3);
        assert_eq!(c.values[0].source_column, 0);
        assert_eq!(c.values[0].summarize, Summarize::Sum);
    }

    #[test]
    fn new_view_layout_with_theme() {
        let mut t = normalized(2);
        t.header.insert(0, THEME_LABEL.to_string());
        for r in t.rows.iter_mut() {
            r.insert(0, Cell::from("Languages"));
        }
        let c = build_cross_tab("Summary-raw", &t, true);
        assert_eq!(
            c.rows.iter().map(|d| d.source_column).collect::<Vec<_>>(),
            vec![0, 2, 3]
        );
        assert_eq!(c.columns[0].label, "Role");
        assert_eq!(c.values[0].label, "P%");
    }

    #[test]
    fn upsert_creates_then_updates() {
        let mut service = MemoryService::default();
        let res = upsert_cross_tab(&mut service, "Summary", "Summary-raw", &normalized(4), false);
        assert_eq!(res.unwrap(), UpsertOutcome::Created);

        // Rename a dimension on the service side: an update keeps it.
        service.views.get_mut("Summary").unwrap().rows[0].label = "Project".to_string();
        let res = upsert_cross_tab(&mut service, "Summary", "Summary-raw", &normalized(6), false);
        assert_eq!(res.unwrap(), UpsertOutcome::Updated);
        let c = &service.views["Summary"];
        assert_eq!(c.source.end_row, 7);
        assert_eq!(c.rows[0].label, "Project");
        assert_eq!(service.stores, 2);
    }

    #[test]
    fn limit_on_fetch_is_quota_exceeded() {
        let mut service = MemoryService {
            limit_on_fetch: true,
            ..Default::default()
        };
        let res = upsert_cross_tab(&mut service, "Summary", "Summary-raw", &normalized(2), false);
        assert!(matches!(res, Err(CrossTabError::QuotaExceeded { .. })));
        assert_eq!(service.stores, 0);
    }

    #[test]
    fn summary_sums_values() {
        let t = normalized(4);
        let c = build_cross_tab("Summary-raw", &t, false);
        let s = summarize(&c, &t);
        assert_eq!(s.column_keys, vec!["Student".to_string()]);
        assert_eq!(
            s.row_keys,
            vec![
                vec!["Java".to_string(), "user0".to_string()],
                vec!["Java".to_string(), "user1".to_string()],
                vec!["Rust".to_string(), "user0".to_string()],
                vec!["Rust".to_string(), "user1".to_string()],
            ]
        );
        assert_eq!(s.row_totals, vec![0.5, 0.5, 0.5, 0.5]);
        assert_eq!(s.grand_total, 2.0);
    }

    #[test]
    fn summary_respects_source_range() {
        let t = normalized(6);
        let c = build_cross_tab("Summary-raw", &t, false).with_row_count(2);
        let s = summarize(&c, &t);
        assert_eq!(s.grand_total, 1.0);
    }
}
