mod config;
mod crosstab;
pub mod manual;

use log::{debug, info, warn};
use snafu::{ensure, OptionExt};

use std::collections::HashSet;

pub use crate::config::*;
pub use crate::crosstab::*;

// Tolerance on the sum of explicit percentages before declaring an over-allocation.
const ALLOCATION_EPSILON: f64 = 1e-9;

// **** Private structures ****

// The ratios of every slot of one repeated column group, for one row.
#[derive(PartialEq, Debug, Clone)]
struct GroupAllocation {
    ratios: Vec<f64>,
}

// The allocation of one row: one entry per requested column, `None` for
// columns that resolved to a single slot (they carry no ratio).
#[derive(PartialEq, Debug, Clone)]
struct RowAllocation {
    groups: Vec<Option<GroupAllocation>>,
}

impl RowAllocation {
    fn ratio(&self, position: usize, ordinal: usize) -> Option<f64> {
        self.groups
            .get(position)
            .and_then(|g| g.as_ref())
            .and_then(|g| g.ratios.get(ordinal).cloned())
    }
}

pub fn has_prefix(s: &str, prefix: &str) -> bool {
    s.starts_with(prefix)
}

pub fn has_suffix(s: &str, suffix: &str) -> bool {
    s.ends_with(suffix)
}

/// Finds, for each requested column, the header positions it refers to.
///
/// A wildcard request matches every header label starting with its label, an
/// exact request matches identical labels only. Percentage columns (ending
/// with [`PERCENT_SUFFIX`]) are never values: they are attached to the value
/// column whose label they extend.
///
/// A request matching nothing resolves to an empty list of slots.
pub fn resolve_columns(specs: &[ColumnSpec], header: &[String]) -> Vec<ResolvedColumn> {
    specs
        .iter()
        .map(|spec| {
            let slots: Vec<Slot> = header
                .iter()
                .enumerate()
                .filter(|(_, h)| {
                    let matches = if spec.wildcard {
                        has_prefix(h, &spec.label)
                    } else {
                        h.as_str() == spec.label
                    };
                    matches && !has_suffix(h, PERCENT_SUFFIX)
                })
                .map(|(value_index, h)| {
                    let percent_label = format!("{}{}", h, PERCENT_SUFFIX);
                    Slot {
                        value_index,
                        percent_index: header.iter().position(|h2| *h2 == percent_label),
                    }
                })
                .collect();
            debug!("resolve_columns: {:?} -> {:?}", spec, slots);
            if slots.is_empty() {
                warn!("No column in the header matches {:?}", spec.label);
            }
            ResolvedColumn {
                label: spec.label.clone(),
                slots,
            }
        })
        .collect()
}

/// Enumerates every way to pick one slot per column group.
///
/// The first group varies the slowest. If any group has no slot, or if there
/// is no group at all, there is nothing to pick and the result is empty.
pub fn expand_actions(resolved: &[ResolvedColumn]) -> Vec<Action> {
    if resolved.is_empty() || resolved.iter().any(|rc| rc.slots.is_empty()) {
        return Vec::new();
    }
    let mut partials: Vec<Vec<SlotChoice>> = vec![Vec::new()];
    for rc in resolved.iter() {
        let mut next: Vec<Vec<SlotChoice>> = Vec::with_capacity(partials.len() * rc.slots.len());
        for partial in partials.iter() {
            for (ordinal, slot) in rc.slots.iter().enumerate() {
                let mut choices = partial.clone();
                choices.push(SlotChoice {
                    ordinal,
                    slot: *slot,
                });
                next.push(choices);
            }
        }
        partials = next;
    }
    partials
        .into_iter()
        .map(|choices| Action { choices })
        .collect()
}

/// The header of the normalized table.
pub fn output_header(resolved: &[ResolvedColumn], with_theme: bool) -> Vec<String> {
    let mut header: Vec<String> = Vec::new();
    if with_theme {
        header.push(THEME_LABEL.to_string());
    }
    for rc in resolved.iter() {
        if rc.is_repeated() {
            header.push(format!("{}%", rc.label));
        }
        header.push(rc.label.clone());
    }
    header
}

/// Rounds a ratio for display.
pub fn round_ratio(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn cell_at(row: &[Cell], idx: usize) -> Cell {
    row.get(idx).cloned().unwrap_or(Cell::Empty)
}

fn is_blank_at(row: &[Cell], idx: usize) -> bool {
    row.get(idx).map(|c| c.is_blank()).unwrap_or(true)
}

// The value identifying a row in error messages: the first value of a
// column that is not repeated.
fn row_identifier(row: &[Cell], resolved: &[ResolvedColumn], lineno: usize) -> String {
    resolved
        .iter()
        .filter(|rc| rc.slots.len() == 1)
        .map(|rc| cell_at(row, rc.slots[0].value_index))
        .find(|c| !c.is_blank())
        .map(|c| c.key())
        .unwrap_or_else(|| format!("line {}", lineno))
}

fn allocate_group(
    row: &[Cell],
    rc: &ResolvedColumn,
    lineno: usize,
    row_id: &str,
) -> Result<GroupAllocation, AllocationError> {
    let mut explicit: Vec<Option<f64>> = Vec::with_capacity(rc.slots.len());
    let mut assigned_count: usize = 0;
    let mut assigned_sum: f64 = 0.0;
    for slot in rc.slots.iter() {
        let pct_cell = slot
            .percent_index
            .and_then(|idx| row.get(idx).map(|c| (idx, c)))
            .filter(|(_, c)| !c.is_blank());
        let pct = match pct_cell {
            Some((column, cell)) => {
                let x = cell
                    .as_fraction()
                    .filter(|x| x.is_finite() && *x >= 0.0)
                    .context(InvalidPercentageSnafu {
                        lineno,
                        row_id,
                        column,
                        content: cell.to_string(),
                    })?;
                assigned_count += 1;
                assigned_sum += x;
                ensure!(
                    assigned_sum <= 1.0 + ALLOCATION_EPSILON,
                    OverAllocationSnafu {
                        lineno,
                        row_id,
                        label: &rc.label,
                        total: assigned_sum,
                    }
                );
                Some(x)
            }
            None => None,
        };
        explicit.push(pct);
    }

    // The remainder goes in equal parts to the slots in play (with a value)
    // that did not get an explicit percentage.
    let unassigned_in_play = rc
        .slots
        .iter()
        .zip(explicit.iter())
        .filter(|(slot, pct)| pct.is_none() && !is_blank_at(row, slot.value_index))
        .count();
    let share = if unassigned_in_play == 0 {
        0.0
    } else {
        (1.0 - assigned_sum).max(0.0) / unassigned_in_play as f64
    };
    debug!(
        "allocate_group: line {} {:?}: assigned {} (sum {}), unassigned in play {}, share {}",
        lineno, rc.label, assigned_count, assigned_sum, unassigned_in_play, share
    );

    let ratios = explicit
        .iter()
        .map(|pct| match pct {
            Some(x) => *x,
            None => round_ratio(share),
        })
        .collect();
    Ok(GroupAllocation { ratios })
}

fn allocate_row(
    row: &[Cell],
    resolved: &[ResolvedColumn],
    lineno: usize,
) -> Result<RowAllocation, AllocationError> {
    let row_id = row_identifier(row, resolved, lineno);
    let mut groups: Vec<Option<GroupAllocation>> = Vec::with_capacity(resolved.len());
    for rc in resolved.iter() {
        let group = if rc.is_repeated() {
            Some(allocate_group(row, rc, lineno, &row_id)?)
        } else {
            None
        };
        groups.push(group);
    }
    Ok(RowAllocation { groups })
}

/// Computes the ratio of every action, at every position of a repeated
/// column, for one source row.
///
/// The result has one line per action and one entry per requested column;
/// entries of non-repeated columns are `None`.
///
/// `lineno` is only used to report errors.
pub fn allocation_ratios(
    row: &[Cell],
    resolved: &[ResolvedColumn],
    actions: &[Action],
    lineno: usize,
) -> Result<Vec<Vec<Option<f64>>>, AllocationError> {
    let allocation = allocate_row(row, resolved, lineno)?;
    Ok(actions
        .iter()
        .map(|action| {
            action
                .choices
                .iter()
                .enumerate()
                .map(|(position, choice)| allocation.ratio(position, choice.ordinal))
                .collect()
        })
        .collect())
}

/// Builds the normalized rows: one candidate per (source row, action), with
/// the candidates holding a blank cell dropped.
///
/// Every row is allocated before anything is returned: an error leaves no
/// partial output.
pub fn materialize(
    rows: &[Vec<Cell>],
    themes: Option<&ThemeTable>,
    resolved: &[ResolvedColumn],
    actions: &[Action],
) -> Result<Vec<OutputRow>, AllocationError> {
    let mut res: Vec<OutputRow> = Vec::new();
    let mut unknown_projects: HashSet<String> = HashSet::new();
    let mut num_dropped: usize = 0;
    for (idx, row) in rows.iter().enumerate() {
        // Line numbers count the header and start at 1.
        let lineno = idx + 2;
        let allocation = allocate_row(row, resolved, lineno)?;
        for action in actions.iter() {
            let mut out: OutputRow = Vec::new();
            if let Some(theme_table) = themes {
                let project = action
                    .choices
                    .first()
                    .map(|c| cell_at(row, c.slot.value_index))
                    .unwrap_or(Cell::Empty);
                let theme = match theme_table.lookup(&project.key()) {
                    Some(t) => Cell::from(t),
                    None => {
                        if !project.is_blank() && unknown_projects.insert(project.key()) {
                            warn!("No theme found for project {:?}", project.key());
                        }
                        Cell::Empty
                    }
                };
                out.push(theme);
            }
            for (position, choice) in action.choices.iter().enumerate() {
                if let Some(r) = allocation.ratio(position, choice.ordinal) {
                    out.push(Cell::Number(r));
                }
                out.push(cell_at(row, choice.slot.value_index));
            }
            if out.iter().any(|c| c.is_blank()) {
                debug!("materialize: line {}: dropping {:?}", lineno, out);
                num_dropped += 1;
                continue;
            }
            res.push(out);
        }
    }
    debug!(
        "materialize: {} rows kept, {} dropped",
        res.len(),
        num_dropped
    );
    Ok(res)
}

/// Runs the whole normalization on a source table.
pub fn normalize(
    specs: &[ColumnSpec],
    source: &Table,
    themes: Option<&ThemeTable>,
) -> Result<Table, AllocationError> {
    info!(
        "Normalizing {:?} rows with columns {:?}",
        source.rows.len(),
        specs
    );
    let resolved = resolve_columns(specs, &source.header);
    let actions = expand_actions(&resolved);
    info!(
        "Resolved slots per column: {:?}, {} actions",
        resolved.iter().map(|rc| rc.slots.len()).collect::<Vec<_>>(),
        actions.len()
    );
    if actions.is_empty() {
        warn!("The requested columns produce no combination: the normalized table will be empty");
    }
    let rows = materialize(&source.rows, themes, &resolved, &actions)?;
    info!("Normalized table: {} rows", rows.len());
    Ok(Table {
        header: output_header(&resolved, themes.is_some()),
        rows,
    })
}
