//! # Allocation Summary
//!
//! $$
//! \mathcal{A} = \{(a_i,\ 100\,w_i) : |w_i| > 10^{-3}\},\quad \text{sorted by } w_i \downarrow
//! $$
//!
//! Human-readable allocation rows and a terminal table.

use prettytable::Table;
use prettytable::row;

use super::types::AllocationRow;

/// Weights with `|w|` at or below this are left out of the summary.
pub const MIN_DISPLAY_WEIGHT: f64 = 0.001;

/// Rows for every asset with a material weight, largest signed weight first.
///
/// Short positions keep their sign and therefore sink to the bottom.
pub fn summarize(weights: &[f64], assets: &[String]) -> Vec<AllocationRow> {
  let mut rows: Vec<AllocationRow> = weights
    .iter()
    .zip(assets)
    .filter(|(w, _)| w.abs() > MIN_DISPLAY_WEIGHT)
    .map(|(w, asset)| AllocationRow {
      asset: asset.clone(),
      weight_pct: w * 100.0,
    })
    .collect();

  rows.sort_by(|a, b| b.weight_pct.total_cmp(&a.weight_pct));
  rows
}

pub fn to_table(rows: &[AllocationRow]) -> Table {
  let mut table = Table::new();
  table.set_titles(row!["Asset", "Weight (%)"]);
  for r in rows {
    table.add_row(row![r.asset, format!("{:.2}", r.weight_pct)]);
  }
  table
}
