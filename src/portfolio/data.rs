//! # Portfolio Data
//!
//! $$
//! r^{(0)}_t = \frac{p_t - p_{t-1}}{p_0},\qquad \sum_{s\le t} r^{(0)}_s = \frac{p_t-p_0}{p_0}
//! $$
//!
//! Raw table ingestion, reference-column detection and the aligned return matrix.

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use tracing::debug;
use tracing::warn;

use crate::error::ConfigurationError;

/// Raw tabular input: column 0 holds date labels, the rest numeric text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReturnTable {
  pub columns: Vec<String>,
  pub rows: Vec<Vec<String>>,
}

impl ReturnTable {
  pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
    Self { columns, rows }
  }

  /// Build a table from already-numeric columns.
  pub fn from_columns(dates: &[&str], columns: &[(&str, &[f64])]) -> Self {
    let mut header = vec!["Date".to_string()];
    header.extend(columns.iter().map(|(name, _)| name.to_string()));

    let rows = dates
      .iter()
      .enumerate()
      .map(|(t, date)| {
        let mut row = vec![date.to_string()];
        row.extend(columns.iter().map(|(_, values)| {
          values
            .get(t)
            .map(|v| v.to_string())
            .unwrap_or_default()
        }));
        row
      })
      .collect();

    Self::new(header, rows)
  }
}

/// Name predicate deciding whether the second column is a reference rate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceDetector {
  vocabulary: Vec<String>,
}

impl Default for ReferenceDetector {
  fn default() -> Self {
    Self::new([
      "taxa", "livre", "risco", "ibov", "ref", "cdi", "selic", "risk", "free",
    ])
  }
}

impl ReferenceDetector {
  pub fn new<S: AsRef<str>>(terms: impl IntoIterator<Item = S>) -> Self {
    Self {
      vocabulary: terms
        .into_iter()
        .map(|t| t.as_ref().to_lowercase())
        .collect(),
    }
  }

  /// Detector that never matches; every column after the date is an asset.
  pub fn disabled() -> Self {
    Self {
      vocabulary: Vec::new(),
    }
  }

  pub fn with_term(mut self, term: &str) -> Self {
    self.vocabulary.push(term.to_lowercase());
    self
  }

  pub fn vocabulary(&self) -> &[String] {
    &self.vocabulary
  }

  /// Case-insensitive substring match against the vocabulary.
  pub fn is_reference(&self, column: &str) -> bool {
    let column = column.to_lowercase();
    self
      .vocabulary
      .iter()
      .any(|term| column.contains(term.as_str()))
  }
}

/// Parse one cell, accepting `,` as decimal separator. Anything else is NaN.
pub fn parse_cell(cell: &str) -> f64 {
  let cell = cell.trim();
  if cell.is_empty() {
    return f64::NAN;
  }

  let parsed = if cell.contains(',') && !cell.contains('.') {
    cell.replace(',', ".").parse::<f64>()
  } else {
    cell.parse::<f64>()
  };

  match parsed {
    Ok(v) if v.is_finite() => v,
    _ => f64::NAN,
  }
}

/// Parse a date label as `%Y-%m-%d`, `%d/%m/%Y` or a `%Y-%m-%d` prefixed timestamp.
pub fn parse_date(label: &str) -> Option<NaiveDate> {
  let label = label.trim();
  NaiveDate::parse_from_str(label, "%Y-%m-%d")
    .or_else(|_| NaiveDate::parse_from_str(label, "%d/%m/%Y"))
    .ok()
    .or_else(|| {
      label
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
    })
}

/// Convert a price path to base-0 daily deltas scaled by the first price.
///
/// The running sum of the output equals `(p_t - p_0) / p_0`. A non-positive or
/// non-finite first price yields an all-NaN series.
pub fn base_zero_returns(prices: &[f64]) -> Vec<f64> {
  let Some(&p0) = prices.first() else {
    return Vec::new();
  };
  if !(p0.is_finite() && p0 > 0.0) {
    return vec![f64::NAN; prices.len()];
  }

  let mut out = Vec::with_capacity(prices.len());
  out.push(0.0);
  for w in prices.windows(2) {
    out.push((w[1] - w[0]) / p0);
  }
  out
}

/// Cleaned, row-aligned return data. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnSeries {
  dates: Vec<String>,
  assets: Vec<String>,
  /// Period-major: one row per period, one column per asset.
  returns: Array2<f64>,
  reference: Option<Array1<f64>>,
  reference_name: Option<String>,
}

impl ReturnSeries {
  /// Build from already-clean data.
  pub fn new(
    dates: Vec<String>,
    assets: Vec<String>,
    returns: Array2<f64>,
    reference: Option<(String, Array1<f64>)>,
  ) -> Result<Self, ConfigurationError> {
    if assets.is_empty() {
      return Err(ConfigurationError::NoAssets);
    }
    if returns.nrows() == 0 {
      return Err(ConfigurationError::EmptyMatrix);
    }
    if returns.ncols() != assets.len() {
      return Err(ConfigurationError::DimensionMismatch {
        expected: assets.len(),
        actual: returns.ncols(),
      });
    }
    if dates.len() != returns.nrows() {
      return Err(ConfigurationError::DimensionMismatch {
        expected: returns.nrows(),
        actual: dates.len(),
      });
    }
    if let Some((_, r)) = &reference {
      if r.len() != returns.nrows() {
        return Err(ConfigurationError::ReferenceLength {
          expected: returns.nrows(),
          actual: r.len(),
        });
      }
    }

    let (reference_name, reference) = match reference {
      Some((name, r)) => (Some(name), Some(r)),
      None => (None, None),
    };

    Ok(Self {
      dates,
      assets,
      returns,
      reference,
      reference_name,
    })
  }

  /// Preprocess a raw table.
  ///
  /// Column 1 becomes the reference series when `detector` matches its header.
  /// Rows with a non-numeric cell in any non-date column are dropped across all
  /// columns, then `selected` projects the asset columns in caller order.
  pub fn from_table(
    table: &ReturnTable,
    selected: Option<&[String]>,
    detector: &ReferenceDetector,
  ) -> Result<Self, ConfigurationError> {
    if table.columns.is_empty() {
      return Err(ConfigurationError::MissingDateColumn);
    }

    let has_reference = table
      .columns
      .get(1)
      .is_some_and(|name| detector.is_reference(name));
    let asset_start = if has_reference { 2 } else { 1 };
    let numeric_cols = table.columns.len() - 1;

    let mut dates = Vec::with_capacity(table.rows.len());
    let mut values = Vec::with_capacity(table.rows.len() * numeric_cols);
    let mut dropped = 0usize;

    for row in &table.rows {
      let parsed: Vec<f64> = (1..table.columns.len())
        .map(|c| row.get(c).map_or(f64::NAN, |cell| parse_cell(cell)))
        .collect();
      if parsed.iter().any(|v| v.is_nan()) {
        dropped += 1;
        continue;
      }
      dates.push(row.first().cloned().unwrap_or_default());
      values.extend(parsed);
    }

    if dropped > 0 {
      warn!(dropped, kept = dates.len(), "dropped rows with non-numeric values");
    }

    let all_assets: Vec<String> = table.columns[asset_start..].to_vec();
    if all_assets.is_empty() {
      return Err(ConfigurationError::NoAssets);
    }
    if dates.is_empty() {
      return Err(ConfigurationError::EmptyMatrix);
    }

    let numeric = Array2::from_shape_vec((dates.len(), numeric_cols), values)
      .map_err(|_| ConfigurationError::DimensionMismatch {
        expected: numeric_cols,
        actual: 0,
      })?;

    let reference = has_reference.then(|| (table.columns[1].clone(), numeric.column(0).to_owned()));
    let returns = numeric.slice_axis(Axis(1), (asset_start - 1..).into()).to_owned();

    debug!(
      assets = all_assets.len(),
      periods = dates.len(),
      reference = ?reference.as_ref().map(|(name, _)| name),
      "preprocessed return table"
    );

    let series = Self::new(dates, all_assets, returns, reference)?;
    match selected {
      Some(names) => series.select(names),
      None => Ok(series),
    }
  }

  /// Project to `names`, in that order.
  pub fn select(&self, names: &[String]) -> Result<Self, ConfigurationError> {
    let idx = names
      .iter()
      .map(|name| {
        self
          .asset_index(name)
          .ok_or_else(|| ConfigurationError::UnknownAsset(name.clone()))
      })
      .collect::<Result<Vec<_>, _>>()?;

    Self::new(
      self.dates.clone(),
      names.to_vec(),
      self.returns.select(Axis(1), &idx),
      self.reference_pair(),
    )
  }

  /// Keep the periods whose date label falls inside `[start, end]`.
  ///
  /// Rows with unparseable labels are left out of any window.
  pub fn window(&self, start: NaiveDate, end: NaiveDate) -> Result<Self, ConfigurationError> {
    let rows: Vec<usize> = self
      .dates
      .iter()
      .enumerate()
      .filter(|(_, label)| parse_date(label).is_some_and(|d| d >= start && d <= end))
      .map(|(t, _)| t)
      .collect();

    if rows.is_empty() {
      return Err(ConfigurationError::EmptyMatrix);
    }

    Self::new(
      rows.iter().map(|&t| self.dates[t].clone()).collect(),
      self.assets.clone(),
      self.returns.select(Axis(0), &rows),
      self
        .reference_pair()
        .map(|(name, r)| (name, r.select(Axis(0), &rows))),
    )
  }

  fn reference_pair(&self) -> Option<(String, Array1<f64>)> {
    match (&self.reference_name, &self.reference) {
      (Some(name), Some(r)) => Some((name.clone(), r.clone())),
      _ => None,
    }
  }

  pub fn dates(&self) -> &[String] {
    &self.dates
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn returns(&self) -> &Array2<f64> {
    &self.returns
  }

  pub fn reference(&self) -> Option<&Array1<f64>> {
    self.reference.as_ref()
  }

  pub fn reference_name(&self) -> Option<&str> {
    self.reference_name.as_deref()
  }

  pub fn n_assets(&self) -> usize {
    self.assets.len()
  }

  pub fn n_periods(&self) -> usize {
    self.returns.nrows()
  }

  pub fn asset_index(&self, name: &str) -> Option<usize> {
    self.assets.iter().position(|a| a == name)
  }

  /// Sum of the reference series over the whole window.
  pub fn accumulated_reference_rate(&self) -> Option<f64> {
    self.reference.as_ref().map(|r| r.sum())
  }
}
