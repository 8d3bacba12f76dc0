//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*=\arg\min_{\mathbf{w}} f(\mathbf{w})\quad
//! \text{s.t.}\ \sum_{i\in S} w_i = 1,\ l_i \le w_i \le u_i
//! $$
//!
//! Requests, bounds and result containers shared by the engine and the optimizer.

use std::collections::BTreeMap;

use impl_new_derive::ImplNew;

use super::metrics::MetricsResult;
use super::objective::ObjectiveType;
use crate::error::ConfigurationError;

/// Inclusive `(min, max)` weight interval for one asset.
#[derive(Clone, Copy, Debug, PartialEq, ImplNew)]
pub struct WeightBounds {
  pub min: f64,
  pub max: f64,
}

impl Default for WeightBounds {
  fn default() -> Self {
    Self { min: 0.0, max: 1.0 }
  }
}

impl WeightBounds {
  /// Fail fast on `min > max` (or NaN) instead of clamping.
  pub fn validate(&self, asset: &str) -> Result<(), ConfigurationError> {
    if self.min <= self.max {
      Ok(())
    } else {
      Err(ConfigurationError::InvalidBounds {
        asset: asset.to_string(),
        min: self.min,
        max: self.max,
      })
    }
  }
}

/// Per-asset overrides of the global [`WeightBounds`].
pub type IndividualConstraints = BTreeMap<String, WeightBounds>;

/// Full optimization over every asset of the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizationRequest {
  pub objective: ObjectiveType,
  /// Global bounds applied to assets without an individual override.
  pub bounds: WeightBounds,
  /// `None` falls back to the accumulated reference rate, or zero.
  pub risk_free_rate: Option<f64>,
  pub individual_constraints: IndividualConstraints,
}

impl OptimizationRequest {
  pub fn new(objective: ObjectiveType) -> Self {
    Self {
      objective,
      bounds: WeightBounds::default(),
      risk_free_rate: None,
      individual_constraints: IndividualConstraints::new(),
    }
  }

  pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
    self.bounds = WeightBounds::new(min, max);
    self
  }

  pub fn with_risk_free_rate(mut self, rate: f64) -> Self {
    self.risk_free_rate = Some(rate);
    self
  }

  pub fn with_constraint(mut self, asset: impl Into<String>, min: f64, max: f64) -> Self {
    self
      .individual_constraints
      .insert(asset.into(), WeightBounds::new(min, max));
    self
  }
}

/// Partial optimization: `short_assets` keep caller weights, `selected_assets` are solved.
#[derive(Clone, Debug, PartialEq)]
pub struct ShortRequest {
  pub selected_assets: Vec<String>,
  pub short_assets: Vec<String>,
  /// Fixed weight per short asset, normally negative. Not part of the budget.
  pub short_weights: BTreeMap<String, f64>,
  pub objective: ObjectiveType,
  pub bounds: WeightBounds,
  pub risk_free_rate: Option<f64>,
  pub individual_constraints: IndividualConstraints,
}

impl ShortRequest {
  pub fn new<S: Into<String>>(
    selected_assets: impl IntoIterator<Item = S>,
    objective: ObjectiveType,
  ) -> Self {
    Self {
      selected_assets: selected_assets.into_iter().map(Into::into).collect(),
      short_assets: Vec::new(),
      short_weights: BTreeMap::new(),
      objective,
      bounds: WeightBounds::default(),
      risk_free_rate: None,
      individual_constraints: IndividualConstraints::new(),
    }
  }

  pub fn with_short(mut self, asset: impl Into<String>, weight: f64) -> Self {
    let asset = asset.into();
    self.short_weights.insert(asset.clone(), weight);
    self.short_assets.push(asset);
    self
  }

  pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
    self.bounds = WeightBounds::new(min, max);
    self
  }

  pub fn with_risk_free_rate(mut self, rate: f64) -> Self {
    self.risk_free_rate = Some(rate);
    self
  }

  pub fn with_constraint(mut self, asset: impl Into<String>, min: f64, max: f64) -> Self {
    self
      .individual_constraints
      .insert(asset.into(), WeightBounds::new(min, max));
    self
  }
}

/// Outcome of one optimization run.
#[derive(Clone, Debug)]
pub enum OptimizationResult {
  Converged {
    /// One weight per engine asset, in engine order.
    weights: Vec<f64>,
    metrics: Box<MetricsResult>,
    assets: Vec<String>,
    /// Solver iterations across all restarts.
    iterations: u64,
    /// Objective value at `weights`.
    cost: f64,
  },
  Failed {
    message: String,
  },
}

impl OptimizationResult {
  pub fn success(&self) -> bool {
    matches!(self, Self::Converged { .. })
  }

  pub fn weights(&self) -> Option<&[f64]> {
    match self {
      Self::Converged { weights, .. } => Some(weights),
      Self::Failed { .. } => None,
    }
  }

  pub fn metrics(&self) -> Option<&MetricsResult> {
    match self {
      Self::Converged { metrics, .. } => Some(metrics),
      Self::Failed { .. } => None,
    }
  }

  pub fn message(&self) -> Option<&str> {
    match self {
      Self::Converged { .. } => None,
      Self::Failed { message } => Some(message),
    }
  }

  pub(crate) fn failed(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
    }
  }
}

/// One line of the allocation summary.
#[derive(Clone, Debug, PartialEq)]
pub struct AllocationRow {
  pub asset: String,
  /// Weight in percent (`0.25` becomes `25.0`).
  pub weight_pct: f64,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bounds_reject_inverted_interval() {
    let err = WeightBounds::new(0.6, 0.2).validate("AAA").unwrap_err();
    assert_eq!(
      err,
      ConfigurationError::InvalidBounds {
        asset: "AAA".to_string(),
        min: 0.6,
        max: 0.2
      }
    );
    assert!(WeightBounds::new(0.2, 0.2).validate("AAA").is_ok());
    assert!(WeightBounds::new(f64::NAN, 0.2).validate("AAA").is_err());
  }

  #[test]
  fn short_request_records_weights_in_order() {
    let req = ShortRequest::new(["AAA", "BBB"], ObjectiveType::Sharpe)
      .with_short("HEDGE", -0.3)
      .with_short("IDX", -0.1);

    assert_eq!(req.short_assets, vec!["HEDGE", "IDX"]);
    assert_eq!(req.short_weights["HEDGE"], -0.3);
    assert_eq!(req.selected_assets.len(), 2);
  }
}
