//! # Portfolio Engine
//!
//! $$
//! \mathbf{w}^\* = \arg\min_{\mathbf{w}\in\mathcal{C}} c_{\text{objective}}\big(\operatorname{Metrics}(\mathbf{R}\mathbf{w})\big)
//! $$
//!
//! High-level API over one immutable return series: request validation,
//! bound resolution, full and partial (fixed shorts) optimization, metrics
//! and the allocation summary.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::info;
use tracing::warn;

use super::data::ReferenceDetector;
use super::data::ReturnSeries;
use super::data::ReturnTable;
use super::metrics::MetricsEngine;
use super::metrics::MetricsResult;
use super::metrics::PERIODS_PER_YEAR;
use super::optimizers::ConstrainedOptimizer;
use super::optimizers::FeasibleSet;
use super::optimizers::SolverConfig;
use super::optimizers::WeightLayout;
use super::optimizers::WeightProblem;
use super::summary::summarize;
use super::types::AllocationRow;
use super::types::IndividualConstraints;
use super::types::OptimizationRequest;
use super::types::OptimizationResult;
use super::types::ShortRequest;
use super::types::WeightBounds;
use crate::error::ConfigurationError;

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Debug)]
pub struct EngineConfig {
  /// Nelder-Mead settings shared by every request.
  pub solver: SolverConfig,
  /// Used by [`PortfolioEngine::from_table`] to spot the reference column.
  pub reference_detector: ReferenceDetector,
  /// Annualization factor.
  pub periods_per_year: f64,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      solver: SolverConfig::default(),
      reference_detector: ReferenceDetector::default(),
      periods_per_year: PERIODS_PER_YEAR,
    }
  }
}

/// Single entry point for metrics and optimization over one return series.
#[derive(Clone, Debug)]
pub struct PortfolioEngine {
  series: Arc<ReturnSeries>,
  metrics: MetricsEngine,
  optimizer: ConstrainedOptimizer,
  config: EngineConfig,
}

impl PortfolioEngine {
  /// Construct an engine over an already-clean series.
  pub fn new(series: ReturnSeries, config: EngineConfig) -> Self {
    let series = Arc::new(series);
    let metrics = MetricsEngine::new(Arc::clone(&series), config.periods_per_year);
    let optimizer = ConstrainedOptimizer::new(metrics.clone(), config.solver.clone());

    info!(
      assets = series.n_assets(),
      periods = series.n_periods(),
      reference = series.reference_name().unwrap_or("none"),
      "portfolio engine ready"
    );

    Self {
      series,
      metrics,
      optimizer,
      config,
    }
  }

  /// Preprocess `table` and build the engine on the selected columns.
  pub fn from_table(
    table: &ReturnTable,
    selected: Option<&[String]>,
    config: EngineConfig,
  ) -> Result<Self, ConfigurationError> {
    let series = ReturnSeries::from_table(table, selected, &config.reference_detector)?;
    Ok(Self::new(series, config))
  }

  /// Engine over the periods dated inside `[start, end]`.
  pub fn window(&self, start: NaiveDate, end: NaiveDate) -> Result<Self, ConfigurationError> {
    Ok(Self::new(self.series.window(start, end)?, self.config.clone()))
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn series(&self) -> &ReturnSeries {
    &self.series
  }

  pub fn assets(&self) -> &[String] {
    self.series.assets()
  }

  pub fn has_reference(&self) -> bool {
    self.series.reference().is_some()
  }

  pub fn accumulated_reference_rate(&self) -> Option<f64> {
    self.series.accumulated_reference_rate()
  }

  /// Explicit rate, else the accumulated reference rate, else zero.
  pub fn resolve_risk_free(&self, risk_free_rate: Option<f64>) -> f64 {
    risk_free_rate
      .or_else(|| self.accumulated_reference_rate())
      .unwrap_or(0.0)
  }

  /// Evaluate a full weight vector without optimizing.
  pub fn metrics(
    &self,
    weights: &[f64],
    risk_free_rate: Option<f64>,
  ) -> Result<MetricsResult, ConfigurationError> {
    if weights.len() != self.series.n_assets() {
      return Err(ConfigurationError::DimensionMismatch {
        expected: self.series.n_assets(),
        actual: weights.len(),
      });
    }
    Ok(self.metrics.compute(weights, self.resolve_risk_free(risk_free_rate)))
  }

  /// Optimize over every asset with `Σw = 1`.
  ///
  /// Bad input is an `Err`; a solver that cannot converge is `Ok(Failed)`.
  pub fn optimize(
    &self,
    request: &OptimizationRequest,
  ) -> Result<OptimizationResult, ConfigurationError> {
    let free: Vec<usize> = (0..self.series.n_assets()).collect();
    let feasible =
      match self.feasible_set(&free, &request.bounds, &request.individual_constraints)? {
        Ok(set) => set,
        Err(message) => return Ok(OptimizationResult::failed(message)),
      };

    let problem = WeightProblem {
      objective: request.objective,
      risk_free_rate: self.resolve_risk_free(request.risk_free_rate),
      layout: WeightLayout::full(self.series.n_assets()),
      feasible,
    };
    Ok(self.optimizer.solve(&problem))
  }

  /// Optimize `selected_assets` with `Σ = 1` while short assets keep their
  /// caller-supplied weights. Assets in neither list get zero.
  pub fn optimize_with_shorts(
    &self,
    request: &ShortRequest,
  ) -> Result<OptimizationResult, ConfigurationError> {
    if request.selected_assets.is_empty() {
      return Err(ConfigurationError::NoAssets);
    }

    let mut seen = HashSet::new();
    let mut free = Vec::with_capacity(request.selected_assets.len());
    for name in &request.selected_assets {
      let idx = self.index_of(name)?;
      if seen.insert(idx) {
        free.push(idx);
      }
    }

    let mut fixed = Vec::with_capacity(request.short_assets.len());
    for name in &request.short_assets {
      let idx = self.index_of(name)?;
      if seen.contains(&idx) {
        return Err(ConfigurationError::OverlappingAssets(name.clone()));
      }
      let weight = request
        .short_weights
        .get(name)
        .copied()
        .ok_or_else(|| ConfigurationError::MissingShortWeight(name.clone()))?;
      fixed.push((idx, weight));
    }

    let feasible =
      match self.feasible_set(&free, &request.bounds, &request.individual_constraints)? {
        Ok(set) => set,
        Err(message) => return Ok(OptimizationResult::failed(message)),
      };

    let problem = WeightProblem {
      objective: request.objective,
      risk_free_rate: self.resolve_risk_free(request.risk_free_rate),
      layout: WeightLayout::partial(self.series.n_assets(), free, fixed),
      feasible,
    };
    Ok(self.optimizer.solve(&problem))
  }

  /// Independent full optimizations in parallel, results in request order.
  pub fn optimize_batch(
    &self,
    requests: &[OptimizationRequest],
  ) -> Vec<Result<OptimizationResult, ConfigurationError>> {
    requests.par_iter().map(|r| self.optimize(r)).collect()
  }

  /// Allocation rows for a weight vector in engine asset order.
  pub fn summary(&self, weights: &[f64]) -> Vec<AllocationRow> {
    summarize(weights, self.series.assets())
  }

  fn index_of(&self, name: &str) -> Result<usize, ConfigurationError> {
    self
      .series
      .asset_index(name)
      .ok_or_else(|| ConfigurationError::UnknownAsset(name.to_string()))
  }

  /// Resolve per-asset bounds for the free slots.
  ///
  /// The outer `Result` carries invalid input, the inner one an infeasible box.
  fn feasible_set(
    &self,
    free: &[usize],
    global: &WeightBounds,
    individual: &IndividualConstraints,
  ) -> Result<Result<FeasibleSet, String>, ConfigurationError> {
    global.validate("*")?;
    for (name, bounds) in individual {
      if self.series.asset_index(name).is_none() {
        warn!(asset = %name, "ignoring constraint for unknown asset");
        continue;
      }
      bounds.validate(name)?;
    }

    let assets = self.series.assets();
    let (lower, upper): (Vec<f64>, Vec<f64>) = free
      .iter()
      .map(|&i| {
        let b = individual.get(&assets[i]).unwrap_or(global);
        (b.min, b.max)
      })
      .unzip();

    Ok(FeasibleSet::new(lower, upper))
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::Array2;
  use tracing_test::traced_test;

  use super::*;
  use crate::portfolio::objective::ObjectiveType;

  const N: usize = 40;

  fn dates() -> Vec<String> {
    (0..N)
      .map(|t| {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(t as i64);
        d.format("%Y-%m-%d").to_string()
      })
      .collect()
  }

  fn column(drift: f64, amp: f64, freq: f64, phase: f64) -> Vec<f64> {
    (0..N)
      .map(|t| drift + amp * (freq * t as f64 + phase).sin())
      .collect()
  }

  fn table(with_reference: bool) -> ReturnTable {
    let cdi = vec![0.0004; N];
    let a = column(0.0015, 0.010, 0.9, 0.0);
    let b = column(0.0008, 0.004, 1.7, 1.0);
    let c = column(0.0020, 0.020, 0.5, 2.0);
    let d = column(-0.0005, 0.008, 2.3, 0.5);

    let dates = dates();
    let date_refs: Vec<&str> = dates.iter().map(String::as_str).collect();
    let mut cols: Vec<(&str, &[f64])> = Vec::new();
    if with_reference {
      cols.push(("CDI", &cdi[..]));
    }
    cols.extend([("AAA", &a[..]), ("BBB", &b[..]), ("CCC", &c[..]), ("DDD", &d[..])]);
    ReturnTable::from_columns(&date_refs, &cols)
  }

  fn engine(with_reference: bool) -> PortfolioEngine {
    PortfolioEngine::from_table(&table(with_reference), None, EngineConfig::default()).unwrap()
  }

  fn assert_budget(weights: &[f64]) {
    assert_abs_diff_eq!(weights.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
  }

  #[test]
  fn reference_column_drives_default_risk_free() {
    let e = engine(true);

    assert!(e.has_reference());
    assert_eq!(e.assets(), &["AAA", "BBB", "CCC", "DDD"]);
    assert_abs_diff_eq!(e.accumulated_reference_rate().unwrap(), 0.0004 * N as f64, epsilon = 1e-12);
    assert_abs_diff_eq!(e.resolve_risk_free(None), 0.016, epsilon = 1e-12);
    assert_eq!(e.resolve_risk_free(Some(0.05)), 0.05);
    assert_eq!(engine(false).resolve_risk_free(None), 0.0);
  }

  #[test]
  fn sharpe_optimization_respects_budget_and_bounds() {
    let e = engine(true);
    let request = OptimizationRequest::new(ObjectiveType::Sharpe).with_bounds(0.1, 0.5);
    let result = e.optimize(&request).unwrap();

    let w = result.weights().expect("converged");
    assert_budget(w);
    assert!(w.iter().all(|&x| (0.1 - 1e-12..=0.5 + 1e-12).contains(&x)), "{w:?}");

    // no feasible point beats the optimum by more than solver noise
    let best = result.metrics().unwrap().sharpe;
    let uniform = e.metrics(&[0.25; 4], None).unwrap().sharpe;
    assert!(best >= uniform - 1e-9);
  }

  #[test]
  fn individual_constraints_override_global_bounds() {
    let e = engine(true);
    let request = OptimizationRequest::new(ObjectiveType::Volatility)
      .with_constraint("CCC", 0.3, 0.4)
      .with_constraint("BBB", 0.0, 0.2);
    let result = e.optimize(&request).unwrap();

    let w = result.weights().expect("converged");
    assert_budget(w);
    assert!(w[2] >= 0.3 - 1e-12 && w[2] <= 0.4 + 1e-12);
    assert!(w[1] <= 0.2 + 1e-12);
  }

  #[test]
  fn invalid_bounds_are_configuration_errors() {
    let e = engine(false);
    let err = e
      .optimize(&OptimizationRequest::new(ObjectiveType::Sharpe).with_bounds(0.6, 0.2))
      .unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidBounds { .. }));

    let err = e
      .optimize(&OptimizationRequest::new(ObjectiveType::Sharpe).with_constraint("AAA", 0.5, 0.1))
      .unwrap_err();
    assert_eq!(
      err,
      ConfigurationError::InvalidBounds {
        asset: "AAA".to_string(),
        min: 0.5,
        max: 0.1
      }
    );
  }

  #[test]
  fn infeasible_box_fails_without_error() {
    let e = engine(false);
    let result = e
      .optimize(&OptimizationRequest::new(ObjectiveType::Sharpe).with_bounds(0.3, 1.0))
      .unwrap();

    assert!(!result.success());
    assert!(result.message().unwrap().contains("infeasible"));
  }

  #[test]
  fn shorts_keep_their_weight_and_stay_outside_the_budget() {
    let e = engine(true);
    let request = ShortRequest::new(["AAA", "CCC"], ObjectiveType::Sharpe).with_short("DDD", -0.3);
    let result = e.optimize_with_shorts(&request).unwrap();

    let w = result.weights().expect("converged");
    assert_eq!(w.len(), 4);
    assert_eq!(w[3], -0.3);
    assert_eq!(w[1], 0.0);
    assert_abs_diff_eq!(w[0] + w[2], 1.0, epsilon = 1e-6);
    assert!(w[0] >= -1e-12 && w[2] >= -1e-12);
  }

  #[test]
  fn short_requests_are_validated() {
    let e = engine(false);

    let err = e
      .optimize_with_shorts(&ShortRequest::new(Vec::<String>::new(), ObjectiveType::Sharpe))
      .unwrap_err();
    assert_eq!(err, ConfigurationError::NoAssets);

    let err = e
      .optimize_with_shorts(&ShortRequest::new(["AAA", "ZZZ"], ObjectiveType::Sharpe))
      .unwrap_err();
    assert_eq!(err, ConfigurationError::UnknownAsset("ZZZ".to_string()));

    let err = e
      .optimize_with_shorts(&ShortRequest::new(["AAA", "BBB"], ObjectiveType::Sharpe).with_short("BBB", -0.1))
      .unwrap_err();
    assert_eq!(err, ConfigurationError::OverlappingAssets("BBB".to_string()));

    let mut request = ShortRequest::new(["AAA"], ObjectiveType::Sharpe);
    request.short_assets.push("DDD".to_string());
    let err = e.optimize_with_shorts(&request).unwrap_err();
    assert_eq!(err, ConfigurationError::MissingShortWeight("DDD".to_string()));
  }

  #[test]
  fn reference_objectives_without_reference_never_panic() {
    let e = engine(false);
    for objective in [ObjectiveType::QualityLinear, ObjectiveType::ExcessHc10] {
      let result = e.optimize(&OptimizationRequest::new(objective)).unwrap();
      assert!(!result.success());
    }
  }

  #[test]
  fn reference_objectives_with_reference_converge() {
    let e = engine(true);
    let result = e
      .optimize(&OptimizationRequest::new(ObjectiveType::ExcessHc10))
      .unwrap();

    let w = result.weights().expect("converged");
    assert_budget(w);
    assert!(result.metrics().unwrap().excess.is_some());
  }

  #[test]
  fn batch_matches_sequential_runs() {
    let e = engine(true);
    let requests: Vec<OptimizationRequest> = [ObjectiveType::Sharpe, ObjectiveType::Volatility, ObjectiveType::Hc10]
      .into_iter()
      .map(OptimizationRequest::new)
      .collect();

    let batch = e.optimize_batch(&requests);
    assert_eq!(batch.len(), requests.len());
    for (parallel, request) in batch.iter().zip(&requests) {
      let sequential = e.optimize(request).unwrap();
      let parallel = parallel.as_ref().unwrap();
      assert_eq!(parallel.success(), sequential.success());
      assert_eq!(parallel.weights(), sequential.weights());
    }
  }

  #[test]
  fn metrics_checks_the_weight_length() {
    let e = engine(false);
    assert_eq!(
      e.metrics(&[0.5, 0.5], None).unwrap_err(),
      ConfigurationError::DimensionMismatch {
        expected: 4,
        actual: 2
      }
    );
  }

  #[test]
  fn window_supports_out_of_sample_evaluation() {
    let e = engine(true);
    let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
    let in_sample = e.window(d(1), d(20)).unwrap();
    let out_of_sample = e.window(d(21), d(31)).unwrap();

    assert_eq!(in_sample.series().n_periods(), 20);
    assert_eq!(out_of_sample.series().n_periods(), 11);

    let fitted = in_sample
      .optimize(&OptimizationRequest::new(ObjectiveType::Sharpe))
      .unwrap();
    let w = fitted.weights().expect("converged");
    let oos = out_of_sample.metrics(w, None).unwrap();
    assert_eq!(oos.daily_returns.len(), 11);
    assert_abs_diff_eq!(oos.risk_free_rate, 0.0004 * 11.0, epsilon = 1e-12);
  }

  /// Columns `1..=n_assets` of a 32×32 Sylvester-Hadamard matrix: zero mean and
  /// mutually orthogonal, so the portfolio variance is `Σ w_i² s_i²`.
  fn hadamard_engine(n_assets: usize, drift: impl Fn(usize) -> f64) -> (PortfolioEngine, Vec<f64>) {
    const PERIODS: usize = 32;
    let scales: Vec<f64> = (0..n_assets).map(|i| 0.01 * (1.0 + 0.04 * i as f64)).collect();
    let returns = Array2::from_shape_fn((PERIODS, n_assets), |(t, i)| {
      let sign = if (t & (i + 1)).count_ones() % 2 == 0 { 1.0 } else { -1.0 };
      drift(i) + scales[i] * sign
    });
    let series = ReturnSeries::new(
      (0..PERIODS).map(|t| format!("t{t}")).collect(),
      (0..n_assets).map(|i| format!("A{i:02}")).collect(),
      returns,
      None,
    )
    .unwrap();
    (PortfolioEngine::new(series, EngineConfig::default()), scales)
  }

  #[test]
  fn twenty_asset_min_volatility_matches_closed_form() {
    let (e, scales) = hadamard_engine(20, |_| 0.0);
    let inv: Vec<f64> = scales.iter().map(|s| 1.0 / (s * s)).collect();
    let total: f64 = inv.iter().sum();
    let expected: Vec<f64> = inv.iter().map(|x| x / total).collect();
    let optimum = e.metrics(&expected, Some(0.0)).unwrap().volatility;

    let result = e
      .optimize(&OptimizationRequest::new(ObjectiveType::Volatility).with_risk_free_rate(0.0))
      .unwrap();

    let w = result.weights().expect("converged");
    assert_budget(w);
    for (got, want) in w.iter().zip(&expected) {
      assert_abs_diff_eq!(*got, *want, epsilon = 2e-3);
    }
    let vol = result.metrics().unwrap().volatility;
    assert!(vol >= optimum - 1e-12);
    assert!((vol - optimum) / optimum < 1e-4, "vol {vol} vs optimum {optimum}");
  }

  #[test]
  fn wide_universe_objectives_converge_within_bounds() {
    let (e, _) = hadamard_engine(24, |i| 0.0004 + 0.00005 * i as f64);
    let uniform = e.metrics(&[1.0 / 24.0; 24], Some(0.0)).unwrap();

    for objective in [
      ObjectiveType::Sharpe,
      ObjectiveType::Sortino,
      ObjectiveType::Hc10,
      ObjectiveType::Volatility,
    ] {
      let request = OptimizationRequest::new(objective)
        .with_bounds(0.0, 0.4)
        .with_risk_free_rate(0.0);
      let result = e.optimize(&request).unwrap();

      assert!(result.success(), "{objective}: {:?}", result.message());
      let w = result.weights().unwrap();
      assert_budget(w);
      assert!(w.iter().all(|&x| (-1e-12..=0.4 + 1e-12).contains(&x)));
      assert!(objective.cost(result.metrics().unwrap()) <= objective.cost(&uniform) + 1e-12);
    }
  }

  #[test]
  fn summary_lists_material_weights() {
    let e = engine(false);
    let rows = e.summary(&[0.0, 0.7, 0.0005, 0.2995]);

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].asset, "BBB");
    assert_abs_diff_eq!(rows[1].weight_pct, 29.95, epsilon = 1e-9);
  }

  #[traced_test]
  #[test]
  fn optimization_is_logged() {
    let e = engine(true);
    let _ = e.optimize(&OptimizationRequest::new(ObjectiveType::Volatility)).unwrap();

    assert!(logs_contain("portfolio engine ready"));
    assert!(logs_contain("starting optimization"));
    assert!(logs_contain("optimization converged"));
  }

  #[traced_test]
  #[test]
  fn unknown_constraint_assets_are_ignored_with_a_warning() {
    let e = engine(false);
    let result = e
      .optimize(&OptimizationRequest::new(ObjectiveType::Volatility).with_constraint("NOPE", 0.0, 0.1))
      .unwrap();

    assert!(result.success());
    assert!(logs_contain("ignoring constraint for unknown asset"));
  }
}
