//! # Portfolio Optimizers
//!
//! $$
//! \min_{\mathbf{x}} f\big(\Pi(\mathbf{x})\big),\qquad
//! \Pi(\mathbf{x}) = \arg\min_{\mathbf{w}\in\mathcal{C}} \|\mathbf{w}-\mathbf{x}\|_2,\quad
//! \mathcal{C}=\{\mathbf{w}: l\le \mathbf{w}\le u,\ \mathbf{1}^\top\mathbf{w}=1\}
//! $$
//!
//! Box- and budget-constrained minimization of a black-box objective.
//! Nelder-Mead searches an unconstrained vector whose Euclidean projection onto
//! the capped simplex is the candidate portfolio, so every evaluated point is
//! feasible. Fixed (short) weights are scattered around the free block.

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::solver::neldermead::NelderMead;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::metrics::MetricsEngine;
use super::objective::ObjectiveType;
use super::objective::PENALTY;
use super::types::OptimizationResult;

/// Sum the free weights must reach.
pub const BUDGET: f64 = 1.0;

const BISECTION_STEPS: usize = 200;

/// Nelder-Mead settings.
#[derive(Clone, Debug, PartialEq)]
pub struct SolverConfig {
  /// Iteration floor for one Nelder-Mead run.
  pub max_iters: u64,
  /// Per-run iterations granted for each free asset; the run cap is the
  /// larger of this times the dimension and `max_iters`.
  pub iters_per_asset: u64,
  /// Convergence when the stdev of the simplex costs falls below this.
  pub sd_tolerance: f64,
  /// Offset of the initial simplex vertices from the start point.
  pub initial_step: f64,
  /// Extra runs restarted from the incumbent.
  pub max_restarts: usize,
}

impl Default for SolverConfig {
  fn default() -> Self {
    Self {
      max_iters: 1000,
      iters_per_asset: 200,
      sd_tolerance: 1e-9,
      initial_step: 0.05,
      max_restarts: 5,
    }
  }
}

impl SolverConfig {
  /// Iteration cap of one run over `n_free` weights.
  pub fn iteration_cap(&self, n_free: usize) -> u64 {
    self.max_iters.max(self.iters_per_asset.saturating_mul(n_free as u64))
  }
}

/// Box `[lower, upper]` intersected with the budget hyperplane.
#[derive(Clone, Debug, PartialEq)]
pub struct FeasibleSet {
  lower: Vec<f64>,
  upper: Vec<f64>,
}

impl FeasibleSet {
  /// Fails with a diagnostic when the box cannot reach the budget.
  pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, String> {
    let lo: f64 = lower.iter().sum();
    let hi: f64 = upper.iter().sum();
    if lo > BUDGET + 1e-12 {
      return Err(format!(
        "infeasible bounds: minimum weights sum to {lo:.6} > {BUDGET}"
      ));
    }
    if hi < BUDGET - 1e-12 {
      return Err(format!(
        "infeasible bounds: maximum weights sum to {hi:.6} < {BUDGET}"
      ));
    }
    Ok(Self { lower, upper })
  }

  pub fn dim(&self) -> usize {
    self.lower.len()
  }

  pub fn lower(&self) -> &[f64] {
    &self.lower
  }

  pub fn upper(&self) -> &[f64] {
    &self.upper
  }

  /// Euclidean projection onto the feasible set.
  ///
  /// Solves `sum(clip(x - tau, l, u)) = 1` for the shift `tau` by bisection.
  pub fn project(&self, x: &[f64]) -> Vec<f64> {
    let mut lo = x
      .iter()
      .zip(&self.upper)
      .map(|(v, u)| v - u)
      .fold(f64::INFINITY, f64::min);
    let mut hi = x
      .iter()
      .zip(&self.lower)
      .map(|(v, l)| v - l)
      .fold(f64::NEG_INFINITY, f64::max);

    for _ in 0..BISECTION_STEPS {
      let mid = 0.5 * (lo + hi);
      if self.shifted(x, mid).sum::<f64>() > BUDGET {
        lo = mid;
      } else {
        hi = mid;
      }
      if hi - lo <= f64::EPSILON * (1.0 + lo.abs().max(hi.abs())) {
        break;
      }
    }

    let mut w: Vec<f64> = self.shifted(x, 0.5 * (lo + hi)).collect();

    // absorb rounding left by the bisection into the interior coordinates
    let interior: Vec<usize> = (0..w.len())
      .filter(|&i| w[i] > self.lower[i] && w[i] < self.upper[i])
      .collect();
    if !interior.is_empty() {
      let share = (BUDGET - w.iter().sum::<f64>()) / interior.len() as f64;
      for i in interior {
        w[i] = (w[i] + share).clamp(self.lower[i], self.upper[i]);
      }
    }
    w
  }

  fn shifted<'a>(&'a self, x: &'a [f64], tau: f64) -> impl Iterator<Item = f64> + 'a {
    x.iter()
      .zip(self.lower.iter().zip(&self.upper))
      .map(move |(v, (l, u))| (v - tau).clamp(*l, *u))
  }
}

/// Placement of free and fixed weights inside the full asset vector.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightLayout {
  n_total: usize,
  free: Vec<usize>,
  fixed: Vec<(usize, f64)>,
}

impl WeightLayout {
  /// Every asset is free.
  pub fn full(n_total: usize) -> Self {
    Self {
      n_total,
      free: (0..n_total).collect(),
      fixed: Vec::new(),
    }
  }

  /// `free` slots are optimized, `fixed` slots keep their weight, the rest stay at zero.
  pub fn partial(n_total: usize, free: Vec<usize>, fixed: Vec<(usize, f64)>) -> Self {
    Self {
      n_total,
      free,
      fixed,
    }
  }

  pub fn free(&self) -> &[usize] {
    &self.free
  }

  pub fn fixed(&self) -> &[(usize, f64)] {
    &self.fixed
  }

  /// Whether this layout addresses exactly `n_assets` slots with `n_free` free ones.
  pub fn fits(&self, n_assets: usize, n_free: usize) -> bool {
    self.n_total == n_assets
      && self.free.len() == n_free
      && self
        .free
        .iter()
        .chain(self.fixed.iter().map(|(i, _)| i))
        .all(|&i| i < n_assets)
  }

  /// Rebuild the full weight vector from the free block.
  pub fn scatter(&self, free_weights: &[f64]) -> Vec<f64> {
    let mut w = vec![0.0; self.n_total];
    for (&i, &v) in self.free.iter().zip(free_weights) {
      w[i] = v;
    }
    for &(i, v) in &self.fixed {
      w[i] = v;
    }
    w
  }
}

/// One optimization problem over an engine's assets.
#[derive(Clone, Debug)]
pub struct WeightProblem {
  pub objective: ObjectiveType,
  pub risk_free_rate: f64,
  pub layout: WeightLayout,
  pub feasible: FeasibleSet,
}

#[derive(Clone)]
struct ObjectiveCost {
  metrics: MetricsEngine,
  objective: ObjectiveType,
  risk_free_rate: f64,
  layout: WeightLayout,
  feasible: FeasibleSet,
}

impl ObjectiveCost {
  fn weights(&self, x: &[f64]) -> Vec<f64> {
    self.layout.scatter(&self.feasible.project(x))
  }

  fn evaluate(&self, x: &[f64]) -> f64 {
    if x.iter().any(|v| !v.is_finite()) {
      return PENALTY;
    }
    let m = self.metrics.compute(&self.weights(x), self.risk_free_rate);
    self.objective.cost(&m)
  }
}

impl CostFunction for ObjectiveCost {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    Ok(self.evaluate(x))
  }
}

struct Run {
  param: Vec<f64>,
  cost: f64,
  iters: u64,
  converged: bool,
  reason: String,
}

/// Minimizes an [`ObjectiveType`] over a [`WeightProblem`].
#[derive(Clone, Debug)]
pub struct ConstrainedOptimizer {
  metrics: MetricsEngine,
  config: SolverConfig,
}

impl ConstrainedOptimizer {
  pub fn new(metrics: MetricsEngine, config: SolverConfig) -> Self {
    Self { metrics, config }
  }

  pub fn config(&self) -> &SolverConfig {
    &self.config
  }

  /// Run the solver. Failures are reported in the result, never panicked.
  pub fn solve(&self, problem: &WeightProblem) -> OptimizationResult {
    let n_free = problem.feasible.dim();
    if n_free == 0 {
      return OptimizationResult::failed("no free assets to optimize");
    }
    if !problem.layout.fits(self.metrics.n_assets(), n_free) {
      return OptimizationResult::failed(format!(
        "weight layout does not match {} assets with {} free",
        self.metrics.n_assets(),
        n_free
      ));
    }

    let cost = ObjectiveCost {
      metrics: self.metrics.clone(),
      objective: problem.objective,
      risk_free_rate: problem.risk_free_rate,
      layout: problem.layout.clone(),
      feasible: problem.feasible.clone(),
    };

    info!(
      objective = %problem.objective,
      free = n_free,
      fixed = problem.layout.fixed().len(),
      "starting optimization"
    );

    let start = problem.feasible.project(&vec![BUDGET / n_free as f64; n_free]);
    let mut best = start.clone();
    let mut best_cost = cost.evaluate(&start);
    let mut iterations = 0;

    if n_free > 1 {
      let cap = self.config.iteration_cap(n_free);
      let mut converged = false;
      let mut last_reason = String::new();

      // each run restarts from the incumbent with a fresh simplex
      for run_idx in 0..=self.config.max_restarts {
        let run = match self.nelder_mead(cost.clone(), &best, cap) {
          Ok(run) => run,
          Err(err) if run_idx == 0 => {
            warn!(%err, "solver error");
            return OptimizationResult::failed(format!("solver error: {err}"));
          }
          Err(err) => {
            debug!(run = run_idx, %err, "restart aborted");
            break;
          }
        };
        iterations += run.iters;
        let improvement = best_cost - run.cost;
        if run.cost < best_cost {
          best = run.param;
          best_cost = run.cost;
        }
        debug!(
          run = run_idx,
          iters = run.iters,
          converged = run.converged,
          improvement,
          cost = best_cost,
          "nelder-mead run finished"
        );

        converged |= run.converged;
        last_reason = run.reason;
        if run.converged && improvement <= self.config.sd_tolerance {
          break;
        }
      }

      if !converged {
        warn!(iterations, reason = %last_reason, "optimization did not converge");
        return OptimizationResult::failed(format!(
          "optimization did not converge: {last_reason} after {iterations} iterations (best cost {best_cost:.6e})"
        ));
      }
    }

    if best_cost >= PENALTY {
      let hint = if problem.objective.requires_reference() && self.metrics.series().reference().is_none() {
        "objective requires a reference series"
      } else {
        "no feasible portfolio leaves the penalty region"
      };
      warn!(objective = %problem.objective, cost = best_cost, "stuck on penalty plateau");
      return OptimizationResult::failed(format!(
        "optimization did not converge: {hint} (cost {best_cost:.6e})"
      ));
    }

    let weights = cost.weights(&best);
    let metrics = self.metrics.compute(&weights, problem.risk_free_rate);

    info!(
      objective = %problem.objective,
      iterations,
      cost = best_cost,
      "optimization converged"
    );

    OptimizationResult::Converged {
      weights,
      metrics: Box::new(metrics),
      assets: self.metrics.series().assets().to_vec(),
      iterations,
      cost: best_cost,
    }
  }

  /// One run with dimension-adapted expansion and shrink coefficients
  /// (Gao & Han); contraction stays at the 0.5 ceiling argmin allows.
  fn nelder_mead(
    &self,
    cost: ObjectiveCost,
    start: &[f64],
    cap: u64,
  ) -> Result<Run, argmin::core::Error> {
    let n = start.len() as f64;
    let simplex = initial_simplex(start, self.config.initial_step);
    let solver = NelderMead::new(simplex)
      .with_sd_tolerance(self.config.sd_tolerance)?
      .with_gamma(1.0 + 2.0 / n)?
      .with_sigma(1.0 - 1.0 / n)?;
    let res = Executor::new(cost, solver)
      .configure(|state| state.max_iters(cap))
      .run()?;

    let state = res.state();
    let reason = state.get_termination_reason();
    Ok(Run {
      param: state
        .get_best_param()
        .cloned()
        .unwrap_or_else(|| start.to_vec()),
      cost: state.get_best_cost(),
      iters: state.get_iter(),
      converged: matches!(
        reason,
        Some(TerminationReason::SolverConverged | TerminationReason::TargetCostReached)
      ),
      reason: reason.map_or_else(|| "not terminated".to_string(), |r| format!("{r:?}")),
    })
  }
}

fn initial_simplex(start: &[f64], step: f64) -> Vec<Vec<f64>> {
  let mut simplex = Vec::with_capacity(start.len() + 1);
  simplex.push(start.to_vec());
  for i in 0..start.len() {
    let mut point = start.to_vec();
    point[i] += step;
    simplex.push(point);
  }
  simplex
}
