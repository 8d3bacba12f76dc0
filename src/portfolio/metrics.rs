//! # Portfolio Metrics
//!
//! $$
//! g_t = \sum_{s\le t} \mathbf{r}_s^\top \mathbf{w},\qquad
//! \sigma = \sqrt{252}\,\operatorname{sd}_0(\mathbf{R}\mathbf{w}),\qquad
//! \mathrm{SR} = \frac{g_T - r_f}{\sigma}
//! $$
//!
//! Full risk/return battery for one weight vector. Accumulation is additive
//! (base-0), never compounded; only the annualized return compounds.

use std::sync::Arc;

use ndarray::Array1;
use ndarray::ArrayView1;
use ndarray::Axis;

use super::data::ReturnSeries;
use crate::stats::risk::HistoricalCvar;
use crate::stats::risk::ParametricVar;
use crate::stats::risk::downside_std;
use crate::stats::risk::mean;
use crate::stats::risk::population_std;
use crate::stats::trend::LinearTrend;
use crate::stats::trend::time_index;

/// Trading periods per year used for annualization.
pub const PERIODS_PER_YEAR: f64 = 252.0;

/// Portfolio-minus-reference statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct ExcessMetrics {
  /// Portfolio cumulative minus reference cumulative.
  pub cumulative: Array1<f64>,
  pub trend: LinearTrend,
  /// Annualized population stdev of `daily - reference`.
  pub volatility: f64,
  pub hc10: f64,
}

/// Every statistic derived from one weight vector.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsResult {
  pub daily_returns: Array1<f64>,
  /// Running sum of `daily_returns`.
  pub cumulative_returns: Array1<f64>,
  /// Last value of `cumulative_returns`.
  pub gv_final: f64,
  pub annual_return: f64,
  pub volatility: f64,
  pub risk_free_rate: f64,
  /// `gv_final - risk_free_rate`.
  pub excess_return: f64,
  pub sharpe: f64,
  pub sortino: f64,
  /// Annualized; zero when no period is negative.
  pub downside_deviation: f64,
  pub var: ParametricVar,
  pub cvar: HistoricalCvar,
  pub trend: LinearTrend,
  pub hc10: f64,
  pub excess: Option<ExcessMetrics>,
}

impl MetricsResult {
  pub fn slope(&self) -> f64 {
    self.trend.slope
  }

  pub fn r_squared(&self) -> f64 {
    self.trend.r_squared
  }
}

/// Stateless evaluator over a shared, immutable [`ReturnSeries`].
///
/// Cloning is cheap; only the reference cumulative curve and the time index
/// are precomputed, since they do not depend on the weights.
#[derive(Clone, Debug)]
pub struct MetricsEngine {
  series: Arc<ReturnSeries>,
  reference_cumulative: Option<Arc<Array1<f64>>>,
  time_index: Arc<[f64]>,
  periods_per_year: f64,
}

impl MetricsEngine {
  pub fn new(series: Arc<ReturnSeries>, periods_per_year: f64) -> Self {
    let reference_cumulative = series.reference().map(|r| Arc::new(running_sum(r.view())));
    let time_index = time_index(series.n_periods()).into();

    Self {
      series,
      reference_cumulative,
      time_index,
      periods_per_year,
    }
  }

  pub fn series(&self) -> &ReturnSeries {
    &self.series
  }

  pub fn n_assets(&self) -> usize {
    self.series.n_assets()
  }

  pub fn periods_per_year(&self) -> f64 {
    self.periods_per_year
  }

  /// Compute the full metric battery.
  ///
  /// `weights.len()` must equal the number of assets; public callers go
  /// through [`PortfolioEngine::metrics`](super::engine::PortfolioEngine::metrics),
  /// which checks it.
  pub(crate) fn compute(&self, weights: &[f64], risk_free_rate: f64) -> MetricsResult {
    debug_assert_eq!(weights.len(), self.series.n_assets());

    let daily = self.series.returns().dot(&ArrayView1::from(weights));
    let cumulative = running_sum(daily.view());
    let n = daily.len();
    let ann = self.periods_per_year.sqrt();

    let daily_slice = daily.as_slice().unwrap_or(&[]);
    let sigma = population_std(daily_slice);
    let mu = mean(daily_slice);
    let volatility = sigma * ann;

    let gv_final = n.checked_sub(1).map_or(0.0, |last| cumulative[last]);
    let excess_return = gv_final - risk_free_rate;
    let sharpe = ratio(excess_return, volatility);

    let downside_deviation = downside_std(daily_slice).map_or(0.0, |sd| sd * ann);
    let sortino = ratio(excess_return, downside_deviation);

    let annual_return = annualize(gv_final, n, self.periods_per_year);

    let var = ParametricVar::new(mu, sigma, self.periods_per_year);
    let mut scratch = daily.to_vec();
    let cvar = HistoricalCvar::from_scratch(&mut scratch, self.periods_per_year);

    let trend = LinearTrend::fit(&self.time_index, cumulative.as_slice().unwrap_or(&[]));
    let hc10 = trend.hc10(volatility);

    let excess = self.excess_metrics(&daily, &cumulative, &mut scratch);

    MetricsResult {
      daily_returns: daily,
      cumulative_returns: cumulative,
      gv_final,
      annual_return,
      volatility,
      risk_free_rate,
      excess_return,
      sharpe,
      sortino,
      downside_deviation,
      var,
      cvar,
      trend,
      hc10,
      excess,
    }
  }

  fn excess_metrics(
    &self,
    daily: &Array1<f64>,
    cumulative: &Array1<f64>,
    scratch: &mut [f64],
  ) -> Option<ExcessMetrics> {
    let reference = self.series.reference()?;
    let reference_cumulative = self.reference_cumulative.as_ref()?;

    for ((s, d), r) in scratch.iter_mut().zip(daily.iter()).zip(reference.iter()) {
      *s = d - r;
    }
    let volatility = population_std(scratch) * self.periods_per_year.sqrt();

    let cumulative = cumulative - &**reference_cumulative;
    let trend = LinearTrend::fit(&self.time_index, cumulative.as_slice().unwrap_or(&[]));

    Some(ExcessMetrics {
      hc10: trend.hc10(volatility),
      cumulative,
      trend,
      volatility,
    })
  }
}

fn running_sum(xs: ArrayView1<f64>) -> Array1<f64> {
  let mut out = xs.to_owned();
  out.accumulate_axis_inplace(Axis(0), |&prev, curr| *curr += prev);
  out
}

fn ratio(num: f64, den: f64) -> f64 {
  if den > 0.0 {
    num / den
  } else {
    0.0
  }
}

/// `(1 + g)^(periods / n) - 1`; a wiped-out portfolio (`g <= -1`) annualizes to `-1`.
fn annualize(gv_final: f64, n_periods: usize, periods_per_year: f64) -> f64 {
  if n_periods == 0 {
    return 0.0;
  }
  let base = 1.0 + gv_final;
  if base <= 0.0 {
    return -1.0;
  }
  base.powf(periods_per_year / n_periods as f64) - 1.0
}
