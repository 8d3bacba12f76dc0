//! # Risk
//!
//! $$
//! \mathrm{VaR}_\alpha = \mu - z_\alpha \sigma,\qquad
//! \mathrm{CVaR}_\alpha = \frac{1}{k}\sum_{i=1}^{k} r_{(i)},\ k=\max(1,\lfloor n\alpha\rfloor)
//! $$
//!
//! Dispersion and tail-loss estimates over a daily return series.

use statrs::statistics::Statistics;

/// z-multiplier for the 95% parametric VaR.
pub const Z_95: f64 = 1.65;
/// z-multiplier for the 99% parametric VaR.
pub const Z_99: f64 = 2.33;

/// Population (ddof = 0) standard deviation; zero for an empty sample.
pub fn population_std(xs: &[f64]) -> f64 {
  if xs.is_empty() {
    return 0.0;
  }
  let sd = xs.iter().population_std_dev();
  if sd.is_finite() {
    sd
  } else {
    0.0
  }
}

/// Arithmetic mean; zero for an empty sample.
pub fn mean(xs: &[f64]) -> f64 {
  if xs.is_empty() {
    0.0
  } else {
    xs.iter().sum::<f64>() / xs.len() as f64
  }
}

/// Population standard deviation of the strictly negative observations.
///
/// Returns `None` when no observation is negative.
pub fn downside_std(xs: &[f64]) -> Option<f64> {
  let negatives: Vec<f64> = xs.iter().copied().filter(|&x| x < 0.0).collect();
  if negatives.is_empty() {
    None
  } else {
    Some(population_std(&negatives))
  }
}

/// Parametric (normal) Value-at-Risk, daily and annualized.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ParametricVar {
  pub daily_95: f64,
  pub daily_99: f64,
  /// Re-derived from `periods * mu` and `sqrt(periods) * sigma`.
  pub annual_95: f64,
  pub annual_99: f64,
}

impl ParametricVar {
  pub fn new(mu: f64, sigma: f64, periods_per_year: f64) -> Self {
    let mu_annual = mu * periods_per_year;
    let sigma_annual = sigma * periods_per_year.sqrt();
    Self {
      daily_95: mu - Z_95 * sigma,
      daily_99: mu - Z_99 * sigma,
      annual_95: mu_annual - Z_95 * sigma_annual,
      annual_99: mu_annual - Z_99 * sigma_annual,
    }
  }
}

/// Historical Conditional VaR: mean of the worst tail observations.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HistoricalCvar {
  pub daily_95: f64,
  pub daily_99: f64,
  /// `daily_95 * periods_per_year`.
  pub annual_95: f64,
  pub annual_99: f64,
}

impl HistoricalCvar {
  /// Sorts `scratch` in place; its contents are the daily returns on entry.
  pub fn from_scratch(scratch: &mut [f64], periods_per_year: f64) -> Self {
    if scratch.is_empty() {
      return Self::default();
    }

    scratch.sort_unstable_by(f64::total_cmp);
    let daily_95 = tail_mean(scratch, 0.05);
    let daily_99 = tail_mean(scratch, 0.01);

    Self {
      daily_95,
      daily_99,
      annual_95: daily_95 * periods_per_year,
      annual_99: daily_99 * periods_per_year,
    }
  }
}

fn tail_mean(sorted: &[f64], alpha: f64) -> f64 {
  let k = ((sorted.len() as f64 * alpha).floor() as usize).clamp(1, sorted.len());
  sorted[..k].iter().sum::<f64>() / k as f64
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  #[test]
  fn population_std_uses_ddof_zero() {
    let xs = [0.002, 0.018, 0.009, 0.011];
    // mean 0.01, squared deviations 64e-6, 64e-6, 1e-6, 1e-6
    assert_abs_diff_eq!(population_std(&xs), (130e-6_f64 / 4.0).sqrt(), epsilon = 1e-12);
    assert_eq!(population_std(&[]), 0.0);
  }

  #[test]
  fn downside_std_only_sees_negative_returns() {
    assert_eq!(downside_std(&[0.01, 0.0, 0.02]), None);
    assert_abs_diff_eq!(downside_std(&[-0.01, 0.5, -0.03]).unwrap(), 0.01, epsilon = 1e-12);
    assert_abs_diff_eq!(downside_std(&[-0.02, 0.1]).unwrap(), 0.0, epsilon = 1e-12);
  }

  #[test]
  fn downside_std_survives_large_offsets() {
    // E[x²] - m² cancels to zero here; the true spread is 1
    let xs = [-1e8 - 1.0, 3.0, -1e8 + 1.0];
    assert_abs_diff_eq!(downside_std(&xs).unwrap(), 1.0, epsilon = 1e-6);
  }

  #[test]
  fn annual_var_is_rederived_not_scaled() {
    let var = ParametricVar::new(0.001, 0.01, 252.0);

    assert_abs_diff_eq!(var.daily_95, 0.001 - 0.0165, epsilon = 1e-12);
    assert_abs_diff_eq!(var.daily_99, 0.001 - 0.0233, epsilon = 1e-12);
    assert_abs_diff_eq!(
      var.annual_95,
      0.252 - 1.65 * 0.01 * 252f64.sqrt(),
      epsilon = 1e-12
    );
    assert!((var.annual_95 - var.daily_95 * 252.0).abs() > 1e-3);
  }

  #[test]
  fn cvar_takes_at_least_one_observation() {
    let mut xs = vec![0.01, -0.04, 0.02, -0.01];
    let cvar = HistoricalCvar::from_scratch(&mut xs, 252.0);

    assert_abs_diff_eq!(cvar.daily_95, -0.04, epsilon = 1e-15);
    assert_abs_diff_eq!(cvar.daily_99, -0.04, epsilon = 1e-15);
    assert_abs_diff_eq!(cvar.annual_95, -0.04 * 252.0, epsilon = 1e-12);
  }

  #[test]
  fn cvar_95_averages_worst_five_percent() {
    let mut xs: Vec<f64> = (0..100).map(|i| i as f64 / 1000.0 - 0.05).collect();
    let cvar = HistoricalCvar::from_scratch(&mut xs, 252.0);

    // worst five: -0.050 .. -0.046
    assert_abs_diff_eq!(cvar.daily_95, -0.048, epsilon = 1e-12);
    assert_abs_diff_eq!(cvar.daily_99, -0.050, epsilon = 1e-12);
  }
}
