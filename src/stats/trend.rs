//! # Trend
//!
//! $$
//! y_t = \alpha + \beta t + \varepsilon_t,\qquad
//! \mathrm{HC10}=\frac{\beta}{\sigma\,(1-R^2)}
//! $$
//!
//! Linear-trend fit of an accumulated return curve against the period index.

use linreg::linear_regression;

/// Ordinary least-squares fit of a series against `0, 1, 2, ...`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LinearTrend {
  /// Slope per period.
  pub slope: f64,
  /// Fitted value at period 0.
  pub intercept: f64,
  /// Squared Pearson correlation between the index and the series.
  pub r_squared: f64,
}

impl LinearTrend {
  /// Fit `y` against the matching prefix of `index`.
  ///
  /// `index` is normally the precomputed `0..n` ramp shared across calls.
  /// Fewer than two points, or a solver error from a constant index, yields
  /// a flat zero trend.
  pub fn fit(index: &[f64], y: &[f64]) -> Self {
    let n = index.len().min(y.len());
    if n < 2 {
      return Self::default();
    }

    let (x, y) = (&index[..n], &y[..n]);
    let (slope, intercept): (f64, f64) = match linear_regression(x, y) {
      Ok(fit) => fit,
      Err(_) => return Self::default(),
    };

    let r = pearson(x, y);
    Self {
      slope,
      intercept,
      r_squared: r * r,
    }
  }

  /// Trend-quality ratio `slope / (volatility * (1 - r^2))`.
  ///
  /// Zero when the volatility is not positive or the fit is perfect.
  pub fn hc10(&self, volatility: f64) -> f64 {
    if volatility > 0.0 && self.r_squared < 1.0 {
      self.slope / (volatility * (1.0 - self.r_squared))
    } else {
      0.0
    }
  }
}

/// Pearson correlation, zero when either side has no variance.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
  let n = x.len().min(y.len());
  if n < 2 {
    return 0.0;
  }

  let mx = x[..n].iter().sum::<f64>() / n as f64;
  let my = y[..n].iter().sum::<f64>() / n as f64;

  let mut cov = 0.0;
  let mut sx = 0.0;
  let mut sy = 0.0;

  for i in 0..n {
    let dx = x[i] - mx;
    let dy = y[i] - my;
    cov += dx * dy;
    sx += dx * dx;
    sy += dy * dy;
  }

  let denom = (sx * sy).sqrt();
  if denom < 1e-15 {
    0.0
  } else {
    (cov / denom).clamp(-1.0, 1.0)
  }
}

/// `0.0, 1.0, ..., (n - 1) as f64`.
pub fn time_index(n: usize) -> Vec<f64> {
  (0..n).map(|t| t as f64).collect()
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  #[test]
  fn fits_exact_line() {
    let x = time_index(5);
    let y: Vec<f64> = x.iter().map(|t| 0.5 + 0.02 * t).collect();
    let trend = LinearTrend::fit(&x, &y);

    assert_abs_diff_eq!(trend.slope, 0.02, epsilon = 1e-12);
    assert_abs_diff_eq!(trend.intercept, 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(trend.r_squared, 1.0, epsilon = 1e-12);
  }

  #[test]
  fn noisy_line_has_partial_fit() {
    let x = time_index(4);
    let y = [0.002, 0.020, 0.029, 0.040];
    let trend = LinearTrend::fit(&x, &y);

    assert_abs_diff_eq!(trend.slope, 0.0123, epsilon = 1e-12);
    assert!(trend.r_squared > 0.9 && trend.r_squared < 1.0);
    assert!(trend.hc10(0.2) > 0.0);
  }

  #[test]
  fn constant_series_is_flat() {
    let x = time_index(6);
    let trend = LinearTrend::fit(&x, &[0.01; 6]);

    assert_abs_diff_eq!(trend.slope, 0.0, epsilon = 1e-15);
    assert_eq!(trend.r_squared, 0.0);
    assert_eq!(trend.hc10(0.3), 0.0);
  }

  #[test]
  fn hc10_is_zero_without_volatility_or_for_perfect_fit() {
    let perfect = LinearTrend {
      slope: 0.01,
      intercept: 0.0,
      r_squared: 1.0,
    };
    let noisy = LinearTrend {
      r_squared: 0.5,
      ..perfect
    };

    assert_eq!(perfect.hc10(0.2), 0.0);
    assert_eq!(noisy.hc10(0.0), 0.0);
    assert_abs_diff_eq!(noisy.hc10(0.2), 0.1, epsilon = 1e-12);
  }

  #[test]
  fn single_point_is_flat() {
    assert_eq!(LinearTrend::fit(&[0.0], &[0.3]), LinearTrend::default());
  }
}
