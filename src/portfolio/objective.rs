//! # Portfolio Objectives
//!
//! $$
//! c_{\mathrm{hc10}}(\mathbf{w}) =
//! \begin{cases}
//! \dfrac{(1-R^2)\,\sigma}{\beta} & \beta > \varepsilon \\\\
//! P - \beta & \beta < -\varepsilon \\\\
//! P & |\beta| \le \varepsilon
//! \end{cases}
//! $$
//!
//! Named objectives mapped to a scalar cost; the solver minimizes, so ratios
//! to be maximized are negated and trend-quality ratios are inverted.

use std::fmt;
use std::str::FromStr;

use super::metrics::MetricsResult;
use crate::error::ConfigurationError;
use crate::stats::trend::LinearTrend;

/// Cost assigned to invalid regions (no reference, flat or falling trend).
pub const PENALTY: f64 = 1e10;
/// Trend slopes within `±SLOPE_EPSILON` count as flat.
pub const SLOPE_EPSILON: f64 = 1e-6;
/// Minimum R² for `quality_linear` to be defined.
pub const MIN_R_SQUARED: f64 = 0.001;

/// Supported optimization objectives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ObjectiveType {
  /// Maximize `(gv_final - rf) / volatility`.
  #[default]
  Sharpe,
  /// Maximize `(gv_final - rf) / downside deviation`.
  Sortino,
  /// Minimize annualized volatility.
  Volatility,
  /// Maximize the slope of the cumulative curve.
  Slope,
  /// Maximize HC10 through its inverse.
  Hc10,
  /// Low excess volatility with a high excess R².
  QualityLinear,
  /// HC10 of the portfolio-minus-reference curve.
  ExcessHc10,
  /// Maximize annualized return.
  Return,
}

impl ObjectiveType {
  pub const ALL: [ObjectiveType; 8] = [
    Self::Sharpe,
    Self::Sortino,
    Self::Volatility,
    Self::Slope,
    Self::Hc10,
    Self::QualityLinear,
    Self::ExcessHc10,
    Self::Return,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Sharpe => "sharpe",
      Self::Sortino => "sortino",
      Self::Volatility => "volatility",
      Self::Slope => "slope",
      Self::Hc10 => "hc10",
      Self::QualityLinear => "quality_linear",
      Self::ExcessHc10 => "excess_hc10",
      Self::Return => "return",
    }
  }

  pub fn requires_reference(&self) -> bool {
    matches!(self, Self::QualityLinear | Self::ExcessHc10)
  }

  /// Scalar cost to minimize. Never NaN or infinite.
  pub fn cost(&self, m: &MetricsResult) -> f64 {
    let cost = match self {
      Self::Sharpe => -m.sharpe,
      Self::Sortino => -m.sortino,
      Self::Volatility => m.volatility,
      Self::Slope => -m.trend.slope,
      Self::Return => -m.annual_return,
      Self::Hc10 => inverse_hc10(&m.trend, m.volatility),
      Self::QualityLinear => match &m.excess {
        Some(excess) => quality_linear(&excess.trend, excess.volatility),
        None => PENALTY,
      },
      Self::ExcessHc10 => match &m.excess {
        Some(excess) => inverse_hc10(&excess.trend, excess.volatility),
        None => PENALTY,
      },
    };

    if cost.is_finite() {
      cost
    } else {
      PENALTY
    }
  }
}

/// `(1 - R²)·σ / β` for rising, noisy trends; a penalty that keeps growing as
/// the slope turns more negative. Zero volatility or a perfect fit has no
/// defined HC10 and sits on the flat penalty.
fn inverse_hc10(trend: &LinearTrend, volatility: f64) -> f64 {
  let slope = trend.slope;
  if slope > SLOPE_EPSILON && volatility > 0.0 && trend.r_squared < 1.0 {
    (1.0 - trend.r_squared) * volatility / slope
  } else if slope < -SLOPE_EPSILON {
    PENALTY - slope
  } else {
    PENALTY
  }
}

fn quality_linear(trend: &LinearTrend, volatility: f64) -> f64 {
  let r2 = trend.r_squared;
  if r2 > MIN_R_SQUARED && volatility > 0.0 {
    volatility * (1.0 - r2) / r2
  } else {
    PENALTY
  }
}

impl fmt::Display for ObjectiveType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ObjectiveType {
  type Err = ConfigurationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let key = s.trim().to_lowercase().replace('-', "_");
    Self::ALL
      .into_iter()
      .find(|o| o.as_str() == key)
      .ok_or_else(|| ConfigurationError::UnknownObjective(s.to_string()))
  }
}
