//! # Errors
//!
//! Input problems the caller has to fix before an optimization is meaningful.
//! Solver failures are not errors: they come back as
//! [`OptimizationResult::Failed`](crate::portfolio::OptimizationResult::Failed).

use thiserror::Error;

/// Configuration errors raised while building a return series or validating a request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
  #[error("input table has no date column")]
  MissingDateColumn,

  #[error("no asset columns left after preprocessing")]
  NoAssets,

  #[error("return matrix is empty after dropping non-numeric rows")]
  EmptyMatrix,

  #[error("unknown asset: {0}")]
  UnknownAsset(String),

  #[error("unknown objective: {0}")]
  UnknownObjective(String),

  #[error("invalid bounds for {asset}: min {min} > max {max}")]
  InvalidBounds { asset: String, min: f64, max: f64 },

  #[error("dimension mismatch: expected {expected} values, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("missing weight for short asset {0}")]
  MissingShortWeight(String),

  #[error("asset {0} is listed both as selected and as short")]
  OverlappingAssets(String),

  #[error("reference series has {actual} periods, return matrix has {expected}")]
  ReferenceLength { expected: usize, actual: usize },
}
