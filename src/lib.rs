//! # quant-allocator
//!
//! $$
//! \mathrm{HC10} = \frac{\beta}{\sigma\,(1-R^2)}
//! $$
//!
//! Constrained portfolio allocation over additive (base-0) return series.

pub mod error;
pub mod portfolio;
pub mod stats;

pub use error::ConfigurationError;
