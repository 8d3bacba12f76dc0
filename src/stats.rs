//! # Stats
//!
//! $$
//! y_t = \alpha + \beta t + \varepsilon_t
//! $$
//!
pub mod risk;
pub mod trend;
