//! # Portfolio
//!
//! $$
//! \mathbf{w}^\* = \arg\min_{\mathbf{w}}\ c(\mathbf{w})\quad
//! \text{s.t.}\ \mathbf{1}^\top\mathbf{w}_S = 1,\ l \le \mathbf{w}_S \le u
//! $$
//!
//! Base-0 return ingestion, portfolio metrics, objectives and constrained
//! weight optimization.

pub mod data;
pub mod engine;
pub mod metrics;
pub mod objective;
pub mod optimizers;
pub mod summary;
pub mod types;

pub use data::ReferenceDetector;
pub use data::ReturnSeries;
pub use data::ReturnTable;
pub use data::base_zero_returns;
pub use engine::EngineConfig;
pub use engine::PortfolioEngine;
pub use metrics::ExcessMetrics;
pub use metrics::MetricsEngine;
pub use metrics::MetricsResult;
pub use objective::ObjectiveType;
pub use optimizers::ConstrainedOptimizer;
pub use optimizers::SolverConfig;
pub use summary::summarize;
pub use summary::to_table;
pub use types::AllocationRow;
pub use types::OptimizationRequest;
pub use types::OptimizationResult;
pub use types::ShortRequest;
pub use types::WeightBounds;
