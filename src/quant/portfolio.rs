//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Price tables, return statistics and mean-variance portfolio optimization.

pub mod data;
pub mod engine;
pub mod optimizers;
pub mod solver;
pub mod statistics;
pub mod types;

pub use data::DateWindow;
pub use data::PricePoint;
pub use data::PriceTable;
pub use engine::OptimizationConfig;
pub use engine::OptimizationEngine;
pub use engine::clean_weights;
pub use engine::portfolio_performance;
pub use optimizers::MeanVariance;
pub use optimizers::SolverSettings;
pub use solver::FeasibleSet;
pub use solver::ProjectedGradient;
pub use statistics::ReturnKind;
pub use statistics::StatisticsConfig;
pub use statistics::StatisticsEngine;
pub use statistics::StatisticsSnapshot;
pub use statistics::TRADING_DAYS;
pub use types::ObjectiveKind;
pub use types::ObjectiveParameters;
pub use types::OptimizationObjective;
pub use types::PerformanceMetrics;
pub use types::Security;
pub use types::WeightDistribution;
