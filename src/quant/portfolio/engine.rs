//! # Optimization Engine
//!
//! $$
//! \mathbf{w}^\* = \operatorname{clean}\big(\operatorname{Optimize}(\mu, \Sigma, \text{objective})\big)
//! $$
//!
//! Entry point that dispatches an [`OptimizationObjective`], cleans the raw
//! weights and reports their performance.

use tracing::debug;
use tracing::info;

use super::optimizers::MeanVariance;
use super::optimizers::SolverSettings;
use super::optimizers::efficient_return;
use super::optimizers::efficient_risk;
use super::optimizers::max_quadratic_utility;
use super::optimizers::max_sharpe;
use super::optimizers::min_volatility;
use super::statistics::StatisticsSnapshot;
use super::types::OptimizationObjective;
use super::types::PerformanceMetrics;
use super::types::WeightDistribution;
use crate::error::Result;

/// Runtime configuration for [`OptimizationEngine`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OptimizationConfig {
  /// Risk-free rate for Sharpe ratios of objectives that carry none.
  pub risk_free_rate: f64,
  /// Weights with smaller magnitude are zeroed.
  pub clean_cutoff: f64,
  /// Decimal places kept after cleaning, `None` keeps full precision.
  pub clean_rounding: Option<u32>,
  pub solver: SolverSettings,
}

impl Default for OptimizationConfig {
  fn default() -> Self {
    Self {
      risk_free_rate: 0.02,
      clean_cutoff: 1e-4,
      clean_rounding: Some(5),
      solver: SolverSettings::default(),
    }
  }
}

/// Single entry point for mean-variance optimization.
#[derive(Clone, Debug, Default)]
pub struct OptimizationEngine {
  config: OptimizationConfig,
}

impl OptimizationEngine {
  /// Construct a new engine with explicit configuration.
  pub fn new(config: OptimizationConfig) -> Self {
    Self { config }
  }

  /// Borrow engine configuration.
  pub fn config(&self) -> &OptimizationConfig {
    &self.config
  }

  /// Optimize, clean and evaluate weights for `objective`.
  ///
  /// Weights follow the label order of `stats`; metrics are computed from
  /// the cleaned weights.
  pub fn solve(
    &self,
    stats: &StatisticsSnapshot,
    objective: &OptimizationObjective,
  ) -> Result<(WeightDistribution, PerformanceMetrics)> {
    objective.validate()?;
    let problem = MeanVariance::new(stats, self.config.solver)?;

    info!(
      objective = %objective.kind(),
      assets = stats.n_assets(),
      market_neutral = objective.market_neutral(),
      "optimizing portfolio"
    );

    let raw = match *objective {
      OptimizationObjective::MaxSharpe { risk_free_rate } => max_sharpe(&problem, risk_free_rate),
      OptimizationObjective::MinVolatility => min_volatility(&problem),
      OptimizationObjective::MaxQuadraticUtility {
        risk_aversion,
        market_neutral,
      } => max_quadratic_utility(&problem, risk_aversion, market_neutral),
      OptimizationObjective::EfficientRisk {
        target_volatility,
        market_neutral,
      } => efficient_risk(&problem, target_volatility, market_neutral),
      OptimizationObjective::EfficientReturn {
        target_return,
        market_neutral,
      } => efficient_return(&problem, target_return, market_neutral),
    }?;

    let weights = clean_weights(&raw, self.config.clean_cutoff, self.config.clean_rounding);
    let risk_free_rate = objective
      .risk_free_rate()
      .unwrap_or(self.config.risk_free_rate);
    let metrics = portfolio_performance(stats, &weights, risk_free_rate);

    debug!(
      expected_return = metrics.expected_return,
      volatility = metrics.volatility,
      sharpe = metrics.sharpe_ratio,
      "portfolio performance"
    );

    Ok((WeightDistribution::from_parts(stats.labels(), &weights), metrics))
  }
}

/// Zero weights below `cutoff` in magnitude, then round to `rounding` places.
pub fn clean_weights(weights: &[f64], cutoff: f64, rounding: Option<u32>) -> Vec<f64> {
  weights
    .iter()
    .map(|&w| {
      let w = if w.abs() < cutoff { 0.0 } else { w };
      match rounding {
        Some(places) => {
          let scale = 10f64.powi(places as i32);
          let r = (w * scale).round() / scale;
          // avoid printing -0
          if r == 0.0 { 0.0 } else { r }
        }
        None => w,
      }
    })
    .collect()
}

/// Expected return, volatility and Sharpe ratio of `weights`.
///
/// The Sharpe ratio is 0 when volatility vanishes.
pub fn portfolio_performance(stats: &StatisticsSnapshot, weights: &[f64], risk_free_rate: f64) -> PerformanceMetrics {
  let mu = stats.mean_returns();
  let cov = stats.covariance();
  let n = weights.len().min(mu.len());

  let expected_return: f64 = (0..n).map(|i| weights[i] * mu[i]).sum();
  let mut variance = 0.0;
  for i in 0..n {
    for j in 0..n {
      variance += weights[i] * cov[[i, j]] * weights[j];
    }
  }
  let volatility = variance.max(0.0).sqrt();
  let sharpe_ratio = if volatility > 1e-15 {
    (expected_return - risk_free_rate) / volatility
  } else {
    0.0
  };

  PerformanceMetrics {
    expected_return,
    volatility,
    sharpe_ratio,
  }
}
