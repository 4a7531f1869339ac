//! # Return Statistics
//!
//! $$
//! \mu_i = f\,\overline{r_i},\qquad \Sigma_{ij} = \frac{f}{T-1}\sum_t (r_{it}-\overline{r_i})(r_{jt}-\overline{r_j})
//! $$
//!
//! Annualized mean returns and sample covariance of daily returns.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::data::PriceTable;
use crate::error::PipelineError;
use crate::error::Result;

/// Trading days per year used to annualize daily statistics.
pub const TRADING_DAYS: f64 = 252.0;

/// How daily returns are derived from consecutive closes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnKind {
  /// `p_t / p_{t-1} - 1`
  #[default]
  Simple,
  /// `ln(p_t / p_{t-1})`
  Log,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatisticsConfig {
  /// Periods per year.
  pub frequency: f64,
  pub returns: ReturnKind,
  /// Report the geometric (CAGR) mean instead of the arithmetic one.
  pub compounding: bool,
}

impl Default for StatisticsConfig {
  fn default() -> Self {
    Self {
      frequency: TRADING_DAYS,
      returns: ReturnKind::Simple,
      compounding: false,
    }
  }
}

/// Mean-return vector and covariance matrix of one price table.
#[derive(Clone, Debug, PartialEq)]
pub struct StatisticsSnapshot {
  labels: Vec<String>,
  mean_returns: Array1<f64>,
  covariance: Array2<f64>,
  observations: usize,
}

impl StatisticsSnapshot {
  /// Assemble a snapshot from precomputed estimates.
  pub fn new(labels: Vec<String>, mean_returns: Vec<f64>, covariance: Vec<Vec<f64>>) -> Result<Self> {
    let n = labels.len();
    if mean_returns.len() != n || covariance.len() != n || covariance.iter().any(|r| r.len() != n) {
      return Err(PipelineError::InvalidParameter(format!(
        "statistics for {n} labels need {n} means and a {n}x{n} covariance"
      )));
    }

    let covariance = Array2::from_shape_fn((n, n), |(i, j)| covariance[i][j]);
    Ok(Self {
      labels,
      mean_returns: Array1::from(mean_returns),
      covariance,
      observations: 0,
    })
  }

  pub fn labels(&self) -> &[String] {
    &self.labels
  }

  pub fn mean_returns(&self) -> &Array1<f64> {
    &self.mean_returns
  }

  pub fn covariance(&self) -> &Array2<f64> {
    &self.covariance
  }

  pub fn n_assets(&self) -> usize {
    self.labels.len()
  }

  /// Number of daily returns the estimates were computed from.
  pub fn observations(&self) -> usize {
    self.observations
  }
}

/// Turns a complete [`PriceTable`] into a [`StatisticsSnapshot`].
#[derive(Clone, Debug, Default)]
pub struct StatisticsEngine {
  config: StatisticsConfig,
}

impl StatisticsEngine {
  pub fn new(config: StatisticsConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &StatisticsConfig {
    &self.config
  }

  pub fn compute(&self, table: &PriceTable) -> Result<StatisticsSnapshot> {
    if table.n_cols() == 0 {
      return Err(PipelineError::DegenerateInput(
        "no securities selected".to_string(),
      ));
    }

    let prices = table.dense()?;
    if prices.nrows() < 3 {
      return Err(PipelineError::InsufficientData(format!(
        "{} trading days in the window, at least 3 are required",
        prices.nrows()
      )));
    }
    if let Some(((row, col), p)) = prices
      .indexed_iter()
      .find(|(_, p)| !(p.is_finite() && **p > 0.0))
    {
      return Err(PipelineError::InsufficientData(format!(
        "non-positive close {p} for {} on {}",
        table.securities()[col].name,
        table.dates()[row]
      )));
    }

    let returns = self.daily_returns(&prices);
    let observations = returns.ncols();
    let f = self.config.frequency;

    let mean_returns = if self.config.compounding {
      let last = prices.nrows() - 1;
      Array1::from_shape_fn(prices.ncols(), |i| {
        (prices[[last, i]] / prices[[0, i]]).powf(f / observations as f64) - 1.0
      })
    } else {
      returns
        .mean_axis(Axis(1))
        .ok_or_else(|| PipelineError::InsufficientData("no daily returns".to_string()))?
        * f
    };

    let covariance = returns
      .cov(1.0)
      .map_err(|e| PipelineError::InsufficientData(e.to_string()))?
      * f;

    debug!(
      assets = table.n_cols(),
      observations, "computed annualized return statistics"
    );

    Ok(StatisticsSnapshot {
      labels: table.labels(),
      mean_returns,
      covariance,
      observations,
    })
  }

  /// Assets by observations matrix of daily returns.
  fn daily_returns(&self, prices: &Array2<f64>) -> Array2<f64> {
    let n_obs = prices.nrows() - 1;
    let kind = self.config.returns;
    Array2::from_shape_fn((prices.ncols(), n_obs), |(i, t)| {
      let ratio = prices[[t + 1, i]] / prices[[t, i]];
      match kind {
        ReturnKind::Simple => ratio - 1.0,
        ReturnKind::Log => ratio.ln(),
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use approx::assert_relative_eq;
  use chrono::NaiveDate;

  use super::*;
  use crate::quant::portfolio::data::PricePoint;
  use crate::quant::portfolio::types::Security;

  fn table(columns: &[&[Option<f64>]]) -> PriceTable {
    let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let securities = (0..columns.len())
      .map(|i| Security::new(format!("S{i}"), format!("Sec {i}")))
      .collect();
    let series = columns
      .iter()
      .map(|col| {
        col
          .iter()
          .enumerate()
          .map(|(k, &c)| PricePoint::new(start + chrono::Days::new(k as u64), c))
          .collect()
      })
      .collect();
    PriceTable::from_series(securities, series).unwrap()
  }

  #[test]
  fn annualizes_arithmetic_mean_and_sample_covariance() {
    let t = table(&[
      &[Some(100.0), Some(110.0), Some(99.0), Some(108.9)],
      &[Some(50.0), Some(51.0), Some(52.02), Some(53.0604)],
    ]);
    let stats = StatisticsEngine::default().compute(&t).unwrap();

    // asset 0 returns: 0.1, -0.1, 0.1 ; asset 1 returns: 0.02 each day
    let mu = stats.mean_returns();
    assert_relative_eq!(mu[0], 252.0 * 0.1 / 3.0, epsilon = 1e-9);
    assert_relative_eq!(mu[1], 252.0 * 0.02, epsilon = 1e-9);

    let cov = stats.covariance();
    let m: f64 = 0.1 / 3.0;
    let var0 = ((0.1 - m).powi(2) * 2.0 + (-0.1 - m).powi(2)) / 2.0;
    assert_relative_eq!(cov[[0, 0]], 252.0 * var0, epsilon = 1e-9);
    assert_abs_diff_eq!(cov[[1, 1]], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(cov[[0, 1]], cov[[1, 0]], epsilon = 1e-15);
    assert_eq!(stats.observations(), 3);
    assert_eq!(stats.labels(), &["Sec 0".to_string(), "Sec 1".to_string()]);
  }

  #[test]
  fn compounding_uses_geometric_growth() {
    let t = table(&[&[Some(100.0), Some(101.0), Some(102.01)]]);
    let engine = StatisticsEngine::new(StatisticsConfig {
      compounding: true,
      ..Default::default()
    });
    let stats = engine.compute(&t).unwrap();
    assert_relative_eq!(stats.mean_returns()[0], 1.01f64.powf(252.0) - 1.0, max_relative = 1e-9);
  }

  #[test]
  fn rejects_missing_cells() {
    let t = table(&[
      &[Some(100.0), Some(101.0), Some(102.0)],
      &[Some(10.0), None, Some(10.5)],
    ]);
    let err = StatisticsEngine::default().compute(&t).unwrap_err();
    assert!(matches!(err, PipelineError::InsufficientData(_)));
  }

  #[test]
  fn rejects_short_and_non_positive_series() {
    let short = table(&[&[Some(100.0), Some(101.0)]]);
    assert!(matches!(
      StatisticsEngine::default().compute(&short),
      Err(PipelineError::InsufficientData(_))
    ));

    let zero = table(&[&[Some(100.0), Some(0.0), Some(101.0)]]);
    assert!(matches!(
      StatisticsEngine::default().compute(&zero),
      Err(PipelineError::InsufficientData(_))
    ));
  }
}
