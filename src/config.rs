//! # Configuration
//!
//! $$
//! \text{TOML} \xrightarrow{\text{serde}} \texttt{PipelineConfig}
//! $$
//!
//! Input bounds and defaults of the pipeline. Every field has a default, so an
//! empty file is a valid configuration. Rates and targets are given in percent.

use std::path::Path;

use chrono::Days;
use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;

use crate::error::PipelineError;
use crate::error::Result;
use crate::quant::portfolio::DateWindow;
use crate::quant::portfolio::ObjectiveKind;
use crate::quant::portfolio::ObjectiveParameters;
use crate::quant::portfolio::OptimizationConfig;
use crate::quant::portfolio::ReturnKind;
use crate::quant::portfolio::StatisticsConfig;
use crate::visualization::Palette;
use crate::visualization::SectorGeometry;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// Most securities a portfolio may hold.
  pub max_portfolio_size: usize,
  /// How far back, in days from today, a window may start.
  pub lookback_days: u64,
  /// Length of the initial window, ending yesterday.
  pub default_window_days: u64,
  /// Exchange codes selected at start-up.
  pub default_securities: Vec<String>,
  pub default_objective: ObjectiveKind,
  /// Trading days per year.
  pub trading_days: f64,
  pub returns: ReturnKind,
  pub compounding: bool,
  /// Percent.
  pub default_risk_free_rate: f64,
  /// Percent.
  pub default_risk_target: f64,
  /// Percent.
  pub default_returns_target: f64,
  pub default_risk_aversion: f64,
  pub clean_cutoff: f64,
  pub clean_rounding: Option<u32>,
  pub sector_min_value: f64,
  pub palette: Palette,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      max_portfolio_size: 10,
      lookback_days: 1825,
      default_window_days: 365,
      default_securities: vec!["SBER".into(), "GAZP".into(), "LKOH".into()],
      default_objective: ObjectiveKind::MaxSharpe,
      trading_days: 252.0,
      returns: ReturnKind::Simple,
      compounding: false,
      default_risk_free_rate: 2.0,
      default_risk_target: 20.0,
      default_returns_target: 10.0,
      default_risk_aversion: 1.0,
      clean_cutoff: 1e-4,
      clean_rounding: Some(5),
      sector_min_value: crate::visualization::MIN_VALUE,
      palette: Palette::default(),
    }
  }
}

impl PipelineConfig {
  pub fn from_toml_str(content: &str) -> Result<Self> {
    let config: Self = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
      .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
    Self::from_toml_str(&content)
  }

  pub fn to_toml_string(&self) -> Result<String> {
    toml::to_string_pretty(self).map_err(|e| PipelineError::Config(e.to_string()))
  }

  pub fn validate(&self) -> Result<()> {
    if self.max_portfolio_size == 0 {
      return Err(PipelineError::Config(
        "max_portfolio_size must be at least 1".to_string(),
      ));
    }
    if self.default_securities.len() > self.max_portfolio_size {
      return Err(PipelineError::Config(format!(
        "{} default securities exceed max_portfolio_size {}",
        self.default_securities.len(),
        self.max_portfolio_size
      )));
    }
    if self.default_window_days == 0 || self.default_window_days >= self.lookback_days {
      return Err(PipelineError::Config(format!(
        "default_window_days must be in 1..{}",
        self.lookback_days
      )));
    }
    if !(self.trading_days.is_finite() && self.trading_days > 0.0) {
      return Err(PipelineError::Config(
        "trading_days must be positive".to_string(),
      ));
    }
    if !(self.clean_cutoff.is_finite() && self.clean_cutoff >= 0.0) {
      return Err(PipelineError::Config(
        "clean_cutoff must be non-negative".to_string(),
      ));
    }
    if !(self.sector_min_value.is_finite() && self.sector_min_value > 0.0) {
      return Err(PipelineError::Config(
        "sector_min_value must be positive".to_string(),
      ));
    }
    self.default_parameters().objective(self.default_objective).validate()?;
    Ok(())
  }

  /// Objective parameters as fractions.
  pub fn default_parameters(&self) -> ObjectiveParameters {
    ObjectiveParameters {
      risk_free_rate: self.default_risk_free_rate / 100.0,
      target_volatility: self.default_risk_target / 100.0,
      target_return: self.default_returns_target / 100.0,
      market_neutral: false,
      risk_aversion: self.default_risk_aversion,
    }
  }

  /// `[yesterday - default_window_days, yesterday]`.
  pub fn default_window(&self, today: NaiveDate) -> DateWindow {
    let end = today.checked_sub_days(Days::new(1)).unwrap_or(today);
    let start = end
      .checked_sub_days(Days::new(self.default_window_days))
      .unwrap_or(end);
    DateWindow { start, end }
  }

  /// Earliest date a window may start on.
  pub fn earliest_start(&self, today: NaiveDate) -> NaiveDate {
    today
      .checked_sub_days(Days::new(self.lookback_days))
      .unwrap_or(NaiveDate::MIN)
  }

  pub fn statistics_config(&self) -> StatisticsConfig {
    StatisticsConfig {
      frequency: self.trading_days,
      returns: self.returns,
      compounding: self.compounding,
    }
  }

  /// Engine settings reporting Sharpe ratios against `risk_free_rate`.
  pub fn optimization_config(&self, risk_free_rate: f64) -> OptimizationConfig {
    OptimizationConfig {
      risk_free_rate,
      clean_cutoff: self.clean_cutoff,
      clean_rounding: self.clean_rounding,
      ..Default::default()
    }
  }

  pub fn sector_geometry(&self) -> SectorGeometry {
    SectorGeometry::new(self.sector_min_value, self.palette.clone())
  }
}
