//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}} \frac{\mathbb E[R_p]-r_f}{\sigma_p}
//! $$
//!
//! Shared enums and result containers for portfolio optimization.

use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;

use crate::error::PipelineError;
use crate::error::Result;

/// Exchange-listed security as returned by the catalogue.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Security {
  /// Exchange code, e.g. `SBER`.
  pub id: String,
  /// Short display name used for labels.
  pub name: String,
}

impl Security {
  pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
    }
  }
}

/// Optimization objective with its active parameters.
///
/// Rates, targets and returns are fractions (`0.07` is 7 %).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OptimizationObjective {
  /// Tangency portfolio.
  MaxSharpe { risk_free_rate: f64 },
  /// Global minimum-variance portfolio.
  MinVolatility,
  /// Maximize `mu'w - (delta / 2) w' Sigma w`.
  MaxQuadraticUtility {
    risk_aversion: f64,
    market_neutral: bool,
  },
  /// Maximize return subject to a volatility ceiling.
  EfficientRisk {
    target_volatility: f64,
    market_neutral: bool,
  },
  /// Minimize volatility subject to a return floor.
  EfficientReturn {
    target_return: f64,
    market_neutral: bool,
  },
}

impl OptimizationObjective {
  /// Risk-free rate carried by the objective itself, if any.
  pub fn risk_free_rate(&self) -> Option<f64> {
    match self {
      Self::MaxSharpe { risk_free_rate } => Some(*risk_free_rate),
      _ => None,
    }
  }

  /// Whether the objective solves over the net-zero feasible set.
  pub fn market_neutral(&self) -> bool {
    match self {
      Self::MaxSharpe { .. } | Self::MinVolatility => false,
      Self::MaxQuadraticUtility { market_neutral, .. }
      | Self::EfficientRisk { market_neutral, .. }
      | Self::EfficientReturn { market_neutral, .. } => *market_neutral,
    }
  }

  pub fn kind(&self) -> ObjectiveKind {
    match self {
      Self::MaxSharpe { .. } => ObjectiveKind::MaxSharpe,
      Self::MinVolatility => ObjectiveKind::MinVolatility,
      Self::MaxQuadraticUtility { .. } => ObjectiveKind::MaxQuadraticUtility,
      Self::EfficientRisk { .. } => ObjectiveKind::EfficientRisk,
      Self::EfficientReturn { .. } => ObjectiveKind::EfficientReturn,
    }
  }

  /// Reject non-finite rates and non-positive risk aversion.
  pub fn validate(&self) -> Result<()> {
    let finite = |name: &str, value: f64| {
      if value.is_finite() {
        Ok(())
      } else {
        Err(PipelineError::InvalidParameter(format!(
          "{name} must be finite, got {value}"
        )))
      }
    };

    match *self {
      Self::MaxSharpe { risk_free_rate } => finite("risk-free rate", risk_free_rate),
      Self::MinVolatility => Ok(()),
      Self::MaxQuadraticUtility { risk_aversion, .. } => {
        finite("risk aversion", risk_aversion)?;
        if risk_aversion <= 0.0 {
          return Err(PipelineError::InvalidParameter(format!(
            "risk aversion must be positive, got {risk_aversion}"
          )));
        }
        Ok(())
      }
      Self::EfficientRisk {
        target_volatility, ..
      } => {
        finite("target volatility", target_volatility)?;
        if target_volatility < 0.0 {
          return Err(PipelineError::InvalidParameter(format!(
            "target volatility must be non-negative, got {target_volatility}"
          )));
        }
        Ok(())
      }
      Self::EfficientReturn { target_return, .. } => finite("target return", target_return),
    }
  }
}

/// Objective selector exposed to the input surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectiveKind {
  #[default]
  MaxSharpe,
  MinVolatility,
  MaxQuadraticUtility,
  EfficientRisk,
  EfficientReturn,
}

impl ObjectiveKind {
  pub const ALL: [ObjectiveKind; 5] = [
    Self::MaxSharpe,
    Self::MinVolatility,
    Self::MaxQuadraticUtility,
    Self::EfficientRisk,
    Self::EfficientReturn,
  ];

  /// Parse a selector name. Unknown names yield `None`.
  pub fn parse(s: &str) -> Option<Self> {
    match s.to_lowercase().as_str() {
      "max-sharpe" | "maxsharpe" | "sharpe" => Some(Self::MaxSharpe),
      "min-volatility" | "min-vol" | "minvol" => Some(Self::MinVolatility),
      "max-quadratic-utility" | "quadratic-utility" | "utility" => {
        Some(Self::MaxQuadraticUtility)
      }
      "efficient-risk" | "target-risk" => Some(Self::EfficientRisk),
      "efficient-return" | "target-return" | "markowitz" => Some(Self::EfficientReturn),
      _ => None,
    }
  }

  /// Whether the market-neutral toggle applies to this objective.
  pub fn supports_market_neutral(&self) -> bool {
    matches!(
      self,
      Self::MaxQuadraticUtility | Self::EfficientRisk | Self::EfficientReturn
    )
  }
}

impl Display for ObjectiveKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ObjectiveKind::MaxSharpe => write!(f, "Maximum Sharpe ratio"),
      ObjectiveKind::MinVolatility => write!(f, "Minimum volatility"),
      ObjectiveKind::MaxQuadraticUtility => write!(f, "Maximum quadratic utility"),
      ObjectiveKind::EfficientRisk => write!(f, "Maximum return at target risk"),
      ObjectiveKind::EfficientReturn => write!(f, "Minimum risk at target return"),
    }
  }
}

/// Every objective parameter the input surface holds, active or not.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObjectiveParameters {
  pub risk_free_rate: f64,
  pub target_volatility: f64,
  pub target_return: f64,
  pub market_neutral: bool,
  pub risk_aversion: f64,
}

impl Default for ObjectiveParameters {
  fn default() -> Self {
    Self {
      risk_free_rate: 0.02,
      target_volatility: 0.2,
      target_return: 0.1,
      market_neutral: false,
      risk_aversion: 1.0,
    }
  }
}

impl ObjectiveParameters {
  /// Build the active objective for `kind`; inactive parameters are ignored.
  pub fn objective(&self, kind: ObjectiveKind) -> OptimizationObjective {
    match kind {
      ObjectiveKind::MaxSharpe => OptimizationObjective::MaxSharpe {
        risk_free_rate: self.risk_free_rate,
      },
      ObjectiveKind::MinVolatility => OptimizationObjective::MinVolatility,
      ObjectiveKind::MaxQuadraticUtility => OptimizationObjective::MaxQuadraticUtility {
        risk_aversion: self.risk_aversion,
        market_neutral: self.market_neutral,
      },
      ObjectiveKind::EfficientRisk => OptimizationObjective::EfficientRisk {
        target_volatility: self.target_volatility,
        market_neutral: self.market_neutral,
      },
      ObjectiveKind::EfficientReturn => OptimizationObjective::EfficientReturn {
        target_return: self.target_return,
        market_neutral: self.market_neutral,
      },
    }
  }
}

/// Insertion-ordered mapping from label to portfolio weight.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeightDistribution {
  entries: Vec<(String, f64)>,
}

impl WeightDistribution {
  pub fn new() -> Self {
    Self::default()
  }

  /// Zip labels with weights, keeping label order.
  pub fn from_parts<S: AsRef<str>>(labels: &[S], weights: &[f64]) -> Self {
    Self {
      entries: labels
        .iter()
        .zip(weights.iter())
        .map(|(l, &w)| (l.as_ref().to_string(), w))
        .collect(),
    }
  }

  /// Insert or overwrite `label`. New labels go to the end.
  pub fn insert(&mut self, label: impl Into<String>, weight: f64) {
    let label = label.into();
    match self.entries.iter_mut().find(|(l, _)| *l == label) {
      Some(entry) => entry.1 = weight,
      None => self.entries.push((label, weight)),
    }
  }

  pub fn get(&self, label: &str) -> Option<f64> {
    self
      .entries
      .iter()
      .find(|(l, _)| l == label)
      .map(|(_, w)| *w)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
    self.entries.iter().map(|(l, w)| (l.as_str(), *w))
  }

  pub fn labels(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|(l, _)| l.as_str())
  }

  /// Weights in insertion order.
  pub fn values(&self) -> Vec<f64> {
    self.entries.iter().map(|(_, w)| *w).collect()
  }

  pub fn total(&self) -> f64 {
    self.entries.iter().map(|(_, w)| w).sum()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl<S: Into<String>> FromIterator<(S, f64)> for WeightDistribution {
  fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
    let mut out = Self::new();
    for (label, weight) in iter {
      out.insert(label, weight);
    }
    out
  }
}

/// Model performance of a weight vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerformanceMetrics {
  /// Annualized expected return.
  pub expected_return: f64,
  /// Annualized volatility.
  pub volatility: f64,
  /// `(expected_return - risk_free) / volatility`.
  pub sharpe_ratio: f64,
}
