//! # Errors
//!
//! $$
//! \text{stage failure} \mapsto \texttt{PipelineError} \mapsto \text{Error}(\text{message})
//! $$
//!
//! Every stage reports one of these variants; the controller turns them into
//! the user-visible message of the `Error` state.

use thiserror::Error;

/// Failure taxonomy of the compute pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
  /// Network or catalogue failure. Retry by triggering compute again.
  #[error("failed to fetch market data: {0}")]
  Fetch(String),

  /// Gaps or unusable prices in the fetched window.
  #[error("insufficient price data: {0}")]
  InsufficientData(String),

  /// The chosen target lies outside the attainable frontier.
  #[error("objective is infeasible: {0}")]
  InfeasibleObjective(String),

  /// Too few securities or a singular covariance matrix.
  #[error("degenerate input: {0}")]
  DegenerateInput(String),

  /// An input outside the configured bounds.
  #[error("invalid parameter: {0}")]
  InvalidParameter(String),

  #[error("configuration error: {0}")]
  Config(String),
}

impl From<toml::de::Error> for PipelineError {
  fn from(err: toml::de::Error) -> Self {
    Self::Config(err.to_string())
  }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
