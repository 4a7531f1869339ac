//! # Market Data
//!
//! $$
//! \{(t, p_t^{(i)})\}_{i=1}^N \xrightarrow{\text{outer join on } t} P
//! $$
//!
//! Source of security catalogues and daily close history.

use std::cell::Cell;
use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::debug;
use tracing::info;

use crate::error::PipelineError;
use crate::error::Result;
use crate::quant::portfolio::DateWindow;
use crate::quant::portfolio::PricePoint;
use crate::quant::portfolio::PriceTable;
use crate::quant::portfolio::Security;

pub mod iss;
#[cfg(feature = "moex")]
pub mod moex;

/// Blocking market-data collaborator.
pub trait MarketDataSource {
  /// Catalogue of selectable securities. Transport failures yield an empty
  /// list rather than an error.
  fn list_securities(&self) -> Vec<Security>;

  /// Daily closes of `security_id` in `[start, end]`, ascending by date.
  fn fetch_history(&self, security_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PricePoint>>;
}

impl<T: MarketDataSource + ?Sized> MarketDataSource for &T {
  fn list_securities(&self) -> Vec<Security> {
    (**self).list_securities()
  }

  fn fetch_history(&self, security_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PricePoint>> {
    (**self).fetch_history(security_id, start, end)
  }
}

/// Fetch every security one after another and join the series.
///
/// Column order follows `securities`. Points outside the window are dropped.
pub fn fetch_price_table<M: MarketDataSource + ?Sized>(
  source: &M,
  securities: &[Security],
  window: DateWindow,
) -> Result<PriceTable> {
  let mut series = Vec::with_capacity(securities.len());
  for security in securities {
    let points = source.fetch_history(&security.id, window.start, window.end)?;
    debug!(security = %security.id, points = points.len(), "fetched price history");
    series.push(
      points
        .into_iter()
        .filter(|p| window.contains(p.date))
        .collect(),
    );
  }

  let table = PriceTable::from_series(securities.to_vec(), series)?;
  info!(
    securities = table.n_cols(),
    days = table.n_rows(),
    missing = table.missing_cells().len(),
    "price table assembled"
  );
  Ok(table)
}

/// Fixed in-process market data, counting history requests.
#[derive(Debug, Default)]
pub struct InMemoryMarketData {
  securities: Vec<Security>,
  history: HashMap<String, Vec<PricePoint>>,
  fetches: Cell<usize>,
}

impl InMemoryMarketData {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `security` with its full history.
  pub fn with_security(mut self, security: Security, history: Vec<PricePoint>) -> Self {
    self.history.insert(security.id.clone(), history);
    self.securities.push(security);
    self
  }

  /// Number of `fetch_history` calls so far.
  pub fn fetch_count(&self) -> usize {
    self.fetches.get()
  }
}

impl MarketDataSource for InMemoryMarketData {
  fn list_securities(&self) -> Vec<Security> {
    self.securities.clone()
  }

  fn fetch_history(&self, security_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PricePoint>> {
    self.fetches.set(self.fetches.get() + 1);
    let history = self
      .history
      .get(security_id)
      .ok_or_else(|| PipelineError::Fetch(format!("unknown security {security_id}")))?;
    Ok(
      history
        .iter()
        .filter(|p| start <= p.date && p.date <= end)
        .copied()
        .collect(),
    )
  }
}
