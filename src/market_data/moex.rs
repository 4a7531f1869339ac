//! # MOEX ISS Client
//!
//! $$
//! \texttt{GET /iss/history/engines/stock/markets/shares/boards/\{board\}/securities/\{id\}.json}
//! $$
//!
//! Blocking client for the Moscow Exchange informational server.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use tracing::debug;
use tracing::warn;

use super::MarketDataSource;
use super::iss::parse_history;
use super::iss::parse_securities;
use crate::error::PipelineError;
use crate::error::Result;
use crate::quant::portfolio::PricePoint;
use crate::quant::portfolio::Security;

pub const ISS_BASE_URL: &str = "https://iss.moex.com/iss";

/// Main board for shares.
pub const DEFAULT_BOARD: &str = "TQBR";

#[derive(Clone, Debug)]
pub struct MoexClient {
  client: Client,
  base_url: String,
  board: String,
}

impl MoexClient {
  pub fn new() -> Result<Self> {
    Self::with_base_url(ISS_BASE_URL)
  }

  pub fn with_base_url(base_url: &str) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| PipelineError::Fetch(e.to_string()))?;

    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
      board: DEFAULT_BOARD.to_string(),
    })
  }

  pub fn with_board(mut self, board: impl Into<String>) -> Self {
    self.board = board.into();
    self
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  fn get(&self, path: &str, query: &[(&str, String)]) -> reqwest::Result<String> {
    let url = format!("{}{}", self.base_url, path);
    self
      .client
      .get(url)
      .query(&[("iss.meta", "off")])
      .query(query)
      .send()?
      .error_for_status()?
      .text()
  }

  fn try_list_securities(&self) -> Result<Vec<Security>> {
    let path = format!(
      "/engines/stock/markets/shares/boards/{}/securities.json",
      self.board
    );
    let body = self
      .get(&path, &[("securities.columns", "SECID,SHORTNAME".to_string())])
      .map_err(|e| PipelineError::Fetch(e.to_string()))?;
    parse_securities(&body)
  }
}

impl MarketDataSource for MoexClient {
  fn list_securities(&self) -> Vec<Security> {
    match self.try_list_securities() {
      Ok(securities) => {
        debug!(count = securities.len(), board = %self.board, "loaded security catalogue");
        securities
      }
      Err(e) => {
        warn!(error = %e, "security catalogue unavailable");
        Vec::new()
      }
    }
  }

  fn fetch_history(&self, security_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PricePoint>> {
    let path = format!(
      "/history/engines/stock/markets/shares/boards/{}/securities/{}.json",
      self.board, security_id
    );

    let mut points = Vec::new();
    let mut offset = 0u64;
    loop {
      let query = [
        ("from", start.format("%Y-%m-%d").to_string()),
        ("till", end.format("%Y-%m-%d").to_string()),
        ("history.columns", "TRADEDATE,CLOSE".to_string()),
        ("start", offset.to_string()),
      ];
      let body = self
        .get(&path, &query)
        .map_err(|e| PipelineError::Fetch(format!("{security_id}: {e}")))?;
      let page = parse_history(&body)?;
      let received = page.points.len();
      points.extend(page.points);

      match page.cursor.and_then(|c| c.next_start()) {
        Some(next) if received > 0 => offset = next,
        _ => break,
      }
    }

    debug!(security = security_id, points = points.len(), "history downloaded");
    Ok(points)
  }
}
