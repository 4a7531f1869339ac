//! # ISS Payloads
//!
//! $$
//! \texttt{\{columns, data\}} \mapsto \text{rows}
//! $$
//!
//! Decoding of Moscow Exchange ISS JSON blocks. Every block is a column list
//! plus row arrays; history pages carry a `history.cursor` block.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::error::PipelineError;
use crate::error::Result;
use crate::quant::portfolio::PricePoint;
use crate::quant::portfolio::Security;

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct IssBlock {
  pub columns: Vec<String>,
  pub data: Vec<Vec<Value>>,
}

impl IssBlock {
  fn column(&self, name: &str) -> Result<usize> {
    self
      .columns
      .iter()
      .position(|c| c.eq_ignore_ascii_case(name))
      .ok_or_else(|| PipelineError::Fetch(format!("ISS block has no {name} column")))
  }
}

#[derive(Debug, Deserialize)]
struct SecuritiesPayload {
  securities: IssBlock,
}

#[derive(Debug, Deserialize)]
struct HistoryPayload {
  history: IssBlock,
  #[serde(rename = "history.cursor")]
  cursor: Option<IssBlock>,
}

/// Position of a history page in the full result set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
  pub index: u64,
  pub total: u64,
  pub page_size: u64,
}

impl Cursor {
  /// Offset of the following page, if any.
  pub fn next_start(&self) -> Option<u64> {
    let next = self.index + self.page_size;
    (self.page_size > 0 && next < self.total).then_some(next)
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HistoryPage {
  pub points: Vec<PricePoint>,
  pub cursor: Option<Cursor>,
}

fn decode_error(err: serde_json::Error) -> PipelineError {
  PipelineError::Fetch(format!("malformed ISS response: {err}"))
}

/// `SECID, SHORTNAME` rows of the board catalogue.
pub fn parse_securities(body: &str) -> Result<Vec<Security>> {
  let payload: SecuritiesPayload = serde_json::from_str(body).map_err(decode_error)?;
  let block = payload.securities;
  let id = block.column("SECID")?;
  let name = block.column("SHORTNAME")?;

  Ok(
    block
      .data
      .iter()
      .filter_map(|row| {
        let id = row.get(id)?.as_str()?;
        let name = row.get(name).and_then(Value::as_str).unwrap_or(id);
        Some(Security::new(id, name))
      })
      .collect(),
  )
}

/// `TRADEDATE, CLOSE` rows; `null` closes become missing cells.
pub fn parse_history(body: &str) -> Result<HistoryPage> {
  let payload: HistoryPayload = serde_json::from_str(body).map_err(decode_error)?;
  let block = payload.history;
  let date_col = block.column("TRADEDATE")?;
  let close_col = block.column("CLOSE")?;

  let mut points = Vec::with_capacity(block.data.len());
  for row in &block.data {
    let raw = row
      .get(date_col)
      .and_then(Value::as_str)
      .ok_or_else(|| PipelineError::Fetch("history row without TRADEDATE".to_string()))?;
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
      .map_err(|e| PipelineError::Fetch(format!("bad trade date {raw}: {e}")))?;
    let close = row.get(close_col).and_then(Value::as_f64);
    points.push(PricePoint::new(date, close));
  }

  let cursor = match payload.cursor {
    Some(block) if !block.data.is_empty() => {
      let field = |name: &str| -> Result<u64> {
        let col = block.column(name)?;
        block.data[0]
          .get(col)
          .and_then(Value::as_u64)
          .ok_or_else(|| PipelineError::Fetch(format!("history.cursor without {name}")))
      };
      Some(Cursor {
        index: field("INDEX")?,
        total: field("TOTAL")?,
        page_size: field("PAGESIZE")?,
      })
    }
    _ => None,
  };

  Ok(HistoryPage { points, cursor })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_catalogue_rows() {
    let body = r#"{"securities": {"columns": ["SECID", "SHORTNAME"],
      "data": [["SBER", "Сбербанк"], ["GAZP", "ГАЗПРОМ ао"], [null, "broken"]]}}"#;
    let securities = parse_securities(body).unwrap();
    assert_eq!(
      securities,
      vec![
        Security::new("SBER", "Сбербанк"),
        Security::new("GAZP", "ГАЗПРОМ ао")
      ]
    );
  }

  #[test]
  fn parses_history_page_with_null_close_and_cursor() {
    let body = r#"{
      "history": {"columns": ["TRADEDATE", "CLOSE"],
        "data": [["2024-01-03", 271.9], ["2024-01-04", null]]},
      "history.cursor": {"columns": ["INDEX", "TOTAL", "PAGESIZE"], "data": [[0, 150, 100]]}
    }"#;
    let page = parse_history(body).unwrap();

    assert_eq!(page.points.len(), 2);
    assert_eq!(page.points[0].close, Some(271.9));
    assert_eq!(page.points[1].close, None);
    let cursor = page.cursor.unwrap();
    assert_eq!(cursor.next_start(), Some(100));
    assert_eq!(
      Cursor {
        index: 100,
        ..cursor
      }
      .next_start(),
      None
    );
  }

  #[test]
  fn missing_columns_are_fetch_errors() {
    let body = r#"{"history": {"columns": ["TRADEDATE"], "data": []}}"#;
    assert!(matches!(parse_history(body), Err(PipelineError::Fetch(_))));
    assert!(matches!(parse_securities("not json"), Err(PipelineError::Fetch(_))));
  }
}
