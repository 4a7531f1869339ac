//! # Portfolio Data
//!
//! $$
//! P \in (\mathbb R_{>0} \cup \{\varnothing\})^{T \times N}
//! $$
//!
//! Date windows, fetched price points and the price table they are joined into.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::NaiveDate;
use ndarray::Array2;

use super::types::Security;
use crate::error::PipelineError;
use crate::error::Result;

/// Inclusive calendar window `[start, end]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DateWindow {
  pub start: NaiveDate,
  pub end: NaiveDate,
}

impl DateWindow {
  pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
    if start > end {
      return Err(PipelineError::InvalidParameter(format!(
        "date window start {start} is after end {end}"
      )));
    }
    Ok(Self { start, end })
  }

  pub fn contains(&self, date: NaiveDate) -> bool {
    self.start <= date && date <= self.end
  }

  /// Number of calendar days covered, both ends included.
  pub fn days(&self) -> i64 {
    (self.end - self.start).num_days() + 1
  }
}

/// One trading day of a fetched series. `close` is `None` when the exchange
/// reports no close for that day.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PricePoint {
  pub date: NaiveDate,
  pub close: Option<f64>,
}

impl PricePoint {
  pub fn new(date: NaiveDate, close: Option<f64>) -> Self {
    Self { date, close }
  }
}

/// Dates (rows) by securities (columns) table of closing prices.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceTable {
  dates: Vec<NaiveDate>,
  securities: Vec<Security>,
  cells: Array2<Option<f64>>,
}

impl PriceTable {
  /// Outer-join per-security series on trading date.
  ///
  /// Rows are the ascending union of all dates; a security without a
  /// quote on some row gets a missing cell there.
  pub fn from_series(securities: Vec<Security>, series: Vec<Vec<PricePoint>>) -> Result<Self> {
    if securities.len() != series.len() {
      return Err(PipelineError::InsufficientData(format!(
        "{} securities but {} price series",
        securities.len(),
        series.len()
      )));
    }

    let dates: Vec<NaiveDate> = series
      .iter()
      .flatten()
      .map(|p| p.date)
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect();
    let row_of: BTreeMap<NaiveDate, usize> = dates.iter().enumerate().map(|(i, &d)| (d, i)).collect();

    let mut cells = Array2::from_elem((dates.len(), securities.len()), None);
    for (col, points) in series.iter().enumerate() {
      for point in points {
        if let Some(&row) = row_of.get(&point.date) {
          cells[[row, col]] = point.close;
        }
      }
    }

    Ok(Self {
      dates,
      securities,
      cells,
    })
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn securities(&self) -> &[Security] {
    &self.securities
  }

  /// Column labels (display names) in selection order.
  pub fn labels(&self) -> Vec<String> {
    self.securities.iter().map(|s| s.name.clone()).collect()
  }

  pub fn n_rows(&self) -> usize {
    self.dates.len()
  }

  pub fn n_cols(&self) -> usize {
    self.securities.len()
  }

  pub fn cell(&self, row: usize, col: usize) -> Option<f64> {
    self.cells.get([row, col]).copied().flatten()
  }

  /// Column `col` as an optional price series.
  pub fn column(&self, col: usize) -> Vec<Option<f64>> {
    self.cells.column(col).to_vec()
  }

  pub fn has_missing(&self) -> bool {
    self.cells.iter().any(|c| c.is_none())
  }

  /// `(date, security)` of every missing cell, row-major.
  pub fn missing_cells(&self) -> Vec<(NaiveDate, &Security)> {
    self
      .cells
      .indexed_iter()
      .filter(|(_, c)| c.is_none())
      .map(|((row, col), _)| (self.dates[row], &self.securities[col]))
      .collect()
  }

  /// Dense price matrix, failing on the first gap.
  pub fn dense(&self) -> Result<Array2<f64>> {
    if let Some((date, security)) = self.missing_cells().first() {
      return Err(PipelineError::InsufficientData(format!(
        "the selected window has gaps, first missing close: {} on {date}",
        security.name
      )));
    }
    Ok(self.cells.mapv(|c| c.unwrap_or(f64::NAN)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
  }

  #[test]
  fn from_series_outer_joins_on_date() {
    let securities = vec![Security::new("AAA", "Alpha"), Security::new("BBB", "Beta")];
    let series = vec![
      vec![PricePoint::new(d(3), Some(10.0)), PricePoint::new(d(2), Some(9.0))],
      vec![PricePoint::new(d(2), Some(20.0)), PricePoint::new(d(4), Some(21.0))],
    ];

    let table = PriceTable::from_series(securities, series).unwrap();

    assert_eq!(table.dates(), &[d(2), d(3), d(4)]);
    assert_eq!(table.column(0), vec![Some(9.0), Some(10.0), None]);
    assert_eq!(table.column(1), vec![Some(20.0), None, Some(21.0)]);
    assert_eq!(table.missing_cells().len(), 2);
    assert!(matches!(table.dense(), Err(PipelineError::InsufficientData(_))));
  }

  #[test]
  fn null_close_is_a_missing_cell() {
    let table = PriceTable::from_series(
      vec![Security::new("AAA", "Alpha")],
      vec![vec![PricePoint::new(d(2), Some(1.0)), PricePoint::new(d(3), None)]],
    )
    .unwrap();

    assert!(table.has_missing());
    assert_eq!(table.cell(1, 0), None);
    assert_eq!(table.cell(0, 0), Some(1.0));
  }

  #[test]
  fn window_rejects_reversed_bounds() {
    assert!(DateWindow::new(d(5), d(1)).is_err());
    assert_eq!(DateWindow::new(d(1), d(5)).unwrap().days(), 5);
  }
}
