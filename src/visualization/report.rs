//! # Text Report
//!
//! $$
//! \text{results} \mapsto \big(\mu,\ \Sigma,\ \mathbf w,\ (\mathbb E[R_p], \sigma_p, S)\big)
//! $$
//!
//! Plain-text rendering of the pipeline results as terminal tables.

use prettytable::Cell;
use prettytable::Row;
use prettytable::Table;
use prettytable::format::consts::FORMAT_NO_LINESEP_WITH_TITLE;

use crate::pipeline::PipelineResults;
use crate::pipeline::PipelineState;
use crate::pipeline::PipelineView;
use crate::pipeline::Presenter;
use crate::quant::portfolio::PerformanceMetrics;
use crate::quant::portfolio::PriceTable;
use crate::quant::portfolio::StatisticsSnapshot;
use crate::quant::portfolio::WeightDistribution;

/// Marker printed for a missing close.
pub const MISSING_CELL: &str = "NaN";

/// Presenter that keeps the latest report text.
#[derive(Clone, Debug, Default)]
pub struct TextReport {
  /// Also print the full price matrix.
  pub include_prices: bool,
  document: String,
}

impl TextReport {
  pub fn new(include_prices: bool) -> Self {
    Self {
      include_prices,
      document: String::new(),
    }
  }

  pub fn document(&self) -> &str {
    &self.document
  }

  pub fn render(&self, view: &PipelineView<'_>) -> String {
    let mut out = format!("Objective: {}\n", view.objective);
    match (view.state, view.results) {
      (PipelineState::Clean, Some(results)) => self.render_results(&mut out, results),
      (PipelineState::Error(message), _) => out.push_str(&format!("Error: {message}\n")),
      _ => out.push_str("Inputs changed, run compute to refresh the portfolio.\n"),
    }
    out
  }

  fn render_results(&self, out: &mut String, results: &PipelineResults) {
    out.push_str(&format!(
      "\nAnnualized mean historical returns ({} daily returns):\n{}",
      results.statistics.observations(),
      mean_returns_table(&results.statistics)
    ));
    out.push_str(&format!(
      "\nCovariance matrix of returns:\n{}",
      covariance_table(&results.statistics)
    ));
    out.push_str(&format!("\nPortfolio weights:\n{}", weights_table(&results.weights)));
    out.push_str(&format!("\nOptimal portfolio:\n{}", performance_text(&results.metrics)));
    if self.include_prices {
      out.push_str(&format!("\nClosing prices:\n{}", price_table(&results.prices)));
    }
  }
}

impl Presenter for TextReport {
  fn present(&mut self, view: &PipelineView<'_>) {
    self.document = self.render(view);
  }
}

fn table_with_titles(titles: Vec<String>) -> Table {
  let mut table = Table::new();
  table.set_format(*FORMAT_NO_LINESEP_WITH_TITLE);
  table.set_titles(Row::new(titles.iter().map(|t| Cell::new(t)).collect()));
  table
}

fn percent(value: f64) -> String {
  format!("{:.2} %", value * 100.0)
}

pub fn mean_returns_table(stats: &StatisticsSnapshot) -> Table {
  let mut table = table_with_titles(vec!["Security".into(), "Mean return".into()]);
  for (label, mu) in stats.labels().iter().zip(stats.mean_returns().iter()) {
    table.add_row(Row::new(vec![Cell::new(label), Cell::new(&percent(*mu))]));
  }
  table
}

pub fn covariance_table(stats: &StatisticsSnapshot) -> Table {
  let mut titles = vec![String::new()];
  titles.extend(stats.labels().iter().cloned());
  let mut table = table_with_titles(titles);

  let cov = stats.covariance();
  for (i, label) in stats.labels().iter().enumerate() {
    let mut cells = vec![Cell::new(label)];
    cells.extend((0..stats.n_assets()).map(|j| Cell::new(&format!("{:.6}", cov[[i, j]]))));
    table.add_row(Row::new(cells));
  }
  table
}

pub fn weights_table(weights: &WeightDistribution) -> Table {
  let mut table = table_with_titles(vec!["Security".into(), "Weight".into()]);
  for (label, w) in weights.iter() {
    table.add_row(Row::new(vec![Cell::new(label), Cell::new(&percent(w))]));
  }
  table
}

pub fn performance_text(metrics: &PerformanceMetrics) -> String {
  format!(
    "Expected annual return: {}\nAnnual volatility: {}\nSharpe ratio: {:.2}\n",
    percent(metrics.expected_return),
    percent(metrics.volatility),
    metrics.sharpe_ratio
  )
}

/// Dates by securities, missing closes as [`MISSING_CELL`].
pub fn price_table(prices: &PriceTable) -> Table {
  let mut titles = vec!["Date".to_string()];
  titles.extend(prices.labels());
  let mut table = table_with_titles(titles);

  for (row, date) in prices.dates().iter().enumerate() {
    let mut cells = vec![Cell::new(&date.format("%Y-%m-%d").to_string())];
    cells.extend((0..prices.n_cols()).map(|col| match prices.cell(row, col) {
      Some(close) => Cell::new(&format!("{close:.2}")),
      None => Cell::new(MISSING_CELL),
    }));
    table.add_row(Row::new(cells));
  }
  table
}
