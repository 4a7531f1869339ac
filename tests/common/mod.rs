#![allow(dead_code)]

use chrono::Days;
use chrono::NaiveDate;
use frontier_rs::market_data::InMemoryMarketData;
use frontier_rs::quant::portfolio::PricePoint;
use frontier_rs::quant::portfolio::Security;
use frontier_rs::quant::portfolio::StatisticsSnapshot;

pub fn today() -> NaiveDate {
  NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
}

/// Deterministic daily closes: drift plus a sinusoidal wobble.
pub fn series(drift: f64, freq: f64, phase: f64) -> Vec<PricePoint> {
  let start = today() - Days::new(150);
  let mut price = 100.0;
  (0..140)
    .map(|t| {
      let point = PricePoint::new(start + Days::new(t), Some(price));
      price *= 1.0 + drift + 0.015 * (freq * t as f64 + phase).sin();
      point
    })
    .collect()
}

pub fn market() -> InMemoryMarketData {
  InMemoryMarketData::new()
    .with_security(Security::new("SBER", "Sberbank"), series(0.0012, 0.7, 0.3))
    .with_security(Security::new("GAZP", "Gazprom"), series(0.0006, 1.9, 1.1))
    .with_security(Security::new("LKOH", "Lukoil"), series(0.0009, 3.1, 2.4))
    .with_security(Security::new("MOEX", "Moscow Exchange"), series(0.0003, 4.3, 0.8))
}

/// Same as [`market`] plus a security whose history has one gap.
pub fn market_with_gap() -> InMemoryMarketData {
  let mut gappy = series(0.0007, 2.6, 0.5);
  gappy[40].close = None;
  market().with_security(Security::new("YNDX", "Yandex"), gappy)
}

/// Four assets with 0.3 pairwise correlation.
pub fn snapshot() -> StatisticsSnapshot {
  let mu = vec![0.08, 0.12, 0.15, 0.05];
  let vol = [0.15, 0.2, 0.3, 0.1];
  let cov = (0..4)
    .map(|i| {
      (0..4)
        .map(|j| {
          let rho = if i == j { 1.0 } else { 0.3 };
          rho * vol[i] * vol[j]
        })
        .collect()
    })
    .collect();
  let labels = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
  StatisticsSnapshot::new(labels, mu, cov).unwrap()
}

/// Two assets sharing the best expected return, uncorrelated.
pub fn tied_snapshot() -> StatisticsSnapshot {
  let labels = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
  StatisticsSnapshot::new(
    labels,
    vec![0.10, 0.10, 0.05],
    vec![
      vec![0.04, 0.0, 0.0],
      vec![0.0, 0.09, 0.0],
      vec![0.0, 0.0, 0.01],
    ],
  )
  .unwrap()
}
