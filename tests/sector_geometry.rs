use std::f64::consts::PI;
use std::f64::consts::TAU;

use approx::assert_abs_diff_eq;
use frontier_rs::quant::portfolio::WeightDistribution;
use frontier_rs::visualization::SectorGeometry;
use frontier_rs::visualization::SectorShape;
use proptest::prelude::*;

fn weights(values: &[f64]) -> WeightDistribution {
  values
    .iter()
    .enumerate()
    .map(|(i, v)| (format!("S{i}"), *v))
    .collect()
}

#[test]
fn three_way_split_closes_the_circle() {
  let sectors = SectorGeometry::default().layout(&weights(&[0.5, 0.3, 0.2]));

  assert_eq!(sectors.len(), 3);
  assert_abs_diff_eq!(sectors[0].start_angle(), 0.0);
  assert_abs_diff_eq!(sectors[0].end_angle(), PI, epsilon = 1e-12);
  assert_abs_diff_eq!(sectors[1].end_angle(), 1.6 * PI, epsilon = 1e-12);
  assert_eq!(sectors[2].end_angle(), 0.0);
  assert_abs_diff_eq!(sectors[2].sweep(), 0.4 * PI, epsilon = 1e-12);
}

#[test]
fn short_positions_and_dust_are_left_out() {
  let sectors = SectorGeometry::default().layout(&weights(&[0.6, -0.4, 0.0005, 0.4]));

  let labels: Vec<_> = sectors.iter().map(|s| s.label.as_str()).collect();
  assert_eq!(labels, vec!["S0", "S3"]);
  assert_eq!(sectors[1].color_index, 1);
}

#[test]
fn dominant_weight_is_a_full_circle() {
  let sectors = SectorGeometry::default().layout(&weights(&[1.0, 0.0, -0.2]));
  assert_eq!(sectors.len(), 1);
  assert_eq!(sectors[0].shape, SectorShape::FullCircle);
}

proptest! {
  #[test]
  fn emitted_sectors_cover_the_circle_in_order(values in prop::collection::vec(-5.0f64..100.0, 0..12)) {
    let geometry = SectorGeometry::default();
    let sectors = geometry.layout(&weights(&values));

    let expected: Vec<String> = values
      .iter()
      .enumerate()
      .filter(|(_, v)| **v > 0.0 && **v >= geometry.min_value())
      .map(|(i, _)| format!("S{i}"))
      .collect();
    let labels: Vec<String> = sectors.iter().map(|s| s.label.clone()).collect();
    prop_assert_eq!(labels, expected);

    if !sectors.is_empty() {
      let swept: f64 = sectors.iter().map(|s| s.sweep()).sum();
      prop_assert!((swept - TAU).abs() < 1e-9);
      prop_assert_eq!(sectors[0].start_angle(), 0.0);
    }

    for pair in sectors.windows(2) {
      prop_assert!((pair[0].end_angle() - pair[1].start_angle()).abs() < 1e-12);
    }
    for (i, sector) in sectors.iter().enumerate() {
      prop_assert_eq!(sector.color_index, i);
      prop_assert!(sector.share > 0.0 && sector.share <= 1.0);
    }
  }

  #[test]
  fn layout_is_stateless(values in prop::collection::vec(0.0f64..10.0, 1..8)) {
    let geometry = SectorGeometry::default();
    let w = weights(&values);
    prop_assert_eq!(geometry.layout(&w), geometry.layout(&w));
  }
}
