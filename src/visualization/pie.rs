//! # Sector Geometry
//!
//! $$
//! \theta_k^{\text{start}} = 2\pi \sum_{j<k} \frac{v_j}{T},\qquad
//! \theta_k^{\text{end}} = \theta_k^{\text{start}} + 2\pi\frac{v_k}{T},\qquad
//! T = \sum_j v_j^{+}
//! $$
//!
//! Turns a weight distribution into contiguous pie wedges. Entries below the
//! minimum value are dropped without handing their span to the others, the
//! last wedge closes at angle `0`, and a lone contributor becomes a full disc.

use std::f64::consts::TAU;

use super::palette::Color;
use super::palette::Palette;
use crate::quant::portfolio::WeightDistribution;

/// Smallest weight that still gets a sector.
pub const MIN_VALUE: f64 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SectorShape {
  /// Counter-clockwise wedge from `start_angle` to `end_angle`, radians.
  Wedge { start_angle: f64, end_angle: f64 },
  /// Complete disc.
  FullCircle,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PieSector {
  pub label: String,
  pub value: f64,
  /// `value / total` against the unfiltered total.
  pub share: f64,
  /// Emitted position, used for color cycling.
  pub color_index: usize,
  pub color: Color,
  pub shape: SectorShape,
}

impl PieSector {
  pub fn is_full_circle(&self) -> bool {
    matches!(self.shape, SectorShape::FullCircle)
  }

  pub fn start_angle(&self) -> f64 {
    match self.shape {
      SectorShape::Wedge { start_angle, .. } => start_angle,
      SectorShape::FullCircle => 0.0,
    }
  }

  pub fn end_angle(&self) -> f64 {
    match self.shape {
      SectorShape::Wedge { end_angle, .. } => end_angle,
      SectorShape::FullCircle => 0.0,
    }
  }

  /// `2 pi * share`.
  pub fn nominal_span(&self) -> f64 {
    TAU * self.share
  }

  /// Angle actually covered when drawn; the closing wedge wraps to `2 pi`.
  pub fn sweep(&self) -> f64 {
    match self.shape {
      SectorShape::FullCircle => TAU,
      SectorShape::Wedge {
        start_angle,
        end_angle,
      } => {
        if end_angle > start_angle {
          end_angle - start_angle
        } else {
          TAU - start_angle + end_angle
        }
      }
    }
  }
}

/// Pie layout with a configurable threshold and palette.
#[derive(Clone, Debug, PartialEq)]
pub struct SectorGeometry {
  min_value: f64,
  palette: Palette,
}

impl Default for SectorGeometry {
  fn default() -> Self {
    Self {
      min_value: MIN_VALUE,
      palette: Palette::default(),
    }
  }
}

impl SectorGeometry {
  pub fn new(min_value: f64, palette: Palette) -> Self {
    Self { min_value, palette }
  }

  pub fn min_value(&self) -> f64 {
    self.min_value
  }

  pub fn palette(&self) -> &Palette {
    &self.palette
  }

  /// Lay out `weights` in insertion order. Every call yields a fresh sector
  /// list; nothing carries over between calls.
  pub fn layout(&self, weights: &WeightDistribution) -> Vec<PieSector> {
    let total: f64 = weights
      .iter()
      .map(|(_, v)| v)
      .filter(|v| v.is_finite() && *v > 0.0)
      .sum();

    let mut sectors: Vec<PieSector> = Vec::new();
    let mut cursor = 0.0;
    for (label, value) in weights.iter() {
      if !value.is_finite() || value <= 0.0 || value < self.min_value {
        continue;
      }

      let share = value / total;
      let shape = if value >= total {
        SectorShape::FullCircle
      } else {
        let start_angle = cursor;
        cursor += TAU * share;
        SectorShape::Wedge {
          start_angle,
          end_angle: cursor,
        }
      };

      let color_index = sectors.len();
      sectors.push(PieSector {
        label: label.to_string(),
        value,
        share,
        color_index,
        color: self.palette.color_at(color_index),
        shape,
      });
    }

    if let Some(SectorShape::Wedge { end_angle, .. }) = sectors.last_mut().map(|s| &mut s.shape) {
      *end_angle = 0.0;
    }
    if let [only] = sectors.as_mut_slice() {
      if only.start_angle() == 0.0 {
        only.shape = SectorShape::FullCircle;
      }
    }

    sectors
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  fn weights(entries: &[(&str, f64)]) -> WeightDistribution {
    entries.iter().map(|(l, v)| (*l, *v)).collect()
  }

  #[test]
  fn negligible_entries_are_dropped_not_redistributed() {
    let sectors = SectorGeometry::default().layout(&weights(&[("A", 0.5), ("B", 0.3), ("C", 0.0005)]));

    assert_eq!(sectors.len(), 2);
    assert_eq!(sectors[0].label, "A");
    assert_eq!(sectors[1].label, "B");

    let total = 0.8005;
    assert_abs_diff_eq!(sectors[0].nominal_span(), TAU * 0.5 / total, epsilon = 1e-12);
    assert_abs_diff_eq!(sectors[1].nominal_span(), TAU * 0.3 / total, epsilon = 1e-12);
    assert_abs_diff_eq!(sectors[0].start_angle(), 0.0);
    assert_abs_diff_eq!(sectors[1].start_angle(), sectors[0].end_angle(), epsilon = 1e-15);
    assert_eq!(sectors[1].end_angle(), 0.0);

    let drawn: f64 = sectors.iter().map(PieSector::sweep).sum();
    assert_abs_diff_eq!(drawn, TAU, epsilon = 1e-12);
  }

  #[test]
  fn single_weight_is_a_full_circle() {
    let sectors = SectorGeometry::default().layout(&weights(&[("X", 1.0)]));
    assert_eq!(sectors.len(), 1);
    assert!(sectors[0].is_full_circle());
    assert_eq!(sectors[0].label, "X");
  }

  #[test]
  fn lone_survivor_of_filtering_is_a_full_circle() {
    let sectors = SectorGeometry::default().layout(&weights(&[("X", 0.9995), ("Y", 0.0005)]));
    assert_eq!(sectors.len(), 1);
    assert!(sectors[0].is_full_circle());
  }

  #[test]
  fn colors_follow_emitted_position() {
    let sectors = SectorGeometry::default().layout(&weights(&[
      ("A", 0.0001),
      ("B", 0.4),
      ("C", 0.6),
    ]));
    assert_eq!(sectors[0].label, "B");
    assert_eq!(sectors[0].color_index, 0);
    assert_eq!(sectors[0].color.as_str(), "yellow");
    assert_eq!(sectors[1].color.as_str(), "red");
  }

  #[test]
  fn short_legs_are_skipped_and_excluded_from_total() {
    let sectors = SectorGeometry::default().layout(&weights(&[("L", 0.6), ("S", -0.6), ("M", 0.2)]));
    assert_eq!(sectors.len(), 2);
    assert_abs_diff_eq!(sectors[0].share, 0.75, epsilon = 1e-12);
  }

  #[test]
  fn empty_and_all_negligible_inputs_yield_no_sectors() {
    let geometry = SectorGeometry::default();
    assert!(geometry.layout(&WeightDistribution::new()).is_empty());
    assert!(geometry.layout(&weights(&[("A", 0.0), ("B", 0.0009)])).is_empty());
  }
}
