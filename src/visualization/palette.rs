//! # Palette
//!
//! $$
//! \operatorname{color}(k) = P_{k \bmod |P|}
//! $$
//!
//! Position-indexed fill colors for pie sectors.

use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;

/// CSS color name or hex literal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(pub String);

impl Color {
  pub fn new(name: impl Into<String>) -> Self {
    Self(name.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl Display for Color {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

pub const DEFAULT_COLORS: [&str; 10] = [
  "yellow",
  "red",
  "lightblue",
  "green",
  "orange",
  "pink",
  "purple",
  "brown",
  "black",
  "grey",
];

/// Ordered color list cycled by sector position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Palette {
  colors: Vec<Color>,
}

impl Default for Palette {
  fn default() -> Self {
    Self {
      colors: DEFAULT_COLORS.iter().map(|c| Color::new(*c)).collect(),
    }
  }
}

impl Palette {
  /// Falls back to the default colors when `colors` is empty.
  pub fn new(colors: Vec<Color>) -> Self {
    if colors.is_empty() {
      Self::default()
    } else {
      Self { colors }
    }
  }

  pub fn len(&self) -> usize {
    self.colors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.colors.is_empty()
  }

  pub fn color_at(&self, index: usize) -> Color {
    if self.colors.is_empty() {
      return Color::new(DEFAULT_COLORS[index % DEFAULT_COLORS.len()]);
    }
    self.colors[index % self.colors.len()].clone()
  }
}
