//! # SVG Pie Chart
//!
//! $$
//! (x, y) = (c_x + r\cos\theta,\ c_y - r\sin\theta)
//! $$
//!
//! Standalone SVG document for a sector list: wedge paths with white
//! separators, discs for full circles, a legend and a centered title.
//! Angles run counter-clockwise from the positive x axis.

use std::f64::consts::PI;
use std::fmt;
use std::fmt::Display;
use std::path::Path;

use super::pie::PieSector;
use super::pie::SectorShape;
use crate::pipeline::PipelineState;
use crate::pipeline::PipelineView;
use crate::pipeline::Presenter;

#[derive(Clone, Debug, PartialEq)]
pub struct PieChartConfig {
  pub width: u32,
  pub height: u32,
  /// Pie radius in pixels.
  pub radius: f64,
  pub title: String,
  pub line_color: String,
}

impl Default for PieChartConfig {
  fn default() -> Self {
    Self {
      width: 640,
      height: 420,
      radius: 160.0,
      title: "Portfolio weights".to_string(),
      line_color: "white".to_string(),
    }
  }
}

/// Presenter that keeps the latest SVG document.
#[derive(Clone, Debug, Default)]
pub struct SvgPieChart {
  config: PieChartConfig,
  document: String,
}

impl SvgPieChart {
  pub fn new(config: PieChartConfig) -> Self {
    Self {
      config,
      document: String::new(),
    }
  }

  pub fn config(&self) -> &PieChartConfig {
    &self.config
  }

  /// Document produced by the last [`Presenter::present`] call.
  pub fn document(&self) -> &str {
    &self.document
  }

  pub fn render(&self, sectors: &[PieSector], note: Option<&str>) -> String {
    SvgDocument {
      config: &self.config,
      sectors,
      note,
    }
    .to_string()
  }

  pub fn write_to(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
    std::fs::write(path, &self.document)
  }
}

impl Presenter for SvgPieChart {
  fn present(&mut self, view: &PipelineView<'_>) {
    self.document = match (view.state, view.results) {
      (PipelineState::Clean, Some(results)) => self.render(&results.sectors, None),
      (PipelineState::Error(message), _) => self.render(&[], Some(message.as_str())),
      _ => self.render(&[], None),
    };
  }
}

struct SvgDocument<'a> {
  config: &'a PieChartConfig,
  sectors: &'a [PieSector],
  note: Option<&'a str>,
}

impl Display for SvgDocument<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let c = self.config;
    let cx = c.radius + 20.0;
    let cy = c.height as f64 / 2.0 + 10.0;

    writeln!(
      f,
      r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">"#,
      c.width, c.height, c.width, c.height
    )?;
    writeln!(f, r#"  <rect width="100%" height="100%" fill="white"/>"#)?;
    writeln!(
      f,
      r#"  <text x="{}" y="25" text-anchor="middle" font-family="sans-serif" font-size="16" font-weight="bold" fill="black">{}</text>"#,
      c.width / 2,
      escape(&c.title)
    )?;

    for sector in self.sectors {
      match sector.shape {
        SectorShape::FullCircle => writeln!(
          f,
          r#"  <circle cx="{:.3}" cy="{:.3}" r="{:.3}" fill="{}" stroke="{}" stroke-width="2"/>"#,
          cx,
          cy,
          c.radius,
          escape(sector.color.as_str()),
          escape(&c.line_color)
        )?,
        SectorShape::Wedge { start_angle, .. } => {
          let sweep = sector.sweep();
          let end_angle = start_angle + sweep;
          let (x1, y1) = polar(cx, cy, c.radius, start_angle);
          let (x2, y2) = polar(cx, cy, c.radius, end_angle);
          let large_arc = u8::from(sweep > PI);
          writeln!(
            f,
            r#"  <path d="M {cx:.3} {cy:.3} L {x1:.3} {y1:.3} A {r:.3} {r:.3} 0 {large_arc} 0 {x2:.3} {y2:.3} Z" fill="{fill}" stroke="{stroke}" stroke-width="2"/>"#,
            r = c.radius,
            fill = escape(sector.color.as_str()),
            stroke = escape(&c.line_color),
          )?;
        }
      }
    }

    let legend_x = cx + c.radius + 40.0;
    for (row, sector) in self.sectors.iter().enumerate() {
      let y = 60.0 + row as f64 * 22.0;
      writeln!(
        f,
        r#"  <rect x="{legend_x:.1}" y="{:.1}" width="14" height="14" fill="{}" stroke="black" stroke-width="0.5"/>"#,
        y - 11.0,
        escape(sector.color.as_str())
      )?;
      writeln!(
        f,
        r#"  <text x="{:.1}" y="{y:.1}" font-family="sans-serif" font-size="12">{} ({:.2} %)</text>"#,
        legend_x + 20.0,
        escape(&sector.label),
        sector.share * 100.0
      )?;
    }

    if let Some(note) = self.note {
      writeln!(
        f,
        r#"  <text x="{}" y="{}" text-anchor="middle" font-family="sans-serif" font-size="13" fill="firebrick">{}</text>"#,
        c.width / 2,
        c.height.saturating_sub(20),
        escape(note)
      )?;
    }

    writeln!(f, "</svg>")
  }
}

fn polar(cx: f64, cy: f64, r: f64, angle: f64) -> (f64, f64) {
  (cx + r * angle.cos(), cy - r * angle.sin())
}

fn escape(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for ch in text.chars() {
    match ch {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&apos;"),
      _ => out.push(ch),
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::quant::portfolio::WeightDistribution;
  use crate::visualization::SectorGeometry;

  fn layout(entries: &[(&str, f64)]) -> Vec<PieSector> {
    let weights: WeightDistribution = entries.iter().map(|(l, v)| (*l, *v)).collect();
    SectorGeometry::default().layout(&weights)
  }

  #[test]
  fn wedges_are_paths_with_white_separators() {
    let chart = SvgPieChart::default();
    let svg = chart.render(&layout(&[("A", 0.25), ("B", 0.75)]), None);

    assert!(svg.starts_with("<svg"));
    assert!(svg.trim_end().ends_with("</svg>"));
    assert_eq!(svg.matches("<path").count(), 2);
    assert!(svg.contains(r#"fill="yellow""#));
    assert!(svg.contains(r#"stroke="white""#));
    assert!(svg.contains("B (75.00 %)"));
    // the second wedge sweeps more than half the circle
    assert!(svg.contains(" 0 1 0 "));
  }

  #[test]
  fn full_circle_is_a_disc() {
    let svg = SvgPieChart::default().render(&layout(&[("X", 1.0)]), None);
    assert_eq!(svg.matches("<circle").count(), 1);
    assert_eq!(svg.matches("<path").count(), 0);
  }

  #[test]
  fn labels_are_escaped() {
    let svg = SvgPieChart::default().render(&layout(&[("A&B", 0.5), ("<C>", 0.5)]), Some("bad \"input\""));
    assert!(svg.contains("A&amp;B"));
    assert!(svg.contains("&lt;C&gt;"));
    assert!(svg.contains("bad &quot;input&quot;"));
  }
}
