//! # Visualization
//!
//! $$
//! \mathbf w \mapsto \{(\theta^{\text{start}}_k, \theta^{\text{end}}_k, c_k)\}_k
//! $$
//!
//! Pie layout of portfolio weights and the two presenters that draw results.

pub mod palette;
pub mod pie;
pub mod report;
pub mod svg;

pub use palette::Color;
pub use palette::Palette;
pub use pie::MIN_VALUE;
pub use pie::PieSector;
pub use pie::SectorGeometry;
pub use pie::SectorShape;
pub use report::TextReport;
pub use svg::PieChartConfig;
pub use svg::SvgPieChart;
