//! # frontier-rs
//!
//! $$
//! P \xrightarrow{\text{stats}} (\mu, \Sigma) \xrightarrow{\text{optimize}} \mathbf w \xrightarrow{\text{layout}} \{\text{sectors}\}
//! $$
//!
//! Efficient-frontier portfolio weights for a basket of exchange-listed
//! securities, computed by a reactive pipeline that refetches prices only
//! when the basket or the date window changes, and drawn as a pie chart.

pub mod config;
pub mod error;
pub mod market_data;
pub mod pipeline;
pub mod quant;
pub mod visualization;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use error::Result;
pub use pipeline::InputChange;
pub use pipeline::PipelineController;
pub use pipeline::PipelineResults;
pub use pipeline::PipelineState;
pub use pipeline::PipelineView;
pub use pipeline::Presenter;
