//! # Quant
//!
//! $$
//! P \mapsto (\mu, \Sigma) \mapsto \mathbf w^\*
//! $$
//!
//! Quantitative core: from closing prices to optimal weights.

pub mod portfolio;
