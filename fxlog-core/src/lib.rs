//! fxlog core: market data, indicators, normalization and trade-log stores.
//!
//! This crate contains everything one pipeline step needs:
//! - Domain types (bars, series, granularity, trade ids, trade records)
//! - The fixed technical indicator set and its engine
//! - Exact-decimal record normalization
//! - Store backends, bounded provisioning and the trade-log writer
//! - Market data sources (OANDA, CSV, synthetic)

pub mod data;
pub mod domain;
pub mod error;
pub mod indicators;
pub mod normalize;
pub mod store;

pub use error::{ErrorKind, PipelineError};
