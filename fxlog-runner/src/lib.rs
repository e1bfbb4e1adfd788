//! fxlog runner: orchestration above the core.
//!
//! This crate provides:
//! - Pipeline configuration (TOML with environment overlay)
//! - Instrument universe resolution with default fallback
//! - The sequential, failure-isolating pipeline runner
//! - Serializable run reports

pub mod config;
pub mod pipeline;
pub mod report;
pub mod universe;

pub use config::{ConfigError, PipelineConfig, SourceKind, StoreKind, DEFAULT_INSTRUMENT};
pub use pipeline::{PipelineRunner, RunError};
pub use report::{InstrumentFailure, InstrumentSuccess, RunReport};
pub use universe::{resolve_universe, UniverseSelection};
