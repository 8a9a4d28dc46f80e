//! Vigil Common - Predictive health-scoring and trend-analysis engine.
//!
//! The shared library behind the vigild daemon: domain types, the
//! SQLite monitoring store, the metrics aggregator, the health score
//! calculator, the trend analyzer, the synthetic signal generator and
//! the report content builder. All scoring and trend logic is pure
//! computation over in-memory summaries; the store is consulted only at
//! the aggregator and generator boundaries.

pub mod error;
pub mod health;
pub mod report;
pub mod stats;
pub mod store;
pub mod synth;
pub mod training;
pub mod trend;
pub mod types;

pub use error::VigilError;
pub use store::MonitorDb;
pub use types::*;
