//! Domain model and measurement math for adaptive placement testing.
//!
//! Everything here is synchronous and storage-agnostic: item response theory
//! under the 3PL model, the online ability estimator, content balancing, the
//! stopping rule and final score reporting.

#![forbid(unsafe_code)]

pub mod balancer;
pub mod config;
pub mod error;
pub mod estimator;
pub mod irt;
pub mod model;
pub mod scoring;
pub mod stopping;
pub mod time;

pub use config::{ConfigError, EngineConfig};
pub use error::Error;
pub use time::Clock;
