mod api;
pub mod args;
pub mod commands;
mod config;
mod db;
mod error;
pub mod model;
pub mod sync;
#[cfg(test)]
mod test;
mod utils;

pub use api::{Aggregator, Ledger, Mode, TestAggregator, TestLedger, TEST_MODE_ENV};
pub use config::{Config, FrolloLogin};
pub use error::{ApiError, ApiResult, Error, Result};
