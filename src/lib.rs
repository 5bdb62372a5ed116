pub mod apis;
pub mod config;
pub mod constants;
pub mod counters;
pub mod db;
pub mod enrich;
pub mod error;
pub mod hooks;
pub mod importer;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod reconcile;
pub mod storage;
pub mod types;

pub use error::{ImportError, Result};
pub use pipeline::{ImportContext, Pipeline, PipelineResult};
pub use storage::{InMemoryStorage, Storage};
