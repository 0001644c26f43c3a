pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod postprocess;
pub mod progress;
pub mod report;
pub mod staging;
pub mod util;

pub use error::{Error, Result};
