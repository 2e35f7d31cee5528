pub mod aggregate;
pub mod chart;
pub mod cli;
pub mod config;
pub mod context;
pub mod docs;
pub mod error;
pub mod git;
pub mod lock;
pub mod model;
pub mod normalize;
pub mod notify;
pub mod report;
pub mod run;
pub mod util;

pub use error::{ConfigError, FetchError, Result, WatchError};
