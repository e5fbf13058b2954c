//! Configuration, paths, errors and logging bootstrap shared by the siws crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    BackendConfig, Config, DEFAULT_CLUSTER, DEFAULT_LOG_LEVEL, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_RPC_ENDPOINT,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::{Paths, HOME_ENV};
