//! Configuration for the analysis pipeline.
//!
//! Every section has serde defaults, so a `.vigil.toml` only needs the keys
//! it wants to change:
//!
//! ```toml
//! [scheduler]
//! max_workers = 8
//! task_timeout_ms = 10000
//!
//! [reducer.weights]
//! history = 0.5
//! pattern = 0.1
//! context = 0.2
//! code_pattern = 0.2
//! ```

mod cache;
mod core;
mod loader;
mod parallel;
mod reducer;
mod resilience;
pub mod retry;

pub use cache::CacheConfig;
pub use core::VigilConfig;
pub use loader::{
    directory_ancestors, find_config_file, load_config, load_config_from,
    parse_and_validate_config, CONFIG_ENV_VAR, CONFIG_FILE_NAME,
};
pub use parallel::SchedulerConfig;
pub use reducer::{ReducerConfig, SignalWeights};
pub use resilience::{BulkheadConfig, CircuitBreakerConfig};
pub use retry::RetryConfig;
