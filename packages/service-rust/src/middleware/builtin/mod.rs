//! Middleware shipped with the built-in aspects.

pub mod cache_result;
pub mod hook;
pub mod log_lifecycle;
pub mod rescue;
pub mod run_steps;
pub mod single_result;

pub use cache_result::CacheResult;
pub use hook::Hook;
pub use log_lifecycle::LogLifecycle;
pub use rescue::Rescue;
pub use run_steps::RunSteps;
pub use single_result::SingleResult;
