//! Named bundles of behavior composed into a service type's configuration.
//!
//! An [`Aspect`] installs middleware and default methods into the draft when
//! it is registered, and may run a hook when the type commits. Registration
//! order is preserved; an aspect name can be registered once per type.
//!
//! - [`Essential`]: result caching, single-result guard, step execution,
//!   predicates and the default entry points. Always registered first.
//! - [`FaultTolerance`]: converts action errors into `error` results.
//! - [`Logging`]: lifecycle events and metrics through observe-mode middleware.

pub mod essential;
pub mod fault_tolerance;
pub mod logging;

use crate::class::ServiceClass;
use crate::config::ConfigDraft;
use crate::error::Error;

pub use essential::Essential;
pub use fault_tolerance::FaultTolerance;
pub use logging::Logging;

/// Composable capability of a service type.
///
/// Used as `Arc<dyn Aspect>`.
pub trait Aspect: Send + Sync + 'static {
    /// Unique name of this aspect (e.g., `"logging"`).
    fn name(&self) -> &str;

    /// Installs middleware and default methods. Runs once, at registration.
    ///
    /// # Errors
    ///
    /// A failing aspect is not registered and leaves the draft untouched.
    fn configure(&self, draft: &mut ConfigDraft) -> Result<(), Error>;

    /// Runs during commit, after the dispatch table is built and before it is
    /// published.
    ///
    /// # Errors
    ///
    /// A failing hook aborts the commit.
    fn on_commit(&self, _class: &ServiceClass) -> Result<(), Error> {
        Ok(())
    }
}
