use super::Aspect;
use crate::config::ConfigDraft;
use crate::error::Error;
use crate::middleware::builtin::LogLifecycle;
use crate::middleware::Slot;

/// Lifecycle events and metrics for service and step results.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logging;

impl Logging {
    pub const NAME: &'static str = "logging";
}

impl Aspect for Logging {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn configure(&self, draft: &mut ConfigDraft) -> Result<(), Error> {
        draft.stack_mut(Slot::instance("result")).observe(LogLifecycle)?;
        draft.stack_mut(Slot::instance("step")).observe(LogLifecycle)?;
        Ok(())
    }
}
