use servitor_core::{Code, ServiceResult};

use crate::args::{Args, Output};
use crate::aspect::essential::RESULT_METHODS;
use crate::error::Error;
use crate::middleware::{Env, Middleware, Next, Scope, Target};

/// Converts action errors raised below it into an `error` result carrying
/// the configured code. Programmer errors still propagate.
#[derive(Debug, Clone)]
pub struct Rescue {
    code: Code,
}

impl Rescue {
    pub const NAME: &'static str = "rescue_errors";

    #[must_use]
    pub fn new(code: impl Into<Code>) -> Self {
        Self { code: code.into() }
    }

    #[must_use]
    pub fn code(&self) -> &Code {
        &self.code
    }
}

impl Middleware for Rescue {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn intended_for(&self) -> Target {
        Target::methods(RESULT_METHODS).scope(Scope::Instance)
    }

    fn call(&self, env: &Env<'_>, args: Args, next: Next<'_>) -> Result<Output, Error> {
        match next.run(env, args) {
            Err(Error::Action(err)) => {
                let message = format!("{err:#}");
                tracing::warn!(
                    service = %env.class().id(),
                    slot = %env.slot(),
                    step = ?env.try_step().map(|s| s.def().step_ref()),
                    code = %self.code,
                    error = %message,
                    "action error rescued"
                );
                Ok(Output::Result(ServiceResult::error(
                    env.class().id().clone(),
                    message,
                    self.code.clone(),
                )))
            }
            other => other,
        }
    }
}
