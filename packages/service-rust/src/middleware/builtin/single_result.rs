use crate::args::{Args, Output};
use crate::aspect::essential::RESULT_METHODS;
use crate::error::Error;
use crate::middleware::{Env, Middleware, Next, Scope, Target};

/// Opens a result frame for the invocation so that the organizer's
/// `success` / `failure` / `error` factories can be called only once in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleResult;

impl SingleResult {
    pub const NAME: &'static str = "ensure_single_result";
}

impl Middleware for SingleResult {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn intended_for(&self) -> Target {
        Target::methods(RESULT_METHODS).scope(Scope::Instance)
    }

    fn call(&self, env: &Env<'_>, args: Args, next: Next<'_>) -> Result<Output, Error> {
        let organizer = env.instance()?;
        let _frame = organizer.open_frame(env.slot());
        next.run(env, args)
    }
}
