use crate::args::{Args, Output};
use crate::error::Error;
use crate::middleware::{Env, Middleware, Next, Owner, Scope, Target};
use crate::step::Pipeline;

/// Runs the organizer's step pipeline in place of the rest of the chain.
/// Organizers without steps fall through to the `result` method, which a
/// service may define itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSteps;

impl RunSteps {
    pub const NAME: &'static str = "run_steps";
}

impl Middleware for RunSteps {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn intended_for(&self) -> Target {
        Target::methods(["result"])
            .scope(Scope::Instance)
            .owner(Owner::Service)
    }

    fn call(&self, env: &Env<'_>, args: Args, next: Next<'_>) -> Result<Output, Error> {
        let organizer = env.instance()?;
        if organizer.steps().is_empty() {
            return next.run(env, args);
        }
        Pipeline::new(organizer).run().map(Output::Result)
    }
}
