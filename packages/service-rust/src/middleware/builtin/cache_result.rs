use crate::args::{Args, Output};
use crate::error::Error;
use crate::middleware::{Env, Middleware, Next, Owner, Scope, Target};

/// Memoizes an organizer's result: the first call runs the chain, later
/// calls return the same result instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheResult;

impl CacheResult {
    pub const NAME: &'static str = "cache_result";
}

impl Middleware for CacheResult {
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
        if let Some(cached) = organizer.cached_result() {
            return Ok(Output::Result(cached.clone()));
        }
        let result = next.run(env, args)?.into_result(env.slot())?;
        Ok(Output::Result(organizer.cache_result(result)))
    }
}
