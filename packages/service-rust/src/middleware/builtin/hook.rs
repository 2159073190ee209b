use std::fmt;
use std::sync::Arc;

use crate::args::{Args, Output};
use crate::error::Error;
use crate::middleware::{Env, Middleware, Next};

pub type BeforeFn = Arc<dyn Fn(&Env<'_>, &Args) -> Result<(), Error> + Send + Sync>;
pub type AfterFn = Arc<dyn Fn(&Env<'_>, &Output) -> Result<(), Error> + Send + Sync>;
pub type AroundFn = Arc<dyn Fn(&Env<'_>, Args, Next<'_>) -> Result<Output, Error> + Send + Sync>;

#[derive(Clone)]
enum HookKind {
    Before(BeforeFn),
    After(AfterFn),
    Around(AroundFn),
}

/// User callback wrapped as a middleware layer.
///
/// `before` hooks may reject the call by returning an error, `after` hooks
/// see the output of a successful call, `around` hooks decide whether and how
/// to continue.
#[derive(Clone)]
pub struct Hook {
    name: String,
    kind: HookKind,
}

impl Hook {
    pub fn before(
        name: impl Into<String>,
        f: impl Fn(&Env<'_>, &Args) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind: HookKind::Before(Arc::new(f)),
        }
    }

    pub fn after(
        name: impl Into<String>,
        f: impl Fn(&Env<'_>, &Output) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind: HookKind::After(Arc::new(f)),
        }
    }

    pub fn around(
        name: impl Into<String>,
        f: impl Fn(&Env<'_>, Args, Next<'_>) -> Result<Output, Error> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind: HookKind::Around(Arc::new(f)),
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            HookKind::Before(_) => "before",
            HookKind::After(_) => "after",
            HookKind::Around(_) => "around",
        };
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

impl Middleware for Hook {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, env: &Env<'_>, args: Args, next: Next<'_>) -> Result<Output, Error> {
        match &self.kind {
            HookKind::Before(f) => {
                f(env, &args)?;
                next.run(env, args)
            }
            HookKind::After(f) => {
                let output = next.run(env, args)?;
                f(env, &output)?;
                Ok(output)
            }
            HookKind::Around(f) => f(env, args, next),
        }
    }
}
