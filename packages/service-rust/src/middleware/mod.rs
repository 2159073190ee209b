//! Method interception.
//!
//! Every dispatchable method lives in a [`Slot`]: an owner kind (the service
//! itself or one of its steps), a scope (class or instance) and a method name.
//! A slot carries an ordered [`MiddlewareStack`] that is compiled at commit
//! into an immutable [`CompiledChain`] (onion model, outermost layer first).
//!
//! 1. **Declaration** (`stack`): ordered edit operations on a slot's stack
//! 2. **Validation**: each middleware's [`Target`] must match its slot
//! 3. **Compilation** (`chain`): layers + terminal method, shared as `Arc`
//! 4. **Built-ins** (`builtin`): result caching, single-result guard, step
//!    execution, error rescue, lifecycle logging, user hooks

pub mod builtin;
pub mod chain;
pub mod stack;

use std::fmt;

use serde::{Deserialize, Serialize};
use servitor_core::ServiceId;

use crate::args::{Args, Output};
use crate::class::ServiceClass;
use crate::error::Error;
use crate::instance::Instance;
use crate::step::Step;

pub use chain::{CompiledChain, MethodFn, Next};
pub use stack::{MiddlewareStack, StackEntry};

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// Kind of object that owns a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Owner {
    Service,
    Step,
}

/// Whether a method is called on the service type or on an organizer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Instance,
    Class,
}

/// Attachment point of a middleware stack: `(owner, scope, method)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot {
    pub owner: Owner,
    pub scope: Scope,
    pub method: String,
}

impl Slot {
    #[must_use]
    pub fn new(owner: Owner, scope: Scope, method: impl Into<String>) -> Self {
        Self {
            owner,
            scope,
            method: method.into(),
        }
    }

    /// Service-owned, instance-scoped method.
    #[must_use]
    pub fn instance(method: impl Into<String>) -> Self {
        Self::new(Owner::Service, Scope::Instance, method)
    }

    /// Service-owned, class-scoped method.
    #[must_use]
    pub fn class(method: impl Into<String>) -> Self {
        Self::new(Owner::Service, Scope::Class, method)
    }

    /// Step-owned method. Steps only exist on organizer instances.
    #[must_use]
    pub fn step(method: impl Into<String>) -> Self {
        Self::new(Owner::Step, Scope::Instance, method)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.owner, self.scope) {
            (Owner::Service, Scope::Instance) => write!(f, "instance method `{}`", self.method),
            (Owner::Service, Scope::Class) => write!(f, "class method `{}`", self.method),
            (Owner::Step, _) => write!(f, "step method `{}`", self.method),
        }
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Set of slots a middleware may be attached to. `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub methods: Option<Vec<String>>,
    pub scope: Option<Scope>,
    pub owner: Option<Owner>,
}

impl Target {
    /// Matches every slot.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Matches the given method names in any scope and owner.
    #[must_use]
    pub fn methods<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            methods: Some(methods.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    #[must_use]
    pub fn owner(mut self, owner: Owner) -> Self {
        self.owner = Some(owner);
        self
    }

    #[must_use]
    pub fn matches(&self, slot: &Slot) -> bool {
        self.methods
            .as_ref()
            .is_none_or(|methods| methods.iter().any(|m| *m == slot.method))
            && self.scope.is_none_or(|scope| scope == slot.scope)
            && self.owner.is_none_or(|owner| owner == slot.owner)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let owner = self.owner.map_or("any owner", |o| match o {
            Owner::Service => "service",
            Owner::Step => "step",
        });
        let scope = self.scope.map_or("any scope", |s| match s {
            Scope::Instance => "instance",
            Scope::Class => "class",
        });
        match &self.methods {
            Some(methods) => write!(f, "{owner} {scope} [{}]", methods.join(", ")),
            None => write!(f, "{owner} {scope} [any method]"),
        }
    }
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// How a stack entry takes part in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Regular onion layer: may transform, short-circuit or wrap.
    Wrap,
    /// Side effects only: the layer's own return value is discarded and the
    /// outcome of the rest of the chain passes through.
    Observe,
}

// ---------------------------------------------------------------------------
// Env
// ---------------------------------------------------------------------------

/// Call environment handed to every layer and terminal of a chain.
#[derive(Clone, Copy)]
pub struct Env<'a> {
    slot: &'a Slot,
    class: &'a ServiceClass,
    instance: Option<&'a Instance>,
    step: Option<&'a Step>,
}

impl<'a> Env<'a> {
    pub(crate) fn for_class(slot: &'a Slot, class: &'a ServiceClass) -> Self {
        Self {
            slot,
            class,
            instance: None,
            step: None,
        }
    }

    pub(crate) fn for_instance(slot: &'a Slot, instance: &'a Instance) -> Self {
        Self {
            slot,
            class: instance.class(),
            instance: Some(instance),
            step: None,
        }
    }

    pub(crate) fn for_step(slot: &'a Slot, instance: &'a Instance, step: &'a Step) -> Self {
        Self {
            slot,
            class: instance.class(),
            instance: Some(instance),
            step: Some(step),
        }
    }

    #[must_use]
    pub fn slot(&self) -> &'a Slot {
        self.slot
    }

    #[must_use]
    pub fn class(&self) -> &'a ServiceClass {
        self.class
    }

    #[must_use]
    pub fn try_instance(&self) -> Option<&'a Instance> {
        self.instance
    }

    #[must_use]
    pub fn try_step(&self) -> Option<&'a Step> {
        self.step
    }

    /// Organizer instance the call runs on.
    ///
    /// # Errors
    ///
    /// Returns `Error::Argument` for class-scoped calls.
    pub fn instance(&self) -> Result<&'a Instance, Error> {
        self.instance
            .ok_or_else(|| Error::Argument(format!("{} runs without an organizer instance", self.slot)))
    }

    /// Step the call runs for.
    ///
    /// # Errors
    ///
    /// Returns `Error::Argument` when the call is not bound to a step.
    pub fn step(&self) -> Result<&'a Step, Error> {
        self.step
            .ok_or_else(|| Error::Argument(format!("{} runs without a step", self.slot)))
    }
}

impl fmt::Debug for Env<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("slot", self.slot)
            .field("class", self.class.id())
            .field("instance", &self.instance.map(Instance::id))
            .field("step", &self.step.map(Step::index))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Middleware trait
// ---------------------------------------------------------------------------

/// One layer of a method chain.
///
/// Used as `Arc<dyn Middleware>`. The `name` identifies the layer in stack
/// edit operations and must be unique within a slot.
pub trait Middleware: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Slots this layer may be attached to. Checked at commit.
    fn intended_for(&self) -> Target {
        Target::any()
    }

    /// Runs the layer. `next` continues with the rest of the chain and can be
    /// called at most once.
    ///
    /// # Errors
    ///
    /// Whatever the layer or the rest of the chain fails with.
    fn call(&self, env: &Env<'_>, args: Args, next: Next<'_>) -> Result<Output, Error>;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from editing or validating middleware stacks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MiddlewareError {
    #[error("middleware `{name}` is not in the stack of {slot}")]
    NotFound { slot: Slot, name: String },
    #[error("middleware `{name}` is already in the stack of {slot}")]
    Duplicate { slot: Slot, name: String },
    #[error("{owner}: middleware `{name}` is intended for {target}, not {slot}")]
    Misattached {
        owner: ServiceId,
        slot: Slot,
        name: String,
        target: String,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
