//! Service types.
//!
//! A [`ServiceClass`] is a cheap, clonable handle to one service type: its
//! identity and its [`Config`]. Declarations (aspects, middleware, methods,
//! attributes, steps) go into the draft until the first commit; every entry
//! point commits implicitly and dispatches through the committed table.

use std::fmt;
use std::sync::Arc;

use servitor_core::{ServiceId, ServiceResult};

use crate::args::{Args, Output};
use crate::aspect::{Aspect, Essential};
use crate::binding::validate_name;
use crate::config::{Config, ConfigDraft, DispatchTable, Settings};
use crate::error::Error;
use crate::instance::Instance;
use crate::middleware::builtin::{Hook, RunSteps};
use crate::middleware::{CompiledChain, Env, MethodFn, MiddlewareError, MiddlewareStack, Next, Owner, Scope, Slot};
use crate::step::StepSpec;

struct ClassInner {
    id: ServiceId,
    config: Config,
}

/// Handle to a service type. Clones share the same configuration.
#[derive(Clone)]
pub struct ServiceClass {
    inner: Arc<ClassInner>,
}

impl ServiceClass {
    /// Creates a service type with default settings and the essential aspect.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self::with_settings(name, Settings::default())
    }

    #[must_use]
    pub fn with_settings(name: impl AsRef<str>, settings: Settings) -> Self {
        let id = ServiceId::new(name);
        let mut draft = ConfigDraft::new(id.clone());
        Essential::install(&mut draft);
        draft.push_aspect(Arc::new(Essential));
        tracing::debug!(service = %id, "service type declared");
        Self {
            inner: Arc::new(ClassInner {
                config: Config::new(settings, draft),
                id,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &ServiceId {
        &self.inner.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.id.name()
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        self.inner.config.settings()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    // -----------------------------------------------------------------------
    // Declarations
    // -----------------------------------------------------------------------

    /// Registers an aspect. Returns `false` if an aspect with the same name is
    /// already registered.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Committed` after commit, or the aspect's
    /// configure error; the draft is unchanged in both cases.
    pub fn register_aspect<A: Aspect>(&self, aspect: A) -> Result<bool, Error> {
        self.inner.config.edit(|draft| {
            if draft.has_aspect(aspect.name()) {
                return Ok(false);
            }
            let mut next = draft.clone();
            aspect.configure(&mut next)?;
            tracing::debug!(service = %self.id(), aspect = aspect.name(), "aspect registered");
            next.push_aspect(Arc::new(aspect));
            *draft = next;
            Ok(true)
        })
    }

    fn edit_stack(
        &self,
        slot: Slot,
        f: impl FnOnce(&mut MiddlewareStack) -> Result<(), MiddlewareError>,
    ) -> Result<(), Error> {
        self.inner.config.edit(|draft| {
            let mut stack = draft
                .stack(&slot)
                .cloned()
                .unwrap_or_else(|| MiddlewareStack::new(slot.clone()));
            f(&mut stack)?;
            draft.set_stack(stack);
            Ok(())
        })
    }

    /// Edits the middleware stack of a service-owned method. The edit is
    /// applied as a whole or not at all.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Committed` after commit, a binding error for
    /// malformed method names, or the first failing stack operation.
    pub fn configure_middlewares(
        &self,
        method: &str,
        scope: Scope,
        f: impl FnOnce(&mut MiddlewareStack) -> Result<(), MiddlewareError>,
    ) -> Result<(), Error> {
        validate_name(method)?;
        self.edit_stack(Slot::new(Owner::Service, scope, method), f)
    }

    /// Edits the middleware stack of a step-owned method.
    ///
    /// # Errors
    ///
    /// Same as [`ServiceClass::configure_middlewares`].
    pub fn configure_step_middlewares(
        &self,
        method: &str,
        f: impl FnOnce(&mut MiddlewareStack) -> Result<(), MiddlewareError>,
    ) -> Result<(), Error> {
        validate_name(method)?;
        self.edit_stack(Slot::step(method), f)
    }

    fn define(&self, slot: Slot, method: MethodFn) -> Result<(), Error> {
        validate_name(&slot.method)?;
        self.inner.config.edit(|draft| {
            draft.define(slot, method);
            Ok(())
        })
    }

    /// Defines an instance method; overrides a default of the same name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Committed` after commit or a binding error for
    /// malformed names.
    pub fn define_method(
        &self,
        name: &str,
        f: impl Fn(&Instance, Args) -> Result<Output, Error> + Send + Sync + 'static,
    ) -> Result<(), Error> {
        let method: MethodFn = Arc::new(move |env: &Env<'_>, args: Args| f(env.instance()?, args));
        self.define(Slot::instance(name), method)
    }

    /// Defines a class method.
    ///
    /// # Errors
    ///
    /// Same as [`ServiceClass::define_method`].
    pub fn define_class_method(
        &self,
        name: &str,
        f: impl Fn(&ServiceClass, Args) -> Result<Output, Error> + Send + Sync + 'static,
    ) -> Result<(), Error> {
        let method: MethodFn = Arc::new(move |env: &Env<'_>, args: Args| f(env.class(), args));
        self.define(Slot::class(name), method)
    }

    /// Declares a constructor attribute.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Committed` after commit or a binding error for
    /// malformed names.
    pub fn attribute(&self, name: &str) -> Result<(), Error> {
        self.inner.config.edit(|draft| draft.declare_attribute(name))
    }

    /// Appends a step and returns its index.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Committed` after commit, or the step declaration
    /// error.
    pub fn step(&self, spec: StepSpec) -> Result<usize, Error> {
        self.inner.config.edit(|draft| draft.steps_mut().append(spec))
    }

    /// Appends an or-step: it runs only when the previous step did not succeed.
    ///
    /// # Errors
    ///
    /// Same as [`ServiceClass::step`].
    pub fn or_step(&self, spec: StepSpec) -> Result<usize, Error> {
        self.step(spec.or())
    }

    fn install_hook(&self, slot: Slot, hook: Hook) -> Result<(), Error> {
        self.edit_stack(slot, |stack| {
            if stack.contains(RunSteps::NAME) {
                stack.insert_before(RunSteps::NAME, hook)?;
            } else {
                stack.append(hook)?;
            }
            Ok(())
        })
    }

    /// Runs `f` before the organizer produces its result. An error from `f`
    /// aborts the call.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Committed` after commit or
    /// `MiddlewareError::Duplicate` if `name` is taken.
    pub fn before(
        &self,
        name: impl Into<String>,
        f: impl Fn(&Env<'_>, &Args) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Result<(), Error> {
        self.install_hook(Slot::instance("result"), Hook::before(name, f))
    }

    /// Runs `f` with the output after the organizer produced its result.
    ///
    /// # Errors
    ///
    /// Same as [`ServiceClass::before`].
    pub fn after(
        &self,
        name: impl Into<String>,
        f: impl Fn(&Env<'_>, &Output) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Result<(), Error> {
        self.install_hook(Slot::instance("result"), Hook::after(name, f))
    }

    /// Wraps the production of the organizer's result.
    ///
    /// # Errors
    ///
    /// Same as [`ServiceClass::before`].
    pub fn around(
        &self,
        name: impl Into<String>,
        f: impl Fn(&Env<'_>, Args, Next<'_>) -> Result<Output, Error> + Send + Sync + 'static,
    ) -> Result<(), Error> {
        self.install_hook(Slot::instance("result"), Hook::around(name, f))
    }

    /// Wraps the evaluation of every step.
    ///
    /// # Errors
    ///
    /// Same as [`ServiceClass::before`].
    pub fn around_step(
        &self,
        name: impl Into<String>,
        f: impl Fn(&Env<'_>, Args, Next<'_>) -> Result<Output, Error> + Send + Sync + 'static,
    ) -> Result<(), Error> {
        self.install_hook(Slot::instance("step"), Hook::around(name, f))
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    /// Commits the configuration. Returns `false` if it was already committed.
    ///
    /// # Errors
    ///
    /// Returns validation errors (misattached middleware, invalid steps),
    /// `ConfigError::TooManyImplicitCommits` or an aspect commit hook error.
    pub fn commit(&self) -> Result<bool, Error> {
        self.inner.config.commit(self)
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.inner.config.is_committed()
    }

    /// Committed dispatch table; commits on first use.
    ///
    /// # Errors
    ///
    /// Any error [`ServiceClass::commit`] can return.
    pub fn table(&self) -> Result<Arc<DispatchTable>, Error> {
        self.inner.config.ensure_committed(self)
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Creates an organizer and returns its result.
    ///
    /// # Errors
    ///
    /// Any error of [`ServiceClass::new_instance`] or [`Instance::result`].
    pub fn result(&self, args: impl Into<Args>) -> Result<ServiceResult, Error> {
        let slot = Slot::class("result");
        self.call("result", args)?.into_result(&slot)
    }

    /// Calls a class method through its middleware chain.
    ///
    /// # Errors
    ///
    /// Returns `Error::MethodNotDefined` for unknown methods, or whatever the
    /// chain returns.
    pub fn call(&self, method: &str, args: impl Into<Args>) -> Result<Output, Error> {
        let slot = Slot::class(method);
        let chain = self.chain(&slot)?;
        chain.call(&Env::for_class(&slot, self), args.into())
    }

    /// Creates an organizer from named attributes.
    ///
    /// # Errors
    ///
    /// Returns `Error::Argument` for positional arguments and, with
    /// `Settings::strict_attributes`, `Error::UnknownAttribute` for names that
    /// were not declared.
    pub fn new_instance(&self, args: impl Into<Args>) -> Result<Instance, Error> {
        let args = args.into();
        if !args.positional.is_empty() {
            return Err(Error::Argument(format!(
                "{} takes named attributes only, got {} positional arguments",
                self.id(),
                args.positional.len()
            )));
        }
        let table = self.table()?;
        if self.settings().strict_attributes {
            if let Some(name) = args.named.keys().find(|name| !table.attributes().contains(*name)) {
                return Err(Error::UnknownAttribute {
                    owner: self.id().clone(),
                    name: name.clone(),
                });
            }
        }
        Ok(Instance::new(self.clone(), table, args.named))
    }

    fn predicate(&self, method: &str, args: impl Into<Args>) -> Result<bool, Error> {
        let slot = Slot::class(method);
        self.call(method, args)?.into_bool(&slot)
    }

    /// # Errors
    ///
    /// Any error [`ServiceClass::result`] can return.
    pub fn is_success(&self, args: impl Into<Args>) -> Result<bool, Error> {
        self.predicate("success?", args)
    }

    /// # Errors
    ///
    /// Any error [`ServiceClass::result`] can return.
    pub fn is_failure(&self, args: impl Into<Args>) -> Result<bool, Error> {
        self.predicate("failure?", args)
    }

    /// # Errors
    ///
    /// Any error [`ServiceClass::result`] can return.
    pub fn is_error(&self, args: impl Into<Args>) -> Result<bool, Error> {
        self.predicate("error?", args)
    }

    /// # Errors
    ///
    /// Any error [`ServiceClass::result`] can return.
    pub fn is_not_success(&self, args: impl Into<Args>) -> Result<bool, Error> {
        self.predicate("not_success?", args)
    }

    /// # Errors
    ///
    /// Any error [`ServiceClass::result`] can return.
    pub fn is_not_failure(&self, args: impl Into<Args>) -> Result<bool, Error> {
        self.predicate("not_failure?", args)
    }

    /// # Errors
    ///
    /// Any error [`ServiceClass::result`] can return.
    pub fn is_not_error(&self, args: impl Into<Args>) -> Result<bool, Error> {
        self.predicate("not_error?", args)
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Compiled chain of `slot`. The same `Arc` is returned on every lookup.
    ///
    /// # Errors
    ///
    /// Returns commit errors, or `Error::MethodNotDefined` when the slot has
    /// neither middleware nor an implementation.
    pub fn chain(&self, slot: &Slot) -> Result<Arc<CompiledChain>, Error> {
        self.table()?.chain(slot).cloned().ok_or_else(|| Error::MethodNotDefined {
            owner: self.id().clone(),
            slot: slot.clone(),
        })
    }

    /// Whether `slot` has an implementation.
    ///
    /// # Errors
    ///
    /// Returns commit errors.
    pub fn has_method(&self, slot: &Slot) -> Result<bool, Error> {
        Ok(self.table()?.chain(slot).is_some_and(|chain| chain.has_terminal()))
    }

    /// Registered aspect names in registration order.
    #[must_use]
    pub fn aspect_names(&self) -> Vec<String> {
        match self.inner.config.table() {
            Some(table) => table.aspects().to_vec(),
            None => self
                .inner
                .config
                .inspect(|draft| draft.aspect_names().into_iter().map(str::to_string).collect()),
        }
    }
}

impl PartialEq for ServiceClass {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ServiceClass {}

impl fmt::Debug for ServiceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClass")
            .field("id", &self.inner.id)
            .field("config", &self.inner.config)
            .finish()
    }
}
