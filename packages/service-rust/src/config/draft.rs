use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use servitor_core::ServiceId;

use crate::aspect::Aspect;
use crate::binding::validate_name;
use crate::error::Error;
use crate::middleware::{MethodFn, MiddlewareStack, Slot};
use crate::step::StepCollection;

/// Mutable declaration state of a service type, before commit.
///
/// Aspects receive the draft in [`Aspect::configure`] and install their
/// middleware and default methods through it.
#[derive(Clone)]
pub struct ConfigDraft {
    pub(crate) owner: ServiceId,
    pub(crate) aspects: Vec<Arc<dyn Aspect>>,
    pub(crate) stacks: BTreeMap<Slot, MiddlewareStack>,
    /// Aspect-provided method implementations.
    pub(crate) defaults: BTreeMap<Slot, MethodFn>,
    /// User-defined method implementations; override defaults.
    pub(crate) methods: BTreeMap<Slot, MethodFn>,
    pub(crate) attributes: BTreeSet<String>,
    pub(crate) steps: StepCollection,
    pub(crate) sealed: bool,
}

impl ConfigDraft {
    pub(crate) fn new(owner: ServiceId) -> Self {
        Self {
            steps: StepCollection::new(owner.clone()),
            owner,
            aspects: Vec::new(),
            stacks: BTreeMap::new(),
            defaults: BTreeMap::new(),
            methods: BTreeMap::new(),
            attributes: BTreeSet::new(),
            sealed: false,
        }
    }

    #[must_use]
    pub fn owner(&self) -> &ServiceId {
        &self.owner
    }

    /// Stack of `slot`, created empty on first access.
    pub fn stack_mut(&mut self, slot: Slot) -> &mut MiddlewareStack {
        self.stacks
            .entry(slot.clone())
            .or_insert_with(|| MiddlewareStack::new(slot))
    }

    #[must_use]
    pub fn stack(&self, slot: &Slot) -> Option<&MiddlewareStack> {
        self.stacks.get(slot)
    }

    pub(crate) fn set_stack(&mut self, stack: MiddlewareStack) {
        self.stacks.insert(stack.slot().clone(), stack);
    }

    /// Installs a default implementation that user methods may override.
    pub fn define_default(&mut self, slot: Slot, method: MethodFn) {
        self.defaults.insert(slot, method);
    }

    pub(crate) fn define(&mut self, slot: Slot, method: MethodFn) {
        self.methods.insert(slot, method);
    }

    /// Whether `slot` has an implementation, user-defined or default.
    #[must_use]
    pub fn has_method(&self, slot: &Slot) -> bool {
        self.methods.contains_key(slot) || self.defaults.contains_key(slot)
    }

    /// Declares a named constructor attribute.
    ///
    /// # Errors
    ///
    /// Returns a binding error for malformed names.
    pub fn declare_attribute(&mut self, name: &str) -> Result<(), Error> {
        validate_name(name)?;
        self.attributes.insert(name.to_string());
        Ok(())
    }

    #[must_use]
    pub fn attributes(&self) -> &BTreeSet<String> {
        &self.attributes
    }

    #[must_use]
    pub fn steps(&self) -> &StepCollection {
        &self.steps
    }

    pub(crate) fn steps_mut(&mut self) -> &mut StepCollection {
        &mut self.steps
    }

    /// Registered aspect names, in registration order.
    #[must_use]
    pub fn aspect_names(&self) -> Vec<&str> {
        self.aspects.iter().map(|a| a.name()).collect()
    }

    #[must_use]
    pub fn has_aspect(&self, name: &str) -> bool {
        self.aspects.iter().any(|a| a.name() == name)
    }

    pub(crate) fn push_aspect(&mut self, aspect: Arc<dyn Aspect>) {
        self.aspects.push(aspect);
    }
}

impl fmt::Debug for ConfigDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigDraft")
            .field("owner", &self.owner)
            .field("aspects", &self.aspect_names())
            .field("stacks", &self.stacks)
            .field("defaults", &self.defaults.keys().collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("attributes", &self.attributes)
            .field("steps", &self.steps.len())
            .field("sealed", &self.sealed)
            .finish()
    }
}
