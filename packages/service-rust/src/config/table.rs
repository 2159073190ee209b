use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use servitor_core::ServiceId;

use super::draft::ConfigDraft;
use crate::error::Error;
use crate::middleware::{CompiledChain, MiddlewareError, Owner, Scope, Slot};
use crate::step::collection::{Container, Readers};
use crate::step::StepDef;

/// Frozen dispatch state of a committed service type.
///
/// Built once per type by the commit; every entry point dispatches through it.
#[derive(Debug)]
pub struct DispatchTable {
    owner: ServiceId,
    chains: BTreeMap<Slot, Arc<CompiledChain>>,
    steps: Vec<Arc<StepDef>>,
    readers: Readers,
    attributes: BTreeSet<String>,
    aspects: Vec<String>,
}

impl DispatchTable {
    /// Validates `draft` and compiles every chain.
    pub(crate) fn build(draft: &ConfigDraft) -> Result<Self, Error> {
        let owner = draft.owner.clone();

        let mut terminals = draft.defaults.clone();
        terminals.extend(draft.methods.iter().map(|(slot, f)| (slot.clone(), f.clone())));

        for (slot, stack) in &draft.stacks {
            for entry in stack.entries() {
                let target = entry.middleware.intended_for();
                if !target.matches(slot) {
                    return Err(MiddlewareError::Misattached {
                        owner,
                        slot: slot.clone(),
                        name: entry.name().to_string(),
                        target: target.to_string(),
                    }
                    .into());
                }
            }
        }

        let methods: BTreeSet<String> = terminals
            .keys()
            .filter(|slot| slot.owner == Owner::Service && slot.scope == Scope::Instance)
            .map(|slot| slot.method.clone())
            .collect();
        let mut steps = draft.steps.clone();
        let readers = steps.validate(&Container {
            attributes: &draft.attributes,
            methods: &methods,
        })?;
        steps.freeze();

        let slots: BTreeSet<&Slot> = draft.stacks.keys().chain(terminals.keys()).collect();
        let chains = slots
            .into_iter()
            .map(|slot| {
                let layers = draft
                    .stacks
                    .get(slot)
                    .map(|stack| stack.entries().to_vec())
                    .unwrap_or_default();
                let chain = CompiledChain::new(owner.clone(), slot.clone(), layers, terminals.get(slot).cloned());
                (slot.clone(), Arc::new(chain))
            })
            .collect();

        Ok(Self {
            owner,
            chains,
            steps: steps.iter().cloned().collect(),
            readers,
            attributes: draft.attributes.clone(),
            aspects: draft.aspect_names().into_iter().map(str::to_string).collect(),
        })
    }

    #[must_use]
    pub fn owner(&self) -> &ServiceId {
        &self.owner
    }

    #[must_use]
    pub fn chain(&self, slot: &Slot) -> Option<&Arc<CompiledChain>> {
        self.chains.get(slot)
    }

    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.chains.keys()
    }

    #[must_use]
    pub fn steps(&self) -> &[Arc<StepDef>] {
        &self.steps
    }

    /// Index of the step that writes the output reader `name`.
    #[must_use]
    pub fn reader(&self, name: &str) -> Option<usize> {
        self.readers.get(name).copied()
    }

    #[must_use]
    pub fn readers(&self) -> &Readers {
        &self.readers
    }

    #[must_use]
    pub fn attributes(&self) -> &BTreeSet<String> {
        &self.attributes
    }

    #[must_use]
    pub fn aspects(&self) -> &[String] {
        &self.aspects
    }
}

#[cfg(test)]
mod tests {
    use servitor_core::Value;

    use super::*;
    use crate::args::{Args, Output};
    use crate::class::ServiceClass;
    use crate::middleware::builtin::CacheResult;
    use crate::middleware::{Env, MethodFn};

    fn returning(text: &'static str) -> MethodFn {
        Arc::new(move |_env: &Env<'_>, _args: Args| Ok(Output::Value(Value::from(text))))
    }

    fn call(table: &DispatchTable, slot: &Slot) -> Output {
        let class = ServiceClass::new("Table");
        let env = Env::for_class(slot, &class);
        table.chain(slot).unwrap().call(&env, Args::new()).unwrap()
    }

    #[test]
    fn user_methods_override_defaults() {
        let mut draft = ConfigDraft::new(ServiceId::new("Table"));
        let greet = Slot::class("greet");
        let wave = Slot::class("wave");
        draft.define_default(greet.clone(), returning("default"));
        draft.define_default(wave.clone(), returning("default"));
        draft.define(greet.clone(), returning("user"));

        let table = DispatchTable::build(&draft).unwrap();
        assert_eq!(call(&table, &greet), Output::Value(Value::from("user")));
        assert_eq!(call(&table, &wave), Output::Value(Value::from("default")));
    }

    #[test]
    fn stack_without_method_compiles_without_terminal() {
        let mut draft = ConfigDraft::new(ServiceId::new("Table"));
        let slot = Slot::instance("audit");
        draft.stack_mut(slot.clone());

        let table = DispatchTable::build(&draft).unwrap();
        assert!(!table.chain(&slot).unwrap().has_terminal());
        assert!(table.chain(&Slot::instance("missing")).is_none());
    }

    #[test]
    fn misattached_middleware_is_rejected() {
        let mut draft = ConfigDraft::new(ServiceId::new("Table"));
        draft.stack_mut(Slot::class("result")).append(CacheResult).unwrap();
        assert!(matches!(
            DispatchTable::build(&draft),
            Err(Error::Middleware(MiddlewareError::Misattached { .. }))
        ));
    }
}
