//! Append-then-freeze container of step definitions.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use servitor_core::ServiceId;

use super::{cast_action, Action, Join, StepDef, StepError, StepSpec};
use crate::binding::{cast, Direction};
use crate::error::Error;
use crate::middleware::Slot;

/// What a step collection is validated against at commit.
pub(crate) struct Container<'a> {
    /// Declared constructor attributes.
    pub attributes: &'a BTreeSet<String>,
    /// Instance methods with a terminal implementation.
    pub methods: &'a BTreeSet<String>,
}

/// Output reader name -> index of the step that writes it.
pub type Readers = BTreeMap<String, usize>;

/// Ordered step definitions of one service type.
#[derive(Debug, Clone)]
pub struct StepCollection {
    owner: ServiceId,
    steps: Vec<Arc<StepDef>>,
    frozen: bool,
}

impl StepCollection {
    #[must_use]
    pub fn new(owner: ServiceId) -> Self {
        Self {
            owner,
            steps: Vec::new(),
            frozen: false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arc<StepDef>> {
        self.steps.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<StepDef>> {
        self.steps.iter()
    }

    /// Casts `spec` and appends it, returning its index.
    ///
    /// # Errors
    ///
    /// Returns a `StepError` when the collection is frozen, the declared index
    /// does not match the position, the first step is an or-step, or a literal
    /// carries `try`/`fallback`; binding and action cast errors otherwise.
    pub fn append(&mut self, spec: StepSpec) -> Result<usize, Error> {
        if self.frozen {
            return Err(StepError::Frozen {
                owner: self.owner.clone(),
            }
            .into());
        }
        let index = self.steps.len();
        if let Some(declared) = spec.index {
            if declared != index {
                return Err(StepError::IndexMismatch {
                    owner: self.owner.clone(),
                    declared,
                    expected: index,
                }
                .into());
            }
        }
        if index == 0 && spec.join == Join::Or {
            return Err(StepError::OrStepFirst {
                owner: self.owner.clone(),
            }
            .into());
        }

        let action = cast_action(spec.action)?;
        let inputs = spec
            .inputs
            .into_iter()
            .map(|raw| cast(raw, Direction::Input))
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = spec
            .outputs
            .into_iter()
            .map(|raw| cast(raw, Direction::Output))
            .collect::<Result<Vec<_>, _>>()?;

        let def = StepDef {
            index,
            owner: self.owner.clone(),
            action,
            inputs,
            outputs,
            modifiers: spec.modifiers,
            join: spec.join,
        };
        if matches!(def.action, Action::Literal(_))
            && (def.modifiers.try_alternate || def.modifiers.fallback.is_some())
        {
            return Err(StepError::ModifierOnLiteral {
                owner: self.owner.clone(),
                step: def.step_ref(),
            }
            .into());
        }

        tracing::trace!(service = %self.owner, step = %def.step_ref(), "step declared");
        self.steps.push(Arc::new(def));
        Ok(index)
    }

    /// Rejects further appends.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Checks every action and binding against `container` and returns the
    /// output readers the steps generate.
    pub(crate) fn validate(&self, container: &Container<'_>) -> Result<Readers, Error> {
        let mut readers = Readers::new();
        for step in &self.steps {
            if let Action::Method(method) = &step.action {
                if !container.methods.contains(method) {
                    return Err(StepError::MissingMethod {
                        owner: self.owner.clone(),
                        step: step.step_ref(),
                        method: method.clone(),
                    }
                    .into());
                }
            }
            if step.modifiers.try_alternate {
                self.check_alternate(step, "try", container)?;
            }
            if step.modifiers.fallback.is_some() {
                self.check_alternate(step, "fallback", container)?;
            }
            for input in &step.inputs {
                let Some(source) = input.source() else {
                    continue;
                };
                let known = container.attributes.contains(source)
                    || readers.contains_key(source)
                    || container.methods.contains(source);
                if !known {
                    return Err(StepError::UnknownInputSource {
                        owner: self.owner.clone(),
                        step: step.step_ref(),
                        attribute: source.to_string(),
                    }
                    .into());
                }
            }
            for output in &step.outputs {
                readers.insert(output.name().to_string(), step.index);
            }
        }
        Ok(readers)
    }

    fn check_alternate(&self, step: &StepDef, modifier: &'static str, container: &Container<'_>) -> Result<(), Error> {
        let (path, defined) = match &step.action {
            Action::Method(method) => {
                let path = format!("{modifier}_{method}");
                let defined = container.methods.contains(&path);
                (path, defined)
            }
            Action::Service(class) => {
                let path = format!("{modifier}_result");
                let defined = class.has_method(&Slot::class(path.as_str()))?;
                (format!("{}::{path}", class.name()), defined)
            }
            Action::Literal(_) => (format!("{modifier}_literal"), false),
        };
        if defined {
            Ok(())
        } else {
            Err(StepError::MissingAlternate {
                owner: self.owner.clone(),
                step: step.step_ref(),
                modifier,
                path,
            }
            .into())
        }
    }
}
