//! Pipeline steps.
//!
//! 1. **Declaration** ([`StepSpec`]): action + bindings + modifiers, as written
//!    by the service author
//! 2. **Definition** ([`StepDef`]): the cast, indexed, immutable form held by
//!    the step collection
//! 3. **Runtime** ([`Step`]): one definition bound to one organizer, with a
//!    one-shot outcome
//! 4. **Execution** (`pipeline`): ordered evaluation with output binding and
//!    short-circuiting

pub mod collection;
pub mod pipeline;

use std::fmt;
use std::sync::{Arc, OnceLock};

use servitor_core::{Data, ServiceId, ServiceResult, Status, StepRef, Value};

use crate::binding::{validate_name, MethodBinding, RawBinding};
use crate::class::ServiceClass;

pub use collection::StepCollection;
pub use pipeline::Pipeline;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from declaring, validating and running steps.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error("{owner} has no method `{method}` required by {step}")]
    MissingMethod {
        owner: ServiceId,
        step: StepRef,
        method: String,
    },
    #[error("{owner}: {step} is marked `{modifier}` but `{path}` is not defined")]
    MissingAlternate {
        owner: ServiceId,
        step: StepRef,
        modifier: &'static str,
        path: String,
    },
    #[error("cannot cast a {found} into a step action")]
    UncastableAction { found: &'static str },
    #[error("{owner}: input `{attribute}` of {step} is neither an attribute, an earlier output nor a method")]
    UnknownInputSource {
        owner: ServiceId,
        step: StepRef,
        attribute: String,
    },
    #[error("{owner}: step declared with index {declared} would be at index {expected}")]
    IndexMismatch {
        owner: ServiceId,
        declared: usize,
        expected: usize,
    },
    #[error("{owner}: the first step cannot be an or-step")]
    OrStepFirst { owner: ServiceId },
    #[error("{owner}: literal {step} cannot be marked `try` or `fallback`")]
    ModifierOnLiteral { owner: ServiceId, step: StepRef },
    #[error("{owner}: the step collection is frozen")]
    Frozen { owner: ServiceId },
    #[error("output `{name}` is not computed yet (written by step #{step})")]
    OutputNotComputed { name: String, step: usize },
    #[error("{step} succeeded without `{key}` required by its output binding")]
    MissingOutput { step: StepRef, key: String },
    #[error("{owner} has no step #{index}")]
    NoSuchStep { owner: ServiceId, index: usize },
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// What a step invokes.
#[derive(Debug, Clone)]
pub enum Action {
    /// Another service type, run with the step inputs as constructor arguments.
    Service(ServiceClass),
    /// An instance method of the organizer.
    Method(String),
    /// A fixed successful result carrying this data.
    Literal(Data),
}

impl Action {
    /// Short description used in step references and logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Action::Service(class) => class.name().to_string(),
            Action::Method(name) => name.clone(),
            Action::Literal(_) => "literal".to_string(),
        }
    }
}

/// Declared shape of an action, before casting.
#[derive(Debug, Clone)]
pub enum RawAction {
    Name(String),
    Class(ServiceClass),
    Value(Value),
}

/// Casts a declared action shape.
///
/// Names and strings become method actions, maps become literals.
///
/// # Errors
///
/// Returns `StepError::UncastableAction` for any other value, or a binding
/// error for malformed method names.
pub fn cast_action(raw: RawAction) -> Result<Action, crate::Error> {
    match raw {
        RawAction::Name(name) | RawAction::Value(Value::String(name)) => {
            validate_name(&name)?;
            Ok(Action::Method(name))
        }
        RawAction::Class(class) => Ok(Action::Service(class)),
        RawAction::Value(Value::Map(data)) => Ok(Action::Literal(data)),
        RawAction::Value(other) => Err(StepError::UncastableAction {
            found: other.type_name(),
        }
        .into()),
    }
}

// ---------------------------------------------------------------------------
// Modifiers
// ---------------------------------------------------------------------------

/// How a step combines with the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Join {
    /// Runs after a success; a failure stops the pipeline.
    #[default]
    And,
    /// Runs only when the previously evaluated step failed.
    Or,
}

/// Statuses that trigger a step's fallback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackOn {
    Failure,
    Error,
    Any,
}

impl FallbackOn {
    #[must_use]
    pub fn matches(self, status: Status) -> bool {
        match (self, status) {
            (_, Status::Success) => false,
            (FallbackOn::Any, _)
            | (FallbackOn::Failure, Status::Failure)
            | (FallbackOn::Error, Status::Error) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    /// Run the `try_result` path on non-success and accept its success.
    pub try_alternate: bool,
    /// Replace matching non-success results with the `fallback_result` path.
    pub fallback: Option<FallbackOn>,
    /// Swap success and failure of the final step result.
    pub negated: bool,
}

// ---------------------------------------------------------------------------
// StepSpec
// ---------------------------------------------------------------------------

/// Declaration of one step.
///
/// ```ignore
/// class.step(StepSpec::method("charge").input("amount").output("receipt").with_try())?;
/// ```
#[derive(Debug, Clone)]
pub struct StepSpec {
    pub(crate) action: RawAction,
    pub(crate) inputs: Vec<RawBinding>,
    pub(crate) outputs: Vec<RawBinding>,
    pub(crate) index: Option<usize>,
    pub(crate) modifiers: Modifiers,
    pub(crate) join: Join,
}

impl StepSpec {
    #[must_use]
    pub fn cast(action: RawAction) -> Self {
        Self {
            action,
            inputs: Vec::new(),
            outputs: Vec::new(),
            index: None,
            modifiers: Modifiers::default(),
            join: Join::And,
        }
    }

    #[must_use]
    pub fn method(name: impl Into<String>) -> Self {
        Self::cast(RawAction::Name(name.into()))
    }

    #[must_use]
    pub fn service(class: &ServiceClass) -> Self {
        Self::cast(RawAction::Class(class.clone()))
    }

    #[must_use]
    pub fn literal(data: Data) -> Self {
        Self::cast(RawAction::Value(Value::Map(data)))
    }

    #[must_use]
    pub fn input(mut self, binding: impl Into<RawBinding>) -> Self {
        self.inputs.push(binding.into());
        self
    }

    #[must_use]
    pub fn output(mut self, binding: impl Into<RawBinding>) -> Self {
        self.outputs.push(binding.into());
        self
    }

    /// Expected position; declaring the step fails if it lands elsewhere.
    #[must_use]
    pub fn index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    #[must_use]
    pub fn with_try(mut self) -> Self {
        self.modifiers.try_alternate = true;
        self
    }

    #[must_use]
    pub fn fallback(mut self, on: FallbackOn) -> Self {
        self.modifiers.fallback = Some(on);
        self
    }

    #[must_use]
    pub fn negated(mut self) -> Self {
        self.modifiers.negated = true;
        self
    }

    #[must_use]
    pub fn or(mut self) -> Self {
        self.join = Join::Or;
        self
    }
}

// ---------------------------------------------------------------------------
// StepDef
// ---------------------------------------------------------------------------

/// Cast, indexed and immutable step declaration.
#[derive(Debug, Clone)]
pub struct StepDef {
    pub(crate) index: usize,
    pub(crate) owner: ServiceId,
    pub(crate) action: Action,
    pub(crate) inputs: Vec<MethodBinding>,
    pub(crate) outputs: Vec<MethodBinding>,
    pub(crate) modifiers: Modifiers,
    pub(crate) join: Join,
}

impl StepDef {
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn owner(&self) -> &ServiceId {
        &self.owner
    }

    #[must_use]
    pub fn action(&self) -> &Action {
        &self.action
    }

    #[must_use]
    pub fn inputs(&self) -> &[MethodBinding] {
        &self.inputs
    }

    #[must_use]
    pub fn outputs(&self) -> &[MethodBinding] {
        &self.outputs
    }

    #[must_use]
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    #[must_use]
    pub fn join(&self) -> Join {
        self.join
    }

    #[must_use]
    pub fn step_ref(&self) -> StepRef {
        StepRef::new(self.index, self.action.describe())
    }
}

// ---------------------------------------------------------------------------
// Step (runtime)
// ---------------------------------------------------------------------------

/// A step definition bound to one organizer instance.
///
/// The outcome is recorded once, when evaluation completes.
pub struct Step {
    def: Arc<StepDef>,
    outcome: OnceLock<ServiceResult>,
}

impl Step {
    pub(crate) fn new(def: Arc<StepDef>) -> Self {
        Self {
            def,
            outcome: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn def(&self) -> &StepDef {
        &self.def
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.def.index
    }

    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// Result the step finished with, once evaluated.
    #[must_use]
    pub fn outcome(&self) -> Option<&ServiceResult> {
        self.outcome.get()
    }

    /// Stores the outcome; a second call keeps the first outcome.
    pub(crate) fn record(&self, result: ServiceResult) -> ServiceResult {
        self.outcome.get_or_init(|| result).clone()
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("index", &self.def.index)
            .field("action", &self.def.action.describe())
            .field("evaluated", &self.is_evaluated())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use servitor_core::data;

    use super::*;
    use crate::Error;

    #[test]
    fn raw_actions_cast_by_shape() {
        assert!(matches!(cast_action(RawAction::Name("charge".into())), Ok(Action::Method(m)) if m == "charge"));
        assert!(matches!(
            cast_action(RawAction::Value(Value::from("refund"))),
            Ok(Action::Method(m)) if m == "refund"
        ));
        assert!(matches!(
            cast_action(RawAction::Value(Value::Map(data! { "x" => 1 }))),
            Ok(Action::Literal(d)) if d["x"] == Value::Int(1)
        ));
        let class = ServiceClass::new("Nested");
        assert!(matches!(cast_action(RawAction::Class(class)), Ok(Action::Service(c)) if c.name() == "Nested"));
    }

    #[test]
    fn uncastable_values_are_rejected() {
        for value in [Value::Int(3), Value::Null, Value::Array(vec![])] {
            let found = value.type_name();
            match cast_action(RawAction::Value(value)) {
                Err(Error::Step(StepError::UncastableAction { found: f })) => assert_eq!(f, found),
                other => panic!("expected uncastable action, got {other:?}"),
            }
        }
        assert!(matches!(
            cast_action(RawAction::Name("not a method".into())),
            Err(Error::Binding(_))
        ));
    }

    #[test]
    fn fallback_filter() {
        assert!(FallbackOn::Any.matches(Status::Failure));
        assert!(FallbackOn::Any.matches(Status::Error));
        assert!(!FallbackOn::Any.matches(Status::Success));
        assert!(FallbackOn::Failure.matches(Status::Failure));
        assert!(!FallbackOn::Failure.matches(Status::Error));
        assert!(FallbackOn::Error.matches(Status::Error));
        assert!(!FallbackOn::Error.matches(Status::Failure));
    }

    #[test]
    fn runtime_step_records_once() {
        let def = Arc::new(StepDef {
            index: 0,
            owner: ServiceId::new("Checkout"),
            action: Action::Method("charge".into()),
            inputs: Vec::new(),
            outputs: Vec::new(),
            modifiers: Modifiers::default(),
            join: Join::And,
        });
        let step = Step::new(def);
        assert!(!step.is_evaluated());

        let first = ServiceResult::success(ServiceId::new("Checkout"), Data::new());
        let second = ServiceResult::failure(ServiceId::new("Checkout"), Data::new(), "late");
        let kept = step.record(first.clone());
        let ignored = step.record(second);
        assert!(step.is_evaluated());
        assert!(ServiceResult::ptr_eq(&kept, &first));
        assert!(ServiceResult::ptr_eq(&ignored, &first));
        assert_eq!(step.def().step_ref(), StepRef::new(0, "charge"));
    }
}
