//! Organizer instances.
//!
//! An [`Instance`] is one invocation of a service type: the constructor
//! attributes, the outputs written by its steps, one runtime [`Step`] per
//! declared step and the memoized result. Every method call on it dispatches
//! through the committed [`DispatchTable`] of its type.
//!
//! Result factories ([`Instance::success`], [`Instance::failure`],
//! [`Instance::error`]) are tracked per result frame: a method guarded by
//! `ensure_single_result` that produces two results fails with
//! `ResultError::DoubleResult`.

use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use servitor_core::{Code, Data, ResultError, ServiceId, ServiceResult, Status, Value};
use uuid::Uuid;

use crate::args::{Args, Output};
use crate::class::ServiceClass;
use crate::config::DispatchTable;
use crate::error::Error;
use crate::middleware::{CompiledChain, Env, Slot};
use crate::step::{Step, StepError};

/// Bookkeeping of one guarded result-producing call.
#[derive(Debug)]
struct Frame {
    slot: Slot,
    produced: Option<Status>,
}

/// Closes a result frame when the guarded call returns.
pub(crate) struct FrameGuard<'a> {
    frames: &'a Mutex<Vec<Frame>>,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.frames.lock().pop();
    }
}

/// One invocation of a service type.
pub struct Instance {
    id: Uuid,
    class: ServiceClass,
    table: Arc<DispatchTable>,
    attributes: Data,
    outputs: RwLock<Data>,
    steps: Vec<Step>,
    result: OnceLock<ServiceResult>,
    frames: Mutex<Vec<Frame>>,
}

impl Instance {
    pub(crate) fn new(class: ServiceClass, table: Arc<DispatchTable>, attributes: Data) -> Self {
        let steps = table.steps().iter().cloned().map(Step::new).collect();
        let id = Uuid::new_v4();
        tracing::trace!(service = %class.id(), instance = %id, "organizer created");
        Self {
            id,
            class,
            table,
            attributes,
            outputs: RwLock::new(Data::new()),
            steps,
            result: OnceLock::new(),
            frames: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn class(&self) -> &ServiceClass {
        &self.class
    }

    #[must_use]
    pub fn service_id(&self) -> &ServiceId {
        self.class.id()
    }

    /// Attributes the organizer was constructed with.
    #[must_use]
    pub fn attributes(&self) -> &Data {
        &self.attributes
    }

    /// Snapshot of the outputs written so far.
    #[must_use]
    pub fn outputs(&self) -> Data {
        self.outputs.read().clone()
    }

    #[must_use]
    pub fn output(&self, name: &str) -> Option<Value> {
        self.outputs.read().get(name).cloned()
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    fn chain(&self, slot: &Slot) -> Result<&Arc<CompiledChain>, Error> {
        self.table.chain(slot).ok_or_else(|| Error::MethodNotDefined {
            owner: self.service_id().clone(),
            slot: slot.clone(),
        })
    }

    /// Calls an instance method through its middleware chain.
    ///
    /// # Errors
    ///
    /// Returns `Error::MethodNotDefined` for unknown methods, or whatever the
    /// chain returns.
    pub fn call(&self, method: &str, args: impl Into<Args>) -> Result<Output, Error> {
        let slot = Slot::instance(method);
        let chain = self.chain(&slot)?;
        chain.call(&Env::for_instance(&slot, self), args.into())
    }

    /// The organizer's result. Runs the pipeline on first call; later calls
    /// return the same result instance.
    ///
    /// # Errors
    ///
    /// Propagates action errors and programmer errors raised while producing
    /// the result.
    pub fn result(&self) -> Result<ServiceResult, Error> {
        let slot = Slot::instance("result");
        let chain = self.chain(&slot)?;
        chain.call(&Env::for_instance(&slot, self), Args::new())?.into_result(&slot)
    }

    fn predicate(&self, method: &str) -> Result<bool, Error> {
        let slot = Slot::instance(method);
        let chain = self.chain(&slot)?;
        chain.call(&Env::for_instance(&slot, self), Args::new())?.into_bool(&slot)
    }

    /// # Errors
    ///
    /// Any error [`Instance::result`] can return.
    pub fn is_success(&self) -> Result<bool, Error> {
        self.predicate("success?")
    }

    /// # Errors
    ///
    /// Any error [`Instance::result`] can return.
    pub fn is_failure(&self) -> Result<bool, Error> {
        self.predicate("failure?")
    }

    /// # Errors
    ///
    /// Any error [`Instance::result`] can return.
    pub fn is_error(&self) -> Result<bool, Error> {
        self.predicate("error?")
    }

    /// # Errors
    ///
    /// Any error [`Instance::result`] can return.
    pub fn is_not_success(&self) -> Result<bool, Error> {
        self.predicate("not_success?")
    }

    /// # Errors
    ///
    /// Any error [`Instance::result`] can return.
    pub fn is_not_failure(&self) -> Result<bool, Error> {
        self.predicate("not_failure?")
    }

    /// # Errors
    ///
    /// Any error [`Instance::result`] can return.
    pub fn is_not_error(&self) -> Result<bool, Error> {
        self.predicate("not_error?")
    }

    // -----------------------------------------------------------------------
    // Result factories
    // -----------------------------------------------------------------------

    fn produce(&self, result: ServiceResult) -> Result<ServiceResult, Error> {
        let mut frames = self.frames.lock();
        if let Some(frame) = frames.last_mut() {
            if let Some(first) = frame.produced {
                tracing::warn!(
                    service = %self.service_id(),
                    instance = %self.id,
                    slot = %frame.slot,
                    first = %first,
                    second = %result.status(),
                    "second result produced in one call"
                );
                return Err(ResultError::DoubleResult {
                    service: self.service_id().clone(),
                    first,
                    second: result.status(),
                }
                .into());
            }
            frame.produced = Some(result.status());
        }
        Ok(result)
    }

    /// Produces a `success` result attributed to this service.
    ///
    /// # Errors
    ///
    /// Returns `ResultError::DoubleResult` if the current guarded call has
    /// already produced a result.
    pub fn success(&self, data: Data) -> Result<ServiceResult, Error> {
        self.produce(ServiceResult::success(self.service_id().clone(), data))
    }

    /// Produces a `failure` result attributed to this service.
    ///
    /// # Errors
    ///
    /// Returns `ResultError::DoubleResult` if the current guarded call has
    /// already produced a result.
    pub fn failure(&self, data: Data, message: impl Into<String>) -> Result<ServiceResult, Error> {
        self.produce(ServiceResult::failure(self.service_id().clone(), data, message))
    }

    /// Produces an `error` result attributed to this service.
    ///
    /// # Errors
    ///
    /// Returns `ResultError::DoubleResult` if the current guarded call has
    /// already produced a result.
    pub fn error(&self, message: impl Into<String>, code: impl Into<Code>) -> Result<ServiceResult, Error> {
        self.produce(ServiceResult::error(self.service_id().clone(), message, code))
    }

    // -----------------------------------------------------------------------
    // Attribute readers
    // -----------------------------------------------------------------------

    /// Reads a named value of the organizer.
    ///
    /// Lookup order: written outputs, constructor attributes, output readers
    /// whose step has not run yet (an error), zero-argument instance methods,
    /// declared attributes left unset (`Null`).
    ///
    /// # Errors
    ///
    /// Returns `StepError::OutputNotComputed` for outputs of steps that have
    /// not run, `Error::UnknownAttribute` for names that resolve to nothing,
    /// and errors of the method called.
    pub fn read(&self, name: &str) -> Result<Value, Error> {
        if let Some(value) = self.output(name) {
            return Ok(value);
        }
        if let Some(value) = self.attributes.get(name) {
            return Ok(value.clone());
        }
        if let Some(step) = self.table.reader(name) {
            return Err(StepError::OutputNotComputed {
                name: name.to_string(),
                step,
            }
            .into());
        }
        let slot = Slot::instance(name);
        if let Some(chain) = self.table.chain(&slot).filter(|c| c.has_terminal()) {
            return chain.call(&Env::for_instance(&slot, self), Args::new())?.into_value(&slot);
        }
        if self.table.attributes().contains(name) {
            return Ok(Value::Null);
        }
        Err(Error::UnknownAttribute {
            owner: self.service_id().clone(),
            name: name.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// # Errors
    ///
    /// Returns `StepError::NoSuchStep` for indices past the last step.
    pub fn step(&self, index: usize) -> Result<&Step, Error> {
        self.steps.get(index).ok_or_else(|| {
            StepError::NoSuchStep {
                owner: self.service_id().clone(),
                index,
            }
            .into()
        })
    }

    /// Evaluates `step` through the instance `step` chain.
    pub(crate) fn run_step(&self, step: &Step) -> Result<ServiceResult, Error> {
        let slot = Slot::instance("step");
        let chain = self.chain(&slot)?;
        let args = Args::positional(vec![Value::from(step.index())]);
        chain.call(&Env::for_step(&slot, self, step), args)?.into_result(&slot)
    }

    /// Runs a step-owned method (`result`, `try_result`, `fallback_result`).
    pub(crate) fn run_step_method(&self, step: &Step, method: &str, args: Args) -> Result<ServiceResult, Error> {
        let slot = Slot::step(method);
        let chain = self.chain(&slot)?;
        chain.call(&Env::for_step(&slot, self, step), args)?.into_result(&slot)
    }

    // -----------------------------------------------------------------------
    // Framework hooks
    // -----------------------------------------------------------------------

    pub(crate) fn open_frame(&self, slot: &Slot) -> FrameGuard<'_> {
        self.frames.lock().push(Frame {
            slot: slot.clone(),
            produced: None,
        });
        FrameGuard { frames: &self.frames }
    }

    pub(crate) fn cached_result(&self) -> Option<&ServiceResult> {
        self.result.get()
    }

    /// Memoizes `result`; if another result won the race, that one is kept.
    pub(crate) fn cache_result(&self, result: ServiceResult) -> ServiceResult {
        self.result.get_or_init(|| result).clone()
    }

    pub(crate) fn write_output(&self, name: &str, value: Value) {
        self.outputs.write().insert(name.to_string(), value);
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("service", self.service_id())
            .field("attributes", &self.attributes)
            .field("outputs", &*self.outputs.read())
            .field("steps", &self.steps)
            .field("has_result", &self.result.get().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use servitor_core::data;

    use super::*;
    use crate::step::StepSpec;

    fn greeter() -> ServiceClass {
        let class = ServiceClass::new("Greeter");
        class.attribute("name").unwrap();
        class.attribute("title").unwrap();
        class
            .define_method("greeting", |organizer, _args| {
                let name = organizer.read("name")?;
                let name = name.as_str().unwrap_or("stranger");
                Ok(Output::Value(Value::from(format!("hello {name}"))))
            })
            .unwrap();
        class
            .step(StepSpec::method("greet").input("greeting").output("message"))
            .unwrap();
        class
            .define_method("greet", |organizer, args| {
                let greeting = args.require("greeting")?.clone();
                Ok(organizer.success(data! { "message" => greeting })?.into())
            })
            .unwrap();
        class
    }

    #[test]
    fn read_follows_lookup_order() {
        let class = greeter();
        let organizer = class.new_instance(data! { "name" => "ada" }).unwrap();

        assert_eq!(organizer.read("name").unwrap(), Value::from("ada"));
        assert_eq!(organizer.read("title").unwrap(), Value::Null);
        assert_eq!(organizer.read("greeting").unwrap(), Value::from("hello ada"));
        assert!(matches!(
            organizer.read("message"),
            Err(Error::Step(StepError::OutputNotComputed { step: 0, .. }))
        ));
        assert!(matches!(organizer.read("nope"), Err(Error::UnknownAttribute { .. })));

        organizer.result().unwrap();
        assert_eq!(organizer.read("message").unwrap(), Value::from("hello ada"));
    }

    #[test]
    fn result_is_memoized() {
        let organizer = greeter().new_instance(data! { "name" => "ada" }).unwrap();
        let first = organizer.result().unwrap();
        let second = organizer.result().unwrap();
        assert!(ServiceResult::ptr_eq(&first, &second));
        assert!(organizer.steps()[0].is_evaluated());
        assert!(organizer.is_success().unwrap());
        assert!(!organizer.is_error().unwrap());
    }

    #[test]
    fn second_result_in_one_call_is_rejected() {
        let class = ServiceClass::new("Greedy");
        class
            .define_method("result", |organizer, _args| {
                organizer.success(Data::new())?;
                Ok(organizer.failure(Data::new(), "again")?.into())
            })
            .unwrap();
        let organizer = class.new_instance(Data::new()).unwrap();
        match organizer.result() {
            Err(Error::Result(ResultError::DoubleResult { first, second, .. })) => {
                assert_eq!(first, Status::Success);
                assert_eq!(second, Status::Failure);
            }
            other => panic!("expected a double result error, got {other:?}"),
        }
    }

    #[test]
    fn factories_outside_guarded_calls_are_unrestricted() {
        let organizer = ServiceClass::new("Free").new_instance(Data::new()).unwrap();
        assert!(organizer.success(Data::new()).is_ok());
        assert!(organizer.error("down", "unavailable").is_ok());
    }

    #[test]
    fn unknown_methods_and_steps() {
        let organizer = greeter().new_instance(Data::new()).unwrap();
        assert!(matches!(organizer.call("refund", Args::new()), Err(Error::MethodNotDefined { .. })));
        assert!(organizer.step(0).is_ok());
        assert!(matches!(
            organizer.step(3),
            Err(Error::Step(StepError::NoSuchStep { index: 3, .. }))
        ));
    }
}
