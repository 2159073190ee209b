//! Step execution.
//!
//! [`Pipeline::run`] walks the organizer's steps in index order. Each step
//! is evaluated through the organizer's `step` chain, whose terminal
//! ([`evaluate`]) resolves inputs, runs the step-owned `result` chain and
//! applies the `try`, `fallback` and `negated` modifiers.

use std::sync::Arc;

use servitor_core::{Data, ServiceResult, Status};

use super::{Action, Join, Step, StepError};
use crate::args::{Args, Output};
use crate::error::Error;
use crate::instance::Instance;
use crate::middleware::{Env, MethodFn};

/// Ordered execution of an organizer's steps.
pub struct Pipeline<'a> {
    organizer: &'a Instance,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(organizer: &'a Instance) -> Self {
        Self { organizer }
    }

    /// Runs every step and produces the organizer's result.
    ///
    /// The first failure or error stops the pipeline unless the next step is
    /// an or-step, which then gets a chance to recover. When every evaluated
    /// step succeeds, the result carries all written outputs overlaid by the
    /// last step's own data.
    ///
    /// # Errors
    ///
    /// Propagates action errors and programmer errors from any step.
    pub fn run(&self) -> Result<ServiceResult, Error> {
        let organizer = self.organizer;
        let mut written = Data::new();
        let mut last: Option<(&Step, ServiceResult)> = None;
        let mut pending: Option<(&Step, ServiceResult)> = None;

        for step in organizer.steps() {
            if step.def().join() == Join::Or {
                if pending.is_none() {
                    tracing::trace!(
                        service = %organizer.service_id(),
                        step = %step.def().step_ref(),
                        "or-step skipped"
                    );
                    continue;
                }
            } else if let Some((failed, result)) = pending.take() {
                return self.short_circuit(failed, &result);
            }

            tracing::trace!(
                service = %organizer.service_id(),
                instance = %organizer.id(),
                step = %step.def().step_ref(),
                "running step"
            );
            let result = organizer.run_step(step)?;
            match result.status() {
                Status::Success => {
                    self.apply_outputs(step, &result, &mut written)?;
                    pending = None;
                    last = Some((step, result));
                }
                Status::Failure => pending = Some((step, result)),
                Status::Error => return self.short_circuit(step, &result),
            }
        }

        if let Some((failed, result)) = pending {
            return self.short_circuit(failed, &result);
        }
        match last {
            Some((step, result)) => self.finish(step, &result, written),
            None => Ok(ServiceResult::success(organizer.service_id().clone(), written)),
        }
    }

    fn apply_outputs(&self, step: &Step, result: &ServiceResult, written: &mut Data) -> Result<(), Error> {
        for binding in step.def().outputs() {
            let value = result
                .data_unchecked()
                .get(binding.key())
                .cloned()
                .ok_or_else(|| StepError::MissingOutput {
                    step: step.def().step_ref(),
                    key: binding.key().to_string(),
                })?;
            self.organizer.write_output(binding.name(), value.clone());
            written.insert(binding.name().to_string(), value);
        }
        Ok(())
    }

    /// Parent to attach when re-attributing `result` to the organizer.
    fn parent_for(&self, result: &ServiceResult) -> Option<ServiceResult> {
        if result.service() == self.organizer.service_id() {
            result.parent().cloned()
        } else {
            Some(result.clone())
        }
    }

    fn short_circuit(&self, step: &Step, result: &ServiceResult) -> Result<ServiceResult, Error> {
        tracing::debug!(
            service = %self.organizer.service_id(),
            instance = %self.organizer.id(),
            step = %step.def().step_ref(),
            status = %result.status(),
            "pipeline short-circuited"
        );
        Ok(result
            .copy_with()
            .service(self.organizer.service_id().clone())
            .step(Some(step.def().step_ref()))
            .parent(self.parent_for(result))
            .build()?)
    }

    fn finish(&self, step: &Step, result: &ServiceResult, mut written: Data) -> Result<ServiceResult, Error> {
        written.extend(result.data_unchecked().iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(result
            .copy_with()
            .service(self.organizer.service_id().clone())
            .data(written)
            .step(Some(step.def().step_ref()))
            .parent(self.parent_for(result))
            .build()?)
    }
}

/// Evaluates one step for `organizer`. Terminal of the instance `step` method.
///
/// A step that already has an outcome returns it without running again.
///
/// # Errors
///
/// Propagates input resolution failures and errors from the step chains.
pub fn evaluate(organizer: &Instance, step: &Step) -> Result<ServiceResult, Error> {
    if let Some(done) = step.outcome() {
        return Ok(done.clone());
    }

    let def = step.def();
    let mut named = Data::new();
    for binding in def.inputs() {
        named.insert(binding.key().to_string(), binding.resolve(organizer)?);
    }
    let args = Args::named(named);
    let modifiers = def.modifiers();

    let mut result = organizer.run_step_method(step, "result", args.clone())?;
    if modifiers.try_alternate && !result.status().is_success() {
        let alternate = organizer.run_step_method(step, "try_result", args.clone())?;
        if alternate.status().is_success() {
            result = alternate;
        } else {
            tracing::trace!(step = %def.step_ref(), "try path did not succeed");
        }
    }
    if let Some(on) = modifiers.fallback {
        if on.matches(result.status()) {
            result = organizer.run_step_method(step, "fallback_result", args)?;
        }
    }
    if modifiers.negated {
        result = negate(&result)?;
    }
    Ok(step.record(result))
}

fn negate(result: &ServiceResult) -> Result<ServiceResult, Error> {
    let status = match result.status() {
        Status::Success => Status::Failure,
        Status::Failure => Status::Success,
        Status::Error => return Ok(result.clone()),
    };
    Ok(result.copy_with().status(status).default_code().build()?)
}

/// Terminal of the step-owned `result`, `try_result` and `fallback_result`
/// methods: invokes the step action or its alternate path.
pub(crate) fn action_terminal(alternate: Option<&'static str>) -> MethodFn {
    Arc::new(move |env: &Env<'_>, args: Args| {
        let organizer = env.instance()?;
        let step = env.step()?;
        match (step.def().action(), alternate) {
            (Action::Method(method), None) => organizer.call(method, args),
            (Action::Method(method), Some(prefix)) => organizer.call(&format!("{prefix}_{method}"), args),
            (Action::Service(class), None) => class.result(args).map(Output::Result),
            (Action::Service(class), Some(prefix)) => class.call(&format!("{prefix}_result"), args),
            (Action::Literal(data), _) => Ok(Output::Result(ServiceResult::success(
                organizer.service_id().clone(),
                data.clone(),
            ))),
        }
    })
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use servitor_core::{data, ServiceId, Value};

    use super::*;
    use crate::binding::RawBinding;
    use crate::class::ServiceClass;
    use crate::step::StepSpec;

    #[test]
    fn negation_swaps_success_and_failure() {
        let id = ServiceId::new("Check");
        let success = ServiceResult::success(id.clone(), data! { "found" => true });
        let negated = negate(&success).unwrap();
        assert_eq!(negated.status(), Status::Failure);
        assert!(negated.is_failure());
        assert_eq!(negated.code().unwrap().as_str(), "default_failure");
        assert_eq!(negated.data().unwrap()["found"], Value::Bool(true));

        let failure = ServiceResult::failure(id.clone(), Data::new(), "missing");
        assert_eq!(negate(&failure).unwrap().status(), Status::Success);

        let error = ServiceResult::error(id, "db down", "unavailable");
        let kept = negate(&error).unwrap();
        assert!(ServiceResult::ptr_eq(&kept, &error));
    }

    #[test]
    fn inputs_resolve_by_strategy() {
        let seen = Arc::new(Mutex::new(Data::new()));
        let class = ServiceClass::new("Charge");
        class.attribute("name").unwrap();
        class.attribute("total_cents").unwrap();
        let sink = seen.clone();
        class
            .define_method("charge", move |organizer, args| {
                *sink.lock() = args.named.clone();
                Ok(organizer.success(data! { "receipt" => "r-1" })?.into())
            })
            .unwrap();
        class
            .step(
                StepSpec::method("charge")
                    .input("name")
                    .input(RawBinding::alias("amount", "total_cents"))
                    .input(RawBinding::raw("currency", "EUR"))
                    .input(RawBinding::lazy("label", |organizer| {
                        let name = organizer.read("name")?;
                        Ok(Value::from(format!("card of {}", name.as_str().unwrap_or("?"))))
                    }))
                    .output(RawBinding::alias("receipt", "receipt_id")),
            )
            .unwrap();

        let organizer = class
            .new_instance(data! { "name" => "ada", "total_cents" => 1250 })
            .unwrap();
        let result = organizer.result().unwrap();
        assert!(result.is_success());

        let args = seen.lock().clone();
        assert_eq!(args["name"], Value::from("ada"));
        assert_eq!(args["amount"], Value::Int(1250));
        assert_eq!(args["currency"], Value::from("EUR"));
        assert_eq!(args["label"], Value::from("card of ada"));
        assert!(!args.contains_key("total_cents"));
        assert_eq!(organizer.output("receipt_id"), Some(Value::from("r-1")));
    }

    #[test]
    fn success_without_bound_output_is_an_error() {
        let class = ServiceClass::new("Quote");
        class
            .define_method("price", |organizer, _args| Ok(organizer.success(data! { "net" => 10 })?.into()))
            .unwrap();
        class.step(StepSpec::method("price").output("gross")).unwrap();

        match class.result(Data::new()) {
            Err(Error::Step(StepError::MissingOutput { step, key })) => {
                assert_eq!(key, "gross");
                assert_eq!(step.index, 0);
            }
            other => panic!("expected missing output error, got {other:?}"),
        }
    }
}
