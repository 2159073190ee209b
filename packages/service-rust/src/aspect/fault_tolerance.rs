use servitor_core::Code;

use super::essential::RESULT_METHODS;
use super::Aspect;
use crate::config::ConfigDraft;
use crate::error::Error;
use crate::middleware::builtin::{Rescue, RunSteps};
use crate::middleware::Slot;

/// Code carried by results produced from rescued action errors.
pub const DEFAULT_CODE: &str = "unhandled_error";

/// Converts action errors raised while producing a result into an `error`
/// result.
///
/// Installs `rescue_errors` on the step-owned `result`, `try_result` and
/// `fallback_result` stacks, where it turns a failing step action or
/// alternate path into a terminal result of the pipeline, and on the
/// instance `result` stack just outside `run_steps`, where it covers
/// user-defined `result` methods.
#[derive(Debug, Clone)]
pub struct FaultTolerance {
    code: Code,
}

impl FaultTolerance {
    pub const NAME: &'static str = "fault_tolerance";

    #[must_use]
    pub fn new() -> Self {
        Self::with_code(DEFAULT_CODE)
    }

    #[must_use]
    pub fn with_code(code: impl Into<Code>) -> Self {
        Self { code: code.into() }
    }

    #[must_use]
    pub fn code(&self) -> &Code {
        &self.code
    }
}

impl Default for FaultTolerance {
    fn default() -> Self {
        Self::new()
    }
}

impl Aspect for FaultTolerance {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn configure(&self, draft: &mut ConfigDraft) -> Result<(), Error> {
        let result = draft.stack_mut(Slot::instance("result"));
        if result.contains(RunSteps::NAME) {
            result.insert_before(RunSteps::NAME, Rescue::new(self.code.clone()))?;
        } else {
            result.append(Rescue::new(self.code.clone()))?;
        }
        for method in RESULT_METHODS {
            draft
                .stack_mut(Slot::step(method))
                .append(Rescue::new(self.code.clone()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Output;
    use crate::class::ServiceClass;
    use crate::middleware::builtin::{CacheResult, SingleResult};
    use crate::step::{FallbackOn, StepSpec};
    use servitor_core::{data, Data, Status};

    fn failing_class() -> ServiceClass {
        let class = ServiceClass::new("Charge");
        class
            .define_method("charge", |_organizer, _args| {
                Err(Error::action(anyhow::anyhow!("gateway timeout")))
            })
            .unwrap();
        class.step(StepSpec::method("charge")).unwrap();
        class
    }

    #[test]
    fn installs_around_run_steps() {
        let class = failing_class();
        assert!(class.register_aspect(FaultTolerance::new()).unwrap());
        class.commit().unwrap();
        assert_eq!(
            class.chain(&Slot::instance("result")).unwrap().layer_names(),
            vec![CacheResult::NAME, SingleResult::NAME, Rescue::NAME, RunSteps::NAME]
        );
        assert_eq!(
            class.chain(&Slot::step("result")).unwrap().layer_names(),
            vec![SingleResult::NAME, Rescue::NAME]
        );
        for method in ["try_result", "fallback_result"] {
            assert_eq!(
                class.chain(&Slot::step(method)).unwrap().layer_names(),
                vec![SingleResult::NAME, Rescue::NAME]
            );
        }
    }

    #[test]
    fn action_errors_propagate_without_it() {
        let class = failing_class();
        let err = class.result(data! {}).unwrap_err();
        assert!(err.is_action());
    }

    #[test]
    fn action_errors_become_error_results() {
        let class = failing_class();
        class.register_aspect(FaultTolerance::with_code("gateway")).unwrap();
        let result = class.result(data! {}).unwrap();
        assert!(result.is_error());
        assert_eq!(result.code().unwrap().as_str(), "gateway");
        assert_eq!(result.message().unwrap(), "gateway timeout");
        assert_eq!(result.step().unwrap().index, 0);
    }

    #[test]
    fn programmer_errors_still_propagate() {
        let class = ServiceClass::new("Broken");
        class.define_method("total", |_organizer, _args| Ok(Output::Unit)).unwrap();
        class.step(StepSpec::method("total")).unwrap();
        class.register_aspect(FaultTolerance::new()).unwrap();
        let err = class.result(data! {}).unwrap_err();
        assert!(matches!(err, Error::UnexpectedOutput { .. }));
    }

    #[test]
    fn rescues_user_defined_result() {
        let class = ServiceClass::new("Custom");
        class
            .define_method("result", |_organizer, _args| {
                Err(Error::action(anyhow::anyhow!("boom")))
            })
            .unwrap();
        class.register_aspect(FaultTolerance::default()).unwrap();
        let result = class.result(data! {}).unwrap();
        assert_eq!(result.status(), Status::Error);
        assert!(result.is_error());
        assert_eq!(result.code().unwrap().as_str(), DEFAULT_CODE);
    }

    #[test]
    fn rescued_fallback_keeps_the_step() {
        let class = ServiceClass::new("Refund");
        class
            .define_method("refund", |organizer, _args| {
                Ok(organizer.failure(Data::new(), "card expired")?.into())
            })
            .unwrap();
        class
            .define_method("fallback_refund", |_organizer, _args| {
                Err(Error::action(anyhow::anyhow!("ledger offline")))
            })
            .unwrap();
        class.step(StepSpec::literal(data! { "ok" => true })).unwrap();
        class
            .step(StepSpec::method("refund").fallback(FallbackOn::Failure))
            .unwrap();
        class.register_aspect(FaultTolerance::new()).unwrap();

        let result = class.result(data! {}).unwrap();
        assert!(result.is_error());
        assert_eq!(result.message().unwrap(), "ledger offline");
        let step = result.step().unwrap();
        assert_eq!(step.index, 1);
        assert_eq!(step.action, "refund");
    }
}
