//! Core behavior every service type starts with.

use std::sync::Arc;

use servitor_core::ServiceResult;

use super::Aspect;
use crate::args::{Args, Output};
use crate::config::ConfigDraft;
use crate::error::Error;
use crate::middleware::builtin::{CacheResult, RunSteps, SingleResult};
use crate::middleware::{Env, Mode, Slot};
use crate::step::pipeline::{action_terminal, evaluate, Pipeline};

/// Methods that produce exactly one result per invocation.
pub const RESULT_METHODS: [&str; 3] = ["result", "try_result", "fallback_result"];

type Predicate = fn(&ServiceResult) -> bool;

/// Status predicates generated in both scopes.
pub const PREDICATES: [(&str, Predicate); 6] = [
    ("success?", ServiceResult::is_success),
    ("failure?", ServiceResult::is_failure),
    ("error?", ServiceResult::is_error),
    ("not_success?", ServiceResult::is_not_success),
    ("not_failure?", ServiceResult::is_not_failure),
    ("not_error?", ServiceResult::is_not_error),
];

/// Result caching, single-result guard, step execution, predicates and the
/// default `result` entry points.
///
/// Instance `result` stack: `[cache_result, ensure_single_result, run_steps]`
/// over a default that succeeds with empty data when there are no steps.
/// Step-owned `result`, `try_result` and `fallback_result` stacks:
/// `[ensure_single_result]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Essential;

impl Essential {
    pub const NAME: &'static str = "essential";

    pub(crate) fn install(draft: &mut ConfigDraft) {
        let result = draft.stack_mut(Slot::instance("result"));
        result.push(Arc::new(CacheResult), Mode::Wrap);
        result.push(Arc::new(SingleResult), Mode::Wrap);
        result.push(Arc::new(RunSteps), Mode::Wrap);

        for method in RESULT_METHODS {
            draft
                .stack_mut(Slot::step(method))
                .push(Arc::new(SingleResult), Mode::Wrap);
        }
        draft.define_default(
            Slot::instance("result"),
            Arc::new(|env: &Env<'_>, _args: Args| Pipeline::new(env.instance()?).run().map(Output::Result)),
        );
        draft.define_default(Slot::step("result"), action_terminal(None));
        draft.define_default(Slot::step("try_result"), action_terminal(Some("try")));
        draft.define_default(Slot::step("fallback_result"), action_terminal(Some("fallback")));

        draft.define_default(
            Slot::instance("step"),
            Arc::new(|env: &Env<'_>, _args: Args| {
                let organizer = env.instance()?;
                evaluate(organizer, env.step()?).map(Output::Result)
            }),
        );
        draft.define_default(
            Slot::class("result"),
            Arc::new(|env: &Env<'_>, args: Args| {
                let organizer = env.class().new_instance(args)?;
                organizer.result().map(Output::Result)
            }),
        );

        for (method, predicate) in PREDICATES {
            draft.define_default(
                Slot::instance(method),
                Arc::new(move |env: &Env<'_>, _args: Args| {
                    let result = env.instance()?.result()?;
                    Ok(Output::from(predicate(&result)))
                }),
            );
            draft.define_default(
                Slot::class(method),
                Arc::new(move |env: &Env<'_>, args: Args| {
                    let result = env.class().result(args)?;
                    Ok(Output::from(predicate(&result)))
                }),
            );
        }
    }
}

impl Aspect for Essential {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn configure(&self, draft: &mut ConfigDraft) -> Result<(), Error> {
        Self::install(draft);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ServiceClass;
    use crate::middleware::Scope;

    #[test]
    fn every_class_starts_with_essential() {
        let class = ServiceClass::new("Plain");
        assert_eq!(class.aspect_names(), vec![Essential::NAME.to_string()]);
        assert!(!class.register_aspect(Essential).unwrap());
    }

    #[test]
    fn installs_result_stacks() {
        let class = ServiceClass::new("Plain");
        class.commit().unwrap();
        let result = class.chain(&Slot::instance("result")).unwrap();
        assert_eq!(
            result.layer_names(),
            vec![CacheResult::NAME, SingleResult::NAME, RunSteps::NAME]
        );
        assert!(result.has_terminal());

        for method in RESULT_METHODS {
            let chain = class.chain(&Slot::step(method)).unwrap();
            assert_eq!(chain.layer_names(), vec![SingleResult::NAME]);
            assert!(chain.has_terminal());
        }
    }

    #[test]
    fn predicates_exist_in_both_scopes() {
        let class = ServiceClass::new("Plain");
        for (method, _) in PREDICATES {
            assert!(class.has_method(&Slot::instance(method)).unwrap());
            assert!(class.has_method(&Slot::new(crate::middleware::Owner::Service, Scope::Class, method)).unwrap());
        }
    }
}
