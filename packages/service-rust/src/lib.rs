//! Servitor — composable step-pipeline services.
//!
//! A service type ([`ServiceClass`]) declares attributes, steps and
//! middleware, then commits once into an immutable dispatch table. Each
//! invocation creates an organizer ([`Instance`]) that runs the steps in
//! order and produces a JSend-style [`ServiceResult`].
//!
//! 1. **Config** (`config`): draft, settings and the thread-safe one-time commit
//! 2. **Middleware** (`middleware`): per-method stacks compiled into onion chains
//! 3. **Steps** (`step`, `binding`): declaration, casting, validation and the pipeline
//! 4. **Aspects** (`aspect`): named behavior bundles (`Essential`,
//!    `FaultTolerance`, `Logging`)
//! 5. **Runtime** (`class`, `instance`): entry points, readers and predicates

pub mod args;
pub mod aspect;
pub mod binding;
pub mod class;
pub mod config;
pub mod error;
pub mod instance;
pub mod middleware;
pub mod step;

pub use args::{Args, Block, Output};
pub use aspect::{Aspect, Essential, FaultTolerance, Logging};
pub use binding::{Direction, MethodBinding, RawBinding, Strategy};
pub use class::ServiceClass;
pub use config::{ConfigDraft, ConfigError, DispatchTable, Settings};
pub use error::Error;
pub use instance::Instance;
pub use middleware::{Env, Middleware, MiddlewareError, MiddlewareStack, Mode, Next, Owner, Scope, Slot, Target};
pub use step::{FallbackOn, Join, RawAction, Step, StepError, StepSpec};

pub use servitor_core::{
    data, Code, Data, Payload, ResultError, ResultParts, ServiceId, ServiceResult, Status, StepRef, Value,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }

    #[test]
    fn end_to_end_with_every_aspect() {
        let class = ServiceClass::new("Invoice");
        class.attribute("amount").unwrap();
        class.register_aspect(FaultTolerance::new()).unwrap();
        class.register_aspect(Logging).unwrap();
        class
            .define_method("total", |organizer, args| {
                let amount = args.require_i64("amount")?;
                if amount < 0 {
                    return Err(anyhow::anyhow!("negative amount {amount}").into());
                }
                Ok(organizer.success(data! { "total" => amount + amount / 10 })?.into())
            })
            .unwrap();
        class
            .step(StepSpec::method("total").input("amount").output("total"))
            .unwrap();

        assert_eq!(
            class.aspect_names(),
            vec!["essential".to_string(), "fault_tolerance".to_string(), "logging".to_string()]
        );

        let paid = class.result(data! { "amount" => 100 }).unwrap();
        assert!(paid.is_success());
        assert_eq!(paid.data().unwrap()["total"], Value::Int(110));

        let broken = class.result(data! { "amount" => -5 }).unwrap();
        assert!(broken.is_error());
        assert_eq!(broken.message().unwrap(), "negative amount -5");
        assert_eq!(broken.code().unwrap().as_str(), "unhandled_error");
    }
}
