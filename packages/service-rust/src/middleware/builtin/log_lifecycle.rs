use std::time::Instant;

use crate::args::{Args, Output};
use crate::error::Error;
use crate::instance::Instance;
use crate::middleware::{Env, Middleware, Next, Owner, Scope, Target};

/// Observer that reports every organizer `result` and `step` call through
/// `tracing` and records outcome counters and durations with `metrics`.
///
/// Reads the result status without running a predicate, so the caller's
/// status gate is left untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLifecycle;

impl LogLifecycle {
    pub const NAME: &'static str = "log_lifecycle";
}

impl Middleware for LogLifecycle {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn intended_for(&self) -> Target {
        Target::methods(["result", "step"])
            .scope(Scope::Instance)
            .owner(Owner::Service)
    }

    fn call(&self, env: &Env<'_>, args: Args, next: Next<'_>) -> Result<Output, Error> {
        let service = env.class().name();
        let method = env.slot().method.as_str();
        let instance = env.try_instance().map(Instance::id);
        let step = env.try_step().map(|s| s.def().step_ref());
        tracing::debug!(service, method, instance = ?instance, step = ?step, "started");

        let start = Instant::now();
        let outcome = next.run(env, args);
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        match &outcome {
            Ok(Output::Result(result)) => {
                let status = result.status().as_str();
                tracing::info!(
                    service,
                    method,
                    instance = ?instance,
                    step = ?step,
                    status,
                    code = %result.code_unchecked(),
                    duration_ms,
                    "finished"
                );
                metrics::counter!(
                    "servitor_results_total",
                    "service" => service.to_string(),
                    "method" => method.to_string(),
                    "status" => status
                )
                .increment(1);
                metrics::histogram!(
                    "servitor_result_duration_ms",
                    "service" => service.to_string(),
                    "method" => method.to_string()
                )
                .record(duration_ms);
            }
            Ok(_) => tracing::debug!(service, method, duration_ms, "finished without a result"),
            Err(err) => {
                tracing::warn!(service, method, instance = ?instance, error = %err, duration_ms, "failed");
                metrics::counter!(
                    "servitor_failed_calls_total",
                    "service" => service.to_string(),
                    "method" => method.to_string()
                )
                .increment(1);
            }
        }
        outcome
    }
}
