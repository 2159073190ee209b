//! Crate-wide error type.
//!
//! Every subsystem has its own `thiserror` enum; [`Error`] aggregates them so
//! that middleware, step actions and entry points share one return type.
//! `Error` is `Clone` because observe-mode middleware hands the same outcome
//! to the observer and to the caller.

use std::sync::Arc;

use servitor_core::{ResultError, ServiceId};

use crate::binding::BindingError;
use crate::config::ConfigError;
use crate::middleware::{MiddlewareError, Slot};
use crate::step::StepError;

/// Error returned by every fallible operation in this crate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Middleware(#[from] MiddlewareError),
    #[error(transparent)]
    Step(#[from] StepError),
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error(transparent)]
    Result(#[from] ResultError),
    #[error("{owner} does not define {slot}")]
    MethodNotDefined { owner: ServiceId, slot: Slot },
    #[error("{owner} has no attribute `{name}`")]
    UnknownAttribute { owner: ServiceId, name: String },
    #[error("{slot} returned {found}, expected {expected}")]
    UnexpectedOutput {
        slot: Slot,
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid argument: {0}")]
    Argument(String),
    /// Failure raised by user code inside a method or step action.
    #[error("action failed: {0}")]
    Action(Arc<anyhow::Error>),
}

impl Error {
    /// Wraps an arbitrary user error as an action failure.
    pub fn action(err: impl Into<anyhow::Error>) -> Self {
        Error::Action(Arc::new(err.into()))
    }

    /// Returns true for failures raised by user code, as opposed to
    /// configuration or usage errors of this crate.
    #[must_use]
    pub fn is_action(&self) -> bool {
        matches!(self, Error::Action(_))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Action(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anyhow_errors_become_actions() {
        let err: Error = anyhow::anyhow!("payment gateway timeout").into();
        assert!(err.is_action());
        assert_eq!(err.to_string(), "action failed: payment gateway timeout");
    }

    #[test]
    fn subsystem_errors_are_transparent() {
        let err: Error = ResultError::ParentChainTooDeep { limit: 3 }.into();
        assert!(!err.is_action());
        assert_eq!(err.to_string(), "parent result chain exceeds 3 levels");
    }

    #[test]
    fn clones_share_the_action_source() {
        let err = Error::action(std::io::Error::other("disk full"));
        let copy = err.clone();
        match (&err, &copy) {
            (Error::Action(a), Error::Action(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected action errors"),
        }
    }
}
