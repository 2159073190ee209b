//! JSend-style tri-state service result.
//!
//! A [`ServiceResult`] is an immutable value: its status is fixed at
//! construction and a changed outcome is expressed by building a new result
//! with [`ServiceResult::copy_with`]. Cloning a `ServiceResult` clones a
//! handle to the same instance, so the one-shot `checked` flag is shared
//! between clones.
//!
//! # Status gate
//!
//! The payload accessors ([`ServiceResult::data`], [`ServiceResult::message`],
//! [`ServiceResult::code`]) refuse to answer until one of the status
//! predicates (`is_success`, `is_failure`, `is_error` or their negations) has
//! been called on the instance. This forces callers to branch on the outcome
//! before consuming it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::{ServiceId, StepRef};
use crate::status::{Code, Status};
use crate::value::Data;

/// Hard limit on the length of a parent-result chain.
pub const MAX_PARENT_DEPTH: usize = 1000;

/// Programmer-usage errors raised by result access and construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultError {
    #[error("status of the {service} result is not checked: call a status predicate before reading `{field}`")]
    StatusNotChecked {
        service: ServiceId,
        field: &'static str,
    },
    #[error("{service} produced more than one result in a single invocation (first {first}, then {second})")]
    DoubleResult {
        service: ServiceId,
        first: Status,
        second: Status,
    },
    #[error("cannot unwrap the data of an error result from {service}: {message} ({code})")]
    UnwrapOnError {
        service: ServiceId,
        message: String,
        code: Code,
    },
    #[error("parent result chain exceeds {limit} levels")]
    ParentChainTooDeep { limit: usize },
}

// ---------------------------------------------------------------------------
// ServiceResult
// ---------------------------------------------------------------------------

struct ResultInner {
    status: Status,
    data: Data,
    message: String,
    code: Code,
    service: ServiceId,
    step: Option<StepRef>,
    parent: Option<ServiceResult>,
    depth: usize,
    checked: AtomicBool,
}

/// Immutable tri-state outcome of a service invocation.
#[derive(Clone)]
pub struct ServiceResult {
    inner: Arc<ResultInner>,
}

impl ServiceResult {
    /// Successful result carrying `data`.
    #[must_use]
    pub fn success(service: ServiceId, data: Data) -> Self {
        Self::from_parts(Status::Success, service, data, String::new(), None)
    }

    /// Client-caused failure carrying `data` and a human-readable `message`.
    #[must_use]
    pub fn failure(service: ServiceId, data: Data, message: impl Into<String>) -> Self {
        Self::from_parts(Status::Failure, service, data, message.into(), None)
    }

    /// Logic/server-caused error carrying a `message` and a machine-readable `code`.
    #[must_use]
    pub fn error(service: ServiceId, message: impl Into<String>, code: impl Into<Code>) -> Self {
        Self::from_parts(
            Status::Error,
            service,
            Data::new(),
            message.into(),
            Some(code.into()),
        )
    }

    fn from_parts(
        status: Status,
        service: ServiceId,
        data: Data,
        message: String,
        code: Option<Code>,
    ) -> Self {
        Self {
            inner: Arc::new(ResultInner {
                status,
                data,
                message,
                code: code.unwrap_or_else(|| Code::default_for(status)),
                service,
                step: None,
                parent: None,
                depth: 0,
                checked: AtomicBool::new(false),
            }),
        }
    }

    /// Starts a builder for a fresh result with the given status.
    #[must_use]
    pub fn builder(status: Status, service: ServiceId) -> ResultBuilder {
        ResultBuilder {
            status,
            service,
            data: Data::new(),
            message: String::new(),
            code: None,
            step: None,
            parent: None,
        }
    }

    /// Starts a builder pre-filled with every field of this result.
    ///
    /// The new instance is unchecked regardless of this one's state.
    #[must_use]
    pub fn copy_with(&self) -> ResultBuilder {
        let inner = &self.inner;
        ResultBuilder {
            status: inner.status,
            service: inner.service.clone(),
            data: inner.data.clone(),
            message: inner.message.clone(),
            code: Some(inner.code.clone()),
            step: inner.step.clone(),
            parent: inner.parent.clone(),
        }
    }

    // -- ungated accessors ---------------------------------------------------

    /// Outcome discriminant. Does not mark the result as checked.
    #[must_use]
    pub fn status(&self) -> Status {
        self.inner.status
    }

    #[must_use]
    pub fn service(&self) -> &ServiceId {
        &self.inner.service
    }

    #[must_use]
    pub fn step(&self) -> Option<&StepRef> {
        self.inner.step.as_ref()
    }

    #[must_use]
    pub fn parent(&self) -> Option<&ServiceResult> {
        self.inner.parent.as_ref()
    }

    /// Number of ancestors reachable through [`ServiceResult::parent`].
    #[must_use]
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    /// Iterates ancestors, nearest first.
    #[must_use]
    pub fn parents(&self) -> Parents<'_> {
        Parents {
            next: self.parent(),
            remaining: MAX_PARENT_DEPTH,
        }
    }

    /// Whether a status predicate has been called on this instance.
    #[must_use]
    pub fn is_checked(&self) -> bool {
        self.inner.checked.load(Ordering::Acquire)
    }

    /// Returns true if both handles point at the same result instance.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    // -- status predicates ---------------------------------------------------

    fn check(&self, status: Status) -> bool {
        self.inner.checked.store(true, Ordering::Release);
        self.inner.status == status
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.check(Status::Success)
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.check(Status::Failure)
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.check(Status::Error)
    }

    #[must_use]
    pub fn is_not_success(&self) -> bool {
        !self.is_success()
    }

    #[must_use]
    pub fn is_not_failure(&self) -> bool {
        !self.is_failure()
    }

    #[must_use]
    pub fn is_not_error(&self) -> bool {
        !self.is_error()
    }

    // -- gated accessors -----------------------------------------------------

    fn ensure_checked(&self, field: &'static str) -> Result<(), ResultError> {
        if self.is_checked() {
            Ok(())
        } else {
            Err(ResultError::StatusNotChecked {
                service: self.inner.service.clone(),
                field,
            })
        }
    }

    /// Result payload.
    ///
    /// # Errors
    ///
    /// Returns `ResultError::StatusNotChecked` if no status predicate has been
    /// called on this instance yet.
    pub fn data(&self) -> Result<&Data, ResultError> {
        self.ensure_checked("data")?;
        Ok(&self.inner.data)
    }

    /// Human-readable message.
    ///
    /// # Errors
    ///
    /// Returns `ResultError::StatusNotChecked` if no status predicate has been
    /// called on this instance yet.
    pub fn message(&self) -> Result<&str, ResultError> {
        self.ensure_checked("message")?;
        Ok(&self.inner.message)
    }

    /// Machine-readable code.
    ///
    /// # Errors
    ///
    /// Returns `ResultError::StatusNotChecked` if no status predicate has been
    /// called on this instance yet.
    pub fn code(&self) -> Result<&Code, ResultError> {
        self.ensure_checked("code")?;
        Ok(&self.inner.code)
    }

    /// Payload without the status gate. Meant for the pipeline engine and
    /// observers that must not alter the caller-visible `checked` state.
    #[must_use]
    pub fn data_unchecked(&self) -> &Data {
        &self.inner.data
    }

    #[must_use]
    pub fn message_unchecked(&self) -> &str {
        &self.inner.message
    }

    #[must_use]
    pub fn code_unchecked(&self) -> &Code {
        &self.inner.code
    }

    /// Convenience shortcut returning the data of a success or failure.
    ///
    /// Marks the result as checked.
    ///
    /// # Errors
    ///
    /// Returns `ResultError::UnwrapOnError` for error results.
    pub fn unwrap_data(&self) -> Result<&Data, ResultError> {
        if self.is_error() {
            return Err(ResultError::UnwrapOnError {
                service: self.inner.service.clone(),
                message: self.inner.message.clone(),
                code: self.inner.code.clone(),
            });
        }
        Ok(&self.inner.data)
    }

    // -- decomposition -------------------------------------------------------

    /// Destructures into `(status, payload)`. Marks the result as checked.
    #[must_use]
    pub fn to_pair(&self) -> (Status, Payload) {
        self.inner.checked.store(true, Ordering::Release);
        let inner = &self.inner;
        let payload = match inner.status {
            Status::Success => Payload::Success(inner.data.clone()),
            Status::Failure => Payload::Failure {
                data: inner.data.clone(),
                message: inner.message.clone(),
            },
            Status::Error => Payload::Error {
                message: inner.message.clone(),
                code: inner.code.clone(),
            },
        };
        (inner.status, payload)
    }

    /// Destructures into a keyed record for structural matching.
    /// Marks the result as checked.
    #[must_use]
    pub fn to_parts(&self) -> ResultParts {
        self.inner.checked.store(true, Ordering::Release);
        let inner = &self.inner;
        ResultParts {
            status: inner.status,
            data: inner.data.clone(),
            message: inner.message.clone(),
            code: inner.code.clone(),
            step: inner.step.as_ref().map(|s| s.action.clone()),
            step_index: inner.step.as_ref().map(|s| s.index),
            service: inner.service.name().to_string(),
        }
    }
}

impl PartialEq for ServiceResult {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (&self.inner, &other.inner);
        a.status == b.status
            && a.data == b.data
            && a.message == b.message
            && a.code == b.code
            && a.service == b.service
    }
}

impl fmt::Debug for ServiceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = &self.inner;
        f.debug_struct("ServiceResult")
            .field("status", &inner.status)
            .field("service", &inner.service)
            .field("data", &inner.data)
            .field("message", &inner.message)
            .field("code", &inner.code)
            .field("step", &inner.step)
            .field("depth", &inner.depth)
            .field("checked", &self.is_checked())
            .finish()
    }
}

impl fmt::Display for ServiceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.inner.service, self.inner.status)?;
        if let Some(step) = &self.inner.step {
            write!(f, " at {step}")?;
        }
        if !self.inner.message.is_empty() {
            write!(f, ": {}", self.inner.message)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ResultBuilder
// ---------------------------------------------------------------------------

/// Builder for new results, including copies with overridden fields.
#[derive(Debug, Clone)]
pub struct ResultBuilder {
    status: Status,
    service: ServiceId,
    data: Data,
    message: String,
    code: Option<Code>,
    step: Option<StepRef>,
    parent: Option<ServiceResult>,
}

impl ResultBuilder {
    #[must_use]
    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn service(mut self, service: ServiceId) -> Self {
        self.service = service;
        self
    }

    #[must_use]
    pub fn data(mut self, data: Data) -> Self {
        self.data = data;
        self
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    #[must_use]
    pub fn code(mut self, code: impl Into<Code>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Resets the code so that the default for the final status applies.
    #[must_use]
    pub fn default_code(mut self) -> Self {
        self.code = None;
        self
    }

    #[must_use]
    pub fn step(mut self, step: Option<StepRef>) -> Self {
        self.step = step;
        self
    }

    #[must_use]
    pub fn parent(mut self, parent: Option<ServiceResult>) -> Self {
        self.parent = parent;
        self
    }

    /// Finishes the result.
    ///
    /// # Errors
    ///
    /// Returns `ResultError::ParentChainTooDeep` when attaching the parent
    /// would make the chain longer than [`MAX_PARENT_DEPTH`].
    pub fn build(self) -> Result<ServiceResult, ResultError> {
        let depth = match &self.parent {
            Some(parent) => parent.depth() + 1,
            None => 0,
        };
        if depth > MAX_PARENT_DEPTH {
            tracing::warn!(service = %self.service, depth, "refusing to extend parent result chain");
            return Err(ResultError::ParentChainTooDeep {
                limit: MAX_PARENT_DEPTH,
            });
        }
        Ok(ServiceResult {
            inner: Arc::new(ResultInner {
                status: self.status,
                code: self.code.unwrap_or_else(|| Code::default_for(self.status)),
                data: self.data,
                message: self.message,
                service: self.service,
                step: self.step,
                parent: self.parent,
                depth,
                checked: AtomicBool::new(false),
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Parents
// ---------------------------------------------------------------------------

/// Iterator over a result's ancestors, nearest first.
#[derive(Debug, Clone)]
pub struct Parents<'a> {
    next: Option<&'a ServiceResult>,
    remaining: usize,
}

impl<'a> Iterator for Parents<'a> {
    type Item = &'a ServiceResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.next?;
        self.remaining -= 1;
        self.next = current.parent();
        Some(current)
    }
}

// ---------------------------------------------------------------------------
// Decomposition types
// ---------------------------------------------------------------------------

/// Status-specific payload produced by [`ServiceResult::to_pair`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Payload {
    Success(Data),
    Failure { data: Data, message: String },
    Error { message: String, code: Code },
}

/// Keyed view of a result produced by [`ServiceResult::to_parts`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultParts {
    pub status: Status,
    pub data: Data,
    pub message: String,
    pub code: Code,
    /// Action of the step that produced the result, if any.
    pub step: Option<String>,
    /// Index of the step that produced the result, if any.
    pub step_index: Option<usize>,
    /// Name of the producing service.
    pub service: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
