use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identity of the service type that produced a result.
///
/// Two ids are equal when they name the same service type; this is the
/// "producer type" that takes part in result equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(Arc<str>);

impl ServiceId {
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of the pipeline step a result was produced by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepRef {
    /// Zero-based index of the step within its collection.
    pub index: usize,
    /// Human-readable description of the step action (method or service name).
    pub action: String,
}

impl StepRef {
    #[must_use]
    pub fn new(index: usize, action: impl Into<String>) -> Self {
        Self {
            index,
            action: action.into(),
        }
    }
}

impl fmt::Display for StepRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step #{} ({})", self.index, self.action)
    }
}
