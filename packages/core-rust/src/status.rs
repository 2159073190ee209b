use std::fmt;

use serde::{Deserialize, Serialize};

/// JSend outcome of a service invocation.
///
/// - `Success`: the service did its job; carries data.
/// - `Failure`: the caller supplied something unacceptable; carries data and a message.
/// - `Error`: the service itself could not complete; carries a message and a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
    Error,
}

impl Status {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failure => "failure",
            Status::Error => "error",
        }
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable result code (the JSend `code` atom).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Code(String);

impl Code {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Code assigned when a constructor is not given one explicitly.
    #[must_use]
    pub fn default_for(status: Status) -> Self {
        match status {
            Status::Success => Self::new("default_success"),
            Status::Failure => Self::new("default_failure"),
            Status::Error => Self::new("default_error"),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Code {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl From<String> for Code {
    fn from(code: String) -> Self {
        Self(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Status::Failure).unwrap(), r#""failure""#);
        let parsed: Status = serde_json::from_str(r#""error""#).unwrap();
        assert_eq!(parsed, Status::Error);
    }

    #[test]
    fn default_codes_follow_status() {
        assert_eq!(Code::default_for(Status::Success).as_str(), "default_success");
        assert_eq!(Code::default_for(Status::Failure).as_str(), "default_failure");
        assert_eq!(Code::default_for(Status::Error).as_str(), "default_error");
    }
}
