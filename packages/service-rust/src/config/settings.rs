use serde::{Deserialize, Serialize};

/// Per-service-type settings.
///
/// Controls commit safety limits and constructor argument checking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Maximum nesting of commit attempts on one service type within a
    /// single call before the commit is aborted.
    pub max_implicit_commits: usize,
    /// Reject named constructor arguments that were not declared with
    /// `ServiceClass::attribute`.
    pub strict_attributes: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_implicit_commits: 10,
            strict_attributes: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"strict_attributes": true}"#).unwrap();
        assert_eq!(settings.max_implicit_commits, 10);
        assert!(settings.strict_attributes);
    }
}
