//! Step input/output bindings.
//!
//! A [`MethodBinding`] describes how one value enters a step (input) or how
//! one key of a step's result leaves it (output). Bindings are declared as
//! [`RawBinding`] shapes and cast once, with the direction known, by [`cast`].

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use servitor_core::Value;

use crate::error::Error;
use crate::instance::Instance;

static NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*[?!]?$").expect("valid name pattern"));

/// Lazily evaluated input value.
pub type ProcFn = Arc<dyn Fn(&Instance) -> Result<Value, Error> + Send + Sync>;

/// Errors from declaring bindings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    #[error("`{name}` is not a valid attribute or method name")]
    InvalidName { name: String },
    #[error("{strategy} binding `{key}` cannot be used as an {direction}")]
    WrongDirection {
        key: String,
        strategy: &'static str,
        direction: Direction,
    },
}

/// Checks that `name` can be used as an attribute, reader or method name.
///
/// # Errors
///
/// Returns `BindingError::InvalidName` otherwise.
pub fn validate_name(name: &str) -> Result<(), BindingError> {
    if NAME_REGEX.is_match(name) {
        Ok(())
    } else {
        Err(BindingError::InvalidName {
            name: name.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// Where an input value comes from, or where an output value goes.
#[derive(Clone)]
pub enum Strategy {
    /// Organizer attribute named like the key.
    Usual,
    /// Organizer attribute with a different name.
    Alias(String),
    /// Fixed literal. Inputs only.
    Raw(Value),
    /// Callable evaluated against the organizer when the step runs. Inputs only.
    Proc(ProcFn),
}

impl Strategy {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Strategy::Usual => "usual",
            Strategy::Alias(_) => "alias",
            Strategy::Raw(_) => "raw",
            Strategy::Proc(_) => "proc",
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Usual => f.write_str("Usual"),
            Strategy::Alias(name) => f.debug_tuple("Alias").field(name).finish(),
            Strategy::Raw(value) => f.debug_tuple("Raw").field(value).finish(),
            Strategy::Proc(_) => f.write_str("Proc(<fn>)"),
        }
    }
}

/// Declared shape of a binding, before casting.
#[derive(Clone)]
pub enum RawBinding {
    Key(String),
    Alias { key: String, name: String },
    Raw { key: String, value: Value },
    Proc { key: String, f: ProcFn },
}

impl RawBinding {
    /// `key` bound to the organizer attribute or reader `name`.
    #[must_use]
    pub fn alias(key: impl Into<String>, name: impl Into<String>) -> Self {
        RawBinding::Alias {
            key: key.into(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn raw(key: impl Into<String>, value: impl Into<Value>) -> Self {
        RawBinding::Raw {
            key: key.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn lazy(
        key: impl Into<String>,
        f: impl Fn(&Instance) -> Result<Value, Error> + Send + Sync + 'static,
    ) -> Self {
        RawBinding::Proc {
            key: key.into(),
            f: Arc::new(f),
        }
    }
}

impl fmt::Debug for RawBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawBinding::Key(key) => f.debug_tuple("Key").field(key).finish(),
            RawBinding::Alias { key, name } => f.debug_struct("Alias").field("key", key).field("name", name).finish(),
            RawBinding::Raw { key, value } => f.debug_struct("Raw").field("key", key).field("value", value).finish(),
            RawBinding::Proc { key, .. } => f.debug_struct("Proc").field("key", key).finish_non_exhaustive(),
        }
    }
}

impl From<&str> for RawBinding {
    fn from(key: &str) -> Self {
        RawBinding::Key(key.to_string())
    }
}

impl From<String> for RawBinding {
    fn from(key: String) -> Self {
        RawBinding::Key(key)
    }
}

/// Typed binding of one step input or output.
#[derive(Debug, Clone)]
pub struct MethodBinding {
    key: String,
    name: String,
    direction: Direction,
    strategy: Strategy,
}

/// Casts a declared shape into a binding for `direction`.
///
/// # Errors
///
/// Returns `BindingError::InvalidName` for malformed keys or names, and
/// `BindingError::WrongDirection` for raw or proc shapes used as outputs.
pub fn cast(raw: RawBinding, direction: Direction) -> Result<MethodBinding, BindingError> {
    let (key, name, strategy) = match raw {
        RawBinding::Key(key) => (key.clone(), key, Strategy::Usual),
        RawBinding::Alias { key, name } => (key, name.clone(), Strategy::Alias(name)),
        RawBinding::Raw { key, value } => (key.clone(), key, Strategy::Raw(value)),
        RawBinding::Proc { key, f } => (key.clone(), key, Strategy::Proc(f)),
    };
    validate_name(&key)?;
    validate_name(&name)?;
    if direction == Direction::Output && matches!(strategy, Strategy::Raw(_) | Strategy::Proc(_)) {
        return Err(BindingError::WrongDirection {
            key,
            strategy: strategy.kind(),
            direction,
        });
    }
    Ok(MethodBinding {
        key,
        name,
        direction,
        strategy,
    })
}

impl MethodBinding {
    /// Argument key passed to the action (inputs) or result data key read
    /// from the step's result (outputs).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Organizer attribute read (inputs) or reader written (outputs).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Organizer attribute an input reads, if it reads one.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        match (&self.strategy, self.direction) {
            (Strategy::Usual | Strategy::Alias(_), Direction::Input) => Some(&self.name),
            _ => None,
        }
    }

    /// Produces the value of an input binding for `organizer`.
    ///
    /// # Errors
    ///
    /// Returns `BindingError::WrongDirection` for output bindings, or the
    /// error of the attribute lookup or proc.
    pub fn resolve(&self, organizer: &Instance) -> Result<Value, Error> {
        if self.direction == Direction::Output {
            return Err(BindingError::WrongDirection {
                key: self.key.clone(),
                strategy: self.strategy.kind(),
                direction: Direction::Input,
            }
            .into());
        }
        match &self.strategy {
            Strategy::Usual | Strategy::Alias(_) => organizer.read(&self.name),
            Strategy::Raw(value) => Ok(value.clone()),
            Strategy::Proc(f) => f(organizer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_key_reads_same_named_attribute() {
        let binding = cast("amount".into(), Direction::Input).unwrap();
        assert_eq!(binding.key(), "amount");
        assert_eq!(binding.source(), Some("amount"));
        assert_eq!(binding.strategy().kind(), "usual");
    }

    #[test]
    fn alias_renames_source() {
        let binding = cast(RawBinding::alias("amount", "total_cents"), Direction::Input).unwrap();
        assert_eq!(binding.key(), "amount");
        assert_eq!(binding.source(), Some("total_cents"));

        let output = cast(RawBinding::alias("id", "order_id"), Direction::Output).unwrap();
        assert_eq!(output.key(), "id");
        assert_eq!(output.name(), "order_id");
        assert_eq!(output.source(), None);
    }

    #[test]
    fn raw_and_proc_are_inputs_only() {
        let err = cast(RawBinding::raw("currency", "EUR"), Direction::Output).unwrap_err();
        assert_eq!(
            err,
            BindingError::WrongDirection {
                key: "currency".to_string(),
                strategy: "raw",
                direction: Direction::Output,
            }
        );
        assert_eq!(err.to_string(), "raw binding `currency` cannot be used as an output");

        let lazy = RawBinding::lazy("now", |_| Ok(Value::Int(0)));
        assert!(cast(lazy.clone(), Direction::Input).is_ok());
        assert!(matches!(
            cast(lazy, Direction::Output),
            Err(BindingError::WrongDirection { strategy: "proc", .. })
        ));
    }

    #[test]
    fn names_are_validated() {
        assert!(validate_name("valid?").is_ok());
        assert!(validate_name("_private").is_ok());
        assert!(validate_name("save!").is_ok());
        for bad in ["", "1st", "has space", "dash-ed", "q??"] {
            assert!(validate_name(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(cast(RawBinding::alias("ok", "not ok"), Direction::Input).is_err());
    }
}
