//! Call arguments and call outputs flowing through middleware chains.

use std::fmt;
use std::sync::Arc;

use servitor_core::{Data, ServiceResult, Value};

use crate::error::Error;
use crate::middleware::Slot;

/// Optional callable passed alongside the arguments of a call.
pub type Block = Arc<dyn Fn(&[Value]) -> Result<Value, Error> + Send + Sync>;

/// Arguments of a dispatched call: positional values, named data and an
/// optional block.
#[derive(Clone, Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub named: Data,
    pub block: Option<Block>,
}

impl Args {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn named(named: Data) -> Self {
        Self {
            named,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn positional(positional: Vec<Value>) -> Self {
        Self {
            positional,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_block(
        mut self,
        block: impl Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    ) -> Self {
        self.block = Some(Arc::new(block));
        self
    }

    /// Adds or replaces a named argument.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.named.get(key)
    }

    /// Named argument that must be present.
    ///
    /// # Errors
    ///
    /// Returns `Error::Argument` if `key` was not passed.
    pub fn require(&self, key: &str) -> Result<&Value, Error> {
        self.named
            .get(key)
            .ok_or_else(|| Error::Argument(format!("missing argument `{key}`")))
    }

    /// Named integer argument.
    ///
    /// # Errors
    ///
    /// Returns `Error::Argument` if `key` is missing or not an integer.
    pub fn require_i64(&self, key: &str) -> Result<i64, Error> {
        let value = self.require(key)?;
        value.as_i64().ok_or_else(|| {
            Error::Argument(format!(
                "argument `{key}` must be an integer, got {}",
                value.type_name()
            ))
        })
    }

    /// Invokes the block passed with this call.
    ///
    /// # Errors
    ///
    /// Returns `Error::Argument` if no block was given, or the block's own error.
    pub fn call_block(&self, values: &[Value]) -> Result<Value, Error> {
        match &self.block {
            Some(block) => block(values),
            None => Err(Error::Argument("no block given".to_string())),
        }
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("positional", &self.positional)
            .field("named", &self.named)
            .field("block", &self.block.as_ref().map(|_| "<block>"))
            .finish()
    }
}

impl From<Data> for Args {
    fn from(named: Data) -> Self {
        Self::named(named)
    }
}

/// Return value of a dispatched call.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Result(ServiceResult),
    Value(Value),
    Unit,
}

impl Output {
    fn kind(&self) -> &'static str {
        match self {
            Output::Result(_) => "a service result",
            Output::Value(_) => "a value",
            Output::Unit => "nothing",
        }
    }

    #[must_use]
    pub fn as_result(&self) -> Option<&ServiceResult> {
        match self {
            Output::Result(result) => Some(result),
            _ => None,
        }
    }

    /// Extracts the service result produced by `slot`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnexpectedOutput` for any other kind of output.
    pub fn into_result(self, slot: &Slot) -> Result<ServiceResult, Error> {
        match self {
            Output::Result(result) => Ok(result),
            other => Err(Error::UnexpectedOutput {
                slot: slot.clone(),
                expected: "a service result",
                found: other.kind(),
            }),
        }
    }

    /// Extracts the plain value produced by `slot`. `Unit` reads as null.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnexpectedOutput` if `slot` produced a service result.
    pub fn into_value(self, slot: &Slot) -> Result<Value, Error> {
        match self {
            Output::Value(value) => Ok(value),
            Output::Unit => Ok(Value::Null),
            Output::Result(_) => Err(Error::UnexpectedOutput {
                slot: slot.clone(),
                expected: "a value",
                found: "a service result",
            }),
        }
    }

    /// Extracts a boolean produced by `slot`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnexpectedOutput` if `slot` did not produce a boolean.
    pub fn into_bool(self, slot: &Slot) -> Result<bool, Error> {
        match self {
            Output::Value(Value::Bool(b)) => Ok(b),
            other => Err(Error::UnexpectedOutput {
                slot: slot.clone(),
                expected: "a boolean",
                found: other.kind(),
            }),
        }
    }
}

impl From<ServiceResult> for Output {
    fn from(result: ServiceResult) -> Self {
        Output::Result(result)
    }
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Output::Value(value)
    }
}

impl From<bool> for Output {
    fn from(b: bool) -> Self {
        Output::Value(Value::Bool(b))
    }
}
