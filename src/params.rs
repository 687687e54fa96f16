//! Parameter trees for model operations.
//!
//! Operation parameters are arbitrary nested structures: scalars,
//! sequences, objects, references to bound models, and shared nodes that
//! may form reference cycles (an `include` clause referring back to an
//! enclosing node). Key derivation consumes these trees; see `key`.

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::lock::{rw_read, rw_write};

const SOURCE: &str = "params";

/// A reference to a bound database model embedded inside parameters.
///
/// Model handles are not stably serializable, so key derivation replaces
/// a reference with its name string; two references to the same model
/// therefore canonicalize identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    name: String,
}

impl ModelRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A named parameter node that can be referenced from more than one place,
/// including from inside its own value.
///
/// The value is attached after construction so a cycle can be closed:
///
/// ```
/// use cacher::{ParamValue, SharedParams};
///
/// let node = SharedParams::new("entity");
/// node.set(ParamValue::object([(
///     "include",
///     ParamValue::from(node.clone()),
/// )]));
/// ```
pub struct SharedParams {
    name: String,
    value: RwLock<Option<ParamValue>>,
}

impl SharedParams {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            value: RwLock::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach or replace the node's value.
    pub fn set(&self, value: ParamValue) {
        *rw_write(&self.value, SOURCE, "shared_set") = Some(value);
    }

    /// Run `f` against the node's current value without cloning it.
    pub(crate) fn with_value<R>(&self, f: impl FnOnce(Option<&ParamValue>) -> R) -> R {
        f(rw_read(&self.value, SOURCE, "shared_read").as_ref())
    }
}

impl fmt::Debug for SharedParams {
    // The value may contain a cycle back to this node; print the name only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedParams")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// An operation-parameter value.
#[derive(Debug, Clone, Default)]
pub enum ParamValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Sequence(Vec<ParamValue>),
    /// Entries keep insertion order; key derivation canonicalizes by
    /// sorting, so order never affects the derived key.
    Object(Vec<(String, ParamValue)>),
    Model(ModelRef),
    Shared(Arc<SharedParams>),
}

impl ParamValue {
    /// Build an object from `(key, value)` entries.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ParamValue)>,
    {
        Self::Object(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    /// Build a sequence from values.
    pub fn sequence<I>(values: I) -> Self
    where
        I: IntoIterator<Item = ParamValue>,
    {
        Self::Sequence(values.into_iter().collect())
    }
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ParamValue::Null, ParamValue::Null) => true,
            (ParamValue::Bool(a), ParamValue::Bool(b)) => a == b,
            (ParamValue::Int(a), ParamValue::Int(b)) => a == b,
            (ParamValue::Float(a), ParamValue::Float(b)) => a == b,
            (ParamValue::String(a), ParamValue::String(b)) => a == b,
            (ParamValue::Sequence(a), ParamValue::Sequence(b)) => a == b,
            (ParamValue::Object(a), ParamValue::Object(b)) => a == b,
            (ParamValue::Model(a), ParamValue::Model(b)) => a == b,
            // Shared nodes compare by identity; structural comparison
            // could recurse through a cycle.
            (ParamValue::Shared(a), ParamValue::Shared(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<ModelRef> for ParamValue {
    fn from(value: ModelRef) -> Self {
        Self::Model(value)
    }
}

impl From<Arc<SharedParams>> for ParamValue {
    fn from(value: Arc<SharedParams>) -> Self {
        Self::Shared(value)
    }
}

impl From<Vec<ParamValue>> for ParamValue {
    fn from(values: Vec<ParamValue>) -> Self {
        Self::Sequence(values)
    }
}
