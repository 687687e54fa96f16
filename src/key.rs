//! Cache key derivation.
//!
//! A key identifies one (model, operation, parameters) combination or one
//! raw query text:
//!
//! - model path: `prefix:model:operation:hex(sha1(canonical(params)))`
//! - raw path:   `prefix:__raw__:query:hex(sha1(query_text))`
//!
//! The canonical parameter serialization is JSON text with sorted object
//! keys, model references replaced by their names, and shared nodes
//! tracked by identity so cyclic structures terminate and hash stably.

use std::collections::HashSet;
use std::sync::Arc;

use sha1::{Digest, Sha1};

use crate::error::CacherError;
use crate::operation::Operation;
use crate::params::ParamValue;

/// Key segment marking the raw-query namespace.
const RAW_SEGMENT: &str = "__raw__";

/// Immutable per-call identity, snapshotted from session configuration.
#[derive(Debug, Clone)]
pub(crate) struct CallSpec {
    pub prefix: String,
    pub target: CallTarget,
}

#[derive(Debug, Clone)]
pub(crate) enum CallTarget {
    Raw {
        query: String,
    },
    Model {
        model: String,
        operation: Operation,
        params: ParamValue,
    },
}

/// Derive the cache key for a call.
///
/// Pure in its input: structurally identical specs always yield the
/// identical string. Fails only if the parameters cannot be serialized.
pub(crate) fn derive_key(spec: &CallSpec) -> Result<String, CacherError> {
    match &spec.target {
        CallTarget::Raw { query } => Ok(format!(
            "{}:{}:query:{}",
            spec.prefix,
            RAW_SEGMENT,
            sha1_hex(query.as_bytes())
        )),
        CallTarget::Model {
            model,
            operation,
            params,
        } => {
            let canonical = canonical_serialize(params)?;
            Ok(format!(
                "{}:{}:{}:{}",
                spec.prefix,
                model,
                operation.as_str(),
                sha1_hex(canonical.as_bytes())
            ))
        }
    }
}

fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

/// Serialize parameters to canonical JSON text.
pub(crate) fn canonical_serialize(params: &ParamValue) -> Result<String, CacherError> {
    let mut out = String::new();
    let mut visited = HashSet::new();
    write_value(&mut out, params, &mut visited)?;
    Ok(out)
}

fn write_value(
    out: &mut String,
    value: &ParamValue,
    visited: &mut HashSet<usize>,
) -> Result<(), CacherError> {
    match value {
        ParamValue::Null => out.push_str("null"),
        ParamValue::Bool(value) => out.push_str(if *value { "true" } else { "false" }),
        ParamValue::Int(value) => out.push_str(&value.to_string()),
        ParamValue::Float(value) => {
            let number = serde_json::Number::from_f64(*value).ok_or_else(|| {
                CacherError::serialization(format!("non-finite number {value} is not representable"))
            })?;
            out.push_str(&number.to_string());
        }
        ParamValue::String(value) => write_escaped(out, value)?,
        ParamValue::Sequence(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_value(out, item, visited)?;
            }
            out.push(']');
        }
        ParamValue::Object(entries) => {
            // Sort by key so insertion order never affects the hash.
            let mut sorted: Vec<&(String, ParamValue)> = entries.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            out.push('{');
            for (index, (key, item)) in sorted.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_escaped(out, key)?;
                out.push(':');
                write_value(out, item, visited)?;
            }
            out.push('}');
        }
        ParamValue::Model(model) => write_escaped(out, model.name())?,
        ParamValue::Shared(node) => {
            let identity = Arc::as_ptr(node) as usize;
            if visited.insert(identity) {
                node.with_value(|inner| match inner {
                    Some(inner) => write_value(out, inner, visited),
                    None => Err(CacherError::serialization(format!(
                        "shared parameter node `{}` has no value",
                        node.name()
                    ))),
                })?;
            } else {
                // Repeated reference (cycle or re-use): collapse to the name.
                write_escaped(out, node.name())?;
            }
        }
    }
    Ok(())
}

fn write_escaped(out: &mut String, text: &str) -> Result<(), CacherError> {
    let escaped = serde_json::to_string(text)
        .map_err(|err| CacherError::serialization(err.to_string()))?;
    out.push_str(&escaped);
    Ok(())
}
