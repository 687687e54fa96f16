//! The enumerated retrieval-operation set.
//!
//! A closed set with a single dispatch point replaces the original
//! pattern of attaching one method per name onto a shared prototype.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// A retrieval operation on a bound model.
///
/// `as_str` yields the exact spelling embedded in derived cache keys, so
/// the set and its spellings are part of the key format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Operation {
    #[default]
    Find,
    FindOne,
    FindAll,
    FindAndCount,
    FindAndCountAll,
    All,
    Min,
    Max,
    Sum,
    Count,
}

impl Operation {
    /// Every supported operation, in key-format order.
    pub const ALL: [Operation; 10] = [
        Operation::Find,
        Operation::FindOne,
        Operation::FindAll,
        Operation::FindAndCount,
        Operation::FindAndCountAll,
        Operation::All,
        Operation::Min,
        Operation::Max,
        Operation::Sum,
        Operation::Count,
    ];

    /// The spelling used inside cache keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Find => "find",
            Operation::FindOne => "findOne",
            Operation::FindAll => "findAll",
            Operation::FindAndCount => "findAndCount",
            Operation::FindAndCountAll => "findAndCountAll",
            Operation::All => "all",
            Operation::Min => "min",
            Operation::Max => "max",
            Operation::Sum => "sum",
            Operation::Count => "count",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == name)
            .ok_or_else(|| ConfigError::invalid_method(name))
    }
}
