//! The database collaborator seam.

use async_trait::async_trait;

use crate::error::QueryError;
use crate::operation::Operation;
use crate::params::ParamValue;
use crate::result::QueryResult;

/// Asynchronous access to the underlying relational query layer.
///
/// Implementations bind model names to whatever engine they wrap. A
/// backend that does not support an operation for a model family fails
/// with [`QueryError::UnsupportedOperation`]; the cache never populates
/// on a failed query.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Run `operation` against the named model with the given parameters.
    async fn run(
        &self,
        model: &str,
        operation: Operation,
        params: &ParamValue,
    ) -> Result<QueryResult, QueryError>;

    /// Execute raw query text as a read-only statement.
    async fn run_raw(&self, query: &str) -> Result<Vec<serde_json::Value>, QueryError>;
}
