//! The per-call cache session.
//!
//! A session binds a database backend and a key-value store, accumulates
//! call configuration, and runs the read-through protocol:
//!
//! 1. derive the cache key from the call's identity
//! 2. GET: a present entry is decoded and returned (hit)
//! 3. on a miss, run the query, normalize the result, SET with TTL,
//!    return the normalized value
//!
//! Invalidation derives the same key and issues DEL without touching the
//! database. Every sub-step failure surfaces as-is; in particular a
//! failing store is never silently bypassed and a cache-write failure
//! fails the call even though the database read succeeded.
//!
//! Configuration mutators are fluent (`&mut Self`), and execution methods
//! take `&mut self`, so one session runs one call at a time; each call
//! starts from an immutable snapshot of the configuration.

use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use tracing::debug;

use crate::backend::QueryBackend;
use crate::config::CacherConfig;
use crate::error::{CacherError, ConfigError};
use crate::key::{CallSpec, CallTarget, derive_key};
use crate::operation::Operation;
use crate::params::ParamValue;
use crate::result::{QueryResult, normalize};
use crate::store::{CacheStore, decode, encode};

const METRIC_HIT_TOTAL: &str = "cacher_hit_total";
const METRIC_MISS_TOTAL: &str = "cacher_miss_total";

/// A read-through cache session over a database backend and a key-value
/// store.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use cacher::{CacheSession, MemoryStore, ParamValue, QueryBackend};
/// # async fn demo(backend: Arc<dyn QueryBackend>) -> Result<(), cacher::CacherError> {
/// let store = Arc::new(MemoryStore::new());
/// let mut session = CacheSession::new(backend, store);
/// let row = session
///     .model("entity")
///     .ttl(60)
///     .find(ParamValue::object([(
///         "where",
///         ParamValue::object([("id", ParamValue::from(1))]),
///     )]))
///     .await?;
/// assert!(!session.cache_hit());
/// # Ok(())
/// # }
/// ```
pub struct CacheSession {
    backend: Arc<dyn QueryBackend>,
    store: Arc<dyn CacheStore>,
    model: Option<String>,
    operation: Operation,
    params: ParamValue,
    raw_query: Option<String>,
    prefix: String,
    ttl_seconds: u64,
    cache_hit: bool,
}

impl CacheSession {
    pub fn new(backend: Arc<dyn QueryBackend>, store: Arc<dyn CacheStore>) -> Self {
        Self::with_config(backend, store, CacherConfig::default())
    }

    pub fn with_config(
        backend: Arc<dyn QueryBackend>,
        store: Arc<dyn CacheStore>,
        config: CacherConfig,
    ) -> Self {
        Self {
            backend,
            store,
            model: None,
            operation: Operation::default(),
            params: ParamValue::default(),
            raw_query: None,
            prefix: config.prefix,
            ttl_seconds: config.ttl_seconds,
            cache_hit: false,
        }
    }

    /// Select the target model by name.
    pub fn model(&mut self, name: impl Into<String>) -> &mut Self {
        self.model = Some(name.into());
        self
    }

    /// Override the key prefix.
    pub fn prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the entry time-to-live in seconds. Zero disables expiration.
    pub fn ttl(&mut self, seconds: u64) -> &mut Self {
        self.ttl_seconds = seconds;
        self
    }

    /// Select the operation used by the next [`run`](Self::run).
    pub fn operation(&mut self, operation: Operation) -> &mut Self {
        self.operation = operation;
        self
    }

    /// Whether the most recently completed call was served from the store.
    pub fn cache_hit(&self) -> bool {
        self.cache_hit
    }

    /// Run the currently selected operation with `params`, read-through.
    ///
    /// Fails with [`ConfigError::ModelNotSet`] before any store or
    /// database call if no model has been selected.
    pub async fn run(&mut self, params: ParamValue) -> Result<Value, CacherError> {
        self.cache_hit = false;
        self.params = params;
        let spec = self.model_spec()?;
        self.read_through(spec).await
    }

    /// Run an operation selected by name; unknown names fail with
    /// [`ConfigError::InvalidMethod`].
    pub async fn run_named(
        &mut self,
        method: &str,
        params: ParamValue,
    ) -> Result<Value, CacherError> {
        self.operation = method.parse::<Operation>()?;
        self.run(params).await
    }

    /// Run raw query text as a read-only statement, read-through.
    ///
    /// The query text is the key's only identity signal: the same text
    /// always maps to the same entry regardless of model configuration.
    pub async fn query(&mut self, query: impl Into<String>) -> Result<Value, CacherError> {
        self.cache_hit = false;
        let query = query.into();
        let spec = CallSpec {
            prefix: self.prefix.clone(),
            target: CallTarget::Raw {
                query: query.clone(),
            },
        };
        self.raw_query = Some(query);
        self.read_through(spec).await
    }

    pub async fn find(&mut self, params: ParamValue) -> Result<Value, CacherError> {
        self.operation = Operation::Find;
        self.run(params).await
    }

    pub async fn find_one(&mut self, params: ParamValue) -> Result<Value, CacherError> {
        self.operation = Operation::FindOne;
        self.run(params).await
    }

    pub async fn find_all(&mut self, params: ParamValue) -> Result<Value, CacherError> {
        self.operation = Operation::FindAll;
        self.run(params).await
    }

    pub async fn find_and_count(&mut self, params: ParamValue) -> Result<Value, CacherError> {
        self.operation = Operation::FindAndCount;
        self.run(params).await
    }

    pub async fn find_and_count_all(&mut self, params: ParamValue) -> Result<Value, CacherError> {
        self.operation = Operation::FindAndCountAll;
        self.run(params).await
    }

    pub async fn all(&mut self, params: ParamValue) -> Result<Value, CacherError> {
        self.operation = Operation::All;
        self.run(params).await
    }

    pub async fn min(&mut self, params: ParamValue) -> Result<Value, CacherError> {
        self.operation = Operation::Min;
        self.run(params).await
    }

    pub async fn max(&mut self, params: ParamValue) -> Result<Value, CacherError> {
        self.operation = Operation::Max;
        self.run(params).await
    }

    pub async fn sum(&mut self, params: ParamValue) -> Result<Value, CacherError> {
        self.operation = Operation::Sum;
        self.run(params).await
    }

    pub async fn count(&mut self, params: ParamValue) -> Result<Value, CacherError> {
        self.operation = Operation::Count;
        self.run(params).await
    }

    /// The key the current configuration derives, for diagnostics and
    /// tests. Raw query text, when present, takes precedence over model
    /// configuration, matching [`clear_cache`](Self::clear_cache).
    pub fn key(&self) -> Result<String, CacherError> {
        derive_key(&self.current_spec()?)
    }

    /// Delete the entry the current configuration points at.
    ///
    /// With `params`, re-targets the same key a prior read with those
    /// parameters used; without, the session's last parameters apply.
    /// Deleting an absent entry is not an error.
    pub async fn clear_cache(&mut self, params: Option<ParamValue>) -> Result<(), CacherError> {
        if let Some(params) = params {
            self.params = params;
        }
        let key = derive_key(&self.current_spec()?)?;
        self.store.del(&key).await?;
        debug!(key = %key, "Cache entry invalidated");
        Ok(())
    }

    fn model_spec(&self) -> Result<CallSpec, CacherError> {
        let model = self.model.clone().ok_or(ConfigError::ModelNotSet)?;
        Ok(CallSpec {
            prefix: self.prefix.clone(),
            target: CallTarget::Model {
                model,
                operation: self.operation,
                params: self.params.clone(),
            },
        })
    }

    fn current_spec(&self) -> Result<CallSpec, CacherError> {
        match &self.raw_query {
            Some(query) => Ok(CallSpec {
                prefix: self.prefix.clone(),
                target: CallTarget::Raw {
                    query: query.clone(),
                },
            }),
            None => self.model_spec(),
        }
    }

    async fn read_through(&mut self, spec: CallSpec) -> Result<Value, CacherError> {
        let key = derive_key(&spec)?;

        if let Some(text) = self.store.get(&key).await? {
            let value = decode(&key, &text)?;
            self.cache_hit = true;
            counter!(METRIC_HIT_TOTAL).increment(1);
            debug!(key = %key, "Cache hit");
            return Ok(value);
        }

        let result = match &spec.target {
            CallTarget::Raw { query } => QueryResult::Sequence(self.backend.run_raw(query).await?),
            CallTarget::Model {
                model,
                operation,
                params,
            } => self.backend.run(model, *operation, params).await?,
        };

        // Empty results are cached too: a repeat call for an absent row
        // is a hit that returns null.
        let value = normalize(result);
        let text = encode(&value)?;
        self.store.set(&key, &text, self.ttl_seconds).await?;
        counter!(METRIC_MISS_TOTAL).increment(1);
        debug!(
            key = %key,
            ttl_seconds = self.ttl_seconds,
            "Cache miss; populated from database"
        );
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::{QueryError, StoreError};
    use crate::store::MemoryStore;

    /// Backend returning a fixed result, counting invocations.
    struct FixedBackend {
        result: QueryResult,
        calls: AtomicUsize,
    }

    impl FixedBackend {
        fn new(result: QueryResult) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueryBackend for FixedBackend {
        async fn run(
            &self,
            _model: &str,
            _operation: Operation,
            _params: &ParamValue,
        ) -> Result<QueryResult, QueryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }

        async fn run_raw(&self, _query: &str) -> Result<Vec<Value>, QueryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.result {
                QueryResult::Sequence(rows) => Ok(rows.clone()),
                _ => Ok(Vec::new()),
            }
        }
    }

    /// Store whose configured operations fail, counting every call.
    #[derive(Default)]
    struct FlakyStore {
        fail_get: bool,
        fail_set: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CacheStore for FlakyStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_get {
                return Err(StoreError::transport("GET refused"));
            }
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: u64) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_set {
                return Err(StoreError::transport("SET refused"));
            }
            Ok(())
        }

        async fn del(&self, _key: &str) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn where_id(id: i64) -> ParamValue {
        ParamValue::object([("where", ParamValue::object([("id", ParamValue::from(id))]))])
    }

    #[test]
    fn hit_flag_is_false_after_construction() {
        let backend = FixedBackend::new(QueryResult::Absent);
        let session = CacheSession::new(backend, Arc::new(MemoryStore::new()));
        assert!(!session.cache_hit());
    }

    #[tokio::test]
    async fn model_not_set_fails_before_any_collaborator_call() {
        let backend = FixedBackend::new(QueryResult::Absent);
        let store = Arc::new(FlakyStore::default());
        let mut session = CacheSession::new(backend.clone(), store.clone());

        let err = session.find(where_id(1)).await.unwrap_err();
        assert!(matches!(
            err,
            CacherError::Config(ConfigError::ModelNotSet)
        ));
        assert_eq!(backend.calls(), 0);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_method_name_fails_before_any_collaborator_call() {
        let backend = FixedBackend::new(QueryResult::Absent);
        let store = Arc::new(FlakyStore::default());
        let mut session = CacheSession::new(backend.clone(), store.clone());
        session.model("entity");

        let err = session
            .run_named("findEverything", where_id(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CacherError::Config(ConfigError::InvalidMethod { .. })
        ));
        assert_eq!(backend.calls(), 0);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn hit_flag_tracks_miss_then_hit_then_miss() {
        let backend = FixedBackend::new(QueryResult::Record(
            crate::result::Record::new().attribute("id", 1),
        ));
        let store = Arc::new(MemoryStore::new());
        let mut session = CacheSession::new(backend.clone(), store);
        session.model("entity");

        let first = session.find(where_id(1)).await.unwrap();
        assert!(!session.cache_hit());
        assert_eq!(first, json!({"id": 1}));

        let second = session.find(where_id(1)).await.unwrap();
        assert!(session.cache_hit());
        assert_eq!(second, first);
        assert_eq!(backend.calls(), 1);

        session.clear_cache(None).await.unwrap();
        session.find(where_id(1)).await.unwrap();
        assert!(!session.cache_hit());
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn store_get_failure_surfaces_without_querying() {
        let backend = FixedBackend::new(QueryResult::Absent);
        let store = Arc::new(FlakyStore {
            fail_get: true,
            ..Default::default()
        });
        let mut session = CacheSession::new(backend.clone(), store);
        session.model("entity");

        let err = session.find(where_id(1)).await.unwrap_err();
        assert!(matches!(err, CacherError::Store(_)));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn cache_write_failure_fails_the_call() {
        let backend = FixedBackend::new(QueryResult::Scalar(json!(3)));
        let store = Arc::new(FlakyStore {
            fail_set: true,
            ..Default::default()
        });
        let mut session = CacheSession::new(backend.clone(), store);
        session.model("entity");

        let err = session.count(ParamValue::object::<String, _>([])).await.unwrap_err();
        assert!(matches!(err, CacherError::Store(_)));
        // The query ran, but the caller never sees a result that failed
        // to cache.
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn query_failure_leaves_the_store_unpopulated() {
        struct FailingBackend;

        #[async_trait]
        impl QueryBackend for FailingBackend {
            async fn run(
                &self,
                model: &str,
                operation: Operation,
                _params: &ParamValue,
            ) -> Result<QueryResult, QueryError> {
                Err(QueryError::UnsupportedOperation {
                    model: model.to_string(),
                    operation,
                })
            }

            async fn run_raw(&self, _query: &str) -> Result<Vec<Value>, QueryError> {
                Err(QueryError::execution("backend offline"))
            }
        }

        let store = Arc::new(MemoryStore::new());
        let mut session = CacheSession::new(Arc::new(FailingBackend), store.clone());
        session.model("entity");

        let err = session.min(where_id(1)).await.unwrap_err();
        assert!(matches!(err, CacherError::Query(_)));
        assert!(store.is_empty().await);
        assert!(!session.cache_hit());
    }

    #[tokio::test]
    async fn corrupt_entry_fails_with_decode_error() {
        let backend = FixedBackend::new(QueryResult::Absent);
        let store = Arc::new(MemoryStore::new());
        let mut session = CacheSession::new(backend, store.clone());
        session.model("entity").operation(Operation::Find);
        session.params = where_id(1);

        let key = session.key().unwrap();
        store.set(&key, "{not json", 0).await.unwrap();

        let err = session.find(where_id(1)).await.unwrap_err();
        assert!(matches!(err, CacherError::Decode { .. }));
        assert!(!session.cache_hit());
    }

    #[tokio::test]
    async fn raw_text_takes_precedence_in_key_and_clear() {
        let backend = FixedBackend::new(QueryResult::Sequence(vec![json!({"id": 1})]));
        let store = Arc::new(MemoryStore::new());
        let mut session = CacheSession::new(backend, store.clone());
        session.model("entity");

        session.query("SELECT * FROM entities").await.unwrap();
        let key = session.key().unwrap();
        assert!(key.starts_with("cacher:__raw__:query:"));

        session.clear_cache(None).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn prefix_and_operation_separate_entries() {
        let backend = FixedBackend::new(QueryResult::Scalar(json!(1)));
        let store = Arc::new(MemoryStore::new());
        let mut session = CacheSession::new(backend, store.clone());

        session.model("entity").prefix("warm");
        session.count(where_id(1)).await.unwrap();
        let count_key = session.key().unwrap();
        assert!(count_key.starts_with("warm:entity:count:"));

        session.sum(where_id(1)).await.unwrap();
        assert!(!session.cache_hit());
        assert_eq!(store.len().await, 2);
    }
}
