//! Retriever handle around an external vector store.

use crate::compiler::FilterOutcome;
use crate::error::{EnforcementError, EnforcementResult};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use ragshield_proto::{Document, NativeFilter};
use thiserror::Error;
use tracing::{debug, warn};

/// Number of documents fetched per search unless configured otherwise.
pub const DEFAULT_SEARCH_K: usize = 4;

/// Failure reported by the external similarity search.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SearchError {
    message: String,
}

impl SearchError {
    /// Create a search error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A similarity search engine that accepts native filters.
///
/// Implementations execute the search; the enforcement core only supplies
/// the filter.
pub trait VectorStore: Send + Sync {
    /// Store type identifier, such as `"PineconeVectorStore"` or `"qdrant"`.
    fn store_id(&self) -> &str;

    /// Run a similarity search restricted by `filter`.
    fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&NativeFilter>,
    ) -> Result<Vec<Document>, SearchError>;
}

/// A vector store plus the filter its next search must apply.
///
/// The pending filter is request-scoped: a search consumes it, and a search
/// with nothing attached is refused. Attaching and searching only happen
/// through a [`RequestScope`], which holds the handle's request lock, so one
/// request never runs with another request's filter. The lock is reentrant:
/// a thread that already holds a scope can open another one on the same
/// handle.
pub struct RetrieverHandle<S> {
    store: S,
    k: usize,
    next_filter: Mutex<Option<FilterOutcome>>,
    request_lock: ReentrantMutex<()>,
}

impl<S: VectorStore> RetrieverHandle<S> {
    /// Wrap a store with the default `k`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            k: DEFAULT_SEARCH_K,
            next_filter: Mutex::new(None),
            request_lock: ReentrantMutex::new(()),
        }
    }

    /// Set the number of documents fetched per search.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Store type identifier.
    pub fn store_id(&self) -> &str {
        self.store.store_id()
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of documents fetched per search.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Lock the handle for one request.
    ///
    /// Other threads block here until the returned scope is dropped.
    pub fn begin(&self) -> RequestScope<'_, S> {
        RequestScope {
            handle: self,
            _guard: self.request_lock.lock(),
        }
    }

    /// Pending filter, if one is attached.
    pub fn pending(&self) -> Option<FilterOutcome> {
        self.next_filter.lock().clone()
    }

    /// Drop the pending filter without searching.
    pub fn clear(&self) -> Option<FilterOutcome> {
        self.next_filter.lock().take()
    }
}

impl<S: VectorStore> std::fmt::Debug for RetrieverHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrieverHandle")
            .field("store_id", &self.store.store_id())
            .field("k", &self.k)
            .field("pending", &*self.next_filter.lock())
            .finish()
    }
}

/// Exclusive access to a handle for the duration of one request.
pub struct RequestScope<'a, S> {
    handle: &'a RetrieverHandle<S>,
    _guard: ReentrantMutexGuard<'a, ()>,
}

impl<'a, S: VectorStore> RequestScope<'a, S> {
    /// Handle this scope locks.
    pub fn handle(&self) -> &'a RetrieverHandle<S> {
        self.handle
    }

    /// Replace the filter for the next search.
    pub fn attach(&self, outcome: FilterOutcome) {
        *self.handle.next_filter.lock() = Some(outcome);
    }

    /// Run the next search, consuming the pending filter.
    ///
    /// A deny-all filter returns no documents without touching the store.
    /// Only an explicit unrestricted outcome searches without a filter; an
    /// empty slot is refused.
    pub fn search(&self, query: &str) -> EnforcementResult<Vec<Document>> {
        let handle = self.handle;
        let pending = handle.next_filter.lock().take();
        let documents = match pending {
            Some(FilterOutcome::DenyAll) => {
                debug!(store = handle.store.store_id(), "deny-all filter, search skipped");
                Vec::new()
            }
            Some(FilterOutcome::Restrict(filter)) => {
                handle.store.similarity_search(query, handle.k, Some(&filter))?
            }
            Some(FilterOutcome::Unrestricted) => {
                handle.store.similarity_search(query, handle.k, None)?
            }
            None => {
                warn!(store = handle.store.store_id(), "no enforcement filter attached, search refused");
                return Err(EnforcementError::FilterNotAttached {
                    backend: handle.store.store_id().to_string(),
                });
            }
        };
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingStore {
        calls: AtomicUsize,
        last_filter: Mutex<Option<Option<NativeFilter>>>,
    }

    impl VectorStore for CountingStore {
        fn store_id(&self) -> &str {
            "QdrantVectorStore"
        }

        fn similarity_search(
            &self,
            query: &str,
            k: usize,
            filter: Option<&NativeFilter>,
        ) -> Result<Vec<Document>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_filter.lock() = Some(filter.cloned());
            Ok((0..k).map(|i| Document::new(format!("{query}-{i}"))).collect())
        }
    }

    #[test]
    fn test_default_k() {
        let handle = RetrieverHandle::new(CountingStore::default());
        assert_eq!(handle.k(), DEFAULT_SEARCH_K);
        let scope = handle.begin();
        scope.attach(FilterOutcome::Unrestricted);
        assert_eq!(scope.search("q").unwrap().len(), 4);
        drop(scope);

        let handle = handle.with_k(2);
        let scope = handle.begin();
        scope.attach(FilterOutcome::Unrestricted);
        assert_eq!(scope.search("q").unwrap().len(), 2);
    }

    #[test]
    fn test_empty_slot_refuses_search() {
        let handle = RetrieverHandle::new(CountingStore::default());
        let err = handle.begin().search("q").unwrap_err();
        assert!(matches!(
            err,
            EnforcementError::FilterNotAttached { ref backend } if backend == "QdrantVectorStore"
        ));
        assert_eq!(handle.store().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_deny_all_skips_store() {
        let handle = RetrieverHandle::new(CountingStore::default());
        let scope = handle.begin();
        scope.attach(FilterOutcome::DenyAll);
        assert!(scope.search("q").unwrap().is_empty());
        assert_eq!(handle.store().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_filter_is_consumed_by_search() {
        let handle = RetrieverHandle::new(CountingStore::default());
        let filter = NativeFilter::Json(json!({"must": []}));
        let scope = handle.begin();
        scope.attach(FilterOutcome::Restrict(filter.clone()));
        assert_eq!(handle.pending(), Some(FilterOutcome::Restrict(filter.clone())));

        scope.search("q").unwrap();
        assert_eq!(*handle.store().last_filter.lock(), Some(Some(filter)));
        assert_eq!(handle.pending(), None);

        let err = scope.search("q").unwrap_err();
        assert!(matches!(err, EnforcementError::FilterNotAttached { .. }));
        assert_eq!(handle.store().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_attach_replaces_pending() {
        let handle = RetrieverHandle::new(CountingStore::default());
        let scope = handle.begin();
        scope.attach(FilterOutcome::DenyAll);
        scope.attach(FilterOutcome::Unrestricted);
        assert_eq!(handle.pending(), Some(FilterOutcome::Unrestricted));
        assert_eq!(handle.clear(), Some(FilterOutcome::Unrestricted));
        assert_eq!(handle.pending(), None);
    }

    #[test]
    fn test_nested_scopes_on_one_thread() {
        let handle = RetrieverHandle::new(CountingStore::default());
        let outer = handle.begin();
        let inner = outer.handle().begin();
        inner.attach(FilterOutcome::Unrestricted);
        drop(inner);
        assert_eq!(outer.search("q").unwrap().len(), DEFAULT_SEARCH_K);
    }

    #[test]
    fn test_search_error_passthrough() {
        struct FailingStore;
        impl VectorStore for FailingStore {
            fn store_id(&self) -> &str {
                "pinecone"
            }
            fn similarity_search(
                &self,
                _query: &str,
                _k: usize,
                _filter: Option<&NativeFilter>,
            ) -> Result<Vec<Document>, SearchError> {
                Err(SearchError::new("index unavailable"))
            }
        }

        let handle = RetrieverHandle::new(FailingStore);
        let scope = handle.begin();
        scope.attach(FilterOutcome::Unrestricted);
        match scope.search("q").unwrap_err() {
            EnforcementError::Search(err) => assert_eq!(err.message(), "index unavailable"),
            other => panic!("expected search error, got {:?}", other),
        }
    }
}
