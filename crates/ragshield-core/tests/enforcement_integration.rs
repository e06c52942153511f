//! Integration tests for filter enforcement on retrievers.

use parking_lot::Mutex;
use ragshield_core::{
    BackendCapability, BackendKind, CapabilityRegistry, EnforcementConfig, EnforcementError,
    Enforcer, FilterOutcome, MemoryAuditSink, MissingIdentityPolicy, Operator, RetrieverHandle,
    SearchError, VectorStore,
};
use ragshield_proto::{AuthContext, Document, NativeFilter, RetrievalRequest, SemanticContext};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// In-memory store that understands `$and/$or/$eq/$in/$nin` filters.
struct MongoStyleStore {
    id: &'static str,
    documents: Vec<Document>,
    calls: AtomicUsize,
    filters: Mutex<Vec<Option<NativeFilter>>>,
}

impl MongoStyleStore {
    fn new(id: &'static str) -> Self {
        Self {
            id,
            documents: corpus(),
            calls: AtomicUsize::new(0),
            filters: Mutex::new(Vec::new()),
        }
    }
}

impl VectorStore for MongoStyleStore {
    fn store_id(&self) -> &str {
        self.id
    }

    fn similarity_search(
        &self,
        _query: &str,
        k: usize,
        filter: Option<&NativeFilter>,
    ) -> Result<Vec<Document>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.filters.lock().push(filter.cloned());
        let filter = match filter {
            None => None,
            Some(NativeFilter::Json(value)) => Some(value),
            Some(NativeFilter::Expression(_)) => {
                return Err(SearchError::new("expression filters are not supported"))
            }
        };
        Ok(self
            .documents
            .iter()
            .filter(|doc| filter.map_or(true, |f| mongo_matches(f, &doc.metadata)))
            .take(k)
            .cloned()
            .collect())
    }
}

fn stored_values(metadata: &Map<String, Value>, key: &str) -> Vec<String> {
    match metadata.get(key) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn as_strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn mongo_matches(filter: &Value, metadata: &Map<String, Value>) -> bool {
    let object = filter.as_object().expect("filter object");
    object.iter().all(|(key, condition)| match key.as_str() {
        "$and" => condition
            .as_array()
            .expect("$and operands")
            .iter()
            .all(|f| mongo_matches(f, metadata)),
        "$or" => condition
            .as_array()
            .expect("$or operands")
            .iter()
            .any(|f| mongo_matches(f, metadata)),
        field => {
            let stored = stored_values(metadata, field);
            let (op, operand) = condition
                .as_object()
                .and_then(|c| c.iter().next())
                .expect("field condition");
            match op.as_str() {
                "$eq" => stored.iter().any(|s| Some(s.as_str()) == operand.as_str()),
                "$in" => {
                    let wanted = as_strings(operand);
                    stored.iter().any(|s| wanted.contains(s))
                }
                "$nin" => {
                    let unwanted = as_strings(operand);
                    !stored.iter().any(|s| unwanted.contains(s))
                }
                other => panic!("unexpected operator {}", other),
            }
        }
    })
}

fn doc(content: &str, identities: &[&str], topics: &[&str]) -> Document {
    Document::new(content)
        .with_metadata("authorized_identities", json!(identities))
        .with_metadata("pebblo_semantic_topics", json!(topics))
}

fn corpus() -> Vec<Document> {
    vec![
        doc("alice-travel", &["alice"], &["travel"]),
        doc("team-a-finance", &["team-a"], &["finance"]),
        doc("team-a-hr", &["team-a"], &["hr"]),
        doc("team-b-travel", &["team-b"], &["travel"]),
        doc("bob-legal", &["bob"], &["legal"]),
        doc("shared-untagged", &["alice", "bob"], &[]),
    ]
}

fn contents(documents: &[Document]) -> Vec<&str> {
    documents.iter().map(|d| d.page_content.as_str()).collect()
}

fn enforcer_with_sink(config: EnforcementConfig) -> (Enforcer, Arc<MemoryAuditSink>) {
    let sink = Arc::new(MemoryAuditSink::new());
    let enforcer = Enforcer::from_config(config)
        .unwrap()
        .with_audit_sink(sink.clone());
    (enforcer, sink)
}

#[test]
fn test_identity_clause_matches_principal_or_group() {
    let enforcer = Enforcer::new(
        Arc::new(CapabilityRegistry::builtin()),
        EnforcementConfig::default(),
    );
    let users = [
        AuthContext::new("alice").with_group("team-a"),
        AuthContext::new("bob"),
        AuthContext::new("carol").with_groups(["team-b", "team-c"]),
        AuthContext::new("dave").with_group("nobody"),
    ];

    for kind in BackendKind::ALL {
        for auth in &users {
            let compiled = enforcer.compile(kind.as_str(), Some(auth), None).unwrap();
            for document in corpus() {
                let identities = stored_values(&document.metadata, "authorized_identities");
                let expected = identities.contains(&auth.user_id)
                    || identities.iter().any(|i| auth.has_group(i));
                assert_eq!(
                    compiled.permits(&document),
                    expected,
                    "{} on {} for {}",
                    auth.user_id,
                    kind,
                    document.page_content
                );
            }
        }
    }
}

#[test]
fn test_denied_label_always_excluded() {
    let enforcer = Enforcer::new(
        Arc::new(CapabilityRegistry::builtin()),
        EnforcementConfig::default(),
    );
    let auth = AuthContext::new("alice").with_group("team-a");
    let semantic = SemanticContext::new()
        .allow_topic("finance")
        .allow_topic("hr")
        .deny_topic("finance");

    for kind in [
        BackendKind::Pinecone,
        BackendKind::Qdrant,
        BackendKind::PgVector,
        BackendKind::Chroma,
        BackendKind::Milvus,
    ] {
        let compiled = enforcer
            .compile(kind.as_str(), Some(&auth), Some(&semantic))
            .unwrap();
        for document in corpus() {
            let topics = stored_values(&document.metadata, "pebblo_semantic_topics");
            if topics.iter().any(|t| t == "finance") {
                assert!(!compiled.permits(&document), "{} on {}", document.page_content, kind);
            }
        }
    }
}

#[test]
fn test_full_operator_backend_filters_search() {
    let (enforcer, sink) = enforcer_with_sink(EnforcementConfig::default());
    let handle = enforcer.handle(MongoStyleStore::new("PGVector")).with_k(10);
    let request = RetrievalRequest::new("what can I read?")
        .with_auth(AuthContext::new("alice").with_group("team-a"))
        .with_semantic(SemanticContext::new().deny_topic("finance"));

    let documents = enforcer.retrieve(&handle, &request).unwrap();
    assert_eq!(
        contents(&documents),
        vec!["alice-travel", "team-a-hr", "shared-untagged"]
    );

    let filters = handle.store().filters.lock().clone();
    assert_eq!(
        filters,
        vec![Some(NativeFilter::Json(json!({
            "$and": [
                {"$or": [
                    {"authorized_identities": {"$eq": "alice"}},
                    {"authorized_identities": {"$in": ["team-a"]}}
                ]},
                {"pebblo_semantic_topics": {"$nin": ["finance"]}}
            ]
        })))]
    );
    assert_eq!(sink.len(), 2);
}

#[test]
fn test_qdrant_uses_generic_negation() {
    let enforcer = Enforcer::new(
        Arc::new(CapabilityRegistry::builtin()),
        EnforcementConfig::default(),
    );
    let auth = AuthContext::new("alice").with_group("team-a");
    let semantic = SemanticContext::new().deny_topic("finance");
    let compiled = enforcer
        .compile("QdrantVectorStore", Some(&auth), Some(&semantic))
        .unwrap();

    assert_eq!(
        compiled.outcome,
        FilterOutcome::Restrict(NativeFilter::Json(json!({
            "must": [
                {"should": [
                    {"key": "metadata.authorized_identities", "match": {"value": "alice"}},
                    {"key": "metadata.authorized_identities", "match": {"any": ["team-a"]}}
                ]},
                {"must_not": [
                    {"key": "metadata.pebblo_semantic_topics", "match": {"any": ["finance"]}}
                ]}
            ]
        })))
    );
}

#[test]
fn test_backend_without_negation_rejects_denials() {
    let registry = CapabilityRegistry::builder()
        .register(
            BackendCapability::builtin(BackendKind::Chroma)
                .without_operator(Operator::Not)
                .without_operator(Operator::NotIn),
        )
        .build();
    let (enforcer, sink) = {
        let sink = Arc::new(MemoryAuditSink::new());
        let enforcer = Enforcer::new(Arc::new(registry), EnforcementConfig::default())
            .with_audit_sink(sink.clone());
        (enforcer, sink)
    };
    let handle = RetrieverHandle::new(MongoStyleStore::new("chroma"));
    let request = RetrievalRequest::new("q")
        .with_auth(AuthContext::new("alice").with_group("team-a"))
        .with_semantic(SemanticContext::new().deny_topic("finance"));

    let err = enforcer.retrieve(&handle, &request).unwrap_err();
    assert!(matches!(
        err,
        EnforcementError::UnsupportedFilterOperator {
            backend: BackendKind::Chroma,
            operator: Operator::Not,
        }
    ));
    assert_eq!(handle.store().calls.load(Ordering::SeqCst), 0);
    assert_eq!(handle.pending(), None);
    assert_eq!(sink.len(), 1);
}

#[test]
fn test_unsupported_backend_never_searches() {
    let enforcer = Enforcer::new(
        Arc::new(CapabilityRegistry::builtin()),
        EnforcementConfig::default(),
    );
    let handle = RetrieverHandle::new(MongoStyleStore::new("ElasticsearchStore"));
    let request = RetrievalRequest::new("q").with_auth(AuthContext::new("alice"));

    let err = enforcer.retrieve(&handle, &request).unwrap_err();
    assert!(err.is_backend_unsupported());
    assert_eq!(handle.store().calls.load(Ordering::SeqCst), 0);
    assert_eq!(handle.pending(), None);
}

#[test]
fn test_empty_contexts_follow_policy() {
    let (deny, _) = enforcer_with_sink(EnforcementConfig::default());
    let handle = deny.handle(MongoStyleStore::new("pinecone"));
    let documents = deny.retrieve(&handle, &RetrievalRequest::new("q")).unwrap();
    assert!(documents.is_empty());
    assert_eq!(handle.store().calls.load(Ordering::SeqCst), 0);

    let (skip, _) = enforcer_with_sink(
        EnforcementConfig::new().with_missing_identity(MissingIdentityPolicy::Skip),
    );
    let handle = skip.handle(MongoStyleStore::new("pinecone")).with_k(100);
    let documents = skip.retrieve(&handle, &RetrievalRequest::new("q")).unwrap();
    assert_eq!(documents.len(), corpus().len());
    assert_eq!(handle.store().filters.lock().clone(), vec![None]);
}

#[test]
fn test_unsatisfiable_allow_list_denies_everything() {
    let (enforcer, _) = enforcer_with_sink(EnforcementConfig::default());
    let handle = enforcer.handle(MongoStyleStore::new("pinecone"));
    let request = RetrievalRequest::new("q")
        .with_auth(AuthContext::new("alice"))
        .with_semantic(SemanticContext::new().allow_topic("travel").deny_topic("travel"));

    assert!(enforcer.retrieve(&handle, &request).unwrap().is_empty());
    assert_eq!(handle.store().calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_request_from_json_payload() {
    let (enforcer, _) = enforcer_with_sink(EnforcementConfig::default());
    let handle = enforcer.handle(MongoStyleStore::new("pinecone")).with_k(10);
    let request = RetrievalRequest::from_json(
        r#"{
            "query": "travel policy",
            "auth_context": {"user_id": "bob", "user_auth": []},
            "semantic_context": {"pebblo_semantic_topics": {"deny": ["legal"]}}
        }"#,
    )
    .unwrap();

    let documents = enforcer.retrieve(&handle, &request).unwrap();
    assert_eq!(contents(&documents), vec!["shared-untagged"]);
}

#[test]
fn test_concurrent_requests_on_shared_handle() {
    let enforcer = Arc::new(Enforcer::new(
        Arc::new(CapabilityRegistry::builtin()),
        EnforcementConfig::default(),
    ));
    let handle = Arc::new(enforcer.handle(MongoStyleStore::new("pinecone")).with_k(10));

    let workers: Vec<_> = ["alice", "bob"]
        .into_iter()
        .map(|user| {
            let enforcer = Arc::clone(&enforcer);
            let handle = Arc::clone(&handle);
            thread::spawn(move || {
                let request = RetrievalRequest::new("q").with_auth(AuthContext::new(user));
                for _ in 0..50 {
                    let documents = enforcer.retrieve(&handle, &request).unwrap();
                    for document in &documents {
                        let identities =
                            stored_values(&document.metadata, "authorized_identities");
                        assert!(identities.iter().any(|i| i == user));
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(handle.store().calls.load(Ordering::SeqCst), 100);
    assert_eq!(handle.pending(), None);
}

#[test]
fn test_enforced_request_keeps_its_own_filter() {
    let enforcer = Arc::new(Enforcer::new(
        Arc::new(CapabilityRegistry::builtin()),
        EnforcementConfig::default(),
    ));
    let handle = Arc::new(enforcer.handle(MongoStyleStore::new("pinecone")).with_k(10));

    let (applied_tx, applied_rx) = mpsc::channel();
    let alice = {
        let enforcer = Arc::clone(&enforcer);
        let handle = Arc::clone(&handle);
        thread::spawn(move || {
            let auth = AuthContext::new("alice");
            let request = enforcer.apply_enforcement(&handle, Some(&auth), None).unwrap();
            applied_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(50));
            let documents = request.search("q").unwrap();
            contents(&documents)
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
    };

    applied_rx.recv().unwrap();
    let auth = AuthContext::new("bob");
    let request = enforcer.apply_enforcement(&handle, Some(&auth), None).unwrap();
    let bob_documents = request.search("q").unwrap();
    drop(request);

    assert_eq!(contents(&bob_documents), vec!["bob-legal", "shared-untagged"]);
    assert_eq!(alice.join().unwrap(), vec!["alice-travel", "shared-untagged"]);
    assert_eq!(handle.store().calls.load(Ordering::SeqCst), 2);
    assert_eq!(handle.pending(), None);
}

#[test]
fn test_search_without_enforcement_is_refused() {
    let handle = RetrieverHandle::new(MongoStyleStore::new("pinecone"));
    let err = handle.begin().search("q").unwrap_err();
    assert!(matches!(err, EnforcementError::FilterNotAttached { .. }));
    assert_eq!(handle.store().calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_empty_auth_context_payload_is_anonymous() {
    let request = RetrievalRequest::from_json(r#"{"question": "q", "auth_context": {}}"#).unwrap();

    let (deny, _) = enforcer_with_sink(EnforcementConfig::default());
    let handle = deny.handle(MongoStyleStore::new("pinecone"));
    assert!(deny.retrieve(&handle, &request).unwrap().is_empty());
    assert_eq!(handle.store().calls.load(Ordering::SeqCst), 0);

    let (skip, _) = enforcer_with_sink(
        EnforcementConfig::new().with_missing_identity(MissingIdentityPolicy::Skip),
    );
    let handle = skip.handle(MongoStyleStore::new("pinecone")).with_k(100);
    let documents = skip.retrieve(&handle, &request).unwrap();
    assert_eq!(documents.len(), corpus().len());
}
