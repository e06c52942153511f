//! Backend identifiers.

use crate::error::{EnforcementError, EnforcementResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Vector-similarity search engines known to the enforcement layer.
///
/// Adding a backend means adding a variant here and an entry to the builtin
/// capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Pinecone metadata filters.
    Pinecone,
    /// Qdrant payload filters.
    Qdrant,
    /// Postgres pgvector JSONB metadata filters.
    PgVector,
    /// Chroma `where` filters.
    Chroma,
    /// Milvus boolean expressions.
    Milvus,
    /// FAISS in-memory metadata dictionary filters.
    Faiss,
}

impl BackendKind {
    /// All backends, in declaration order.
    pub const ALL: [BackendKind; 6] = [
        BackendKind::Pinecone,
        BackendKind::Qdrant,
        BackendKind::PgVector,
        BackendKind::Chroma,
        BackendKind::Milvus,
        BackendKind::Faiss,
    ];

    /// Canonical lowercase identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Pinecone => "pinecone",
            BackendKind::Qdrant => "qdrant",
            BackendKind::PgVector => "pgvector",
            BackendKind::Chroma => "chroma",
            BackendKind::Milvus => "milvus",
            BackendKind::Faiss => "faiss",
        }
    }

    /// Resolve a store type identifier.
    ///
    /// Accepts canonical ids (`"qdrant"`) as well as store class names
    /// (`"PineconeVectorStore"`, `"PGVector"`), case-insensitively.
    pub fn parse(id: &str) -> Option<Self> {
        let normalized: String = id
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        let name = normalized
            .strip_suffix("vectorstore")
            .unwrap_or(&normalized);

        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = EnforcementError;

    fn from_str(s: &str) -> EnforcementResult<Self> {
        BackendKind::parse(s).ok_or_else(|| EnforcementError::UnsupportedBackend {
            backend: s.to_string(),
        })
    }
}
