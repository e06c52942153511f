//! Constraint model carried by a retrieval request.
//!
//! An [`AuthContext`] describes who is asking, a [`SemanticContext`] describes
//! which topics and entities the answer may draw from. Both are plain data: the
//! compiler borrows them for the duration of one compilation and never keeps
//! them.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identity and group-membership claims for the current request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Optional display name of the principal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Identifier of the requesting principal.
    #[serde(default)]
    pub user_id: String,
    /// Groups, roles or entitlements held by the principal.
    #[serde(default)]
    pub user_auth: BTreeSet<String>,
}

impl AuthContext {
    /// Create a context for a principal with no group memberships.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            name: None,
            user_id: user_id.into(),
            user_auth: BTreeSet::new(),
        }
    }

    /// Add a group membership.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.user_auth.insert(group.into());
        self
    }

    /// Add several group memberships.
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_auth.extend(groups.into_iter().map(Into::into));
        self
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Check whether the principal holds the given group.
    pub fn has_group(&self, group: &str) -> bool {
        self.user_auth.contains(group)
    }

    /// Check whether the context names neither a principal nor a group.
    pub fn is_empty(&self) -> bool {
        self.user_id.trim().is_empty() && self.user_auth.is_empty()
    }
}

/// Who is asking: either an authenticated principal or nobody at all.
///
/// A missing [`AuthContext`] is never replaced by a placeholder principal;
/// callers have to decide what anonymous access means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity<'a> {
    /// No authentication context was supplied.
    Anonymous,
    /// An authenticated principal.
    Authenticated(&'a AuthContext),
}

impl<'a> Identity<'a> {
    /// Build an identity from an optional context.
    ///
    /// A context with a blank `user_id` and no groups carries no claims and
    /// is anonymous. A blank `user_id` alongside groups stays authenticated
    /// so the compiler can reject it.
    pub fn from_context(context: Option<&'a AuthContext>) -> Self {
        match context {
            Some(ctx) if !ctx.is_empty() => Identity::Authenticated(ctx),
            _ => Identity::Anonymous,
        }
    }

    /// Principal identifier, if authenticated.
    pub fn principal(&self) -> Option<&'a str> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(ctx) => Some(ctx.user_id.as_str()),
        }
    }

    /// Check if no identity was supplied.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }
}

impl fmt::Display for Identity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Anonymous => write!(f, "<anonymous>"),
            Identity::Authenticated(ctx) => write!(f, "{}", ctx.user_id),
        }
    }
}

/// Topic and entity allow/deny lists for the current request.
///
/// A label present in both an allow list and the matching deny list is
/// treated as denied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SemanticContextWire")]
pub struct SemanticContext {
    /// Topics the answer may draw from. Empty means unconstrained.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub allowed_topics: BTreeSet<String>,
    /// Topics that must never be retrieved.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub denied_topics: BTreeSet<String>,
    /// Entities the answer may draw from. Empty means unconstrained.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub allowed_entities: BTreeSet<String>,
    /// Entities that must never be retrieved.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub denied_entities: BTreeSet<String>,
}

impl SemanticContext {
    /// Create an empty (unconstrained) context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow a topic.
    pub fn allow_topic(mut self, topic: impl Into<String>) -> Self {
        self.allowed_topics.insert(topic.into());
        self
    }

    /// Deny a topic.
    pub fn deny_topic(mut self, topic: impl Into<String>) -> Self {
        self.denied_topics.insert(topic.into());
        self
    }

    /// Allow an entity.
    pub fn allow_entity(mut self, entity: impl Into<String>) -> Self {
        self.allowed_entities.insert(entity.into());
        self
    }

    /// Deny an entity.
    pub fn deny_entity(mut self, entity: impl Into<String>) -> Self {
        self.denied_entities.insert(entity.into());
        self
    }

    /// True when all four lists are empty. Equivalent to no context at all.
    pub fn is_empty(&self) -> bool {
        self.allowed_topics.is_empty()
            && self.denied_topics.is_empty()
            && self.allowed_entities.is_empty()
            && self.denied_entities.is_empty()
    }

    /// Iterate over every label in every list.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.allowed_topics
            .iter()
            .chain(&self.denied_topics)
            .chain(&self.allowed_entities)
            .chain(&self.denied_entities)
            .map(String::as_str)
    }
}

/// Deny-only list as emitted by existing Pebblo clients.
#[derive(Debug, Default, Deserialize)]
struct DenyList {
    #[serde(default)]
    deny: Vec<String>,
}

/// Accepts both the flat form and the nested `pebblo_semantic_*` form.
#[derive(Debug, Default, Deserialize)]
struct SemanticContextWire {
    #[serde(default)]
    allowed_topics: BTreeSet<String>,
    #[serde(default)]
    denied_topics: BTreeSet<String>,
    #[serde(default)]
    allowed_entities: BTreeSet<String>,
    #[serde(default)]
    denied_entities: BTreeSet<String>,
    #[serde(default)]
    pebblo_semantic_topics: Option<DenyList>,
    #[serde(default)]
    pebblo_semantic_entities: Option<DenyList>,
}

impl From<SemanticContextWire> for SemanticContext {
    fn from(wire: SemanticContextWire) -> Self {
        let mut denied_topics = wire.denied_topics;
        if let Some(topics) = wire.pebblo_semantic_topics {
            denied_topics.extend(topics.deny);
        }
        let mut denied_entities = wire.denied_entities;
        if let Some(entities) = wire.pebblo_semantic_entities {
            denied_entities.extend(entities.deny);
        }
        Self {
            allowed_topics: wire.allowed_topics,
            denied_topics,
            allowed_entities: wire.allowed_entities,
            denied_entities,
        }
    }
}

/// A question together with the constraints it must be answered under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    /// The user question used as the similarity query.
    #[serde(alias = "query")]
    pub question: String,
    /// Identity of the asker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_context: Option<AuthContext>,
    /// Topic and entity restrictions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_context: Option<SemanticContext>,
}

impl RetrievalRequest {
    /// Create an unconstrained request.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            auth_context: None,
            semantic_context: None,
        }
    }

    /// Attach an authentication context.
    pub fn with_auth(mut self, auth: AuthContext) -> Self {
        self.auth_context = Some(auth);
        self
    }

    /// Attach a semantic context.
    pub fn with_semantic(mut self, semantic: SemanticContext) -> Self {
        self.semantic_context = Some(semantic);
        self
    }

    /// Identity of the asker.
    pub fn identity(&self) -> Identity<'_> {
        Identity::from_context(self.auth_context.as_ref())
    }

    /// Decode a request from JSON.
    pub fn from_json(input: &str) -> Result<Self, Error> {
        let request: Self = serde_json::from_str(input)?;
        if request.question.trim().is_empty() {
            return Err(Error::InvalidRequest("question must not be empty".into()));
        }
        Ok(request)
    }

    /// Encode the request as JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_context_groups_are_unique() {
        let ctx = AuthContext::new("alice")
            .with_group("team-a")
            .with_groups(["team-b", "team-a"]);
        assert_eq!(ctx.user_auth.len(), 2);
        assert!(ctx.has_group("team-b"));
    }

    #[test]
    fn test_identity_from_context() {
        let ctx = AuthContext::new("alice");
        assert_eq!(Identity::from_context(Some(&ctx)).principal(), Some("alice"));
        assert!(Identity::from_context(None).is_anonymous());
        assert_eq!(Identity::Anonymous.to_string(), "<anonymous>");
    }

    #[test]
    fn test_empty_auth_context_is_anonymous() {
        let empty: AuthContext = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
        assert!(Identity::from_context(Some(&empty)).is_anonymous());
        assert!(Identity::from_context(Some(&AuthContext::new("  "))).is_anonymous());

        let groups_only = AuthContext::new("").with_group("team-a");
        assert!(!groups_only.is_empty());
        assert!(!Identity::from_context(Some(&groups_only)).is_anonymous());
    }

    #[test]
    fn test_semantic_context_empty() {
        assert!(SemanticContext::new().is_empty());
        assert!(!SemanticContext::new().deny_topic("finance").is_empty());
    }

    #[test]
    fn test_semantic_context_nested_deny_form() {
        let json = r#"{
            "pebblo_semantic_topics": {"deny": ["harmful-advice"]},
            "pebblo_semantic_entities": {"deny": ["credit-card-number", "ssn"]}
        }"#;
        let ctx: SemanticContext = serde_json::from_str(json).unwrap();
        assert!(ctx.denied_topics.contains("harmful-advice"));
        assert_eq!(ctx.denied_entities.len(), 2);
        assert!(ctx.allowed_topics.is_empty());
    }

    #[test]
    fn test_semantic_context_flat_and_nested_merge() {
        let json = r#"{
            "denied_topics": ["finance"],
            "pebblo_semantic_topics": {"deny": ["legal"]}
        }"#;
        let ctx: SemanticContext = serde_json::from_str(json).unwrap();
        let denied: Vec<_> = ctx.denied_topics.iter().map(String::as_str).collect();
        assert_eq!(denied, vec!["finance", "legal"]);
    }

    #[test]
    fn test_request_from_json() {
        let json = r#"{
            "question": "What is our travel policy?",
            "auth_context": {"user_id": "alice", "user_auth": ["team-a"]},
            "semantic_context": {"denied_topics": ["finance"]}
        }"#;
        let request = RetrievalRequest::from_json(json).unwrap();
        assert_eq!(request.identity().principal(), Some("alice"));
        assert!(request
            .semantic_context
            .as_ref()
            .unwrap()
            .denied_topics
            .contains("finance"));
    }

    #[test]
    fn test_request_accepts_query_alias() {
        let request = RetrievalRequest::from_json(r#"{"query": "hello"}"#).unwrap();
        assert_eq!(request.question, "hello");
        assert!(request.identity().is_anonymous());
    }

    #[test]
    fn test_request_with_empty_auth_context() {
        let request =
            RetrievalRequest::from_json(r#"{"question": "q", "auth_context": {}}"#).unwrap();
        assert!(request.auth_context.is_some());
        assert!(request.identity().is_anonymous());
    }

    #[test]
    fn test_request_rejects_blank_question() {
        let err = RetrievalRequest::from_json(r#"{"question": "  "}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_request_rejects_malformed_json() {
        let err = RetrievalRequest::from_json("{").unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }
}
