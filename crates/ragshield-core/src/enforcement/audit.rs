//! Audit events for enforcement decisions.
//!
//! Every filter the enforcer applies, every deny-all and every rejected
//! request produces one [`EnforcementEvent`]. Events are handed to an
//! [`AuditSink`]; nothing is persisted here.

use parking_lot::Mutex;
use ragshield_proto::Identity;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Counter for generating unique event IDs.
static EVENT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Current time in microseconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

fn generate_event_id() -> [u8; 16] {
    let ts = current_timestamp();
    let counter = EVENT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut id = [0u8; 16];
    id[0..8].copy_from_slice(&ts.to_be_bytes());
    id[8..16].copy_from_slice(&counter.to_be_bytes());
    id
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnforcementEventKind {
    /// A restricting or unrestricted filter was attached.
    FilterApplied {
        /// Rendered filter.
        summary: String,
    },
    /// The request may not see any document.
    DeniedAll {
        /// Why nothing is visible.
        reason: String,
    },
    /// Enforcement failed and retrieval was refused.
    Rejected {
        /// Error message.
        error: String,
    },
    /// A filtered search completed.
    Retrieved {
        /// Documents handed back to the caller.
        document_count: usize,
        /// Documents dropped by result verification.
        dropped: usize,
    },
}

/// One audited enforcement decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforcementEvent {
    /// Unique event ID.
    pub id: [u8; 16],
    /// Microseconds since the Unix epoch.
    pub timestamp: u64,
    /// Backend identifier as supplied by the retriever.
    pub backend: String,
    /// Requesting principal, `<anonymous>` if none.
    pub principal: String,
    /// Event details.
    pub kind: EnforcementEventKind,
}

impl EnforcementEvent {
    /// Create an event.
    pub fn new(backend: impl Into<String>, identity: Identity<'_>, kind: EnforcementEventKind) -> Self {
        Self {
            id: generate_event_id(),
            timestamp: current_timestamp(),
            backend: backend.into(),
            principal: identity.to_string(),
            kind,
        }
    }

    /// Event for an attached restricting or unrestricted filter.
    pub fn filter_applied(backend: impl Into<String>, identity: Identity<'_>, summary: impl Into<String>) -> Self {
        Self::new(
            backend,
            identity,
            EnforcementEventKind::FilterApplied {
                summary: summary.into(),
            },
        )
    }

    /// Event for a deny-all outcome with its reason.
    pub fn denied_all(backend: impl Into<String>, identity: Identity<'_>, reason: impl Into<String>) -> Self {
        Self::new(
            backend,
            identity,
            EnforcementEventKind::DeniedAll {
                reason: reason.into(),
            },
        )
    }

    /// Event for a request refused with an error.
    pub fn rejected(backend: impl Into<String>, identity: Identity<'_>, error: impl Into<String>) -> Self {
        Self::new(
            backend,
            identity,
            EnforcementEventKind::Rejected {
                error: error.into(),
            },
        )
    }

    /// Event for a completed search and the documents it returned.
    pub fn retrieved(
        backend: impl Into<String>,
        identity: Identity<'_>,
        document_count: usize,
        dropped: usize,
    ) -> Self {
        Self::new(
            backend,
            identity,
            EnforcementEventKind::Retrieved {
                document_count,
                dropped,
            },
        )
    }

    /// Hex-encoded event ID.
    pub fn id_hex(&self) -> String {
        hex::encode(self.id)
    }

    /// Format the event as a log line.
    pub fn to_log_line(&self) -> String {
        let event_desc = match &self.kind {
            EnforcementEventKind::FilterApplied { summary } => {
                format!("FILTER_APPLIED filter={}", summary)
            }
            EnforcementEventKind::DeniedAll { reason } => format!("DENIED_ALL reason={}", reason),
            EnforcementEventKind::Rejected { error } => format!("REJECTED error={}", error),
            EnforcementEventKind::Retrieved {
                document_count,
                dropped,
            } => format!("RETRIEVED documents={} dropped={}", document_count, dropped),
        };

        format!(
            "{} id={} backend={} principal={} {}",
            self.timestamp,
            self.id_hex(),
            self.backend,
            self.principal,
            event_desc
        )
    }
}

/// Receiver of enforcement events.
pub trait AuditSink: Send + Sync {
    /// Record an event.
    fn record(&self, event: EnforcementEvent);
}

/// Emits events as structured `tracing` events.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: EnforcementEvent) {
        let id = event.id_hex();
        match &event.kind {
            EnforcementEventKind::FilterApplied { summary } => info!(
                target: "ragshield::audit",
                %id, backend = %event.backend, principal = %event.principal, filter = %summary,
                "filter applied"
            ),
            EnforcementEventKind::DeniedAll { reason } => info!(
                target: "ragshield::audit",
                %id, backend = %event.backend, principal = %event.principal, %reason,
                "deny-all applied"
            ),
            EnforcementEventKind::Rejected { error } => warn!(
                target: "ragshield::audit",
                %id, backend = %event.backend, principal = %event.principal, %error,
                "retrieval rejected"
            ),
            EnforcementEventKind::Retrieved {
                document_count,
                dropped,
            } => info!(
                target: "ragshield::audit",
                %id, backend = %event.backend, principal = %event.principal,
                document_count, dropped,
                "documents retrieved"
            ),
        }
    }
}

/// In-memory sink for testing.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<EnforcementEvent>>,
}

impl MemoryAuditSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events.
    pub fn events(&self) -> Vec<EnforcementEvent> {
        self.events.lock().clone()
    }

    /// Clear all events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Get event count.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: EnforcementEvent) {
        self.events.lock().push(event);
    }
}

/// Sink that discards all events.
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: EnforcementEvent) {}
}
