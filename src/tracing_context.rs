//! Correlation ID and tracing context management
//!
//! Every delivered transaction gets a correlation ID so its log lines
//! (operation classification, flush, failures) can be tied together.

use tracing::Span;
use uuid::Uuid;

/// A correlation ID that uniquely identifies one transaction delivery
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a new UUID-based correlation ID
    pub fn new() -> Self {
        CorrelationId(Uuid::new_v4().to_string())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation ID plus the span all of a transaction's events are recorded in
#[derive(Debug, Clone)]
pub struct TracingContext {
    pub correlation_id: CorrelationId,
    pub span: Span,
}

impl TracingContext {
    /// Context for one transaction delivered by the host
    pub fn for_transaction(transaction_id: &str) -> Self {
        Self::with_correlation_id(CorrelationId::new(), transaction_id)
    }

    pub fn with_correlation_id(correlation_id: CorrelationId, transaction_id: &str) -> Self {
        let span = tracing::info_span!(
            "transaction",
            correlation_id = %correlation_id,
            tx = transaction_id,
            component = "cdc2pilosa"
        );

        Self {
            correlation_id,
            span,
        }
    }
}
