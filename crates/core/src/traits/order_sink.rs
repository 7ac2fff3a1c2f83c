//! OrderSink capability trait (§4.9, §4.10).

use crate::conversation::OrderDraftItem;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Finalization request built from a Confirming-state ConversationContext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub call_id: String,
    pub tenant: Option<String>,
    pub items: Vec<OrderDraftItem>,
    pub average_confidence: f32,
    /// Set if any item was flagged out-of-stock during the dialogue, even
    /// though such items never make it into `items` (§4.10 review trigger).
    pub any_out_of_stock: bool,
}

/// §4.10: review is required when total > 10,000, averageConfidence < 0.85,
/// or any item was flagged out-of-stock during the dialogue. Thresholds are
/// configuration (§12), not constants of this trait.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub requires_human_review: bool,
    pub review_reason: Option<String>,
}

/// Persists a finalized order (C13, via the storage adapter in §13).
#[async_trait]
pub trait OrderSink: Send + Sync {
    async fn create(&self, request: OrderRequest) -> Result<OrderResult>;
}
