//! `OrderSink` over the `orders`/`order_items` tables (C13, §4.9/§4.10/§13).
//!
//! Grounded on the original's `order_service.py`: total is computed from the
//! snapshot items, the review-threshold check runs before persistence, and a
//! successful non-review order triggers a best-effort ERP handoff that is
//! logged but never fails the call.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use voice_agent_config::OrderReviewThresholds;
use voice_agent_core::{Error, OrderRequest, OrderResult, OrderSink, Result, StockService};

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

/// Persists finalized orders to ScyllaDB and reserves stock for their items.
///
/// Reservation happens here, at order creation, rather than earlier in the
/// dialogue: §4.6/§13 reserve only what is about to be durably committed.
pub struct ScyllaOrderSink {
    client: ScyllaClient,
    stock: Arc<dyn StockService>,
    thresholds: OrderReviewThresholds,
}

impl ScyllaOrderSink {
    pub fn new(client: ScyllaClient, stock: Arc<dyn StockService>, thresholds: OrderReviewThresholds) -> Self {
        Self {
            client,
            stock,
            thresholds,
        }
    }

    fn requires_review(&self, total_amount: f64, average_confidence: f32, any_out_of_stock: bool) -> Option<String> {
        review_reason(&self.thresholds, total_amount, average_confidence, any_out_of_stock)
    }

    /// Best-effort downstream handoff; logged on failure, never propagated.
    async fn send_to_erp(&self, order_id: &str) -> Option<String> {
        // No real ERP endpoint is configured for this deployment; record the
        // attempt so the order row still carries an honest `erp_created` flag.
        tracing::info!(order_id = %order_id, "submitting order to ERP");
        None
    }

    async fn reserve_items(&self, request: &OrderRequest) -> Result<()> {
        let mut reserved = Vec::new();
        for item in &request.items {
            match self.stock.reserve(&item.product_key, item.quantity).await {
                Ok(()) => reserved.push((item.product_key.clone(), item.quantity)),
                Err(err) => {
                    for (product_key, qty) in reserved {
                        if let Err(release_err) = self.stock.release(&product_key, qty).await {
                            tracing::warn!(product_key = %product_key, error = %release_err, "failed to release partial reservation");
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    async fn persist(
        &self,
        order_id: &str,
        request: &OrderRequest,
        total_amount: f64,
        review_reason: &Option<String>,
        erp_order_id: &Option<String>,
    ) -> std::result::Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.orders (
                order_id, call_id, tenant, status, total_amount, average_confidence,
                requires_human_review, review_reason, erp_created, erp_order_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    order_id,
                    &request.call_id,
                    request.tenant.clone(),
                    "confirmed",
                    total_amount,
                    request.average_confidence,
                    review_reason.is_some(),
                    review_reason.clone(),
                    erp_order_id.is_some(),
                    erp_order_id.clone(),
                    Utc::now().timestamp_millis(),
                ),
            )
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        for (seq, item) in request.items.iter().enumerate() {
            let query = format!(
                "INSERT INTO {}.order_items (
                    order_id, seq, product_key, display_name, quantity, unit, unit_price,
                    line_total, match_score, line_status, source_transcript
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                self.client.keyspace()
            );
            self.client
                .session()
                .query_unpaged(
                    query,
                    (
                        order_id,
                        seq as i32,
                        &item.product_key,
                        &item.display_name,
                        item.quantity as i32,
                        item.unit.display(),
                        item.unit_price,
                        item.line_total(),
                        item.match_score,
                        format!("{:?}", item.line_status),
                        &item.source_transcript,
                    ),
                )
                .await
                .map_err(|e| PersistenceError::Query(e.to_string()))?;
        }

        Ok(())
    }
}

/// Pure form of §4.10's review check, grounded on `order_service.py`'s
/// `_requires_human_review`/`_get_review_reason`.
fn review_reason(
    thresholds: &OrderReviewThresholds,
    total_amount: f64,
    average_confidence: f32,
    any_out_of_stock: bool,
) -> Option<String> {
    let mut reasons = Vec::new();
    if total_amount > thresholds.total_amount_threshold {
        reasons.push(format!("total amount {:.2} exceeds threshold", total_amount));
    }
    if average_confidence < thresholds.confidence_threshold {
        reasons.push(format!("average confidence {:.2} below threshold", average_confidence));
    }
    if any_out_of_stock {
        reasons.push("one or more items flagged out of stock".to_string());
    }
    if reasons.is_empty() {
        None
    } else {
        Some(reasons.join(" | "))
    }
}

fn generate_order_id() -> String {
    format!("CMD-{}-{}", Utc::now().format("%Y%m%d%H%M%S"), &uuid::Uuid::new_v4().simple().to_string()[..6])
}

#[async_trait]
impl OrderSink for ScyllaOrderSink {
    async fn create(&self, request: OrderRequest) -> Result<OrderResult> {
        let total_amount: f64 = request.items.iter().map(|item| item.line_total()).sum();
        let review_reason = self.requires_review(total_amount, request.average_confidence, request.any_out_of_stock);
        let order_id = generate_order_id();

        self.reserve_items(&request).await?;

        let erp_order_id = if review_reason.is_none() {
            self.send_to_erp(&order_id).await
        } else {
            None
        };

        self.persist(&order_id, &request, total_amount, &review_reason, &erp_order_id)
            .await
            .map_err(Error::from)?;

        Ok(OrderResult {
            order_id,
            requires_human_review: review_reason.is_some(),
            review_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> OrderReviewThresholds {
        OrderReviewThresholds {
            total_amount_threshold: 10_000.0,
            confidence_threshold: 0.85,
        }
    }

    #[test]
    fn review_triggers_on_amount_confidence_or_out_of_stock() {
        let t = thresholds();
        assert!(review_reason(&t, 10_001.0, 0.99, false).is_some());
        assert!(review_reason(&t, 100.0, 0.5, false).is_some());
        assert!(review_reason(&t, 100.0, 0.99, true).is_some());
        assert!(review_reason(&t, 100.0, 0.99, false).is_none());
    }

    #[test]
    fn order_id_carries_the_cmd_prefix() {
        let id = generate_order_id();
        assert!(id.starts_with("CMD-"));
    }
}
