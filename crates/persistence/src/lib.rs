//! ScyllaDB persistence layer (§13): the durable half of `StockService` plus
//! the concrete `OrderSink` and `CallRecorder`, backing the
//! `calls`/`orders`/`order_items`/`products` schema created idempotently at
//! startup.

pub mod calls;
pub mod client;
pub mod error;
pub mod orders;
pub mod schema;
pub mod stock;

use std::sync::Arc;

pub use calls::ScyllaCallRecorder;
pub use client::{ScyllaClient, ScyllaConfig};
pub use error::PersistenceError;
pub use orders::ScyllaOrderSink;
pub use stock::ScyllaStockService;

use voice_agent_config::OrderReviewThresholds;

/// Connects to ScyllaDB, ensures the schema exists, and wires the concrete
/// `StockService`/`OrderSink`/`CallRecorder` implementations the agent crate
/// depends on.
pub async fn init(
    config: ScyllaConfig,
    thresholds: OrderReviewThresholds,
) -> Result<PersistenceLayer, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;

    let stock = Arc::new(ScyllaStockService::new(client.clone()));
    let orders = Arc::new(ScyllaOrderSink::new(client.clone(), stock.clone(), thresholds));
    let calls = Arc::new(ScyllaCallRecorder::new(client.clone()));

    Ok(PersistenceLayer {
        client,
        stock,
        orders,
        calls,
    })
}

/// The durable backend handed to the server crate's composition root.
pub struct PersistenceLayer {
    pub client: ScyllaClient,
    pub stock: Arc<ScyllaStockService>,
    pub orders: Arc<ScyllaOrderSink>,
    pub calls: Arc<ScyllaCallRecorder>,
}
