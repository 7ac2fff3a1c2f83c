//! ScyllaDB schema creation (§13): a handful of tables, created idempotently at
//! startup, grounded on the original's `calls`/`orders`/`order_items`/`products`
//! SQLAlchemy models.

use crate::error::PersistenceError;
use scylla::Session;

/// Create the keyspace if it doesn't exist
pub async fn create_keyspace(session: &Session, keyspace: &str, replication_factor: u8) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session.query_unpaged(query, &[]).await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create keyspace: {}", e)))?;

    Ok(())
}

/// Create all required tables
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    let products_table = format!(r#"
        CREATE TABLE IF NOT EXISTS {}.products (
            product_key TEXT,
            display_name TEXT,
            category TEXT,
            unit_price DOUBLE,
            stock_available INT,
            stock_reserved INT,
            updated_at TIMESTAMP,
            PRIMARY KEY (product_key)
        )
    "#, keyspace);

    session.query_unpaged(products_table, &[]).await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create products table: {}", e)))?;

    let calls_table = format!(r#"
        CREATE TABLE IF NOT EXISTS {}.calls (
            call_id TEXT,
            tenant TEXT,
            phone TEXT,
            status TEXT,
            started_at TIMESTAMP,
            ended_at TIMESTAMP,
            PRIMARY KEY (call_id)
        )
    "#, keyspace);

    session.query_unpaged(calls_table, &[]).await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create calls table: {}", e)))?;

    let dialogue_turns_table = format!(r#"
        CREATE TABLE IF NOT EXISTS {}.dialogue_turns (
            call_id TEXT,
            seq INT,
            role TEXT,
            text TEXT,
            created_at TIMESTAMP,
            PRIMARY KEY ((call_id), seq)
        ) WITH CLUSTERING ORDER BY (seq ASC)
    "#, keyspace);

    session.query_unpaged(dialogue_turns_table, &[]).await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create dialogue_turns table: {}", e)))?;

    let orders_table = format!(r#"
        CREATE TABLE IF NOT EXISTS {}.orders (
            order_id TEXT,
            call_id TEXT,
            tenant TEXT,
            status TEXT,
            total_amount DOUBLE,
            average_confidence FLOAT,
            requires_human_review BOOLEAN,
            review_reason TEXT,
            erp_created BOOLEAN,
            erp_order_id TEXT,
            created_at TIMESTAMP,
            PRIMARY KEY (order_id)
        )
    "#, keyspace);

    session.query_unpaged(orders_table, &[]).await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create orders table: {}", e)))?;

    let order_items_table = format!(r#"
        CREATE TABLE IF NOT EXISTS {}.order_items (
            order_id TEXT,
            seq INT,
            product_key TEXT,
            display_name TEXT,
            quantity INT,
            unit TEXT,
            unit_price DOUBLE,
            line_total DOUBLE,
            match_score FLOAT,
            line_status TEXT,
            source_transcript TEXT,
            PRIMARY KEY ((order_id), seq)
        )
    "#, keyspace);

    session.query_unpaged(order_items_table, &[]).await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create order_items table: {}", e)))?;

    tracing::info!("All tables created successfully");
    Ok(())
}
