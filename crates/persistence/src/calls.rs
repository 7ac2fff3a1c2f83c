//! `CallRecorder` over the `calls` table (§6 "Persisted state layout"): a call
//! record with identifiers, status, and timestamps, written at terminal
//! transitions.

use async_trait::async_trait;

use voice_agent_core::{Call, CallRecorder, CallStatus, Error, Result};

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

pub struct ScyllaCallRecorder {
    client: ScyllaClient,
}

impl ScyllaCallRecorder {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

fn status_str(status: CallStatus) -> &'static str {
    match status {
        CallStatus::Pending => "pending",
        CallStatus::Active => "active",
        CallStatus::Completed => "completed",
        CallStatus::Timeout => "timeout",
        CallStatus::Failed => "failed",
        CallStatus::Disconnected => "disconnected",
    }
}

#[async_trait]
impl CallRecorder for ScyllaCallRecorder {
    async fn record(&self, call: &Call) -> Result<()> {
        let query = format!(
            "INSERT INTO {}.calls (call_id, tenant, phone, status, started_at, ended_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &call.call_id,
                    call.tenant.clone(),
                    &call.phone,
                    status_str(call.status),
                    call.started_at.timestamp_millis(),
                    call.ended_at.map(|t| t.timestamp_millis()),
                ),
            )
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))
            .map_err(Error::from)?;
        Ok(())
    }
}
