//! Call-record writer (§6 "Persisted state layout"): a `call` row with
//! identifiers, status, and timestamps, written at terminal transitions.

use crate::conversation::Call;
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait CallRecorder: Send + Sync {
    async fn record(&self, call: &Call) -> Result<()>;
}
