//! CallRegistry (C10, §4.7): process-wide capacity control, active-call
//! index, and stale-call reclamation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use voice_agent_core::{Call, CallRecorder, CallStatus, Error, Result};

/// Handed back on `admit`. Holds the cancellation receiver the orchestrator
/// polls in its select loop; dropping it does not release the slot — the
/// orchestrator must call `CallRegistry::release` explicitly at teardown
/// (§4.9 step 5).
#[derive(Clone)]
pub struct CallHandle {
    pub call_id: String,
    cancel_rx: watch::Receiver<bool>,
}

impl CallHandle {
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Resolves once the registry's stale reaper (or an operator) signals
    /// this call for cancellation. Safe to poll repeatedly; idempotent.
    pub async fn cancelled(&mut self) {
        if *self.cancel_rx.borrow() {
            return;
        }
        let _ = self.cancel_rx.changed().await;
    }
}

fn status_label(status: CallStatus) -> &'static str {
    match status {
        CallStatus::Pending => "pending",
        CallStatus::Active => "active",
        CallStatus::Completed => "completed",
        CallStatus::Timeout => "timeout",
        CallStatus::Failed => "failed",
        CallStatus::Disconnected => "disconnected",
    }
}

struct Slot {
    call: Call,
    cancel_tx: watch::Sender<bool>,
}

pub struct CallRegistry {
    max_concurrent: usize,
    slots: Mutex<HashMap<String, Slot>>,
    recorder: Mutex<Option<Arc<dyn CallRecorder>>>,
}

impl CallRegistry {
    pub fn new(max_concurrent: usize) -> Arc<Self> {
        Arc::new(Self {
            max_concurrent,
            slots: Mutex::new(HashMap::new()),
            recorder: Mutex::new(None),
        })
    }

    /// Attaches the durable writer for the `call` record named in §6. Absent a
    /// recorder, `release` simply drops the slot as before.
    pub fn set_recorder(&self, recorder: Arc<dyn CallRecorder>) {
        *self.recorder.lock() = Some(recorder);
    }

    pub fn active_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Admits a new call, or fails with `Error::AtCapacity` (§8 invariant:
    /// `|activeCalls| <= maxConcurrentCalls` at every instant).
    pub fn admit(
        &self,
        call_id: impl Into<String>,
        phone: impl Into<String>,
        tenant: Option<String>,
    ) -> Result<CallHandle> {
        let mut slots = self.slots.lock();
        if slots.len() >= self.max_concurrent {
            metrics::counter!("voice_agent_calls_rejected_total").increment(1);
            return Err(Error::AtCapacity);
        }
        let call_id = call_id.into();
        let mut call = Call::new(call_id.clone(), phone.into(), tenant);
        call.status = CallStatus::Active;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        slots.insert(call_id.clone(), Slot { call, cancel_tx });
        metrics::counter!("voice_agent_calls_admitted_total").increment(1);
        metrics::gauge!("voice_agent_active_calls").set(slots.len() as f64);
        Ok(CallHandle { call_id, cancel_rx })
    }

    /// Releases a call's slot. Idempotent: releasing an unknown or
    /// already-released call id is a no-op (§8).
    pub fn release(&self, call_id: &str, final_status: CallStatus) {
        let mut slots = self.slots.lock();
        if let Some(mut slot) = slots.remove(call_id) {
            metrics::gauge!("voice_agent_active_calls").set(slots.len() as f64);
            metrics::counter!("voice_agent_call_terminations_total", "status" => status_label(final_status))
                .increment(1);
            slot.call.end(final_status);
            drop(slots);
            if let Some(recorder) = self.recorder.lock().clone() {
                let call = slot.call.clone();
                tokio::spawn(async move {
                    if let Err(err) = recorder.record(&call).await {
                        tracing::warn!(call_id = %call.call_id, error = %err, "failed to persist call record");
                    }
                });
            }
        }
    }

    /// Snapshot of active calls, for an operator surface (§4.7, §6).
    pub fn list(&self) -> Vec<Call> {
        self.slots.lock().values().map(|s| s.call.clone()).collect()
    }

    /// Signals cancellation to every call older than `older_than`, without
    /// removing their slots — release happens when the orchestrator
    /// acknowledges termination via `release` (§4.7). Returns the ids
    /// signalled. A second call with the same threshold signals nothing new
    /// for already-cancelled entries (idempotent, §8).
    pub fn reap_stale(&self, older_than: Duration) -> Vec<String> {
        let now = Utc::now();
        let slots = self.slots.lock();
        let mut reaped = Vec::new();
        for (call_id, slot) in slots.iter() {
            let age = now - slot.call.started_at;
            if age.to_std().unwrap_or(Duration::ZERO) > older_than && !*slot.cancel_tx.borrow() {
                let _ = slot.cancel_tx.send(true);
                reaped.push(call_id.clone());
            }
        }
        reaped
    }

    /// Spawns the periodic reaper named in §4.7 ("a background task invokes
    /// `reapStale` on a fixed interval for the lifetime of the process").
    pub fn spawn_reaper(
        self: &Arc<Self>,
        interval: Duration,
        stale_after: Duration,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let reaped = registry.reap_stale(stale_after);
                if !reaped.is_empty() {
                    tracing::info!(count = reaped.len(), "reaped stale calls");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_refuses_past_capacity() {
        let registry = CallRegistry::new(2);
        registry.admit("c1", "+1", None).unwrap();
        registry.admit("c2", "+2", None).unwrap();
        let err = registry.admit("c3", "+3", None).unwrap_err();
        assert!(matches!(err, Error::AtCapacity));
    }

    #[test]
    fn release_frees_a_slot() {
        let registry = CallRegistry::new(1);
        registry.admit("c1", "+1", None).unwrap();
        registry.release("c1", CallStatus::Completed);
        assert_eq!(registry.active_count(), 0);
        registry.admit("c2", "+2", None).unwrap();
    }

    #[test]
    fn release_is_idempotent() {
        let registry = CallRegistry::new(1);
        registry.admit("c1", "+1", None).unwrap();
        registry.release("c1", CallStatus::Completed);
        registry.release("c1", CallStatus::Completed);
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn reap_stale_signals_cancellation_and_is_idempotent() {
        let registry = CallRegistry::new(4);
        let mut handle = registry.admit("c1", "+1", None).unwrap();
        assert!(!handle.is_cancelled());

        let reaped_first = registry.reap_stale(Duration::from_secs(0));
        assert_eq!(reaped_first, vec!["c1".to_string()]);
        handle.cancelled().await;
        assert!(handle.is_cancelled());

        let reaped_second = registry.reap_stale(Duration::from_secs(0));
        assert!(reaped_second.is_empty());
    }

    #[test]
    fn list_reflects_active_calls() {
        let registry = CallRegistry::new(4);
        registry.admit("c1", "+1", None).unwrap();
        let list = registry.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].call_id, "c1");
    }
}
