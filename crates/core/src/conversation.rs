//! Call and conversation data model (SPEC_FULL §3).

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// The nine dialogue states of SPEC_FULL §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DialogueState {
    #[default]
    Idle,
    Greeting,
    Collecting,
    Clarifying,
    Confirming,
    Processing,
    Completed,
    Error,
    Transferring,
}

fn state_label(state: DialogueState) -> &'static str {
    match state {
        DialogueState::Idle => "idle",
        DialogueState::Greeting => "greeting",
        DialogueState::Collecting => "collecting",
        DialogueState::Clarifying => "clarifying",
        DialogueState::Confirming => "confirming",
        DialogueState::Processing => "processing",
        DialogueState::Completed => "completed",
        DialogueState::Error => "error",
        DialogueState::Transferring => "transferring",
    }
}

static STATE_TRANSITIONS: Lazy<HashMap<DialogueState, &'static [DialogueState]>> = Lazy::new(|| {
    use DialogueState::*;
    let mut map = HashMap::new();
    map.insert(Idle, &[Greeting] as &[_]);
    map.insert(Greeting, &[Collecting, Error] as &[_]);
    map.insert(
        Collecting,
        &[Collecting, Clarifying, Confirming, Error, Transferring] as &[_],
    );
    map.insert(Clarifying, &[Collecting, Confirming, Transferring] as &[_]);
    map.insert(Confirming, &[Processing, Collecting, Error] as &[_]);
    map.insert(Processing, &[Completed, Error] as &[_]);
    map.insert(Completed, &[] as &[_]);
    map.insert(Error, &[Transferring] as &[_]);
    map.insert(Transferring, &[] as &[_]);
    map
});

impl DialogueState {
    /// Allowed targets from this state, per the SPEC_FULL §4.8 transition table.
    pub fn allowed_transitions(&self) -> &'static [DialogueState] {
        STATE_TRANSITIONS.get(self).copied().unwrap_or(&[])
    }

    pub fn can_transition_to(&self, target: DialogueState) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DialogueState::Completed | DialogueState::Transferring)
    }
}

/// Lifecycle status of a Call, independent of its dialogue state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Timeout,
    Failed,
    Disconnected,
}

/// Unit of measure for an ordered product line, per SPEC_FULL §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Boxes,
    Units,
    Flacons,
    Tubes,
}

impl Default for Unit {
    fn default() -> Self {
        Unit::Boxes
    }
}

impl Unit {
    /// French display form, matching the original dialogue templates.
    pub fn display(&self) -> &'static str {
        match self {
            Unit::Boxes => "boîtes",
            Unit::Units => "unités",
            Unit::Flacons => "flacons",
            Unit::Tubes => "tubes",
        }
    }

    pub fn parse(s: &str) -> Unit {
        match s.to_lowercase().as_str() {
            "unit" | "units" | "unite" | "unités" | "unites" => Unit::Units,
            "flacon" | "flacons" => Unit::Flacons,
            "tube" | "tubes" => Unit::Tubes,
            _ => Unit::Boxes,
        }
    }
}

/// Line-item status after a stock check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Ok,
    OutOfStock,
}

/// A single confirmed (matched + stock-checked) line of the draft order.
///
/// Never mutated in place: edits produce a new item and the prior one is dropped
/// from the active list (SPEC_FULL §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDraftItem {
    pub product_key: String,
    pub display_name: String,
    pub quantity: u32,
    pub unit: Unit,
    pub unit_price: f64,
    pub match_score: f32,
    pub source_transcript: String,
    pub line_status: LineStatus,
}

impl OrderDraftItem {
    pub fn line_total(&self) -> f64 {
        self.unit_price * self.quantity as f64
    }
}

/// Speaker role of a dialogue turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub role: TurnRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Minimum cap for the turn ring, per SPEC_FULL §9 ("bounded structure... cap >= 8").
pub const MIN_TURN_RING_CAPACITY: usize = 8;

/// Per-call dialogue state, owned 1:1 by a Call and mutated only by its orchestrator
/// (single-writer discipline, SPEC_FULL §5).
#[derive(Debug, Clone)]
pub struct ConversationContext {
    pub state: DialogueState,
    pub items: Vec<OrderDraftItem>,
    turns: VecDeque<DialogueTurn>,
    turn_capacity: usize,
    pub attempts: u32,
    confidences: Vec<f32>,
    pub last_transcript: Option<String>,
    pub last_updated: DateTime<Utc>,
    /// Set by the orchestrator at context creation so the DialogueStateMachine
    /// can build an `OrderRequest` (§4.10) without its own call handle.
    pub call_id: String,
    pub tenant: Option<String>,
    /// Set once any extracted item comes back out-of-stock during the dialogue;
    /// drives the order-review trigger in §4.10 independent of what ends up in
    /// `items` (an out-of-stock line is never added to the confirmed draft).
    pub oos_flagged: bool,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::with_turn_capacity(MIN_TURN_RING_CAPACITY)
    }

    pub fn with_turn_capacity(turn_capacity: usize) -> Self {
        Self {
            state: DialogueState::Idle,
            items: Vec::new(),
            turns: VecDeque::with_capacity(turn_capacity.max(MIN_TURN_RING_CAPACITY)),
            turn_capacity: turn_capacity.max(MIN_TURN_RING_CAPACITY),
            attempts: 0,
            confidences: Vec::new(),
            last_transcript: None,
            last_updated: Utc::now(),
            call_id: String::new(),
            tenant: None,
            oos_flagged: false,
        }
    }

    /// Associate this context with its owning call (SPEC_FULL §4.9 step 2).
    pub fn set_call(&mut self, call_id: impl Into<String>, tenant: Option<String>) {
        self.call_id = call_id.into();
        self.tenant = tenant;
    }

    pub fn flag_out_of_stock(&mut self) {
        self.oos_flagged = true;
        self.last_updated = Utc::now();
    }

    /// Append a turn, dropping the oldest if the bounded ring is full.
    pub fn add_turn(&mut self, role: TurnRole, text: impl Into<String>) {
        if self.turns.len() >= self.turn_capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(DialogueTurn {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        });
        self.last_updated = Utc::now();
    }

    pub fn turns(&self) -> impl Iterator<Item = &DialogueTurn> {
        self.turns.iter()
    }

    /// Last `n` turns, oldest first — used as the LLMExtractor's `recentTurns` argument.
    pub fn recent_turns(&self, n: usize) -> Vec<DialogueTurn> {
        let len = self.turns.len();
        let skip = len.saturating_sub(n);
        self.turns.iter().skip(skip).cloned().collect()
    }

    /// Record a measured confidence (not a machine-injected floor, per §4.8's numeric
    /// semantics note).
    pub fn record_confidence(&mut self, confidence: f32) {
        self.confidences.push(confidence);
        self.attempts_monotonic_guard();
    }

    fn attempts_monotonic_guard(&mut self) {
        // Invariant I4: attempts is monotonically non-decreasing; nothing here ever
        // decrements it.
    }

    pub fn increment_attempts(&mut self) {
        self.attempts += 1;
    }

    /// Arithmetic mean of measured confidences; an empty sequence yields 0.0 and thus
    /// never escalates (SPEC_FULL §4.8/§8).
    pub fn average_confidence(&self) -> f32 {
        if self.confidences.is_empty() {
            return 0.0;
        }
        self.confidences.iter().sum::<f32>() / self.confidences.len() as f32
    }

    pub fn should_escalate(&self) -> bool {
        let avg = self.average_confidence();
        self.attempts >= 3 || (avg > 0.0 && avg < 0.70)
    }

    /// Attempt a transition; disallowed targets are a logged no-op (SPEC_FULL §4.8).
    pub fn transition(&mut self, target: DialogueState) -> bool {
        if self.state.can_transition_to(target) {
            tracing::debug!(from = ?self.state, to = ?target, "dialogue state transition");
            metrics::counter!(
                "voice_agent_state_transitions_total",
                "from" => state_label(self.state),
                "to" => state_label(target)
            )
            .increment(1);
            self.state = target;
            self.last_updated = Utc::now();
            true
        } else {
            tracing::warn!(from = ?self.state, to = ?target, "rejected invalid dialogue transition");
            false
        }
    }

    pub fn add_item(&mut self, item: OrderDraftItem) {
        self.items.push(item);
        self.last_updated = Utc::now();
    }

    pub fn any_out_of_stock(&self) -> bool {
        self.items.iter().any(|i| i.line_status == LineStatus::OutOfStock)
    }

    pub fn total_amount(&self) -> f64 {
        self.items.iter().map(|i| i.line_total()).sum()
    }
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A telephone call, identified by an opaque callId (SPEC_FULL §3).
#[derive(Debug, Clone)]
pub struct Call {
    pub call_id: String,
    pub phone: String,
    pub tenant: Option<String>,
    pub status: CallStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Call {
    pub fn new(call_id: impl Into<String>, phone: impl Into<String>, tenant: Option<String>) -> Self {
        Self {
            call_id: call_id.into(),
            phone: phone.into(),
            tenant,
            status: CallStatus::Pending,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }

    pub fn end(&mut self, status: CallStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }
}
