//! Call registry, dialogue state machine and per-call orchestrator (C8, C9, C10).
//!
//! This crate wires the capability traits defined in `voice-agent-core`
//! (implemented by `voice-agent-pipeline`, `voice-agent-catalog`,
//! `voice-agent-llm`, and the persistence crate's `OrderSink`) into the
//! call lifecycle described in SPEC_FULL §4.7-§4.10.

pub mod fsm;
pub mod orchestrator;
pub mod registry;

pub use fsm::DialogueStateMachine;
pub use orchestrator::{CallOrchestrator, TerminationReason};
pub use registry::{CallHandle, CallRegistry};
