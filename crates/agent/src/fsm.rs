//! `DialogueStateMachine`: the per-utterance handler named in SPEC_FULL §4.8.
//!
//! Wired with concrete `LlmExtractor`/`CatalogIndex`/`StockService`/`OrderSink`
//! instances at construction time, per the capability-trait composition the
//! core crate's `DialogueFsm` doc comment describes. No branch here performs
//! raw I/O beyond awaiting those four collaborators.

use std::sync::Arc;

use async_trait::async_trait;

use voice_agent_config::{CatalogThresholds, DialogueThresholds};
use voice_agent_core::{
    CatalogIndex, ConversationContext, DialogueEffect, DialogueEvent, DialogueFsm, DialogueState,
    FsmError, LineStatus, LlmExtractor, OrderDraftItem, OrderRequest, OrderSink, StockService,
    TurnRole, Unit,
};

const FINALIZE_KEYWORDS: &[&str] =
    &["that's all", "i confirm", "i validate", "that's good", "finished", "done"];
const AFFIRMATIVE_KEYWORDS: &[&str] = &["yes", "ok", "validate", "confirm", "agreed"];
const ADDITIVE_KEYWORDS: &[&str] = &["add", "also", "again", "more"];

fn matches_any(text: &str, keywords: &[&str]) -> bool {
    let lower = text.to_lowercase();
    keywords.iter().any(|k| lower.contains(k))
}

pub struct DialogueStateMachine {
    extractor: Arc<dyn LlmExtractor>,
    catalog: Arc<dyn CatalogIndex>,
    stock: Arc<dyn StockService>,
    order_sink: Arc<dyn OrderSink>,
    dialogue: DialogueThresholds,
    catalog_thresholds: CatalogThresholds,
}

impl DialogueStateMachine {
    pub fn new(
        extractor: Arc<dyn LlmExtractor>,
        catalog: Arc<dyn CatalogIndex>,
        stock: Arc<dyn StockService>,
        order_sink: Arc<dyn OrderSink>,
        dialogue: DialogueThresholds,
        catalog_thresholds: CatalogThresholds,
    ) -> Self {
        Self {
            extractor,
            catalog,
            stock,
            order_sink,
            dialogue,
            catalog_thresholds,
        }
    }

    /// Orchestrator-driven entry for the one transition this machine never
    /// reaches via a transcript event: `Idle -> Greeting` at call start (§4.9
    /// step 3).
    pub fn greet(&self, ctx: &mut ConversationContext) -> DialogueEffect {
        ctx.transition(DialogueState::Greeting);
        let utterance = "Hello, what would you like to order today?".to_string();
        ctx.add_turn(TurnRole::Assistant, utterance.clone());
        DialogueEffect::UtteranceEmitted(utterance)
    }

    fn should_escalate(&self, ctx: &ConversationContext) -> bool {
        let avg = ctx.average_confidence();
        ctx.attempts >= self.dialogue.escalation_attempts_ceiling
            || (avg > 0.0 && avg < self.dialogue.escalation_confidence_upper)
    }

    fn escalate(&self, ctx: &mut ConversationContext) -> Vec<DialogueEffect> {
        metrics::counter!("voice_agent_escalations_total").increment(1);
        ctx.transition(DialogueState::Transferring);
        let utterance =
            "I'm having trouble understanding. Let me transfer you to someone who can help."
                .to_string();
        ctx.add_turn(TurnRole::Assistant, utterance.clone());
        vec![
            DialogueEffect::TransferRequested {
                reason: "escalation: low confidence or too many attempts".to_string(),
            },
            DialogueEffect::UtteranceEmitted(utterance),
        ]
    }

    async fn run_collecting(
        &self,
        ctx: &mut ConversationContext,
        text: &str,
        confidence: f32,
    ) -> Result<Vec<DialogueEffect>, FsmError> {
        if matches_any(text, FINALIZE_KEYWORDS) {
            ctx.transition(DialogueState::Confirming);
            let items_str = ctx
                .items
                .iter()
                .filter(|i| i.line_status == LineStatus::Ok)
                .map(|i| format!("{} {} of {}", i.quantity, i.unit.display(), i.display_name))
                .collect::<Vec<_>>()
                .join(", ");
            let recap = if items_str.is_empty() {
                "Shall I confirm?".to_string()
            } else {
                format!("{items_str}. Shall I confirm?")
            };
            ctx.add_turn(TurnRole::Assistant, recap.clone());
            return Ok(vec![DialogueEffect::UtteranceEmitted(recap)]);
        }

        if confidence < self.dialogue.low_confidence_threshold {
            ctx.increment_attempts();
            if self.should_escalate(ctx) {
                return Ok(self.escalate(ctx));
            }
            ctx.transition(DialogueState::Clarifying);
            let prompt = "Sorry, I didn't quite catch that. Could you repeat that?".to_string();
            ctx.add_turn(TurnRole::Assistant, prompt.clone());
            return Ok(vec![DialogueEffect::UtteranceEmitted(prompt)]);
        }

        let recent = ctx.recent_turns(5);
        let extract_started = std::time::Instant::now();
        let extraction = self.extractor.extract(text, &recent).await?;
        metrics::histogram!("voice_agent_llm_extract_seconds").record(extract_started.elapsed().as_secs_f64());

        let mut fragments = Vec::with_capacity(extraction.items.len());
        for item in &extraction.items {
            if item.quantity < self.dialogue.min_quantity || item.quantity > self.dialogue.max_quantity {
                fragments.push(format!("I couldn't find {}.", item.name));
                continue;
            }

            let catalog_started = std::time::Instant::now();
            let matches = self
                .catalog
                .search(&item.name, self.catalog_thresholds.search_k, self.catalog_thresholds.min_score)
                .await?;
            metrics::histogram!("voice_agent_catalog_search_seconds").record(catalog_started.elapsed().as_secs_f64());
            let Some(top) = matches.into_iter().next() else {
                fragments.push(format!("I couldn't find {}.", item.name));
                continue;
            };

            let qty = item.quantity as u32;
            let stock_started = std::time::Instant::now();
            let available = self.stock.check_stock(&top.product.key, qty).await?;
            metrics::histogram!("voice_agent_stock_check_seconds").record(stock_started.elapsed().as_secs_f64());
            if !available {
                ctx.flag_out_of_stock();
                fragments.push(format!("Sorry, {} is out of stock.", top.product.display_name));
                continue;
            }

            let draft = OrderDraftItem {
                product_key: top.product.key.clone(),
                display_name: top.product.display_name.clone(),
                quantity: qty,
                unit: Unit::parse(&item.unit),
                unit_price: top.product.unit_price,
                match_score: top.score,
                source_transcript: text.to_string(),
                line_status: LineStatus::Ok,
            };
            fragments.push(format!(
                "Noted, {} {} of {}.",
                draft.quantity,
                draft.unit.display(),
                draft.display_name
            ));
            ctx.add_item(draft);
        }

        let utterance = if fragments.is_empty() {
            "I didn't catch the product. Can you repeat that?".to_string()
        } else {
            fragments.join(" ")
        };
        ctx.add_turn(TurnRole::Assistant, utterance.clone());
        Ok(vec![DialogueEffect::UtteranceEmitted(utterance)])
    }

    async fn run_confirming(
        &self,
        ctx: &mut ConversationContext,
        text: &str,
    ) -> Result<Vec<DialogueEffect>, FsmError> {
        // Affirmative and additive sets are disjoint by design; if text somehow
        // matches both, affirmative wins (§4.8 tie-break).
        if matches_any(text, AFFIRMATIVE_KEYWORDS) {
            ctx.transition(DialogueState::Processing);
            let request = OrderRequest {
                call_id: ctx.call_id.clone(),
                tenant: ctx.tenant.clone(),
                items: ctx.items.clone(),
                average_confidence: ctx.average_confidence(),
                any_out_of_stock: ctx.oos_flagged,
            };
            let order_started = std::time::Instant::now();
            let order_result = self.order_sink.create(request).await;
            metrics::histogram!("voice_agent_order_sink_seconds").record(order_started.elapsed().as_secs_f64());
            return Ok(match order_result {
                Ok(result) => {
                    ctx.transition(DialogueState::Completed);
                    let utterance = format!(
                        "Your order {} has been confirmed. Thank you!",
                        result.order_id
                    );
                    ctx.add_turn(TurnRole::Assistant, utterance.clone());
                    vec![
                        DialogueEffect::OrderCreated {
                            order_id: result.order_id,
                            requires_human_review: result.requires_human_review,
                        },
                        DialogueEffect::UtteranceEmitted(utterance),
                    ]
                }
                Err(e) => {
                    ctx.transition(DialogueState::Error);
                    let utterance =
                        "Sorry, I ran into a technical problem processing your order."
                            .to_string();
                    ctx.add_turn(TurnRole::Assistant, utterance.clone());
                    vec![
                        DialogueEffect::OrderFailed { reason: e.to_string() },
                        DialogueEffect::UtteranceEmitted(utterance),
                    ]
                }
            });
        }

        if matches_any(text, ADDITIVE_KEYWORDS) {
            ctx.transition(DialogueState::Collecting);
            return self.run_collecting(ctx, text, self.dialogue.additive_floor).await;
        }

        ctx.transition(DialogueState::Collecting);
        let prompt = "What would you like to change?".to_string();
        ctx.add_turn(TurnRole::Assistant, prompt.clone());
        Ok(vec![DialogueEffect::UtteranceEmitted(prompt)])
    }
}

#[async_trait]
impl DialogueFsm for DialogueStateMachine {
    async fn handle(
        &self,
        context: &mut ConversationContext,
        event: DialogueEvent,
    ) -> Result<Vec<DialogueEffect>, FsmError> {
        let DialogueEvent::FinalTranscript { text, confidence } = event;

        // Step 1: normalization.
        context.add_turn(TurnRole::User, text.clone());
        context.record_confidence(confidence);
        context.last_transcript = Some(text.clone());

        // Step 2: escalation check.
        if self.should_escalate(context) {
            return Ok(self.escalate(context));
        }

        // Step 3: state dispatch.
        match context.state {
            DialogueState::Greeting => {
                context.transition(DialogueState::Collecting);
                self.run_collecting(context, &text, self.dialogue.greeting_floor).await
            }
            DialogueState::Collecting => self.run_collecting(context, &text, confidence).await,
            DialogueState::Clarifying => {
                context.transition(DialogueState::Collecting);
                self.run_collecting(context, &text, self.dialogue.clarifying_floor).await
            }
            DialogueState::Confirming => self.run_confirming(context, &text).await,
            other => {
                tracing::warn!(state = ?other, "final transcript received in a state that does not accept one");
                Ok(vec![])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use voice_agent_core::{
        CatalogMatch, DialogueTurn, Error, ExtractedItem, ExtractionResult, OrderResult,
        ProductRecord, Result,
    };

    struct FakeExtractor {
        items: Vec<ExtractedItem>,
    }

    #[async_trait]
    impl LlmExtractor for FakeExtractor {
        async fn extract(&self, _text: &str, _turns: &[DialogueTurn]) -> Result<ExtractionResult> {
            Ok(ExtractionResult { items: self.items.clone() })
        }
    }

    struct FakeCatalog {
        hit: Option<(String, String, f64, f32)>,
    }

    #[async_trait]
    impl CatalogIndex for FakeCatalog {
        async fn search(&self, _query: &str, _k: usize, _min_score: f32) -> Result<Vec<CatalogMatch>> {
            Ok(match &self.hit {
                Some((key, name, price, score)) => vec![CatalogMatch {
                    product: ProductRecord {
                        key: key.clone(),
                        display_name: name.clone(),
                        category: "meds".to_string(),
                        unit_price: *price,
                        metadata: serde_json::json!({}),
                    },
                    score: *score,
                }],
                None => vec![],
            })
        }
    }

    struct FakeStock {
        available: bool,
    }

    #[async_trait]
    impl StockService for FakeStock {
        async fn check_stock(&self, _key: &str, _qty: u32) -> Result<bool> {
            Ok(self.available)
        }
        async fn reserve(&self, _key: &str, _qty: u32) -> Result<()> {
            Ok(())
        }
        async fn release(&self, _key: &str, _qty: u32) -> Result<()> {
            Ok(())
        }
    }

    struct FakeOrderSink {
        fail: bool,
    }

    #[async_trait]
    impl OrderSink for FakeOrderSink {
        async fn create(&self, _request: OrderRequest) -> Result<OrderResult> {
            if self.fail {
                Err(Error::Internal("sink down".to_string()))
            } else {
                Ok(OrderResult {
                    order_id: "CMD-1".to_string(),
                    requires_human_review: false,
                    review_reason: None,
                })
            }
        }
    }

    fn machine(
        items: Vec<ExtractedItem>,
        hit: Option<(String, String, f64, f32)>,
        in_stock: bool,
        sink_fails: bool,
    ) -> DialogueStateMachine {
        DialogueStateMachine::new(
            Arc::new(FakeExtractor { items }),
            Arc::new(FakeCatalog { hit }),
            Arc::new(FakeStock { available: in_stock }),
            Arc::new(FakeOrderSink { fail: sink_fails }),
            DialogueThresholds::default(),
            CatalogThresholds::default(),
        )
    }

    #[tokio::test]
    async fn happy_path_collects_confirms_and_completes() {
        let machine = machine(
            vec![ExtractedItem { name: "Doliprane 1000".to_string(), quantity: 10, unit: "boxes".to_string() }],
            Some(("p1".to_string(), "Doliprane 1000mg".to_string(), 5.5, 0.88)),
            true,
            false,
        );
        let mut ctx = ConversationContext::new();
        ctx.set_call("C1", Some("tenant-a".to_string()));
        machine.greet(&mut ctx);

        let effects = machine
            .handle(&mut ctx, DialogueEvent::FinalTranscript {
                text: "I'd like 10 boxes of Doliprane 1000".to_string(),
                confidence: 0.93,
            })
            .await
            .unwrap();
        assert_eq!(ctx.state, DialogueState::Collecting);
        assert!(matches!(effects[0], DialogueEffect::UtteranceEmitted(_)));
        assert_eq!(ctx.items.len(), 1);

        machine
            .handle(&mut ctx, DialogueEvent::FinalTranscript { text: "That's all".to_string(), confidence: 0.9 })
            .await
            .unwrap();
        assert_eq!(ctx.state, DialogueState::Confirming);

        let effects = machine
            .handle(&mut ctx, DialogueEvent::FinalTranscript { text: "Yes".to_string(), confidence: 0.9 })
            .await
            .unwrap();
        assert_eq!(ctx.state, DialogueState::Completed);
        assert!(matches!(effects[0], DialogueEffect::OrderCreated { requires_human_review: false, .. }));
    }

    #[tokio::test]
    async fn out_of_stock_item_is_flagged_and_excluded_from_items() {
        let machine = machine(
            vec![ExtractedItem { name: "Spasfon".to_string(), quantity: 5, unit: "boxes".to_string() }],
            Some(("p2".to_string(), "Spasfon".to_string(), 3.0, 0.8)),
            false,
            false,
        );
        let mut ctx = ConversationContext::new();
        machine.greet(&mut ctx);
        let effects = machine
            .handle(&mut ctx, DialogueEvent::FinalTranscript { text: "5 Spasfon please".to_string(), confidence: 0.9 })
            .await
            .unwrap();
        assert!(ctx.oos_flagged);
        assert!(ctx.items.is_empty());
        match &effects[0] {
            DialogueEffect::UtteranceEmitted(text) => assert!(text.contains("out of stock")),
            _ => panic!("expected an utterance"),
        }
    }

    #[tokio::test]
    async fn three_low_confidence_attempts_escalate() {
        let machine = machine(vec![], None, true, false);
        let mut ctx = ConversationContext::new();
        machine.greet(&mut ctx);
        ctx.transition(DialogueState::Collecting);

        for _ in 0..2 {
            machine
                .handle(&mut ctx, DialogueEvent::FinalTranscript { text: "mumble".to_string(), confidence: 0.5 })
                .await
                .unwrap();
        }
        assert_eq!(ctx.state, DialogueState::Clarifying);

        let effects = machine
            .handle(&mut ctx, DialogueEvent::FinalTranscript { text: "mumble".to_string(), confidence: 0.5 })
            .await
            .unwrap();
        assert_eq!(ctx.state, DialogueState::Transferring);
        assert!(matches!(effects[0], DialogueEffect::TransferRequested { .. }));
    }

    #[tokio::test]
    async fn quantity_out_of_bounds_is_treated_as_not_found() {
        let machine = machine(
            vec![ExtractedItem { name: "Doliprane".to_string(), quantity: 1001, unit: "boxes".to_string() }],
            Some(("p1".to_string(), "Doliprane".to_string(), 5.0, 0.9)),
            true,
            false,
        );
        let mut ctx = ConversationContext::new();
        machine.greet(&mut ctx);
        machine
            .handle(&mut ctx, DialogueEvent::FinalTranscript { text: "1001 boxes of Doliprane".to_string(), confidence: 0.9 })
            .await
            .unwrap();
        assert!(ctx.items.is_empty());
    }

    #[tokio::test]
    async fn finalize_keyword_wins_over_low_confidence() {
        let machine = machine(vec![], None, true, false);
        let mut ctx = ConversationContext::new();
        machine.greet(&mut ctx);
        ctx.transition(DialogueState::Collecting);
        machine
            .handle(&mut ctx, DialogueEvent::FinalTranscript { text: "that's all".to_string(), confidence: 0.2 })
            .await
            .unwrap();
        assert_eq!(ctx.state, DialogueState::Confirming);
    }

    #[tokio::test]
    async fn affirmative_wins_when_text_also_matches_additive() {
        let machine = machine(vec![], None, true, false);
        let mut ctx = ConversationContext::new();
        machine.greet(&mut ctx);
        ctx.transition(DialogueState::Confirming);
        // "yes, add" matches both affirmative ("yes") and additive ("add").
        let effects = machine
            .handle(&mut ctx, DialogueEvent::FinalTranscript { text: "yes, add".to_string(), confidence: 0.9 })
            .await
            .unwrap();
        assert!(matches!(effects[0], DialogueEffect::OrderCreated { .. }));
    }

    #[tokio::test]
    async fn order_sink_failure_transitions_to_error() {
        let machine = machine(vec![], None, true, true);
        let mut ctx = ConversationContext::new();
        machine.greet(&mut ctx);
        ctx.transition(DialogueState::Confirming);
        let effects = machine
            .handle(&mut ctx, DialogueEvent::FinalTranscript { text: "yes".to_string(), confidence: 0.9 })
            .await
            .unwrap();
        assert_eq!(ctx.state, DialogueState::Error);
        assert!(matches!(effects[0], DialogueEffect::OrderFailed { .. }));
    }
}
