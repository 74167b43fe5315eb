//! Request dispatcher - runs the routing pipeline
//!
//! INPUT → CLASSIFY → ENRICH → ROUTE → HANDLE → COMPLETE

use crate::classifier::IntentClassifier;
use crate::extraction::enrich_params;
use crate::handlers::HandlerRegistry;
use crate::models::{HandlerOutcome, RequestState};
use crate::router::{HandlerId, Router};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of the terminal unknown node
pub const FALLBACK_MESSAGE: &str = "Sorry, I didn't understand your request.";

fn fallback_outcome() -> HandlerOutcome {
    HandlerOutcome::result(FALLBACK_MESSAGE)
}

/// Sequences classifier, router and handlers for one utterance at a time.
/// Shared read-only across concurrent requests.
pub struct Dispatcher {
    classifier: IntentClassifier,
    router: Router,
    handlers: HandlerRegistry,
}

impl Dispatcher {
    pub fn new(classifier: IntentClassifier, router: Router, handlers: HandlerRegistry) -> Self {
        Self {
            classifier,
            router,
            handlers,
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Run the pipeline and return the final request state
    pub async fn run(&self, user_id: Uuid, text: &str) -> RequestState {
        let start_time = Instant::now();
        let mut state = RequestState::new(user_id, text);

        info!(
            request_id = %state.request_id,
            user_id = %user_id,
            "Dispatcher: request received"
        );

        // === CLASSIFY ===
        let classification = self.classifier.classify(text).await;
        state.intent = classification.intent;
        state.confidence = classification.confidence;
        state.params = classification.entities;

        // === ENRICH ===
        enrich_params(&state.intent, text, &mut state.params);

        // === ROUTE ===
        let handler_id = self.router.route(&state.intent);
        debug!(
            request_id = %state.request_id,
            intent = %state.intent,
            handler = %handler_id,
            "Routed request"
        );

        // === HANDLE ===
        let outcome = match handler_id {
            HandlerId::Unknown => fallback_outcome(),
            id => match self.handlers.get(id) {
                Some(handler) => handler.handle(&state).await,
                None => {
                    warn!(handler = %id, intent = %state.intent, "No handler registered - using unknown node");
                    fallback_outcome()
                }
            },
        };

        if let HandlerOutcome::Error(reason) = &outcome {
            warn!(request_id = %state.request_id, intent = %state.intent, %reason, "Handler returned an error");
        }

        info!(
            request_id = %state.request_id,
            intent = %state.intent,
            handler = %handler_id,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Dispatcher: request complete"
        );

        state.result = Some(outcome);
        state
    }

    /// Process on behalf of a specific user
    pub async fn process_for(&self, user_id: Uuid, text: &str) -> HandlerOutcome {
        self.run(user_id, text)
            .await
            .result
            .unwrap_or_else(fallback_outcome)
    }

    /// Process for the default (nil) user
    pub async fn process(&self, text: &str) -> HandlerOutcome {
        self.process_for(Uuid::nil(), text).await
    }
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifierPolicy;
    use crate::compliance::create_default_compliance_engine;
    use crate::generation::{LanguageModel, ScriptedModel};
    use crate::handlers::{
        BudgetHandler, InvestmentHandler, PaymentHandler, PendingOrderGateway, TransactionHandler,
    };
    use crate::portfolio::StaticHoldings;
    use crate::router::IntentRegistry;
    use crate::store::{FinanceStore, InMemoryFinanceStore};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    fn dispatcher(model: Arc<ScriptedModel>) -> Dispatcher {
        let llm: Arc<dyn LanguageModel> = model;
        let store: Arc<dyn FinanceStore> = Arc::new(InMemoryFinanceStore::new());
        let registry = Arc::new(IntentRegistry::default());

        let mut handlers = HandlerRegistry::new();
        handlers.register(Arc::new(BudgetHandler::new(store.clone())));
        handlers.register(Arc::new(PaymentHandler::new(
            store.clone(),
            create_default_compliance_engine(),
            Arc::new(PendingOrderGateway::default()),
        )));
        handlers.register(Arc::new(InvestmentHandler::new(
            Arc::new(StaticHoldings::demo()),
            llm.clone(),
        )));
        handlers.register(Arc::new(TransactionHandler::new(store)));

        let policy = ClassifierPolicy {
            timeout: Duration::from_millis(50),
            ..ClassifierPolicy::default()
        };

        Dispatcher::new(
            IntentClassifier::new(llm, registry, policy),
            Router::default(),
            handlers,
        )
    }

    fn reply(intent: &str, amount: Value, payee: Value) -> String {
        json!({
            "intent": intent,
            "amount": amount,
            "payee": payee,
            "category": null,
            "confidence": 0.95,
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_empty_input_is_fallback() {
        let model = Arc::new(ScriptedModel::always(reply("send_money", json!(1), json!("x"))));
        let dispatcher = dispatcher(model.clone());

        assert_eq!(dispatcher.process("   ").await, fallback_outcome());
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_model_failure_is_fallback() {
        let dispatcher = dispatcher(Arc::new(ScriptedModel::failing()));

        let state = dispatcher.run(Uuid::nil(), "gibberish").await;
        assert_eq!(state.intent, "unknown");
        assert_eq!(state.confidence, 0.0);
        assert_eq!(state.result, Some(fallback_outcome()));
    }

    #[tokio::test]
    async fn test_timeout_is_fallback() {
        let model = ScriptedModel::always(reply("send_money", json!(300), json!("Priya")))
            .with_delay(Duration::from_millis(500));
        let dispatcher = dispatcher(Arc::new(model));

        assert_eq!(dispatcher.process("send 300 to Priya").await, fallback_outcome());
    }

    #[tokio::test]
    async fn test_send_money_reaches_payment() {
        let model = ScriptedModel::always(reply("send_money", json!(300), json!("Priya")));
        let dispatcher = dispatcher(Arc::new(model));

        let state = dispatcher.run(Uuid::nil(), "send 300 to Priya").await;
        assert_eq!(state.intent, "send_money");
        assert_eq!(dispatcher.router().route(&state.intent), HandlerId::Payment);

        let outcome = state.result.unwrap();
        let value = outcome.value().expect("payment result");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["amount"], 30000);
    }

    #[tokio::test]
    async fn test_stock_pnl_default_ticker() {
        let model = ScriptedModel::always(reply("stock_pnl", Value::Null, Value::Null));
        let dispatcher = dispatcher(Arc::new(model));

        let state = dispatcher.run(Uuid::nil(), "how are my shares doing").await;
        assert_eq!(state.params["stock"], "RELIANCE");
        assert_eq!(
            state.result.unwrap().value().unwrap()["pnl"]["symbol"],
            "RELIANCE"
        );
    }

    #[tokio::test]
    async fn test_handler_error_is_surfaced() {
        let model = ScriptedModel::always(reply("send_money", json!(5000), json!("Priya")));
        let dispatcher = dispatcher(Arc::new(model));

        match dispatcher.process("send 5000 to Priya").await {
            HandlerOutcome::Error(reason) => assert!(reason.contains("AMOUNT_TOO_HIGH")),
            other => panic!("expected error outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invented_intent_routes_to_unknown() {
        let model = ScriptedModel::always(reply("buy_pizza", Value::Null, Value::Null));
        let dispatcher = dispatcher(Arc::new(model));

        let state = dispatcher.run(Uuid::nil(), "order pizza").await;
        assert_eq!(state.intent, "buy_pizza");
        assert_eq!(state.result, Some(fallback_outcome()));
    }

    #[tokio::test]
    async fn test_missing_handler_uses_unknown_node() {
        let model = Arc::new(ScriptedModel::always(reply("get_budgets", Value::Null, Value::Null)));
        let llm: Arc<dyn LanguageModel> = model;
        let dispatcher = Dispatcher::new(
            IntentClassifier::new(
                llm,
                Arc::new(IntentRegistry::default()),
                ClassifierPolicy::default(),
            ),
            Router::default(),
            HandlerRegistry::new(),
        );

        assert_eq!(dispatcher.process("show budgets").await, fallback_outcome());
    }
}
