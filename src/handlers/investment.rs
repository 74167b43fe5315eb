//! Investment handler
//!
//! `portfolio_value` and `stock_pnl` are computed from holdings. The advisory
//! intents hand a filled prompt template plus holdings context to the model.

use super::{unsupported, IntentHandler};
use crate::error::OrchestrationError;
use crate::extraction::DEFAULT_STOCK;
use crate::generation::{GenerationRequest, LanguageModel};
use crate::models::{HandlerOutcome, Params, RequestState};
use crate::portfolio::{portfolio_summary, risk_profile, stock_pnl, HoldingsSource};
use crate::router::HandlerId;
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Advisory prompt templates. `{name}` is replaced by the param `name`.
const PROMPT_TEMPLATES: &[(&str, &str)] = &[
    (
        "portfolio_optimize",
        "Suggest how to optimize the portfolio to save for a goal worth {expenses}.",
    ),
    (
        "portfolio_strategy",
        "Suggest a strategy to maximize returns for the current portfolio.",
    ),
    (
        "portfolio_advice",
        "Provide one actionable investment advice for the portfolio.",
    ),
    (
        "portfolio_rebalancing",
        "How should the portfolio be rebalanced to reduce risk?",
    ),
    (
        "portfolio_review",
        "Summarize the strengths and weaknesses of the portfolio.",
    ),
];

/// Intents whose prompt also carries the risk profile
const RISK_AWARE: &[&str] = &["portfolio_rebalancing", "portfolio_review"];

fn template_for(intent: &str) -> Option<&'static str> {
    PROMPT_TEMPLATES
        .iter()
        .find(|(name, _)| *name == intent)
        .map(|(_, template)| *template)
}

/// Substitute `{key}` placeholders; null or missing params become "unknown"
pub fn fill_template(template: &str, params: &Params) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);

        match params.get(&rest[start + 1..start + len]) {
            Some(Value::String(s)) => out.push_str(s),
            Some(Value::Null) | None => out.push_str("unknown"),
            Some(other) => out.push_str(&other.to_string()),
        }

        rest = &rest[start + len + 1..];
    }

    out.push_str(rest);
    out
}

pub struct InvestmentHandler {
    holdings: Arc<dyn HoldingsSource>,
    model: Arc<dyn LanguageModel>,
}

impl InvestmentHandler {
    pub fn new(holdings: Arc<dyn HoldingsSource>, model: Arc<dyn LanguageModel>) -> Self {
        Self { holdings, model }
    }

    async fn portfolio_value(&self, state: &RequestState) -> Result<Value> {
        let holdings = self.holdings.holdings(state.user_id).await?;
        let summary = portfolio_summary(&holdings);

        Ok(json!({
            "status": "success",
            "summary": summary,
            "message": format!(
                "Your portfolio is worth ₹{} against a cost of ₹{} ({}% returns).",
                summary.total_current_value, summary.total_cost, summary.returns_percent
            ),
        }))
    }

    async fn stock_pnl(&self, state: &RequestState) -> Result<Value> {
        let symbol = state.param_str("stock").unwrap_or(DEFAULT_STOCK);
        let holdings = self.holdings.holdings(state.user_id).await?;

        let pnl = stock_pnl(&holdings, symbol).ok_or_else(|| {
            OrchestrationError::NotFound(format!("{} is not in your portfolio", symbol))
        })?;

        Ok(json!({
            "status": "success",
            "pnl": pnl,
            "message": format!(
                "{}: P&L of ₹{} ({}%) on {} shares.",
                pnl.symbol, pnl.pnl, pnl.pnl_percent, pnl.quantity
            ),
        }))
    }

    async fn advise(&self, state: &RequestState, template: &str) -> Result<Value> {
        let holdings = self.holdings.holdings(state.user_id).await?;
        let question = fill_template(template, &state.params);

        let mut context = json!({
            "holdings": holdings,
            "summary": portfolio_summary(&holdings),
        });

        if RISK_AWARE.contains(&state.intent.as_str()) {
            let history = self.holdings.value_history(state.user_id).await?;
            context["risk_profile"] = json!(risk_profile(&holdings, &history));
        }

        let prompt = format!(
            "You are a careful personal finance assistant for an Indian retail investor.\n\
             Answer using only the portfolio data below. Do not invent numbers.\n\n\
             Portfolio data:\n{}\n\n\
             User request: {}\n\n\
             Question: {}",
            serde_json::to_string_pretty(&context)?,
            state.raw_input,
            question
        );

        debug!(intent = %state.intent, prompt_len = prompt.len(), "Requesting portfolio advice");

        let advice = self.model.generate(GenerationRequest::text(prompt)).await?;

        info!(intent = %state.intent, "Portfolio advice generated");

        Ok(json!({
            "status": "success",
            "question": question,
            "advice": advice.trim(),
        }))
    }
}

#[async_trait]
impl IntentHandler for InvestmentHandler {
    fn id(&self) -> HandlerId {
        HandlerId::Investment
    }

    async fn handle(&self, state: &RequestState) -> HandlerOutcome {
        match state.intent.as_str() {
            "portfolio_value" => self.portfolio_value(state).await.into(),
            "stock_pnl" => self.stock_pnl(state).await.into(),
            other => match template_for(other) {
                Some(template) => self.advise(state, template).await.into(),
                None => unsupported(self.id(), other),
            },
        }
    }
}
