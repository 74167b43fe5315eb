//! Entity extraction
//!
//! Deterministic helpers that fill in parameters the classifier does not
//! reliably supply. None of these fail: a missing match yields a fixed default.

use crate::models::Params;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

/// Ticker returned when no known stock keyword appears in the text
pub const DEFAULT_STOCK: &str = "RELIANCE";

/// Known stock keywords, checked in this order
const STOCK_KEYWORDS: &[&str] = &[
    "reliance", "tata", "infy", "infosys", "tcs", "hdfc", "sbin", "icici", "axis", "bajfinance",
    "kotak",
];

/// Keywords whose ticker differs from their upper-cased form
const STOCK_SYNONYMS: &[(&str, &str)] = &[("infy", "INFY"), ("infosys", "INFY")];

const MONTH_NAMES: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

lazy_static! {
    // ASCII only; `\d` would also match other scripts' digits
    static ref DIGIT_RUN: Regex = Regex::new(r"[0-9]{3,}").expect("static regex");
    static ref ISO_DATE: Regex = Regex::new(r"\b[0-9]{4}-[0-9]{2}-[0-9]{2}\b").expect("static regex");
}

/// Lower-cased alphanumeric words of `text`
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Resolve a stock ticker from free text.
///
/// The first of [`STOCK_KEYWORDS`] (in list order) found anywhere in the
/// lower-cased text wins, so exchange symbols like `HDFCBANK` resolve too.
/// Always returns a ticker; falls back to [`DEFAULT_STOCK`].
pub fn extract_stock_symbol(text: &str) -> String {
    let lowered = text.to_lowercase();

    STOCK_KEYWORDS
        .iter()
        .find(|kw| lowered.contains(**kw))
        .map(|kw| {
            STOCK_SYNONYMS
                .iter()
                .find(|(from, _)| from == kw)
                .map(|(_, to)| to.to_string())
                .unwrap_or_else(|| kw.to_uppercase())
        })
        .unwrap_or_else(|| DEFAULT_STOCK.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpenseEstimate {
    /// 0 when nothing was found
    pub expenses: i64,
    pub amount: Option<f64>,
}

/// First run of three or more digits, read as both an integer and a float
pub fn extract_expenses(text: &str) -> ExpenseEstimate {
    DIGIT_RUN
        .find(text)
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .map(|n| ExpenseEstimate {
            expenses: n,
            amount: Some(n as f64),
        })
        .unwrap_or(ExpenseEstimate {
            expenses: 0,
            amount: None,
        })
}

/// Parse a time period (`YYYY-MM`) relative to `today`.
///
/// Explicit month names win over "this month" / "next month".
pub fn extract_time_period(text: &str, today: NaiveDate) -> Option<String> {
    let tokens = words(text);

    if let Some(idx) = MONTH_NAMES
        .iter()
        .position(|m| tokens.iter().any(|t| t == m))
    {
        return Some(format!("{}-{:02}", today.year(), idx + 1));
    }

    let lowered = text.to_lowercase();
    let first_of_month = today.with_day(1).unwrap_or(today);

    if lowered.contains("this month") {
        return Some(first_of_month.format("%Y-%m").to_string());
    }

    if lowered.contains("next month") {
        // 32 days past the 1st always lands inside the following month
        let next = first_of_month + Duration::days(32);
        return Some(next.format("%Y-%m").to_string());
    }

    None
}

/// [`extract_time_period`] against today's UTC date, the same calendar the
/// ledger and compliance limits use
pub fn extract_time_period_now(text: &str) -> Option<String> {
    extract_time_period(text, Utc::now().date_naive())
}

/// Current `YYYY-MM` (UTC)
pub fn current_period() -> String {
    Utc::now().format("%Y-%m").to_string()
}

/// First valid `YYYY-MM-DD` date in the text
pub fn extract_date(text: &str) -> Option<NaiveDate> {
    ISO_DATE
        .find_iter(text)
        .find_map(|m| NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok())
}

/// Add intent-specific entities to `params`
pub fn enrich_params(intent: &str, text: &str, params: &mut Params) {
    match intent {
        "stock_pnl" => {
            params.insert("stock".to_string(), json!(extract_stock_symbol(text)));
        }
        "portfolio_optimize" => {
            let estimate = extract_expenses(text);
            params.insert("expenses".to_string(), json!(estimate.expenses));
            params.insert(
                "amount".to_string(),
                estimate.amount.map(Value::from).unwrap_or(Value::Null),
            );
        }
        "update_transaction" | "delete_transaction" if !params.contains_key("date") => {
            if let Some(date) = extract_date(text) {
                params.insert("date".to_string(), json!(date.to_string()));
            }
        }
        _ => {}
    }
}
