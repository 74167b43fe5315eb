//! Payment compliance engine
//!
//! Rules-based checks run before any payment leaves the system.
//! Deterministic; the first failing rule decides.

use crate::models::{Transaction, TransactionType};
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const MAX_TRANSACTION_AMOUNT: f64 = 1000.0;
pub const MAX_DAILY_LIMIT: f64 = 2000.0;
pub const MAX_MONTHLY_LIMIT: f64 = 10000.0;
pub const RAPID_TXN_LIMIT: usize = 5;
pub const RAPID_TXN_WINDOW_MINUTES: i64 = 2;

const SUSPICIOUS_KEYWORDS: &[&str] = &[
    "betting",
    "gambling",
    "crypto scam",
    "hack",
    "fraud",
    "darkweb",
    "adult services",
];

/// A payment about to be made
#[derive(Debug, Clone)]
pub struct PaymentRequest<'a> {
    pub amount: f64,
    pub payee: &'a str,
    pub recent_transactions: &'a [Transaction],
    pub now: DateTime<Utc>,
}

/// Money that left the account
fn outgoing(transactions: &[Transaction]) -> impl Iterator<Item = &Transaction> {
    transactions
        .iter()
        .filter(|t| t.kind == TransactionType::Expense)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ComplianceDecision {
    Approved,
    Rejected { reason: String, message: String },
}

impl ComplianceDecision {
    fn reject(reason: &str, message: String) -> Self {
        ComplianceDecision::Rejected {
            reason: reason.to_string(),
            message,
        }
    }
}

/// Trait for compliance rules
pub trait ComplianceRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when the payment passes this rule
    fn check(&self, payment: &PaymentRequest<'_>) -> Option<ComplianceDecision>;
}

/// Compliance engine that enforces rules in order
pub struct ComplianceEngine {
    rules: Vec<Box<dyn ComplianceRule>>,
}

impl ComplianceEngine {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn ComplianceRule>) {
        self.rules.push(rule);
    }

    pub fn check_payment(&self, payment: &PaymentRequest<'_>) -> ComplianceDecision {
        for rule in &self.rules {
            if let Some(decision) = rule.check(payment) {
                warn!(
                    rule = rule.name(),
                    amount = payment.amount,
                    payee = %payment.payee,
                    "Payment rejected by compliance"
                );
                return decision;
            }
        }

        info!(rule_count = self.rules.len(), "Payment approved by compliance");
        ComplianceDecision::Approved
    }
}

impl Default for ComplianceEngine {
    fn default() -> Self {
        Self::new()
    }
}

//
// ========== Rules ==========
//

/// Rule: hard cap on a single payment
pub struct MaxAmountRule {
    pub limit: f64,
}

impl ComplianceRule for MaxAmountRule {
    fn name(&self) -> &'static str {
        "max_transaction_amount"
    }

    fn check(&self, payment: &PaymentRequest<'_>) -> Option<ComplianceDecision> {
        (payment.amount > self.limit).then(|| {
            ComplianceDecision::reject(
                "AMOUNT_TOO_HIGH",
                format!(
                    "Payment of amount {} is too high. Max allowed is {}.",
                    payment.amount, self.limit
                ),
            )
        })
    }
}

/// Rule: payee looks suspicious
pub struct SuspiciousPayeeRule;

impl ComplianceRule for SuspiciousPayeeRule {
    fn name(&self) -> &'static str {
        "suspicious_payee"
    }

    fn check(&self, payment: &PaymentRequest<'_>) -> Option<ComplianceDecision> {
        let payee = payment.payee.to_lowercase();

        SUSPICIOUS_KEYWORDS
            .iter()
            .any(|kw| payee.contains(kw))
            .then(|| {
                ComplianceDecision::reject(
                    "SUSPICIOUS_PAYEE",
                    format!(
                        "Payment to {} is suspicious. Transaction flagged for safety.",
                        payment.payee
                    ),
                )
            })
    }
}

/// Rule: total outgoing spend today
pub struct DailyLimitRule {
    pub limit: f64,
}

impl ComplianceRule for DailyLimitRule {
    fn name(&self) -> &'static str {
        "daily_limit"
    }

    fn check(&self, payment: &PaymentRequest<'_>) -> Option<ComplianceDecision> {
        let today = payment.now.date_naive();
        let spent: f64 = outgoing(payment.recent_transactions)
            .filter(|t| t.timestamp.date_naive() == today)
            .map(|t| t.amount)
            .sum();

        (spent + payment.amount > self.limit).then(|| {
            ComplianceDecision::reject(
                "DAILY_LIMIT_EXCEEDED",
                format!("Daily spend limit exceeded. You have spent Rs.{} today.", spent),
            )
        })
    }
}

/// Rule: total outgoing spend this calendar month
pub struct MonthlyLimitRule {
    pub limit: f64,
}

impl ComplianceRule for MonthlyLimitRule {
    fn name(&self) -> &'static str {
        "monthly_limit"
    }

    fn check(&self, payment: &PaymentRequest<'_>) -> Option<ComplianceDecision> {
        let (year, month) = (payment.now.year(), payment.now.month());
        let spent: f64 = outgoing(payment.recent_transactions)
            .filter(|t| t.timestamp.year() == year && t.timestamp.month() == month)
            .map(|t| t.amount)
            .sum();

        (spent + payment.amount > self.limit).then(|| {
            ComplianceDecision::reject(
                "MONTHLY_LIMIT_EXCEEDED",
                format!(
                    "Monthly spend limit exceeded. You have spent Rs.{} this month.",
                    spent
                ),
            )
        })
    }
}

/// Rule: too many payments in a short window
pub struct RapidTransactionRule {
    pub limit: usize,
    pub window: Duration,
}

impl ComplianceRule for RapidTransactionRule {
    fn name(&self) -> &'static str {
        "rapid_transactions"
    }

    fn check(&self, payment: &PaymentRequest<'_>) -> Option<ComplianceDecision> {
        let rapid = payment
            .recent_transactions
            .iter()
            .filter(|t| payment.now - t.timestamp <= self.window)
            .count();

        (rapid >= self.limit).then(|| {
            ComplianceDecision::reject(
                "RAPID_TXN_LIMIT_EXCEEDED",
                format!(
                    "Rapid transaction limit exceeded. You have made {} transactions in the last {} minutes.",
                    rapid,
                    self.window.num_minutes()
                ),
            )
        })
    }
}

/// Create a compliance engine with the standard payment rules
pub fn create_default_compliance_engine() -> ComplianceEngine {
    let mut engine = ComplianceEngine::new();
    engine.add_rule(Box::new(MaxAmountRule {
        limit: MAX_TRANSACTION_AMOUNT,
    }));
    engine.add_rule(Box::new(SuspiciousPayeeRule));
    engine.add_rule(Box::new(DailyLimitRule {
        limit: MAX_DAILY_LIMIT,
    }));
    engine.add_rule(Box::new(MonthlyLimitRule {
        limit: MAX_MONTHLY_LIMIT,
    }));
    engine.add_rule(Box::new(RapidTransactionRule {
        limit: RAPID_TXN_LIMIT,
        window: Duration::minutes(RAPID_TXN_WINDOW_MINUTES),
    }));
    engine
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn spent(amount: f64, at: DateTime<Utc>) -> Transaction {
        Transaction {
            transaction_id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            kind: TransactionType::Expense,
            amount,
            category: "payment".to_string(),
            payee: None,
            raw_description: None,
            is_recurring: false,
            timestamp: at,
        }
    }

    fn reason(decision: ComplianceDecision) -> String {
        match decision {
            ComplianceDecision::Rejected { reason, .. } => reason,
            ComplianceDecision::Approved => "APPROVED".to_string(),
        }
    }

    fn check(amount: f64, payee: &str, history: &[Transaction], now: DateTime<Utc>) -> String {
        let engine = create_default_compliance_engine();
        reason(engine.check_payment(&PaymentRequest {
            amount,
            payee,
            recent_transactions: history,
            now,
        }))
    }

    #[test]
    fn test_approves_ordinary_payment() {
        assert_eq!(check(300.0, "Priya", &[], Utc::now()), "APPROVED");
    }

    #[test]
    fn test_amount_cap() {
        assert_eq!(check(1500.0, "Priya", &[], Utc::now()), "AMOUNT_TOO_HIGH");
    }

    #[test]
    fn test_suspicious_payee() {
        assert_eq!(
            check(10.0, "Lucky Betting Co", &[], Utc::now()),
            "SUSPICIOUS_PAYEE"
        );
    }

    #[test]
    fn test_daily_limit() {
        let now = "2024-05-20T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let history = vec![
            spent(900.0, now - Duration::hours(1)),
            spent(900.0, now - Duration::hours(1)),
        ];
        assert_eq!(check(300.0, "Priya", &history, now), "DAILY_LIMIT_EXCEEDED");
    }

    #[test]
    fn test_monthly_limit() {
        let now = "2024-05-20T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let history: Vec<_> = (1..=10)
            .map(|day| spent(990.0, now - Duration::days(day)))
            .collect();
        assert_eq!(check(200.0, "Priya", &history, now), "MONTHLY_LIMIT_EXCEEDED");
    }

    #[test]
    fn test_rapid_transactions() {
        let now = Utc::now();
        let history: Vec<_> = (0..5)
            .map(|_| spent(1.0, now - Duration::seconds(30)))
            .collect();
        assert_eq!(check(1.0, "Priya", &history, now), "RAPID_TXN_LIMIT_EXCEEDED");
    }

    #[test]
    fn test_decision_serialization() {
        let json = serde_json::to_value(ComplianceDecision::reject(
            "AMOUNT_TOO_HIGH",
            "too high".to_string(),
        ))
        .unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["reason"], "AMOUNT_TOO_HIGH");
    }
}
