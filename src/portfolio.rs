//! Portfolio metrics and holdings sources
//!
//! Pure calculations over holdings. The LLM never computes numbers here.

use crate::models::Holding;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

const HIGH_RISK_TYPES: &[&str] = &["crypto", "smallcap", "penny"];

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioSummary {
    pub total_cost: f64,
    pub total_current_value: f64,
    pub net_pnl: f64,
    pub returns_percent: f64,
    /// instrument type → percent of current value
    pub allocation: BTreeMap<String, f64>,
}

pub fn portfolio_summary(holdings: &[Holding]) -> PortfolioSummary {
    let total_cost: f64 = holdings.iter().map(Holding::cost).sum();
    let total_value: f64 = holdings.iter().map(|h| h.current_value).sum();

    let mut by_type: BTreeMap<String, f64> = BTreeMap::new();
    for h in holdings {
        *by_type.entry(h.instrument_type.clone()).or_insert(0.0) += h.current_value;
    }

    let pnl = total_value - total_cost;
    let returns = if total_cost != 0.0 {
        pnl / total_cost * 100.0
    } else {
        0.0
    };

    let allocation = if total_value != 0.0 {
        by_type
            .into_iter()
            .map(|(k, v)| (k, round_to(v / total_value * 100.0, 2)))
            .collect()
    } else {
        BTreeMap::new()
    };

    PortfolioSummary {
        total_cost: round_to(total_cost, 2),
        total_current_value: round_to(total_value, 2),
        net_pnl: round_to(pnl, 2),
        returns_percent: round_to(returns, 2),
        allocation,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockPnl {
    pub symbol: String,
    pub quantity: f64,
    pub cost: f64,
    pub current_value: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
}

/// P&L for one symbol, aggregated over all its lots. `None` if not held.
pub fn stock_pnl(holdings: &[Holding], symbol: &str) -> Option<StockPnl> {
    let lots: Vec<&Holding> = holdings
        .iter()
        .filter(|h| h.symbol.eq_ignore_ascii_case(symbol))
        .collect();

    if lots.is_empty() {
        return None;
    }

    let quantity: f64 = lots.iter().map(|h| h.quantity).sum();
    let cost: f64 = lots.iter().map(|h| h.cost()).sum();
    let value: f64 = lots.iter().map(|h| h.current_value).sum();
    let pnl = value - cost;

    Some(StockPnl {
        symbol: symbol.to_uppercase(),
        quantity,
        cost: round_to(cost, 2),
        current_value: round_to(value, 2),
        pnl: round_to(pnl, 2),
        pnl_percent: if cost != 0.0 {
            round_to(pnl / cost * 100.0, 2)
        } else {
            0.0
        },
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskProfile {
    /// distinct instrument types per holding, as a percent
    pub diversification_score: f64,
    /// population std-dev of period returns
    pub volatility: f64,
    pub high_risk_weight: f64,
}

pub fn calculate_diversification(holdings: &[Holding]) -> f64 {
    let mut types: Vec<&str> = holdings.iter().map(|h| h.instrument_type.as_str()).collect();
    types.sort_unstable();
    types.dedup();

    round_to(types.len() as f64 / holdings.len().max(1) as f64 * 100.0, 2)
}

pub fn calculate_volatility(history_values: &[f64]) -> f64 {
    if history_values.len() < 2 {
        return 0.0;
    }

    let returns: Vec<f64> = history_values
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();

    if returns.is_empty() {
        return 0.0;
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;

    round_to(variance.sqrt(), 4)
}

pub fn risk_profile(holdings: &[Holding], history_values: &[f64]) -> RiskProfile {
    let total: f64 = holdings.iter().map(|h| h.current_value).sum();
    let risky: f64 = holdings
        .iter()
        .filter(|h| HIGH_RISK_TYPES.contains(&h.instrument_type.as_str()))
        .map(|h| h.current_value)
        .sum();

    RiskProfile {
        diversification_score: calculate_diversification(holdings),
        volatility: calculate_volatility(history_values),
        high_risk_weight: round_to(risky / total.max(1.0) * 100.0, 2),
    }
}

//
// ================= Holdings Source =================
//

/// Where a user's holdings come from (broker API, database, fixture)
#[async_trait::async_trait]
pub trait HoldingsSource: Send + Sync {
    async fn holdings(&self, user_id: Uuid) -> Result<Vec<Holding>>;

    /// Historical portfolio values, oldest first
    async fn value_history(&self, _user_id: Uuid) -> Result<Vec<f64>> {
        Ok(Vec::new())
    }
}

/// Fixed holdings shared by every user, for demos and tests
pub struct StaticHoldings {
    holdings: Vec<Holding>,
    history: Vec<f64>,
}

impl StaticHoldings {
    pub fn new(holdings: Vec<Holding>, history: Vec<f64>) -> Self {
        Self { holdings, history }
    }

    /// A small NSE portfolio
    pub fn demo() -> Self {
        fn holding(symbol: &str, kind: &str, qty: f64, avg: f64, ltp: f64) -> Holding {
            Holding {
                symbol: symbol.to_string(),
                instrument_type: kind.to_string(),
                quantity: qty,
                avg_price: avg,
                current_value: qty * ltp,
            }
        }

        Self::new(
            vec![
                holding("RELIANCE", "equity", 10.0, 2400.0, 2850.0),
                holding("TCS", "equity", 5.0, 3600.0, 3900.0),
                holding("INFY", "equity", 12.0, 1550.0, 1480.0),
                holding("HDFC", "equity", 8.0, 1650.0, 1720.0),
                holding("NIFTYBEES", "etf", 40.0, 210.0, 245.0),
                holding("SGBJUN31", "gold", 2.0, 5900.0, 6300.0),
            ],
            vec![118_000.0, 121_500.0, 119_800.0, 124_200.0, 126_900.0],
        )
    }
}

#[async_trait::async_trait]
impl HoldingsSource for StaticHoldings {
    async fn holdings(&self, _user_id: Uuid) -> Result<Vec<Holding>> {
        Ok(self.holdings.clone())
    }

    async fn value_history(&self, _user_id: Uuid) -> Result<Vec<f64>> {
        Ok(self.history.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(symbol: &str, kind: &str, qty: f64, avg: f64, value: f64) -> Holding {
        Holding {
            symbol: symbol.to_string(),
            instrument_type: kind.to_string(),
            quantity: qty,
            avg_price: avg,
            current_value: value,
        }
    }

    #[test]
    fn test_portfolio_summary() {
        let holdings = vec![
            holding("TCS", "equity", 10.0, 100.0, 1200.0),
            holding("BTC", "crypto", 1.0, 1000.0, 800.0),
        ];

        let summary = portfolio_summary(&holdings);
        assert_eq!(summary.total_cost, 2000.0);
        assert_eq!(summary.total_current_value, 2000.0);
        assert_eq!(summary.net_pnl, 0.0);
        assert_eq!(summary.returns_percent, 0.0);
        assert_eq!(summary.allocation["equity"], 60.0);
        assert_eq!(summary.allocation["crypto"], 40.0);
    }

    #[test]
    fn test_empty_portfolio() {
        let summary = portfolio_summary(&[]);
        assert_eq!(summary.returns_percent, 0.0);
        assert!(summary.allocation.is_empty());

        let risk = risk_profile(&[], &[]);
        assert_eq!(risk.diversification_score, 0.0);
        assert_eq!(risk.high_risk_weight, 0.0);
    }

    #[test]
    fn test_stock_pnl() {
        let holdings = vec![
            holding("TCS", "equity", 10.0, 100.0, 1100.0),
            holding("tcs", "equity", 10.0, 100.0, 1100.0),
        ];

        let pnl = stock_pnl(&holdings, "TCS").unwrap();
        assert_eq!(pnl.quantity, 20.0);
        assert_eq!(pnl.pnl, 200.0);
        assert_eq!(pnl.pnl_percent, 10.0);
        assert!(stock_pnl(&holdings, "INFY").is_none());
    }

    #[test]
    fn test_risk_profile() {
        let holdings = vec![
            holding("TCS", "equity", 1.0, 1.0, 750.0),
            holding("INFY", "equity", 1.0, 1.0, 0.0),
            holding("DOGE", "crypto", 1.0, 1.0, 250.0),
            holding("XYZ", "penny", 1.0, 1.0, 0.0),
        ];

        let risk = risk_profile(&holdings, &[100.0, 110.0, 99.0]);
        assert_eq!(risk.diversification_score, 75.0);
        assert_eq!(risk.high_risk_weight, 25.0);
        // returns +0.10 and -0.10
        assert_eq!(risk.volatility, 0.1);
    }

    #[test]
    fn test_volatility_short_history() {
        assert_eq!(calculate_volatility(&[]), 0.0);
        assert_eq!(calculate_volatility(&[100.0]), 0.0);
    }
}
