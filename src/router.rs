//! Intent registry and routing table
//!
//! Routing is a pure lookup: intent → handler id. The table is configuration
//! data (versioned, loadable from JSON) so intent groups can change without
//! touching the lookup itself.

use crate::error::OrchestrationError;
use crate::models::UNKNOWN_INTENT;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HandlerId {
    Budget,
    Payment,
    Investment,
    Transaction,
    Unknown,
}

impl HandlerId {
    /// Group membership is checked in this order
    pub const PRIORITY: [HandlerId; 5] = [
        HandlerId::Budget,
        HandlerId::Payment,
        HandlerId::Investment,
        HandlerId::Transaction,
        HandlerId::Unknown,
    ];

    fn rank(&self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|h| h == self)
            .unwrap_or(Self::PRIORITY.len())
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandlerId::Budget => "budget",
            HandlerId::Payment => "payment",
            HandlerId::Investment => "investment",
            HandlerId::Transaction => "transaction",
            HandlerId::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Intent Registry =================
//

/// Static intent vocabulary
const DEFAULT_INTENTS: &[&str] = &[
    "set_budget",
    "update_budget",
    "get_budgets",
    "send_money",
    "check_balance",
    "portfolio_value",
    "stock_pnl",
    "portfolio_strategy",
    "portfolio_advice",
    "portfolio_rebalancing",
    "portfolio_review",
    "portfolio_optimize",
    "create_expense",
    "create_income",
    "get_transactions",
    "update_transaction",
    "delete_transaction",
];

/// Ordered set of intents the classifier may choose from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRegistry {
    intents: Vec<String>,
}

impl IntentRegistry {
    /// Duplicates and blanks are dropped; first occurrence keeps its place
    pub fn new<I, S>(intents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ordered: Vec<String> = Vec::new();
        for intent in intents {
            let intent = intent.as_ref().trim();
            if !intent.is_empty() && !ordered.iter().any(|i| i == intent) {
                ordered.push(intent.to_string());
            }
        }
        Self { intents: ordered }
    }

    pub fn contains(&self, intent: &str) -> bool {
        self.intents.iter().any(|i| i == intent)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.intents.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// Comma-separated list for prompts
    pub fn prompt_list(&self) -> String {
        self.intents.join(", ")
    }
}

impl Default for IntentRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_INTENTS)
    }
}

//
// ================= Routing Table =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteGroup {
    pub handler: HandlerId,
    pub intents: Vec<String>,
}

/// Versioned intent → handler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingTable {
    pub version: u32,
    pub groups: Vec<RouteGroup>,
}

impl RoutingTable {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| OrchestrationError::Config(format!("invalid routing table: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OrchestrationError::Config(format!(
                "cannot read routing table {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }

    /// Check the table against the registry.
    ///
    /// Groups must be disjoint, and every registry intent must belong to
    /// exactly one group (an explicit `unknown` group counts).
    pub fn validate(&self, registry: &IntentRegistry) -> Result<()> {
        let mut owner: HashMap<&str, HandlerId> = HashMap::new();

        for group in &self.groups {
            for intent in &group.intents {
                if let Some(previous) = owner.insert(intent.as_str(), group.handler) {
                    return Err(OrchestrationError::Config(format!(
                        "intent '{}' is mapped to both {} and {} (table v{})",
                        intent, previous, group.handler, self.version
                    )));
                }
            }
        }

        let unmapped: Vec<&str> = registry
            .iter()
            .filter(|intent| !owner.contains_key(intent))
            .collect();

        if !unmapped.is_empty() {
            return Err(OrchestrationError::Config(format!(
                "registry intents without a handler (table v{}): {}",
                self.version,
                unmapped.join(", ")
            )));
        }

        Ok(())
    }

    pub fn handler_intents(&self, handler: HandlerId) -> Vec<&str> {
        self.groups
            .iter()
            .filter(|g| g.handler == handler)
            .flat_map(|g| g.intents.iter().map(String::as_str))
            .collect()
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        fn group(handler: HandlerId, intents: &[&str]) -> RouteGroup {
            RouteGroup {
                handler,
                intents: intents.iter().map(|s| s.to_string()).collect(),
            }
        }

        Self {
            version: 2,
            groups: vec![
                group(
                    HandlerId::Budget,
                    &["set_budget", "update_budget", "get_budgets"],
                ),
                group(HandlerId::Payment, &["send_money"]),
                group(
                    HandlerId::Investment,
                    &[
                        "portfolio_value",
                        "stock_pnl",
                        "portfolio_optimize",
                        "portfolio_strategy",
                        "portfolio_advice",
                        "portfolio_rebalancing",
                        "portfolio_review",
                    ],
                ),
                group(
                    HandlerId::Transaction,
                    &[
                        "create_expense",
                        "create_income",
                        "get_transactions",
                        "update_transaction",
                        "delete_transaction",
                        "check_balance",
                    ],
                ),
                group(HandlerId::Unknown, &[UNKNOWN_INTENT]),
            ],
        }
    }
}

//
// ================= Router =================
//

/// Total intent → handler lookup, read-only after construction
#[derive(Debug, Clone)]
pub struct Router {
    routes: HashMap<String, HandlerId>,
    version: u32,
}

impl Router {
    /// Validate `table` against `registry` and precompute the lookup
    pub fn new(table: &RoutingTable, registry: &IntentRegistry) -> Result<Self> {
        table.validate(registry)?;
        Ok(Self::from_table(table))
    }

    /// Build without registry validation. Groups are applied in
    /// [`HandlerId::PRIORITY`] order and the first owner of an intent wins.
    pub fn from_table(table: &RoutingTable) -> Self {
        let mut groups: Vec<&RouteGroup> = table.groups.iter().collect();
        groups.sort_by_key(|g| g.handler.rank());

        let mut routes = HashMap::new();
        for group in groups {
            for intent in &group.intents {
                routes.entry(intent.clone()).or_insert(group.handler);
            }
        }

        info!(
            version = table.version,
            intents = routes.len(),
            "Routing table loaded"
        );

        Self {
            routes,
            version: table.version,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Map any intent to exactly one handler; unknown intents go to `Unknown`
    pub fn route(&self, intent: &str) -> HandlerId {
        match self.routes.get(intent) {
            Some(handler) => *handler,
            None => {
                warn!(
                    intent = %intent,
                    table_version = self.version,
                    "Routing gap: intent has no handler group"
                );
                HandlerId::Unknown
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::from_table(&RoutingTable::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_table_matches_default() {
        let table = RoutingTable::from_json(include_str!("../routing_table.example.json")).unwrap();
        assert_eq!(table, RoutingTable::default());
    }

    #[test]
    fn test_default_table_is_valid() {
        let registry = IntentRegistry::default();
        assert!(RoutingTable::default().validate(&registry).is_ok());
        assert!(Router::new(&RoutingTable::default(), &registry).is_ok());
    }

    #[test]
    fn test_route_known_groups() {
        let router = Router::default();
        assert_eq!(router.route("send_money"), HandlerId::Payment);
        assert_eq!(router.route("set_budget"), HandlerId::Budget);
        assert_eq!(router.route("get_budgets"), HandlerId::Budget);
        assert_eq!(router.route("stock_pnl"), HandlerId::Investment);
        assert_eq!(router.route("check_balance"), HandlerId::Transaction);
        assert_eq!(router.route("unknown"), HandlerId::Unknown);
    }

    #[test]
    fn test_route_is_total() {
        let router = Router::default();
        for intent in ["", "order_pizza", "SEND_MONEY", "update_budget, get_budgets"] {
            assert_eq!(router.route(intent), HandlerId::Unknown);
        }
    }

    #[test]
    fn test_overlapping_groups_rejected() {
        let mut table = RoutingTable::default();
        table.groups.push(RouteGroup {
            handler: HandlerId::Transaction,
            intents: vec!["send_money".to_string()],
        });

        let err = table.validate(&IntentRegistry::default()).unwrap_err();
        assert!(matches!(err, OrchestrationError::Config(_)));
    }

    #[test]
    fn test_unmapped_registry_intent_rejected() {
        let registry = IntentRegistry::new(["send_money", "buy_gold"]);
        let err = Router::new(&RoutingTable::default(), &registry).unwrap_err();
        assert!(err.to_string().contains("buy_gold"));
    }

    #[test]
    fn test_priority_order_breaks_ties() {
        // transaction listed first, but budget outranks it
        let table = RoutingTable {
            version: 9,
            groups: vec![
                RouteGroup {
                    handler: HandlerId::Transaction,
                    intents: vec!["set_budget".to_string()],
                },
                RouteGroup {
                    handler: HandlerId::Budget,
                    intents: vec!["set_budget".to_string()],
                },
            ],
        };

        assert_eq!(Router::from_table(&table).route("set_budget"), HandlerId::Budget);
    }

    #[test]
    fn test_table_from_json() {
        let table = RoutingTable::from_json(
            r#"{"version": 3, "groups": [
                {"handler": "payment", "intents": ["send_money", "pay_bill"]},
                {"handler": "unknown", "intents": ["unknown"]}
            ]}"#,
        )
        .unwrap();

        let registry = IntentRegistry::new(["send_money", "pay_bill"]);
        let router = Router::new(&table, &registry).unwrap();
        assert_eq!(router.version(), 3);
        assert_eq!(router.route("pay_bill"), HandlerId::Payment);
        assert_eq!(table.handler_intents(HandlerId::Payment), vec!["send_money", "pay_bill"]);

        assert!(RoutingTable::from_json(r#"{"version": 1, "groups": [{"handler": "gold"}]}"#).is_err());
    }

    #[test]
    fn test_registry_dedups_in_order() {
        let registry = IntentRegistry::new(["b", "a", "b", " ", "c"]);
        assert_eq!(registry.iter().collect::<Vec<_>>(), vec!["b", "a", "c"]);
        assert_eq!(registry.prompt_list(), "b, a, c");
        assert_eq!(registry.len(), 3);
    }
}
