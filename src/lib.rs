//! Financial Intent Router
//!
//! Routes free-text financial requests ("set a budget of 4000",
//! "send 300 to Priya") to domain handlers:
//! - An LLM classifier turns text into a typed, confidence-scored intent
//! - Deterministic extraction fills entities the model does not supply
//! - A versioned routing table maps every intent to exactly one handler
//! - Handlers run budget, payment, investment and ledger operations
//! - Any classification failure degrades to the "unknown" fallback
//!
//! PIPELINE:
//! INPUT → CLASSIFY → ENRICH → ROUTE → HANDLE → COMPLETE

pub mod api;
pub mod classifier;
pub mod compliance;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod extraction;
pub mod generation;
pub mod handlers;
pub mod models;
pub mod portfolio;
pub mod router;
pub mod store;

pub use error::Result;

// Re-export common types
pub use classifier::{ClassifierPolicy, IntentClassifier};
pub use config::AppConfig;
pub use dispatcher::Dispatcher;
pub use models::*;
pub use router::{HandlerId, IntentRegistry, Router, RoutingTable};
