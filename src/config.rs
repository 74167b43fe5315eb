//! Process configuration
//!
//! Read once at startup from the environment (and `.env` via dotenv), then
//! used to assemble the dispatcher.

use crate::classifier::{ClassifierPolicy, IntentClassifier};
use crate::compliance::create_default_compliance_engine;
use crate::dispatcher::Dispatcher;
use crate::error::OrchestrationError;
use crate::generation::{gemini, GeminiModel, LanguageModel};
use crate::handlers::payment::DEFAULT_PAYMENT_LINK_BASE;
use crate::handlers::{
    BudgetHandler, HandlerRegistry, InvestmentHandler, PaymentHandler, PendingOrderGateway,
    TransactionHandler,
};
use crate::portfolio::{HoldingsSource, StaticHoldings};
use crate::router::{IntentRegistry, Router, RoutingTable};
use crate::store::{FinanceStore, InMemoryFinanceStore, PgFinanceStore};
use crate::Result;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub classifier: ClassifierPolicy,
    pub routing_table_path: Option<PathBuf>,
    pub database_url: Option<String>,
    pub port: u16,
    pub payment_link_base: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: gemini::DEFAULT_MODEL.to_string(),
            classifier: ClassifierPolicy::default(),
            routing_table_path: None,
            database_url: None,
            port: DEFAULT_PORT,
            payment_link_base: DEFAULT_PAYMENT_LINK_BASE.to_string(),
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let defaults = Self::default();

        let timeout_secs: Option<u64> = parse_var(&get, "CLASSIFIER_TIMEOUT_SECS")?;
        let max_retries: Option<u32> = parse_var(&get, "CLASSIFIER_MAX_RETRIES")?;
        let backoff_ms: Option<u64> = parse_var(&get, "CLASSIFIER_RETRY_BACKOFF_MS")?;

        let port = match parse_var::<u16, _>(&get, "PORT")? {
            Some(port) => port,
            None => parse_var(&get, "API_PORT")?.unwrap_or(defaults.port),
        };

        Ok(Self {
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            classifier: ClassifierPolicy {
                timeout: timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.classifier.timeout),
                max_retries: max_retries.unwrap_or(defaults.classifier.max_retries),
                retry_backoff: backoff_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.classifier.retry_backoff),
            },
            routing_table_path: get("ROUTING_TABLE_PATH").map(PathBuf::from),
            database_url: get("DATABASE_URL"),
            port,
            payment_link_base: get("PAYMENT_LINK_BASE").unwrap_or(defaults.payment_link_base),
        })
    }

    pub fn routing_table(&self) -> Result<RoutingTable> {
        match &self.routing_table_path {
            Some(path) => {
                let table = RoutingTable::load(path)?;
                info!(path = %path.display(), version = table.version, "Loaded routing table");
                Ok(table)
            }
            None => Ok(RoutingTable::default()),
        }
    }

    pub fn language_model(&self) -> Result<Arc<dyn LanguageModel>> {
        let api_key = match &self.gemini_api_key {
            Some(key) => key.clone(),
            None => {
                warn!("GEMINI_API_KEY not set - every request will classify as unknown");
                String::new()
            }
        };

        // Outer bound only; the classifier applies its own timeout per attempt.
        let request_timeout = self.classifier.timeout + Duration::from_secs(5);
        Ok(Arc::new(GeminiModel::new(
            api_key,
            &self.gemini_model,
            request_timeout,
        )?))
    }

    pub async fn finance_store(&self) -> Result<Arc<dyn FinanceStore>> {
        match &self.database_url {
            Some(url) => Ok(Arc::new(PgFinanceStore::connect(url).await?)),
            None => {
                info!("DATABASE_URL not set - using in-memory finance store");
                Ok(Arc::new(InMemoryFinanceStore::new()))
            }
        }
    }

    /// Assemble the full pipeline around the given model and store
    pub fn build_dispatcher_with(
        &self,
        model: Arc<dyn LanguageModel>,
        store: Arc<dyn FinanceStore>,
        holdings: Arc<dyn HoldingsSource>,
    ) -> Result<Dispatcher> {
        let registry = Arc::new(IntentRegistry::default());
        let table = self.routing_table()?;
        let router = Router::new(&table, &registry)?;

        let mut handlers = HandlerRegistry::new();
        handlers.register(Arc::new(BudgetHandler::new(store.clone())));
        handlers.register(Arc::new(PaymentHandler::new(
            store.clone(),
            create_default_compliance_engine(),
            Arc::new(PendingOrderGateway::new(self.payment_link_base.clone())),
        )));
        handlers.register(Arc::new(InvestmentHandler::new(holdings, model.clone())));
        handlers.register(Arc::new(TransactionHandler::new(store)));

        let classifier = IntentClassifier::new(model, registry, self.classifier.clone());

        info!(
            routing_version = router.version(),
            handlers = handlers.list().len(),
            "Dispatcher assembled"
        );

        Ok(Dispatcher::new(classifier, router, handlers))
    }

    /// Assemble the pipeline from configuration
    pub async fn build_dispatcher(&self) -> Result<Dispatcher> {
        let model = self.language_model()?;
        let store = self.finance_store().await?;
        self.build_dispatcher_with(model, store, Arc::new(StaticHoldings::demo()))
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| {
                OrchestrationError::Config(format!("{} has invalid value '{}': {}", key, raw, e))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ScriptedModel;
    use std::collections::HashMap;
    use tokio_test::assert_err;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.classifier.timeout, Duration::from_secs(15));
        assert_eq!(cfg.classifier.max_retries, 0);
        assert_eq!(cfg.classifier.retry_backoff, Duration::from_millis(250));
        assert!(cfg.gemini_api_key.is_none());
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.payment_link_base, DEFAULT_PAYMENT_LINK_BASE);
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("GEMINI_API_KEY", "k"),
            ("CLASSIFIER_TIMEOUT_SECS", "3"),
            ("CLASSIFIER_MAX_RETRIES", "2"),
            ("API_PORT", "9000"),
            ("DATABASE_URL", "  "),
        ])
        .unwrap();

        assert_eq!(cfg.gemini_api_key.as_deref(), Some("k"));
        assert_eq!(cfg.classifier.timeout, Duration::from_secs(3));
        assert_eq!(cfg.classifier.max_retries, 2);
        assert_eq!(cfg.port, 9000);
        assert!(cfg.database_url.is_none());

        let both = config(&[("PORT", "7000"), ("API_PORT", "9000")]).unwrap();
        assert_eq!(both.port, 7000);
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let err = config(&[("CLASSIFIER_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, OrchestrationError::Config(_)));
    }

    #[test]
    fn test_missing_routing_table_file() {
        let cfg = config(&[("ROUTING_TABLE_PATH", "/nonexistent/routes.json")]).unwrap();
        assert_err!(cfg.routing_table());
    }

    #[tokio::test]
    async fn test_build_dispatcher_with_scripted_model() {
        let cfg = config(&[]).unwrap();
        let dispatcher = cfg
            .build_dispatcher_with(
                Arc::new(ScriptedModel::failing()),
                Arc::new(InMemoryFinanceStore::new()),
                Arc::new(StaticHoldings::demo()),
            )
            .unwrap();

        assert_eq!(dispatcher.router().version(), RoutingTable::default().version);
        assert!(!dispatcher.process("hello").await.is_error());
    }
}
