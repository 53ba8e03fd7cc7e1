//! Service layer called by the HTTP handlers.
//!
//! - [`checkin`]: validate, classify, primary write, best-effort side writes
//! - [`chat`]: context, prompt, adapter chain, persisted exchange
//! - [`hr_summary`]: risk counts for HR dashboards and the HR assistant
//! - [`profile`]: read-only lookups for dashboards

pub mod chat;
pub mod checkin;
pub mod hr_summary;
pub mod locks;
pub mod profile;
pub mod prompts;

use std::sync::Arc;
use std::time::Duration;

use sakina_core::{
    create_store, AdapterChain, DataStore, EnterpriseAgentClient, GeminiClient, SakinaConfig,
    SakinaError, SentimentClassifier,
};
use serde::Serialize;

use self::chat::ChatService;
use self::checkin::CheckInService;
use self::hr_summary::HrSummaryService;
use self::locks::EmployeeLocks;
use self::profile::ProfileService;

/// A secondary record whose write may fail without failing the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondaryRecord {
    AnalysisLog,
    ChatLog,
}

/// A swallowed secondary-write failure, reported next to the primary outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteDiagnostic {
    pub record: SecondaryRecord,
    pub error: String,
}

/// Everything the HTTP layer needs, built once at start-up.
pub struct AppServices {
    pub store: Arc<dyn DataStore>,
    pub checkins: CheckInService,
    pub chat: ChatService,
    pub hr: HrSummaryService,
    pub profile: ProfileService,
    pub classifier: Option<Arc<dyn SentimentClassifier>>,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn DataStore>,
        chain: AdapterChain,
        classifier: Option<Arc<dyn SentimentClassifier>>,
        config: &SakinaConfig,
    ) -> Self {
        let locks = EmployeeLocks::default();
        let language = config.service.default_language;
        let hr = HrSummaryService::new(store.clone());

        Self {
            checkins: CheckInService::new(store.clone(), classifier.clone(), locks.clone(), language),
            chat: ChatService::new(
                store.clone(),
                chain,
                hr.clone(),
                locks,
                language,
                config.chat.history_limit,
            ),
            profile: ProfileService::new(store.clone(), config.chat.history_limit),
            hr,
            classifier,
            store,
        }
    }

    /// Connect the configured store and construct whichever adapters have
    /// their credentials.
    pub async fn from_config(config: &SakinaConfig) -> Result<Self, SakinaError> {
        let store = create_store(&config.store).await?;
        tracing::info!(backend = store.name(), "Store backend ready");
        let (chain, classifier) = build_adapters(config);
        Ok(Self::new(store, chain, classifier, config))
    }
}

/// Build the attempt chain: enterprise agent first, Gemini second. An
/// adapter without credentials is left out, so the configuration error
/// surfaces on first use instead of at start-up.
pub fn build_adapters(config: &SakinaConfig) -> (AdapterChain, Option<Arc<dyn SentimentClassifier>>) {
    let mut chain = AdapterChain::new(Duration::from_secs(config.chat.attempt_timeout_secs));
    let mut classifier: Option<Arc<dyn SentimentClassifier>> = None;

    match EnterpriseAgentClient::new(&config.agent) {
        Ok(agent) => chain = chain.with_adapter(Arc::new(agent)),
        Err(e) => tracing::warn!("Enterprise agent skipped: {}", e),
    }

    match GeminiClient::new(&config.generative) {
        Ok(gemini) => {
            let gemini = Arc::new(gemini);
            chain = chain.with_adapter(gemini.clone());
            classifier = Some(gemini);
        }
        Err(e) => tracing::warn!("Gemini backend skipped: {}", e),
    }

    tracing::info!(adapters = ?chain.adapter_names(), "Conversational chain configured");
    (chain, classifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sakina_core::config::{AgentConfig, GenerativeConfig};

    #[test]
    fn test_build_adapters_skips_unconfigured() {
        let config = SakinaConfig::default();
        let (chain, classifier) = build_adapters(&config);
        assert!(chain.is_empty());
        assert!(classifier.is_none());
    }

    #[test]
    fn test_build_adapters_orders_agent_before_gemini() {
        let config = SakinaConfig {
            agent: AgentConfig {
                api_key: Some("k".to_string()),
                base_url: Some("http://agent.local".to_string()),
                assistant_id: Some("a".to_string()),
                ..AgentConfig::default()
            },
            generative: GenerativeConfig {
                api_key: Some("g".to_string()),
                ..GenerativeConfig::default()
            },
            ..SakinaConfig::default()
        };
        let (chain, classifier) = build_adapters(&config);
        assert_eq!(chain.adapter_names(), vec!["enterprise-agent", "gemini"]);
        assert!(classifier.is_some());
    }
}
