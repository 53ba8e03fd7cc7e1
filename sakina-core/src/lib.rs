pub mod agent;
pub mod config;
pub mod conversation;
pub mod db;
pub mod error;
pub mod gemini;
pub mod models;
pub mod postgrest;
pub mod risk;
pub mod store;

pub use agent::EnterpriseAgentClient;
pub use config::SakinaConfig;
pub use conversation::{
    AdapterChain, AttemptFailure, ChainReply, ConversationAdapter, ConversationError,
    SentimentClassifier,
};
pub use db::PgStore;
pub use error::SakinaError;
pub use gemini::GeminiClient;
pub use postgrest::PostgrestStore;
pub use risk::{classify, classify_in, DisplayRiskLevel, MoodScore, RiskAssessment};
pub use store::{create_store, DataStore, Filter, FilterValue, MemoryStore, Query, StoreError, Table};
