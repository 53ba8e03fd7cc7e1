use thiserror::Error;

use crate::conversation::ConversationError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum SakinaError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Mood score must be between 1 and 5, got {0}")]
    InvalidMoodScore(i64),
}
