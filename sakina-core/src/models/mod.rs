//! Row types for the hosted relational store.
//!
//! Rows travel through [`crate::store::DataStore`] as JSON and are decoded
//! into these structs with serde. Ids and timestamps are assigned by the
//! services so every backend stores identical rows.

pub mod activity;
pub mod analysis;
pub mod chat;
pub mod checkin;
pub mod employee;
pub mod summary;

pub use activity::{ActivityLog, DigitalTwinReport, DigitalTwinState};
pub use analysis::{AnalysisLog, RiskLevel, SentimentLabel, SentimentResult};
pub use chat::{ChatLogEntry, ChatRole, ChatTurn};
pub use checkin::{Channel, CheckIn};
pub use employee::{Employee, HrManager};
pub use summary::{HrSummary, RiskTally};

use serde::{Deserialize, Serialize};

/// UI language. Prompts and canned recommendations exist in both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ar,
}
