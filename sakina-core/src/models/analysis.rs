use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical persisted risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentLabel {
    #[serde(alias = "positive", alias = "Positive")]
    Positive,
    #[serde(alias = "neutral", alias = "Neutral")]
    Neutral,
    #[serde(alias = "negative", alias = "Negative")]
    Negative,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "POSITIVE",
            SentimentLabel::Neutral => "NEUTRAL",
            SentimentLabel::Negative => "NEGATIVE",
        }
    }
}

/// Output of the sentiment classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub sentiment: SentimentLabel,
    pub score: f32,
    pub emotion: String,
}

impl SentimentResult {
    /// Substituted whenever a model reply cannot be parsed.
    pub fn neutral() -> Self {
        Self {
            sentiment: SentimentLabel::Neutral,
            score: 0.5,
            emotion: "neutral".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisLog {
    pub id: Uuid,
    pub checkin_id: Uuid,
    #[serde(default)]
    pub sentiment: Option<SentimentLabel>,
    #[serde(default)]
    pub sentiment_score: Option<f32>,
    #[serde(default)]
    pub emotion: Option<String>,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub recommendation: Option<String>,
    pub model_source: String,
}
