//! Risk heuristic for check-ins.
//!
//! A check-in's risk level depends only on its mood score and the optional
//! sentiment label of its note. First matching rule wins:
//!
//! 1. mood <= 2, or sentiment NEGATIVE -> HIGH
//! 2. mood == 3 -> MEDIUM
//! 3. otherwise -> LOW

use serde::{Deserialize, Serialize};

use crate::error::SakinaError;
use crate::models::{Language, RiskLevel, SentimentLabel};

/// A validated mood score in `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct MoodScore(u8);

impl MoodScore {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for MoodScore {
    type Error = SakinaError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(SakinaError::InvalidMoodScore(value))
        }
    }
}

impl<'de> Deserialize<'de> for MoodScore {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        MoodScore::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for MoodScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub recommendation: &'static str,
}

/// Classify with the English recommendation text.
pub fn classify(mood: MoodScore, sentiment: Option<SentimentLabel>) -> RiskAssessment {
    classify_in(mood, sentiment, Language::En)
}

pub fn classify_in(
    mood: MoodScore,
    sentiment: Option<SentimentLabel>,
    language: Language,
) -> RiskAssessment {
    let risk_level = if mood.get() <= 2 || sentiment == Some(SentimentLabel::Negative) {
        RiskLevel::High
    } else if mood.get() == 3 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    RiskAssessment {
        risk_level,
        recommendation: recommendation(risk_level, language),
    }
}

pub fn recommendation(level: RiskLevel, language: Language) -> &'static str {
    match (level, language) {
        (RiskLevel::High, Language::En) => {
            "It sounds like things are really hard right now. You don't have to carry this alone: \
             please consider talking to your HR partner or our confidential counselling line today."
        }
        (RiskLevel::Medium, Language::En) => {
            "Thanks for checking in. A short break, a walk outside or a few slow breaths \
             could help lighten the day."
        }
        (RiskLevel::Low, Language::En) => {
            "Great to hear you're doing well! Keep up the good energy and remember to take \
             care of yourself."
        }
        (RiskLevel::High, Language::Ar) => {
            "يبدو أن الأمور صعبة جداً عليك الآن. لست وحدك في هذا، ننصحك بالتواصل مع شريك الموارد \
             البشرية أو خط الاستشارة السري اليوم."
        }
        (RiskLevel::Medium, Language::Ar) => {
            "شكراً لمشاركتك. استراحة قصيرة أو نزهة قصيرة أو بعض الأنفاس العميقة قد تخفف من يومك."
        }
        (RiskLevel::Low, Language::Ar) => {
            "يسعدنا أنك بخير! حافظ على طاقتك الإيجابية ولا تنسَ الاهتمام بنفسك."
        }
    }
}

/// Presentation-only risk tier for dashboards. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayRiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl DisplayRiskLevel {
    pub fn from_assessment(level: RiskLevel, mood: MoodScore) -> Self {
        match level {
            RiskLevel::High if mood.get() == MoodScore::MIN => DisplayRiskLevel::Critical,
            RiskLevel::High => DisplayRiskLevel::High,
            RiskLevel::Medium => DisplayRiskLevel::Medium,
            RiskLevel::Low => DisplayRiskLevel::Low,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mood(v: i64) -> MoodScore {
        MoodScore::try_from(v).unwrap()
    }

    const NON_NEGATIVE: [Option<SentimentLabel>; 3] = [
        None,
        Some(SentimentLabel::Positive),
        Some(SentimentLabel::Neutral),
    ];

    #[test]
    fn test_low_mood_is_high_risk_regardless_of_sentiment() {
        for score in [1, 2] {
            for sentiment in NON_NEGATIVE.iter().copied().chain([Some(SentimentLabel::Negative)]) {
                assert_eq!(classify(mood(score), sentiment).risk_level, RiskLevel::High);
            }
        }
    }

    #[test]
    fn test_negative_sentiment_is_high_risk_for_any_mood() {
        for score in 1..=5 {
            let result = classify(mood(score), Some(SentimentLabel::Negative));
            assert_eq!(result.risk_level, RiskLevel::High, "mood {}", score);
        }
    }

    #[test]
    fn test_mood_three_is_medium() {
        for sentiment in NON_NEGATIVE {
            assert_eq!(classify(mood(3), sentiment).risk_level, RiskLevel::Medium);
        }
    }

    #[test]
    fn test_mood_four_and_five_are_low() {
        for score in [4, 5] {
            for sentiment in NON_NEGATIVE {
                assert_eq!(classify(mood(score), sentiment).risk_level, RiskLevel::Low);
            }
        }
    }

    #[test]
    fn test_classify_is_deterministic() {
        for score in 1..=5 {
            let a = classify(mood(score), Some(SentimentLabel::Neutral));
            let b = classify(mood(score), Some(SentimentLabel::Neutral));
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_arabic_keeps_level_and_changes_text() {
        let en = classify_in(mood(2), None, Language::En);
        let ar = classify_in(mood(2), None, Language::Ar);
        assert_eq!(en.risk_level, ar.risk_level);
        assert_ne!(en.recommendation, ar.recommendation);
    }

    #[test]
    fn test_mood_score_rejects_out_of_range() {
        for bad in [0, 6, -1, 100] {
            match MoodScore::try_from(bad) {
                Err(SakinaError::InvalidMoodScore(v)) => assert_eq!(v, bad),
                other => panic!("expected InvalidMoodScore, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_mood_score_deserialize_validates() {
        assert!(serde_json::from_str::<MoodScore>("4").is_ok());
        assert!(serde_json::from_str::<MoodScore>("9").is_err());
    }

    #[test]
    fn test_display_level_critical_only_for_high_at_mood_one() {
        assert_eq!(
            DisplayRiskLevel::from_assessment(RiskLevel::High, mood(1)),
            DisplayRiskLevel::Critical
        );
        assert_eq!(
            DisplayRiskLevel::from_assessment(RiskLevel::High, mood(4)),
            DisplayRiskLevel::High
        );
        assert_eq!(
            DisplayRiskLevel::from_assessment(RiskLevel::Low, mood(5)),
            DisplayRiskLevel::Low
        );
    }
}
