//! Check-in submission.
//!
//! The check-in row is the primary write: if it fails the submission fails
//! and nothing else is written. The analysis log and the chat exchange are
//! secondary writes; their failures are logged and returned as diagnostics
//! next to a successful outcome.

use std::sync::Arc;

use chrono::Utc;
use sakina_core::models::{AnalysisLog, Channel, ChatLogEntry, CheckIn, Language, RiskLevel, SentimentResult};
use sakina_core::store::{insert_record, insert_records};
use sakina_core::{classify_in, DataStore, DisplayRiskLevel, MoodScore, SentimentClassifier, Table};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::locks::EmployeeLocks;
use super::{SecondaryRecord, WriteDiagnostic};

#[derive(Debug, Clone, Deserialize)]
pub struct CheckInSubmission {
    pub employee_id: Uuid,
    /// Raw score; validated by the service so a bad value is reported as an
    /// outcome instead of a decode error.
    pub mood_score: i64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default)]
    pub sentiment: Option<SentimentResult>,
    #[serde(default)]
    pub language: Option<Language>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitErrorKind {
    Validation,
    Storage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub status: SubmitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_risk_level: Option<DisplayRiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkin_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<SubmitErrorKind>,
    pub diagnostics: Vec<WriteDiagnostic>,
}

impl SubmitOutcome {
    fn failed(kind: SubmitErrorKind, error: String) -> Self {
        Self {
            status: SubmitStatus::Error,
            risk_level: None,
            display_risk_level: None,
            recommendation: None,
            checkin_id: None,
            error: Some(error),
            error_kind: Some(kind),
            diagnostics: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SubmitStatus::Success
    }
}

#[derive(Clone)]
pub struct CheckInService {
    store: Arc<dyn DataStore>,
    classifier: Option<Arc<dyn SentimentClassifier>>,
    locks: EmployeeLocks,
    default_language: Language,
}

impl CheckInService {
    pub fn new(
        store: Arc<dyn DataStore>,
        classifier: Option<Arc<dyn SentimentClassifier>>,
        locks: EmployeeLocks,
        default_language: Language,
    ) -> Self {
        Self {
            store,
            classifier,
            locks,
            default_language,
        }
    }

    pub async fn submit(&self, submission: CheckInSubmission) -> SubmitOutcome {
        let mood = match MoodScore::try_from(submission.mood_score) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(employee_id = %submission.employee_id, "Rejected check-in: {}", e);
                return SubmitOutcome::failed(SubmitErrorKind::Validation, e.to_string());
            }
        };

        let _guard = self.locks.acquire(submission.employee_id).await;

        let notes = submission
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());
        let (sentiment, model_source) = self.resolve_sentiment(submission.sentiment, notes).await;
        let language = submission.language.unwrap_or(self.default_language);
        let assessment = classify_in(mood, sentiment.as_ref().map(|s| s.sentiment), language);

        let now = Utc::now();
        let checkin = CheckIn {
            id: Uuid::new_v4(),
            employee_id: submission.employee_id,
            mood_score: i16::from(mood.get()),
            note_text: notes.map(str::to_string),
            channel: submission.channel,
            created_at: now,
        };

        let stored = match insert_record(self.store.as_ref(), Table::DailyCheckins, &checkin).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(employee_id = %checkin.employee_id, "Check-in write failed: {}", e);
                return SubmitOutcome::failed(SubmitErrorKind::Storage, e.to_string());
            }
        };

        let mut diagnostics = Vec::new();

        let analysis = AnalysisLog {
            id: Uuid::new_v4(),
            checkin_id: stored.id,
            sentiment: sentiment.as_ref().map(|s| s.sentiment),
            sentiment_score: sentiment.as_ref().map(|s| s.score),
            emotion: sentiment.as_ref().map(|s| s.emotion.clone()),
            risk_level: assessment.risk_level,
            recommendation: Some(assessment.recommendation.to_string()),
            model_source,
        };
        if let Err(e) = insert_record(self.store.as_ref(), Table::AnalysisLogs, &analysis).await {
            tracing::warn!(checkin_id = %stored.id, "Analysis log write failed: {}", e);
            diagnostics.push(WriteDiagnostic {
                record: SecondaryRecord::AnalysisLog,
                error: e.to_string(),
            });
        }

        let user_turn = match notes {
            Some(n) => n.to_string(),
            None => format!("Mood score {}/5 via {}", mood, stored.channel),
        };
        let exchange = ChatLogEntry::exchange(stored.employee_id, &user_turn, assessment.recommendation, now);
        if let Err(e) = insert_records(self.store.as_ref(), Table::ChatLogs, &exchange).await {
            tracing::warn!(checkin_id = %stored.id, "Check-in chat log write failed: {}", e);
            diagnostics.push(WriteDiagnostic {
                record: SecondaryRecord::ChatLog,
                error: e.to_string(),
            });
        }

        tracing::info!(
            checkin_id = %stored.id,
            risk = %assessment.risk_level,
            secondary_failures = diagnostics.len(),
            "Check-in recorded"
        );

        SubmitOutcome {
            status: SubmitStatus::Success,
            risk_level: Some(assessment.risk_level),
            display_risk_level: Some(DisplayRiskLevel::from_assessment(assessment.risk_level, mood)),
            recommendation: Some(assessment.recommendation.to_string()),
            checkin_id: Some(stored.id),
            error: None,
            error_kind: None,
            diagnostics,
        }
    }

    /// Supplied sentiment wins. Otherwise notes are classified when a
    /// classifier is configured; a classifier failure means no sentiment.
    async fn resolve_sentiment(
        &self,
        supplied: Option<SentimentResult>,
        notes: Option<&str>,
    ) -> (Option<SentimentResult>, String) {
        if let Some(s) = supplied {
            return (Some(s), "heuristic+client".to_string());
        }
        let (Some(classifier), Some(notes)) = (&self.classifier, notes) else {
            return (None, "heuristic".to_string());
        };
        match classifier.classify_sentiment(notes).await {
            Ok(s) => (Some(s), format!("heuristic+{}", classifier.name())),
            Err(e) => {
                tracing::warn!(classifier = classifier.name(), "Sentiment classification failed: {}", e);
                (None, "heuristic".to_string())
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sakina_core::models::{ChatRole, SentimentLabel};
    use sakina_core::{ConversationError, MemoryStore};

    struct FixedClassifier(Option<SentimentLabel>);

    #[async_trait]
    impl SentimentClassifier for FixedClassifier {
        async fn classify_sentiment(&self, _text: &str) -> Result<SentimentResult, ConversationError> {
            match self.0 {
                Some(sentiment) => Ok(SentimentResult {
                    sentiment,
                    score: 0.9,
                    emotion: "sad".to_string(),
                }),
                None => Err(ConversationError::EmptyReply),
            }
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn service(store: Arc<MemoryStore>, classifier: Option<Arc<dyn SentimentClassifier>>) -> CheckInService {
        CheckInService::new(store, classifier, EmployeeLocks::default(), Language::En)
    }

    fn submission(mood_score: i64, notes: Option<&str>) -> CheckInSubmission {
        CheckInSubmission {
            employee_id: Uuid::new_v4(),
            mood_score,
            notes: notes.map(String::from),
            channel: Channel::Web,
            sentiment: None,
            language: None,
        }
    }

    #[tokio::test]
    async fn test_low_mood_without_note_writes_all_three_records() {
        let store = Arc::new(MemoryStore::new());
        let outcome = service(store.clone(), None).submit(submission(2, None)).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.risk_level, Some(RiskLevel::High));
        assert_eq!(outcome.display_risk_level, Some(DisplayRiskLevel::High));
        assert!(outcome.diagnostics.is_empty());

        let checkins = store.rows(Table::DailyCheckins).await;
        assert_eq!(checkins.len(), 1);
        assert_eq!(checkins[0]["mood_score"], 2);
        assert_eq!(checkins[0]["channel"], "WEB");

        let logs = store.rows(Table::AnalysisLogs).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0]["risk_level"], "HIGH");
        assert_eq!(logs[0]["checkin_id"], checkins[0]["id"]);
        assert_eq!(logs[0]["model_source"], "heuristic");

        let chat = store.rows(Table::ChatLogs).await;
        assert_eq!(chat.len(), 2);
        assert_eq!(chat[0]["role"], "user");
        assert_eq!(chat[0]["content"], "Mood score 2/5 via WEB");
        assert_eq!(chat[1]["role"], "assistant");
        assert_eq!(chat[1]["content"], outcome.recommendation.unwrap().as_str());
    }

    #[tokio::test]
    async fn test_invalid_mood_is_rejected_without_writes() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone(), None);

        for bad in [0, 6, -1] {
            let outcome = svc.submit(submission(bad, Some("hi"))).await;
            assert_eq!(outcome.status, SubmitStatus::Error);
            assert_eq!(outcome.error_kind, Some(SubmitErrorKind::Validation));
        }
        assert_eq!(store.insert_attempts(Table::DailyCheckins).await, 0);
        assert_eq!(store.insert_attempts(Table::AnalysisLogs).await, 0);
        assert_eq!(store.insert_attempts(Table::ChatLogs).await, 0);
    }

    #[tokio::test]
    async fn test_primary_failure_stops_all_writes() {
        let store = Arc::new(MemoryStore::new());
        store.fail_inserts_into(Table::DailyCheckins).await;

        let outcome = service(store.clone(), None).submit(submission(4, None)).await;
        assert_eq!(outcome.status, SubmitStatus::Error);
        assert_eq!(outcome.error_kind, Some(SubmitErrorKind::Storage));
        assert!(outcome.checkin_id.is_none());
        assert_eq!(store.insert_attempts(Table::DailyCheckins).await, 1);
        assert_eq!(store.insert_attempts(Table::AnalysisLogs).await, 0);
        assert_eq!(store.insert_attempts(Table::ChatLogs).await, 0);
    }

    #[tokio::test]
    async fn test_secondary_failure_is_reported_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.fail_inserts_into(Table::AnalysisLogs).await;

        let outcome = service(store.clone(), None).submit(submission(5, Some("great day"))).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.risk_level, Some(RiskLevel::Low));
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].record, SecondaryRecord::AnalysisLog);

        // The chat exchange is still written after the analysis failure.
        let chat = store.rows(Table::ChatLogs).await;
        assert_eq!(chat.len(), 2);
        assert_eq!(chat[0]["content"], "great day");
    }

    #[tokio::test]
    async fn test_classifier_negative_note_raises_risk() {
        let store = Arc::new(MemoryStore::new());
        let classifier: Arc<dyn SentimentClassifier> = Arc::new(FixedClassifier(Some(SentimentLabel::Negative)));

        let outcome = service(store.clone(), Some(classifier))
            .submit(submission(4, Some("I can't keep up")))
            .await;
        assert_eq!(outcome.risk_level, Some(RiskLevel::High));

        let logs = store.rows(Table::AnalysisLogs).await;
        assert_eq!(logs[0]["sentiment"], "NEGATIVE");
        assert_eq!(logs[0]["emotion"], "sad");
        assert_eq!(logs[0]["model_source"], "heuristic+fixed");
    }

    #[tokio::test]
    async fn test_classifier_failure_falls_back_to_mood_only() {
        let store = Arc::new(MemoryStore::new());
        let classifier: Arc<dyn SentimentClassifier> = Arc::new(FixedClassifier(None));

        let outcome = service(store.clone(), Some(classifier))
            .submit(submission(3, Some("meh")))
            .await;
        assert_eq!(outcome.risk_level, Some(RiskLevel::Medium));
        assert_eq!(store.rows(Table::AnalysisLogs).await[0]["model_source"], "heuristic");
    }

    #[tokio::test]
    async fn test_supplied_sentiment_and_arabic_recommendation() {
        let store = Arc::new(MemoryStore::new());
        let mut sub = submission(1, Some("متعب جداً"));
        sub.channel = Channel::Voice;
        sub.language = Some(Language::Ar);
        sub.sentiment = Some(SentimentResult {
            sentiment: SentimentLabel::Negative,
            score: 0.1,
            emotion: "sad".to_string(),
        });

        let outcome = service(store.clone(), None).submit(sub).await;
        assert_eq!(outcome.display_risk_level, Some(DisplayRiskLevel::Critical));
        assert_eq!(
            outcome.recommendation.as_deref(),
            Some(sakina_core::risk::recommendation(RiskLevel::High, Language::Ar))
        );
        assert_eq!(store.rows(Table::AnalysisLogs).await[0]["model_source"], "heuristic+client");
        assert_eq!(store.rows(Table::DailyCheckins).await[0]["channel"], "VOICE");
    }

    #[tokio::test]
    async fn test_user_turn_precedes_assistant_turn() {
        let store = Arc::new(MemoryStore::new());
        service(store.clone(), None).submit(submission(3, None)).await;

        let chat: Vec<ChatLogEntry> = store
            .rows(Table::ChatLogs)
            .await
            .into_iter()
            .map(|r| serde_json::from_value(r).unwrap())
            .collect();
        assert_eq!(chat[0].role, ChatRole::User);
        assert!(chat[0].timestamp < chat[1].timestamp);
    }
}
