//! HR summary aggregation.
//!
//! Three reads run concurrently: HIGH analyses for check-ins since local
//! midnight, the number of check-ins since local midnight, and a per
//! department risk tally over the trailing seven days. Any read error yields
//! the zeroed summary.
//!
//! Counts come from the store's exact count, never from the length of a
//! (row-capped) select. Check-in ids are fanned out into chunked `IN`
//! filters so the request URL stays bounded however busy the week was.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveTime, Utc};
use sakina_core::models::{AnalysisLog, CheckIn, Employee, HrSummary, RiskLevel, RiskTally};
use sakina_core::store::{count_any_of, select_all, select_any_of};
use sakina_core::{DataStore, Query, StoreError, Table};
use uuid::Uuid;

const UNKNOWN_DEPARTMENT: &str = "Unknown";

#[derive(Clone)]
pub struct HrSummaryService {
    store: Arc<dyn DataStore>,
}

/// Start of the calendar day containing `now`, in `now`'s offset.
fn local_midnight(now: &DateTime<FixedOffset>) -> DateTime<Utc> {
    now.date_naive()
        .and_time(NaiveTime::MIN)
        .and_local_timezone(*now.offset())
        .single()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc))
}

impl HrSummaryService {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    pub async fn summarize(&self) -> HrSummary {
        self.summarize_at(Local::now().fixed_offset()).await
    }

    pub async fn summarize_at(&self, now: DateTime<FixedOffset>) -> HrSummary {
        let today = local_midnight(&now);
        let week_ago = now.with_timezone(&Utc) - Duration::days(7);

        let result = tokio::try_join!(
            self.high_risk_since(today),
            self.checkin_count_since(today),
            self.department_breakdown(week_ago),
        );

        match result {
            Ok((high, total, per_department)) => HrSummary {
                employees_at_high_risk_today: high,
                total_checkins_today: total,
                per_department,
            },
            Err(e) => {
                tracing::warn!("HR summary unavailable, returning zeroed summary: {}", e);
                HrSummary::default()
            }
        }
    }

    fn since(since: DateTime<Utc>) -> Query {
        Query::new().gte("created_at", since)
    }

    async fn checkins_since(&self, since: DateTime<Utc>) -> Result<Vec<CheckIn>, StoreError> {
        select_all(
            self.store.as_ref(),
            Table::DailyCheckins,
            &Self::since(since).order_asc("id"),
        )
        .await
    }

    /// Counts HIGH analysis rows, not distinct employees.
    async fn high_risk_since(&self, since: DateTime<Utc>) -> Result<u32, StoreError> {
        let ids: Vec<Uuid> = self.checkins_since(since).await?.iter().map(|c| c.id).collect();
        let high = count_any_of(
            self.store.as_ref(),
            Table::AnalysisLogs,
            &Query::new().eq("risk_level", RiskLevel::High.as_str()),
            "checkin_id",
            ids,
        )
        .await?;
        Ok(saturate(high))
    }

    async fn checkin_count_since(&self, since: DateTime<Utc>) -> Result<u32, StoreError> {
        let total = self.store.count(Table::DailyCheckins, &Self::since(since)).await?;
        Ok(saturate(total))
    }

    async fn department_breakdown(&self, since: DateTime<Utc>) -> Result<BTreeMap<String, RiskTally>, StoreError> {
        let store = self.store.as_ref();
        let checkins = self.checkins_since(since).await?;

        let employee_of: HashMap<Uuid, Uuid> = checkins.iter().map(|c| (c.id, c.employee_id)).collect();
        let employee_ids: Vec<Uuid> = checkins
            .iter()
            .map(|c| c.employee_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let analyses: Vec<AnalysisLog> = select_any_of(
            store,
            Table::AnalysisLogs,
            &Query::new().order_asc("id"),
            "checkin_id",
            checkins.iter().map(|c| c.id).collect(),
        )
        .await?;

        let departments: HashMap<Uuid, String> =
            select_any_of::<Employee, _>(store, Table::Employees, &Query::new().order_asc("id"), "id", employee_ids)
                .await?
                .into_iter()
                .filter_map(|e| e.department.filter(|d| !d.trim().is_empty()).map(|d| (e.id, d)))
                .collect();

        let mut tally: BTreeMap<String, RiskTally> = BTreeMap::new();
        for analysis in analyses {
            let department = employee_of
                .get(&analysis.checkin_id)
                .and_then(|employee| departments.get(employee))
                .map(String::as_str)
                .unwrap_or(UNKNOWN_DEPARTMENT);
            tally.entry(department.to_string()).or_default().record(analysis.risk_level);
        }
        Ok(tally)
    }
}

fn saturate(count: u64) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sakina_core::models::Channel;
    use sakina_core::MemoryStore;

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    fn now() -> DateTime<FixedOffset> {
        offset().with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap()
    }

    fn employee(department: Option<&str>) -> Employee {
        Employee {
            id: Uuid::new_v4(),
            full_name: "Test Employee".to_string(),
            job_title: None,
            department: department.map(String::from),
            avatar_url: None,
            email: None,
        }
    }

    async fn seed_checkin(store: &MemoryStore, employee_id: Uuid, at: DateTime<Utc>, risk: RiskLevel) {
        let checkin = CheckIn {
            id: Uuid::new_v4(),
            employee_id,
            mood_score: 3,
            note_text: None,
            channel: Channel::Web,
            created_at: at,
        };
        let analysis = AnalysisLog {
            id: Uuid::new_v4(),
            checkin_id: checkin.id,
            sentiment: None,
            sentiment_score: None,
            emotion: None,
            risk_level: risk,
            recommendation: None,
            model_source: "heuristic".to_string(),
        };
        store.seed(Table::DailyCheckins, &[checkin]).await.unwrap();
        store.seed(Table::AnalysisLogs, &[analysis]).await.unwrap();
    }

    #[tokio::test]
    async fn test_counts_today_and_departments() {
        let store = Arc::new(MemoryStore::new());
        let eng = employee(Some("Engineering"));
        let ops = employee(Some("Operations"));
        let nobody = employee(None);
        store.seed(Table::Employees, &[eng.clone(), ops.clone(), nobody.clone()]).await.unwrap();

        let today = now().with_timezone(&Utc) - Duration::hours(1);
        let levels = [
            RiskLevel::High,
            RiskLevel::High,
            RiskLevel::High,
            RiskLevel::Medium,
            RiskLevel::Medium,
            RiskLevel::Low,
            RiskLevel::Low,
            RiskLevel::Low,
            RiskLevel::Low,
            RiskLevel::Low,
        ];
        for (i, level) in levels.into_iter().enumerate() {
            let who = if i % 2 == 0 { eng.id } else { ops.id };
            seed_checkin(&store, who, today, level).await;
        }
        // Earlier this week: only counted per department.
        seed_checkin(&store, nobody.id, today - Duration::days(3), RiskLevel::High).await;
        // Outside the window entirely.
        seed_checkin(&store, eng.id, today - Duration::days(10), RiskLevel::High).await;

        let summary = HrSummaryService::new(store).summarize_at(now()).await;
        assert_eq!(summary.total_checkins_today, 10);
        assert_eq!(summary.employees_at_high_risk_today, 3);

        let eng_tally = summary.per_department["Engineering"];
        let ops_tally = summary.per_department["Operations"];
        assert_eq!(eng_tally.high + ops_tally.high, 3);
        assert_eq!(eng_tally.high + eng_tally.medium + eng_tally.low, 5);
        assert_eq!(ops_tally.high + ops_tally.medium + ops_tally.low, 5);
        assert_eq!(summary.per_department["Unknown"], RiskTally { high: 1, medium: 0, low: 0 });
    }

    #[tokio::test]
    async fn test_midnight_boundary_uses_local_offset() {
        let store = Arc::new(MemoryStore::new());
        let e = employee(Some("Finance"));
        store.seed(Table::Employees, &[e.clone()]).await.unwrap();

        // 23:30 yesterday local time and 00:30 today local time.
        let midnight = offset().with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap().with_timezone(&Utc);
        seed_checkin(&store, e.id, midnight - Duration::minutes(30), RiskLevel::High).await;
        seed_checkin(&store, e.id, midnight + Duration::minutes(30), RiskLevel::Low).await;

        let summary = HrSummaryService::new(store).summarize_at(now()).await;
        assert_eq!(summary.total_checkins_today, 1);
        assert_eq!(summary.employees_at_high_risk_today, 0);
        assert_eq!(summary.per_department["Finance"], RiskTally { high: 1, medium: 0, low: 1 });
    }

    #[tokio::test]
    async fn test_busy_week_beyond_row_and_filter_caps() {
        let store = Arc::new(MemoryStore::new());
        store.limit_response_rows(100).await;
        store.limit_filter_values(sakina_core::store::MAX_FILTER_VALUES).await;

        let staff: Vec<Employee> = (0..120)
            .map(|i| employee(Some(if i % 2 == 0 { "Engineering" } else { "Support" })))
            .collect();
        store.seed(Table::Employees, &staff).await.unwrap();

        let today = now().with_timezone(&Utc) - Duration::hours(2);
        let earlier = today - Duration::days(2);
        let mut checkins = Vec::new();
        let mut analyses = Vec::new();
        for i in 0..700 {
            let checkin = CheckIn {
                id: Uuid::new_v4(),
                employee_id: staff[i % staff.len()].id,
                mood_score: 3,
                note_text: None,
                channel: Channel::Web,
                created_at: if i < 450 { today } else { earlier },
            };
            analyses.push(AnalysisLog {
                id: Uuid::new_v4(),
                checkin_id: checkin.id,
                sentiment: None,
                sentiment_score: None,
                emotion: None,
                risk_level: if i % 3 == 0 { RiskLevel::High } else { RiskLevel::Low },
                recommendation: None,
                model_source: "heuristic".to_string(),
            });
            checkins.push(checkin);
        }
        store.seed(Table::DailyCheckins, &checkins).await.unwrap();
        store.seed(Table::AnalysisLogs, &analyses).await.unwrap();

        let summary = HrSummaryService::new(store).summarize_at(now()).await;
        assert_eq!(summary.total_checkins_today, 450);
        assert_eq!(summary.employees_at_high_risk_today, 150);

        let eng = summary.per_department["Engineering"];
        let support = summary.per_department["Support"];
        assert_eq!(eng.high + eng.low + support.high + support.low, 700);
        assert_eq!(eng.high + support.high, 234);
        assert!(!summary.per_department.contains_key("Unknown"));
    }

    #[tokio::test]
    async fn test_empty_store_gives_zeroed_summary() {
        let summary = HrSummaryService::new(Arc::new(MemoryStore::new()))
            .summarize_at(now())
            .await;
        assert_eq!(summary, HrSummary::default());
    }

    #[tokio::test]
    async fn test_read_error_gives_zeroed_summary() {
        let store = Arc::new(MemoryStore::new());
        seed_checkin(&store, Uuid::new_v4(), now().with_timezone(&Utc), RiskLevel::High).await;
        store.fail_selects_from(Table::AnalysisLogs).await;

        let summary = HrSummaryService::new(store).summarize_at(now()).await;
        assert_eq!(summary, HrSummary::default());
    }
}
