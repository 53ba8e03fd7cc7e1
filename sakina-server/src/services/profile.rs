//! Read-only lookups behind the dashboards.

use std::sync::Arc;

use sakina_core::models::{ActivityLog, ChatLogEntry, DigitalTwinReport, DigitalTwinState, Employee, HrManager};
use sakina_core::store::{select_first, select_records};
use sakina_core::{DataStore, Query, StoreError, Table};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct TwinView {
    pub state: Option<DigitalTwinState>,
    pub reports: Vec<DigitalTwinReport>,
}

#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn DataStore>,
    default_limit: usize,
}

impl ProfileService {
    pub fn new(store: Arc<dyn DataStore>, default_limit: usize) -> Self {
        Self { store, default_limit }
    }

    fn limit(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_limit).clamp(1, self.default_limit.max(1))
    }

    pub async fn employee_by_email(&self, email: &str) -> Result<Option<Employee>, StoreError> {
        select_first(self.store.as_ref(), Table::Employees, Query::new().eq("email", email.trim())).await
    }

    pub async fn hr_manager_by_email(&self, email: &str) -> Result<Option<HrManager>, StoreError> {
        select_first(self.store.as_ref(), Table::HrManagers, Query::new().eq("email", email.trim())).await
    }

    /// The most recent `limit` turns, oldest first.
    pub async fn chat_history(&self, employee_id: Uuid, limit: Option<usize>) -> Result<Vec<ChatLogEntry>, StoreError> {
        let query = Query::new()
            .eq("employee_id", employee_id)
            .order_desc("timestamp")
            .limit(self.limit(limit));
        let mut entries: Vec<ChatLogEntry> = select_records(self.store.as_ref(), Table::ChatLogs, &query).await?;
        entries.reverse();
        Ok(entries)
    }

    pub async fn activity(&self, employee_id: Uuid, limit: Option<usize>) -> Result<Vec<ActivityLog>, StoreError> {
        let query = Query::new()
            .eq("employee_id", employee_id)
            .order_desc("created_at")
            .limit(self.limit(limit));
        select_records(self.store.as_ref(), Table::ActivityLogs, &query).await
    }

    pub async fn digital_twin(&self, employee_id: Uuid) -> Result<TwinView, StoreError> {
        let store = self.store.as_ref();
        let state_query = Query::new().eq("employee_id", employee_id).order_desc("updated_at");
        let reports_query = Query::new()
            .eq("employee_id", employee_id)
            .order_desc("created_at")
            .limit(self.default_limit);

        let (state, reports) = tokio::try_join!(
            select_first::<DigitalTwinState>(store, Table::DigitalTwinStates, state_query),
            select_records::<DigitalTwinReport>(store, Table::DigitalTwinReports, &reports_query),
        )?;
        Ok(TwinView { state, reports })
    }
}
