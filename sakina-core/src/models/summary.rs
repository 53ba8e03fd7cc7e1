use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::RiskLevel;

/// Risk counts for one department.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskTally {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl RiskTally {
    pub fn record(&mut self, level: RiskLevel) {
        match level {
            RiskLevel::High => self.high += 1,
            RiskLevel::Medium => self.medium += 1,
            RiskLevel::Low => self.low += 1,
        }
    }
}

/// On-demand aggregate for HR dashboards and the HR assistant. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HrSummary {
    pub employees_at_high_risk_today: u32,
    pub total_checkins_today: u32,
    pub per_department: BTreeMap<String, RiskTally>,
}
