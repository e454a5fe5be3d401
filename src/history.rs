use crate::domain::CaseReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable audit record of one synchronization outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Option<Uuid>,
    pub report_id: Option<i64>,
    /// Report as it stood for this outcome, with `Status`/`StatusLog` stamped.
    pub report: CaseReport,
    pub log: String,
    pub source: String,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        mut report: CaseReport,
        report_id: Option<i64>,
        status: Option<&str>,
        log: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let log = log.into();
        if let Some(status) = status {
            report.status = Some(status.to_string());
        }
        report.status_log = Some(log.clone());
        Self {
            id: None,
            report_id,
            report,
            log,
            source: source.into(),
            recorded_at: Utc::now(),
        }
    }
}
