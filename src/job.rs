use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Polling state of a job. Only `Running` jobs are picked up by a pass;
/// the other states stay put until the job is re-armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// `R`: armed and awaiting a response.
    Running,
    /// `A`: an update was applied.
    Applied,
    /// `W`: the remote answered with a non-success status.
    Warning,
    /// `E`: transport or processing failure.
    Error,
}

impl JobStatus {
    pub fn code(&self) -> &'static str {
        match self {
            JobStatus::Running => "R",
            JobStatus::Applied => "A",
            JobStatus::Warning => "W",
            JobStatus::Error => "E",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingJob {
    pub id: Option<Uuid>,
    /// Storage key of the owning record.
    pub record_key: Uuid,
    pub status: JobStatus,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PollingJob {
    /// New jobs start out `Running` with no gate, so the next pass picks them up.
    pub fn new(record_key: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            record_key,
            status: JobStatus::Running,
            next_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Re-arms the job: back to `Running`, eligible again after `interval`.
    pub fn start_run(&mut self, now: DateTime<Utc>, interval: Duration) {
        self.status = JobStatus::Running;
        self.next_run_at = Some(now + interval);
        self.updated_at = now;
    }

    pub fn update_status(&mut self, status: JobStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// `status == R` and the `next_run_at` gate, if any, has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Running && self.next_run_at.map_or(true, |next| now >= next)
    }
}
