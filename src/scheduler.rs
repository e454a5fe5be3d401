use crate::error::Result;
use crate::job::{JobStatus, PollingJob};
use crate::metrics::{self, MetricName};
use crate::storage::Storage;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Owns polling state: which jobs are due, arming, and state transitions.
pub struct JobScheduler {
    storage: Arc<dyn Storage>,
    rearm_interval: Duration,
}

impl JobScheduler {
    pub fn new(storage: Arc<dyn Storage>, rearm_interval: Duration) -> Self {
        Self {
            storage,
            rearm_interval,
        }
    }

    /// Jobs in `R` whose `next_run_at` gate is unset or has passed.
    pub async fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<PollingJob>> {
        let running = self.storage.find_jobs_by_status(JobStatus::Running).await?;
        let total = running.len();
        let due: Vec<PollingJob> = running.into_iter().filter(|j| j.is_due(now)).collect();
        debug!("{} of {} running job(s) are due", due.len(), total);
        metrics::gauge(MetricName::JobsDue, due.len() as f64);
        Ok(due)
    }

    /// Re-arms the newest job for `record_key`, creating one if none exists.
    pub async fn arm_for_record(&self, record_key: Uuid) -> Result<PollingJob> {
        let existing = self.storage.find_jobs_by_record(record_key).await?;
        let now = Utc::now();
        match existing.into_iter().next() {
            Some(mut job) => {
                job.start_run(now, self.rearm_interval);
                self.storage.save_job(&job).await?;
                debug!("Re-armed job {:?} for record {}", job.id, record_key);
                Ok(job)
            }
            None => {
                let mut job = PollingJob::new(record_key);
                job.start_run(now, self.rearm_interval);
                self.storage.create_job(&mut job).await?;
                info!("Created polling job {:?} for record {}", job.id, record_key);
                Ok(job)
            }
        }
    }

    pub async fn transition(&self, job: &mut PollingJob, status: JobStatus) -> Result<()> {
        let from = job.status;
        job.update_status(status);
        self.storage.save_job(job).await?;
        debug!("Job {:?}: {} -> {}", job.id, from, status);
        Ok(())
    }

    /// Moves the newest job of `record_key` to `A`, if the record has one.
    pub async fn mark_applied(&self, record_key: Uuid) -> Result<Option<PollingJob>> {
        let Some(mut job) = self.storage.find_jobs_by_record(record_key).await?.into_iter().next()
        else {
            return Ok(None);
        };
        self.transition(&mut job, JobStatus::Applied).await?;
        Ok(Some(job))
    }
}
