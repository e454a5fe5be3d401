use crate::error::{Result, SyncError};
use crate::history::HistoryEntry;
use crate::job::{JobStatus, PollingJob};
use crate::record::StoredRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Storage port for stored records, polling jobs and history entries.
///
/// Implementations must give read-after-write consistency for a single
/// record; cross-record transactions are not required.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Hands out the next report ID. Every call yields a value never returned
    /// before by this storage.
    async fn allocate_report_id(&self) -> Result<i64>;

    // Stored record operations
    async fn create_record(&self, record: &mut StoredRecord) -> Result<()>;
    async fn save_record(&self, record: &StoredRecord) -> Result<()>;
    async fn get_record(&self, key: Uuid) -> Result<Option<StoredRecord>>;
    /// Records whose flattened identifier string contains `encoded`, ignoring case.
    async fn find_records_by_identifier(&self, encoded: &str) -> Result<Vec<StoredRecord>>;
    /// Records carrying `report_id`, highest version first.
    async fn find_records_by_report_id(&self, report_id: i64) -> Result<Vec<StoredRecord>>;

    // Polling job operations
    async fn create_job(&self, job: &mut PollingJob) -> Result<()>;
    async fn save_job(&self, job: &PollingJob) -> Result<()>;
    async fn find_jobs_by_status(&self, status: JobStatus) -> Result<Vec<PollingJob>>;
    /// Jobs owned by `record_key`, newest first.
    async fn find_jobs_by_record(&self, record_key: Uuid) -> Result<Vec<PollingJob>>;

    // History operations
    async fn append_history(&self, entry: &mut HistoryEntry) -> Result<()>;
    async fn history_for_report(&self, report_id: i64) -> Result<Vec<HistoryEntry>>;
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| SyncError::Storage(format!("{} lock poisoned", what)))
}

/// In-memory storage implementation for development/testing
pub struct InMemoryStorage {
    next_report_id: AtomicI64,
    records: Arc<Mutex<HashMap<Uuid, StoredRecord>>>,
    jobs: Arc<Mutex<Vec<PollingJob>>>,
    history: Arc<Mutex<Vec<HistoryEntry>>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::with_first_report_id(1)
    }

    pub fn with_first_report_id(first: i64) -> Self {
        Self {
            next_report_id: AtomicI64::new(first),
            records: Arc::new(Mutex::new(HashMap::new())),
            jobs: Arc::new(Mutex::new(Vec::new())),
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn all_jobs(&self) -> Vec<PollingJob> {
        self.jobs.lock().map(|j| j.clone()).unwrap_or_default()
    }

    pub fn all_history(&self) -> Vec<HistoryEntry> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn allocate_report_id(&self) -> Result<i64> {
        Ok(self.next_report_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn create_record(&self, record: &mut StoredRecord) -> Result<()> {
        let key = Uuid::new_v4();
        record.key = Some(key);

        let mut records = lock(&self.records, "records")?;
        records.insert(key, record.clone());

        debug!("Created record for report {} with key {}", record.report_id, key);
        Ok(())
    }

    async fn save_record(&self, record: &StoredRecord) -> Result<()> {
        let key = record
            .key
            .ok_or_else(|| SyncError::Storage("Cannot save record without key".to_string()))?;

        let mut records = lock(&self.records, "records")?;
        records.insert(key, record.clone());

        debug!("Saved record {} at version {}", key, record.version);
        Ok(())
    }

    async fn get_record(&self, key: Uuid) -> Result<Option<StoredRecord>> {
        let records = lock(&self.records, "records")?;
        Ok(records.get(&key).cloned())
    }

    async fn find_records_by_identifier(&self, encoded: &str) -> Result<Vec<StoredRecord>> {
        let needle = encoded.to_lowercase();
        let records = lock(&self.records, "records")?;
        let mut found: Vec<StoredRecord> = records
            .values()
            .filter(|r| r.patient_identifiers.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }

    async fn find_records_by_report_id(&self, report_id: i64) -> Result<Vec<StoredRecord>> {
        let records = lock(&self.records, "records")?;
        let mut found: Vec<StoredRecord> = records
            .values()
            .filter(|r| r.report_id == report_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(found)
    }

    async fn create_job(&self, job: &mut PollingJob) -> Result<()> {
        let id = Uuid::new_v4();
        job.id = Some(id);

        let mut jobs = lock(&self.jobs, "jobs")?;
        jobs.push(job.clone());

        debug!("Created job {} for record {}", id, job.record_key);
        Ok(())
    }

    async fn save_job(&self, job: &PollingJob) -> Result<()> {
        let id = job
            .id
            .ok_or_else(|| SyncError::Storage("Cannot save job without ID".to_string()))?;

        let mut jobs = lock(&self.jobs, "jobs")?;
        match jobs.iter_mut().find(|j| j.id == Some(id)) {
            Some(existing) => *existing = job.clone(),
            None => jobs.push(job.clone()),
        }

        debug!("Saved job {} with status {}", id, job.status);
        Ok(())
    }

    async fn find_jobs_by_status(&self, status: JobStatus) -> Result<Vec<PollingJob>> {
        let jobs = lock(&self.jobs, "jobs")?;
        Ok(jobs.iter().filter(|j| j.status == status).cloned().collect())
    }

    async fn find_jobs_by_record(&self, record_key: Uuid) -> Result<Vec<PollingJob>> {
        let jobs = lock(&self.jobs, "jobs")?;
        Ok(jobs
            .iter()
            .rev()
            .filter(|j| j.record_key == record_key)
            .cloned()
            .collect())
    }

    async fn append_history(&self, entry: &mut HistoryEntry) -> Result<()> {
        let id = Uuid::new_v4();
        entry.id = Some(id);

        let mut history = lock(&self.history, "history")?;
        history.push(entry.clone());

        debug!("Appended history entry {} for report {:?}", id, entry.report_id);
        Ok(())
    }

    async fn history_for_report(&self, report_id: i64) -> Result<Vec<HistoryEntry>> {
        let history = lock(&self.history, "history")?;
        Ok(history
            .iter()
            .filter(|h| h.report_id == Some(report_id))
            .cloned()
            .collect())
    }
}
