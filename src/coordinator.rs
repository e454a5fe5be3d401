use crate::app::ports::{IndexServicePort, PacerClientPort};
use crate::constants::{
    is_preferred_scheme, is_ssn_type, DEFAULT_LAB_ORDER_DATE, HISTORY_SOURCE_EHR, US_SSN_SYSTEM,
};
use crate::domain::identifier;
use crate::domain::{CaseReport, Patient};
use crate::endpoint::{EndpointResolver, ResolvedEndpoint};
use crate::error::{Result, SyncError};
use crate::history::HistoryEntry;
use crate::job::{JobStatus, PollingJob};
use crate::locks::RecordLocks;
use crate::matching::{MatchOutcome, MatchResolver, MatchScope};
use crate::metrics::{self, MetricName};
use crate::record::StoredRecord;
use crate::scheduler::JobScheduler;
use crate::storage::Storage;
use crate::wire::{JobRequest, ListElement};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::ops::AddAssign;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Picks the identifier sent as `referenceId`.
///
/// Blank values are skipped and a missing type counts as empty. SSN aliases
/// are rewritten to the US SSN system URI first. The first URI/URN/OID typed
/// identifier wins; otherwise the last usable one is used.
pub fn select_reference_id(patient: &Patient) -> Option<String> {
    let mut selected = None;
    for id in &patient.ids {
        if id.value.trim().is_empty() {
            continue;
        }
        let id_type = if is_ssn_type(&id.id_type) {
            US_SSN_SYSTEM
        } else {
            id.id_type.as_str()
        };
        let encoded = identifier::encode(Some(id_type), Some(&id.value));
        if encoded.is_empty() {
            continue;
        }
        selected = Some(encoded);
        if is_preferred_scheme(id_type) {
            break;
        }
    }
    selected
}

/// Earliest lab order date on the patient, or the fixed default.
pub fn lab_order_date(patient: &Patient) -> String {
    patient
        .lab_order_code
        .iter()
        .filter_map(|order| order.earliest_date())
        .min()
        .unwrap_or(DEFAULT_LAB_ORDER_DATE)
        .to_string()
}

/// Builds the outbound list element for a stored record, if it has a usable
/// patient identifier.
pub fn list_element_for(record: &StoredRecord) -> Option<ListElement> {
    let patient = record.report.patient.as_ref()?;
    let reference_id = select_reference_id(patient)?;
    Some(ListElement {
        record_id: record.report_id,
        reference_id,
        name: patient.name.as_ref().map(|n| n.to_string()),
        lab_order_date: lab_order_date(patient),
    })
}

#[derive(Debug, Clone)]
struct BatchEntry {
    job: PollingJob,
    record_key: Uuid,
    report_id: i64,
    last_known: CaseReport,
}

/// All due jobs routed to one endpoint during a pass.
#[derive(Debug, Clone)]
struct OutboundBatch {
    endpoint: String,
    auth_header: Option<String>,
    entries: Vec<BatchEntry>,
    elements: Vec<ListElement>,
}

impl OutboundBatch {
    fn new(endpoint: &ResolvedEndpoint) -> Self {
        Self {
            endpoint: endpoint.server_url.clone(),
            auth_header: endpoint.auth_header.clone(),
            entries: Vec::new(),
            elements: Vec::new(),
        }
    }

    fn entry_for_record(&self, record_key: Uuid) -> Option<&BatchEntry> {
        self.entries.iter().find(|e| e.record_key == record_key)
    }

    fn entry_for_report(&self, report_id: Option<i64>) -> Option<&BatchEntry> {
        let report_id = report_id?;
        self.entries.iter().find(|e| e.report_id == report_id)
    }
}

/// Counters describing one polling pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub jobs_due: usize,
    pub jobs_skipped: usize,
    pub batches: usize,
    pub applied: usize,
    pub empty_results: usize,
    pub rejected: usize,
    pub failed: usize,
    pub unmatched: usize,
    pub ambiguous: usize,
}

impl AddAssign for PassSummary {
    fn add_assign(&mut self, other: Self) {
        self.jobs_due += other.jobs_due;
        self.jobs_skipped += other.jobs_skipped;
        self.batches += other.batches;
        self.applied += other.applied;
        self.empty_results += other.empty_results;
        self.rejected += other.rejected;
        self.failed += other.failed;
        self.unmatched += other.unmatched;
        self.ambiguous += other.ambiguous;
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub rearm_interval: Duration,
    pub max_concurrent_batches: usize,
}

struct Inner {
    storage: Arc<dyn Storage>,
    scheduler: JobScheduler,
    matcher: MatchResolver,
    endpoints: EndpointResolver,
    client: Arc<dyn PacerClientPort>,
    locks: RecordLocks,
    permits: Arc<Semaphore>,
}

/// Runs polling passes: due jobs out, case reports back in.
#[derive(Clone)]
pub struct PollingCoordinator {
    inner: Arc<Inner>,
}

impl PollingCoordinator {
    pub fn new(
        storage: Arc<dyn Storage>,
        index: Arc<dyn IndexServicePort>,
        client: Arc<dyn PacerClientPort>,
        locks: RecordLocks,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                scheduler: JobScheduler::new(storage.clone(), settings.rearm_interval),
                matcher: MatchResolver::new(storage.clone()),
                endpoints: EndpointResolver::new(index),
                storage,
                client,
                locks,
                permits: Arc::new(Semaphore::new(settings.max_concurrent_batches.max(1))),
            }),
        }
    }

    /// One coordination pass. Per-job failures are logged and recorded to
    /// history; only failing to list due jobs aborts the pass.
    pub async fn run_pass(&self) -> Result<PassSummary> {
        metrics::increment(MetricName::PollingPasses);
        let now = Utc::now();
        let due = self.inner.scheduler.due_jobs(now).await?;
        let mut summary = PassSummary {
            jobs_due: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            debug!("No polling jobs due");
            return Ok(summary);
        }
        info!("Polling pass with {} due job(s)", due.len());

        let (batches, skipped) = self.inner.build_batches(due).await;
        summary.jobs_skipped = skipped;
        summary.batches = batches.len();

        let mut tasks = JoinSet::new();
        for batch in batches {
            let inner = self.inner.clone();
            let span = info_span!("batch", endpoint = %batch.endpoint, size = batch.entries.len());
            tasks.spawn(
                async move {
                    let _permit = inner.permits.clone().acquire_owned().await;
                    inner.dispatch(batch).await
                }
                .instrument(span),
            );
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => summary += outcome,
                Err(e) => error!("Batch task failed to complete: {}", e),
            }
        }

        info!(
            "Polling pass done: {} applied, {} empty, {} rejected, {} failed, {} skipped",
            summary.applied,
            summary.empty_results,
            summary.rejected,
            summary.failed,
            summary.jobs_skipped
        );
        Ok(summary)
    }
}

impl Inner {
    async fn build_batches(&self, due: Vec<PollingJob>) -> (Vec<OutboundBatch>, usize) {
        let mut batches: Vec<OutboundBatch> = Vec::new();
        let mut by_endpoint: HashMap<String, usize> = HashMap::new();
        let mut skipped = 0;

        for job in due {
            let record = match self.storage.get_record(job.record_key).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    warn!("No ECR Data for the outstanding ECR Job ({})", job.record_key);
                    skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!("Failed to load record {}: {}", job.record_key, e);
                    skipped += 1;
                    continue;
                }
            };

            if record.report.providers.is_empty() {
                warn!("No Providers for the outstanding ECR Job ({})", job.record_key);
                skipped += 1;
                continue;
            }

            let Some(endpoint) = self.endpoints.resolve(&record.report.providers).await else {
                let msg = format!(
                    "No PACER Job Manager Endpoint Found. Skipping ECRid: {}",
                    record.report_id
                );
                info!("{}", msg);
                metrics::increment(MetricName::EndpointsUnresolved);
                self.record_history(
                    record.report.clone(),
                    Some(record.report_id),
                    Some(job.status),
                    &msg,
                )
                .await;
                skipped += 1;
                continue;
            };

            let Some(element) = list_element_for(&record) else {
                warn!(
                    "Record {} has no usable patient identifier; not dispatched",
                    record.report_id
                );
                skipped += 1;
                continue;
            };

            let index = *by_endpoint
                .entry(endpoint.server_url.clone())
                .or_insert_with(|| {
                    batches.push(OutboundBatch::new(&endpoint));
                    batches.len() - 1
                });
            let batch = &mut batches[index];
            if batch.auth_header.is_none() {
                batch.auth_header = endpoint.auth_header.clone();
            }
            batch.elements.push(element);
            batch.entries.push(BatchEntry {
                record_key: job.record_key,
                report_id: record.report_id,
                last_known: record.report,
                job,
            });
        }

        (batches, skipped)
    }

    async fn dispatch(&self, batch: OutboundBatch) -> PassSummary {
        let mut summary = PassSummary::default();
        let request = JobRequest::new(Utc::now(), batch.elements.clone());
        metrics::increment(MetricName::BatchesDispatched);

        let started = std::time::Instant::now();
        let result = self
            .client
            .submit(&batch.endpoint, batch.auth_header.as_deref(), &request)
            .await;
        metrics::record_duration(MetricName::DispatchDuration, started.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                error!("Posting to PACER-server failed with an error: {}", e);
                summary.failed += self.fail_batch(&batch, &e).await;
                return summary;
            }
        };

        if !response.is_success() {
            let e = SyncError::RemoteRejection {
                status: response.status,
            };
            error!("{} from {}", e, batch.endpoint);
            summary.rejected += self.fail_batch(&batch, &e).await;
            return summary;
        }

        if response.is_empty_result() {
            info!("Patient does not exist or no data found");
            summary.empty_results += batch.entries.len();
            return summary;
        }

        let reports: Vec<CaseReport> = match serde_json::from_str(&response.body) {
            Ok(reports) => reports,
            Err(e) => {
                let e = SyncError::from(e);
                error!("Undecodable response from {}: {}", batch.endpoint, e);
                summary.failed += self.fail_batch(&batch, &e).await;
                return summary;
            }
        };
        info!("Received {} case report(s) from {}", reports.len(), batch.endpoint);

        for report in reports {
            if let Err(e) = self.apply_incoming(&batch, report, &mut summary).await {
                error!("Failed to apply incoming case report: {}", e);
                summary.failed += 1;
            }
        }
        summary
    }

    /// Moves every job in the batch to the state `e` maps to and records the
    /// failure against each record's last known report.
    async fn fail_batch(&self, batch: &OutboundBatch, e: &SyncError) -> usize {
        let status = e.job_status().unwrap_or(JobStatus::Error);
        match status {
            JobStatus::Warning => metrics::increment(MetricName::RemoteRejections),
            _ => metrics::increment(MetricName::TransportFailures),
        }
        let msg = e.to_string();

        for entry in &batch.entries {
            let mut job = entry.job.clone();
            if let Err(err) = self.scheduler.transition(&mut job, status).await {
                error!("Failed to update job for record {}: {}", entry.record_key, err);
            }
            let last_known = match self.storage.get_record(entry.record_key).await {
                Ok(Some(record)) => record.report,
                _ => entry.last_known.clone(),
            };
            self.record_history(last_known, Some(entry.report_id), Some(status), &msg)
                .await;
        }
        batch.entries.len()
    }

    async fn apply_incoming(
        &self,
        batch: &OutboundBatch,
        incoming: CaseReport,
        summary: &mut PassSummary,
    ) -> Result<()> {
        let resolution = self
            .matcher
            .resolve(&incoming, MatchScope::IdentifiersThenReportId)
            .await?;
        let patient_key = resolution.matched_identifier.clone().unwrap_or_default();
        let report_number = incoming.report_number();
        let dispatching_status = batch.entry_for_report(report_number).map(|e| e.job.status);

        match resolution.outcome {
            MatchOutcome::NoMatch => {
                if let Some(report_id) = report_number {
                    error!(
                        "Initial Case Report Not found for ecr id = {} and patientID = {}",
                        report_id, patient_key
                    );
                }
                let msg = format!("We could not locate the ECR for patientID = {}", patient_key);
                error!("{}", SyncError::NotFound(msg.clone()));
                metrics::increment(MetricName::MatchesMissing);
                summary.unmatched += 1;
                self.record_history(incoming, report_number, dispatching_status, &msg)
                    .await;
                Ok(())
            }
            MatchOutcome::MultiMatch(records) => {
                let e = SyncError::AmbiguousMatch {
                    key: patient_key.clone(),
                    count: records.len(),
                };
                let msg = format!(
                    "Multiple ({}) ECR Data sets detected for patientID = {}.\nWe are not updating anything since we do not know which to update.",
                    records.len(),
                    patient_key
                );
                warn!("{}", e);
                metrics::increment(MetricName::MatchesAmbiguous);
                summary.ambiguous += 1;
                let first_report_id = records.first().map(|r| r.report_id);
                self.record_history(incoming, first_report_id, dispatching_status, &msg)
                    .await;
                Ok(())
            }
            MatchOutcome::SingleMatch(matched) => {
                let key = matched
                    .key
                    .ok_or_else(|| SyncError::Storage("matched record has no key".to_string()))?;
                let record = {
                    let _guard = self.locks.acquire(key).await;
                    let mut record = self.storage.get_record(key).await?.unwrap_or(matched);
                    record.update(&incoming);
                    self.storage.save_record(&record).await?;
                    record
                };
                metrics::increment(MetricName::RecordsMerged);
                info!(
                    "Merged update into report {} (version {})",
                    record.report_id, record.version
                );

                let status = match batch.entry_for_record(key) {
                    Some(entry) => {
                        let mut job = entry.job.clone();
                        self.scheduler.transition(&mut job, JobStatus::Applied).await?;
                        Some(job.status)
                    }
                    None => self.scheduler.mark_applied(key).await?.map(|j| j.status),
                };
                summary.applied += 1;
                self.record_history(incoming, Some(record.report_id), status, "")
                    .await;
                Ok(())
            }
        }
    }

    async fn record_history(
        &self,
        report: CaseReport,
        report_id: Option<i64>,
        status: Option<JobStatus>,
        log: &str,
    ) {
        let mut entry = HistoryEntry::new(
            report,
            report_id,
            status.map(|s| s.code()),
            log,
            HISTORY_SOURCE_EHR,
        );
        if let Err(e) = self.storage.append_history(&mut entry).await {
            error!("Failed to append history for report {:?}: {}", report_id, e);
        }
    }
}
