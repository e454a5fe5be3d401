//! Bulk intake of staged flat patient files.
//!
//! Each data line is `idType,idValue[,code^display^date...]`. A line becomes a
//! minimal case report that is either stored as a new record or merged into
//! the single record already carrying that patient identifier. Every record
//! touched is (re-)armed for polling.

use crate::constants::{
    HISTORY_SOURCE_EHR, LOCAL_PROVIDER_NAME, LOCAL_PROVIDER_TYPE, LOCAL_PROVIDER_VALUE,
    LOINC_SYSTEM,
};
use crate::domain::{CaseReport, LabOrderCode, LabResult, Patient, Provider, TypeableId};
use crate::error::{Result, SyncError};
use crate::history::HistoryEntry;
use crate::locks::RecordLocks;
use crate::matching::{MatchOutcome, MatchResolver, MatchScope};
use crate::metrics::{self, MetricName};
use crate::record::StoredRecord;
use crate::scheduler::JobScheduler;
use crate::storage::Storage;
use chrono::Duration;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// One lab code seeded from a bulk line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoincEntry {
    pub code: String,
    pub display: String,
    pub date: Option<String>,
}

impl LoincEntry {
    /// `code^display^date`; display and date are optional.
    pub fn parse(field: &str) -> Self {
        let mut parts = field.split('^').map(str::trim);
        let code = parts.next().unwrap_or_default().to_string();
        let display = parts.next().unwrap_or_default().to_string();
        let date = parts.next().filter(|d| !d.is_empty()).map(String::from);
        Self {
            code,
            display,
            date,
        }
    }

    fn to_lab_result(&self) -> LabResult {
        LabResult {
            code: self.code.clone(),
            system: LOINC_SYSTEM.to_string(),
            display: self.display.clone(),
            date: self.date.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeLine {
    pub id_type: String,
    pub id_value: String,
    pub lab_codes: Vec<LoincEntry>,
}

impl IntakeLine {
    pub fn identifier(&self) -> TypeableId {
        TypeableId::new(self.id_type.clone(), self.id_value.clone())
    }

    /// Minimal report: one patient identifier, the local placeholder provider
    /// and one lab order per seeded lab code.
    pub fn to_report(&self) -> CaseReport {
        let mut patient = Patient {
            ids: vec![self.identifier()],
            ..Default::default()
        };
        for entry in &self.lab_codes {
            let result = entry.to_lab_result();
            patient.lab_order_code.push(LabOrderCode {
                code: result.code.clone(),
                system: result.system.clone(),
                display: result.display.clone(),
                date: result.date.clone(),
                laboratory_results: vec![result.clone()],
            });
            patient.laboratory_results.push(result);
        }

        CaseReport {
            providers: vec![Provider::new(
                TypeableId::new(LOCAL_PROVIDER_TYPE, LOCAL_PROVIDER_VALUE),
                LOCAL_PROVIDER_NAME,
            )],
            patient: Some(patient),
            ..Default::default()
        }
    }
}

/// Comment lines start with `#`, or carry `#` as their second character.
pub fn is_comment(line: &str) -> bool {
    let mut chars = line.chars();
    chars.next() == Some('#') || chars.next() == Some('#')
}

/// Lines are decoded one at a time so a bad byte only costs its own line.
fn decode_line(raw: &[u8]) -> Result<&str> {
    std::str::from_utf8(raw)
        .map_err(|e| SyncError::Validation(format!("line is not valid UTF-8: {}", e)))
}

/// Parses one raw line. Blank and comment lines yield `Ok(None)`; lines
/// without an identifier type and value are a `Validation` error.
pub fn parse_line(raw: &str) -> Result<Option<IntakeLine>> {
    let line = raw.trim();
    if line.is_empty() || is_comment(line) {
        return Ok(None);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(line.as_bytes());
    let record = match reader.records().next() {
        Some(record) => record.map_err(|e| SyncError::Validation(format!("malformed line: {}", e)))?,
        None => return Ok(None),
    };

    let id_type = record.get(0).unwrap_or_default();
    let id_value = record.get(1).unwrap_or_default();
    if record.len() < 2 || id_type.is_empty() || id_value.is_empty() {
        return Err(SyncError::Validation(format!(
            "not enough data ({})",
            line
        )));
    }

    let lab_codes = record
        .iter()
        .skip(2)
        .filter(|field| !field.is_empty())
        .map(LoincEntry::parse)
        .collect();
    Ok(Some(IntakeLine {
        id_type: id_type.to_string(),
        id_value: id_value.to_string(),
        lab_codes,
    }))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    Created { record_key: Uuid, report_id: i64 },
    Merged { record_key: Uuid, report_id: i64 },
    /// Several stored records carry the identifier; nothing was changed.
    Ambiguous { candidates: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeSummary {
    pub files: usize,
    pub lines: usize,
    pub created: usize,
    pub merged: usize,
    pub ambiguous: usize,
    pub skipped: usize,
}

impl AddAssign for IntakeSummary {
    fn add_assign(&mut self, other: Self) {
        self.files += other.files;
        self.lines += other.lines;
        self.created += other.created;
        self.merged += other.merged;
        self.ambiguous += other.ambiguous;
        self.skipped += other.skipped;
    }
}

pub struct BulkIntakeProcessor {
    storage: Arc<dyn Storage>,
    matcher: MatchResolver,
    scheduler: JobScheduler,
    locks: RecordLocks,
}

impl BulkIntakeProcessor {
    pub fn new(storage: Arc<dyn Storage>, locks: RecordLocks, rearm_interval: Duration) -> Self {
        Self {
            matcher: MatchResolver::new(storage.clone()),
            scheduler: JobScheduler::new(storage.clone(), rearm_interval),
            storage,
            locks,
        }
    }

    /// Stores or merges one parsed line and re-arms the record's polling job.
    pub async fn ingest(&self, line: &IntakeLine) -> Result<IntakeOutcome> {
        let incoming = line.to_report();
        let resolution = self
            .matcher
            .resolve(&incoming, MatchScope::IdentifiersOnly)
            .await?;

        let (record_key, outcome) = match resolution.outcome {
            MatchOutcome::NoMatch => {
                let report_id = self.storage.allocate_report_id().await?;
                let mut record = StoredRecord::new(incoming, report_id);
                self.storage.create_record(&mut record).await?;
                let record_key = record
                    .key
                    .ok_or_else(|| SyncError::Storage("created record has no key".to_string()))?;
                metrics::increment(MetricName::RecordsCreated);
                debug!("Created report {} for {}|{}", report_id, line.id_type, line.id_value);
                (
                    record_key,
                    IntakeOutcome::Created {
                        record_key,
                        report_id,
                    },
                )
            }
            MatchOutcome::SingleMatch(matched) => {
                let record_key = matched
                    .key
                    .ok_or_else(|| SyncError::Storage("matched record has no key".to_string()))?;
                let _guard = self.locks.acquire(record_key).await;
                let mut record = self
                    .storage
                    .get_record(record_key)
                    .await?
                    .unwrap_or(matched);
                record.update(&incoming);
                self.storage.save_record(&record).await?;
                metrics::increment(MetricName::RecordsMerged);
                debug!("Merged bulk line into report {}", record.report_id);
                (
                    record_key,
                    IntakeOutcome::Merged {
                        record_key,
                        report_id: record.report_id,
                    },
                )
            }
            MatchOutcome::MultiMatch(records) => {
                let key = resolution.matched_identifier.unwrap_or_default();
                let msg = format!(
                    "Multiple ({}) ECR Data sets detected for patientID = {}.\nWe are not updating anything since we do not know which to update.",
                    records.len(),
                    key
                );
                let e = SyncError::AmbiguousMatch {
                    key,
                    count: records.len(),
                };
                warn!("{}", e);
                metrics::increment(MetricName::MatchesAmbiguous);
                let mut entry = HistoryEntry::new(
                    incoming,
                    records.first().map(|r| r.report_id),
                    None,
                    msg,
                    HISTORY_SOURCE_EHR,
                );
                self.storage.append_history(&mut entry).await?;
                return Ok(IntakeOutcome::Ambiguous {
                    candidates: records.len(),
                });
            }
        };

        self.scheduler.arm_for_record(record_key).await?;
        Ok(outcome)
    }

    /// Consumes every line of `path`, then deletes the file. A file that
    /// cannot be read is left in place.
    pub async fn process_file(&self, path: &Path) -> Result<IntakeSummary> {
        let contents = tokio::fs::read(path).await?;
        let mut summary = IntakeSummary {
            files: 1,
            ..Default::default()
        };

        let mut data_line = 0;
        for raw in contents.split(|b| *b == b'\n') {
            let parsed = match decode_line(raw).and_then(parse_line) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => continue,
                Err(e) => {
                    data_line += 1;
                    warn!("Line #{} {}. Skipping.", data_line, e);
                    summary.skipped += 1;
                    metrics::increment(MetricName::IntakeLinesSkipped);
                    continue;
                }
            };
            data_line += 1;
            summary.lines += 1;
            metrics::increment(MetricName::IntakeLines);

            match self.ingest(&parsed).await {
                Ok(IntakeOutcome::Created { .. }) => summary.created += 1,
                Ok(IntakeOutcome::Merged { .. }) => summary.merged += 1,
                Ok(IntakeOutcome::Ambiguous { .. }) => summary.ambiguous += 1,
                Err(e) => {
                    error!("Line #{} could not be ingested: {}", data_line, e);
                    summary.skipped += 1;
                }
            }
        }

        tokio::fs::remove_file(path).await?;
        metrics::increment(MetricName::IntakeFilesConsumed);
        info!(
            "Consumed {}: {} line(s), {} created, {} merged",
            path.display(),
            summary.lines,
            summary.created,
            summary.merged
        );
        Ok(summary)
    }

    /// Sweeps every regular file under `dir`, recursively. The directory is
    /// created when missing.
    pub async fn process_dir(&self, dir: &Path) -> Result<IntakeSummary> {
        if !tokio::fs::try_exists(dir).await? {
            tokio::fs::create_dir_all(dir).await?;
            info!("Created bulk intake directory {}", dir.display());
        }

        let mut summary = IntakeSummary::default();
        for file in collect_files(dir).await? {
            let span = info_span!("intake_file", path = %file.display());
            match self.process_file(&file).instrument(span).await {
                Ok(file_summary) => summary += file_summary,
                Err(e) => error!("Failed to read {}: {}", file.display(), e),
            }
        }
        Ok(summary)
    }
}

async fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use crate::storage::InMemoryStorage;

    fn processor(storage: Arc<InMemoryStorage>) -> BulkIntakeProcessor {
        BulkIntakeProcessor::new(storage, RecordLocks::new(), Duration::seconds(120))
    }

    #[test]
    fn comment_rules() {
        assert!(is_comment("# header"));
        assert!(is_comment("1# odd"));
        assert!(!is_comment("MRN,1"));
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("  #MRN,1").unwrap(), None);
    }

    #[test]
    fn parses_identifier_and_lab_codes() {
        let line = parse_line("MRN, 12345 ,94500-6^Glucose^2024-01-01,1234-5")
            .unwrap()
            .unwrap();
        assert_eq!(line.id_type, "MRN");
        assert_eq!(line.id_value, "12345");
        assert_eq!(
            line.lab_codes,
            vec![
                LoincEntry {
                    code: "94500-6".into(),
                    display: "Glucose".into(),
                    date: Some("2024-01-01".into()),
                },
                LoincEntry {
                    code: "1234-5".into(),
                    display: String::new(),
                    date: None,
                },
            ]
        );
    }

    #[test]
    fn invalid_utf8_line_is_a_validation_error() {
        let err = decode_line(b"MRN,caf\xe9").and_then(parse_line).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(decode_line(b"MRN,1\r").unwrap(), "MRN,1\r");
    }

    #[test]
    fn short_lines_are_rejected() {
        assert!(matches!(parse_line("MRN"), Err(SyncError::Validation(_))));
        assert!(matches!(parse_line("MRN,"), Err(SyncError::Validation(_))));
    }

    #[test]
    fn report_carries_local_provider_and_labs() {
        let line = parse_line("MRN,1,94500-6^Glucose").unwrap().unwrap();
        let report = line.to_report();
        assert_eq!(report.providers[0].name, "LOCAL PROVIDER");
        assert_eq!(report.providers[0].id, TypeableId::new("LOCAL_PROVIDER", "1"));
        let patient = report.patient.unwrap();
        assert_eq!(patient.lab_order_code.len(), 1);
        assert_eq!(patient.lab_order_code[0].laboratory_results[0].system, "LN");
        assert_eq!(patient.laboratory_results.len(), 1);
    }

    #[tokio::test]
    async fn repeat_line_merges_into_existing_record() {
        let storage = Arc::new(InMemoryStorage::new());
        let intake = processor(storage.clone());

        let first = parse_line("MRN,1,94500-6^Glucose").unwrap().unwrap();
        let created = intake.ingest(&first).await.unwrap();
        let second = parse_line("MRN,1,2345-7^Glucose serum").unwrap().unwrap();
        let merged = intake.ingest(&second).await.unwrap();

        let (IntakeOutcome::Created { record_key, .. }, IntakeOutcome::Merged { record_key: merged_key, .. }) =
            (created, merged)
        else {
            panic!("expected create then merge");
        };
        assert_eq!(record_key, merged_key);
        assert_eq!(storage.record_count(), 1);

        let record = storage.get_record(record_key).await.unwrap().unwrap();
        assert_eq!(record.version, 2);
        assert_eq!(record.report.patient.unwrap().lab_order_code.len(), 2);
        assert_eq!(record.report.providers.len(), 1);

        let jobs = storage.all_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Running);
    }

    #[tokio::test]
    async fn ambiguous_identifier_is_refused() {
        let storage = Arc::new(InMemoryStorage::new());
        for report_id in [1, 2] {
            let line = parse_line("MRN,dup").unwrap().unwrap();
            let mut record = StoredRecord::new(line.to_report(), report_id);
            storage.create_record(&mut record).await.unwrap();
        }
        let intake = processor(storage.clone());

        let line = parse_line("MRN,dup,94500-6").unwrap().unwrap();
        let outcome = intake.ingest(&line).await.unwrap();

        assert_eq!(outcome, IntakeOutcome::Ambiguous { candidates: 2 });
        assert!(storage.all_jobs().is_empty());
        assert_eq!(storage.all_history().len(), 1);
    }
}
