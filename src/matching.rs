use crate::domain::identifier;
use crate::domain::CaseReport;
use crate::error::Result;
use crate::record::StoredRecord;
use crate::storage::Storage;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    NoMatch,
    SingleMatch(StoredRecord),
    MultiMatch(Vec<StoredRecord>),
}

impl MatchOutcome {
    fn from_records(mut records: Vec<StoredRecord>) -> Self {
        match records.len() {
            0 => MatchOutcome::NoMatch,
            1 => MatchOutcome::SingleMatch(records.remove(0)),
            _ => MatchOutcome::MultiMatch(records),
        }
    }
}

/// Which lookups a resolution may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchScope {
    /// Patient identifiers only (bulk intake never carries a report ID).
    IdentifiersOnly,
    /// Patient identifiers, then the report ID carried by the incoming report.
    IdentifiersThenReportId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub outcome: MatchOutcome,
    /// Encoded identifier that produced the hit, if the hit came from one.
    pub matched_identifier: Option<String>,
}

/// Finds the stored records an incoming report could apply to.
pub struct MatchResolver {
    storage: Arc<dyn Storage>,
}

impl MatchResolver {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn resolve(&self, incoming: &CaseReport, scope: MatchScope) -> Result<Resolution> {
        for id in incoming.patient_ids().iter().filter(|id| id.is_complete()) {
            let encoded = identifier::encode_id(id);
            let records = self.storage.find_records_by_identifier(&encoded).await?;
            if !records.is_empty() {
                info!(
                    "Found {} case(s) with patient ID ({}) in ECR DB",
                    records.len(),
                    encoded
                );
                return Ok(Resolution {
                    outcome: MatchOutcome::from_records(records),
                    matched_identifier: Some(encoded),
                });
            }
        }

        if scope == MatchScope::IdentifiersThenReportId {
            if let Some(report_id) = incoming.report_number() {
                let records = self.storage.find_records_by_report_id(report_id).await?;
                if !records.is_empty() {
                    info!("Found case data with requested report id ({})", report_id);
                    // Report ID lookups yield versions of one report; the newest wins.
                    let newest = records.into_iter().take(1).collect();
                    return Ok(Resolution {
                        outcome: MatchOutcome::from_records(newest),
                        matched_identifier: None,
                    });
                }
            }
        }

        debug!("No stored case report matches incoming report {:?}", incoming.report_id);
        Ok(Resolution {
            outcome: MatchOutcome::NoMatch,
            matched_identifier: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Patient, TypeableId};
    use crate::storage::InMemoryStorage;

    fn report(ids: Vec<TypeableId>, report_id: Option<&str>) -> CaseReport {
        CaseReport {
            report_id: report_id.map(String::from),
            patient: Some(Patient {
                ids,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    async fn seed(storage: &InMemoryStorage, ids: Vec<TypeableId>, report_id: i64) -> StoredRecord {
        let mut record = StoredRecord::new(report(ids, None), report_id);
        storage.create_record(&mut record).await.unwrap();
        record
    }

    #[tokio::test]
    async fn single_identifier_match() {
        let storage = Arc::new(InMemoryStorage::new());
        let stored = seed(&storage, vec![TypeableId::new("MRN", "1")], 1).await;
        let resolver = MatchResolver::new(storage.clone());

        let incoming = report(
            vec![TypeableId::new("", "ignored"), TypeableId::new("MRN", "1")],
            None,
        );
        let resolution = resolver
            .resolve(&incoming, MatchScope::IdentifiersThenReportId)
            .await
            .unwrap();
        assert_eq!(resolution.outcome, MatchOutcome::SingleMatch(stored));
        assert_eq!(resolution.matched_identifier.as_deref(), Some("MRN|1"));
    }

    #[tokio::test]
    async fn shared_identifier_is_multi_match_without_mutation() {
        let storage = Arc::new(InMemoryStorage::new());
        let a = seed(&storage, vec![TypeableId::new("MRN", "42")], 1).await;
        let b = seed(&storage, vec![TypeableId::new("MRN", "42"), TypeableId::new("SSN", "9")], 2).await;
        let resolver = MatchResolver::new(storage.clone());

        let incoming = report(vec![TypeableId::new("MRN", "42")], None);
        let resolution = resolver
            .resolve(&incoming, MatchScope::IdentifiersOnly)
            .await
            .unwrap();
        match resolution.outcome {
            MatchOutcome::MultiMatch(records) => assert_eq!(records.len(), 2),
            other => panic!("expected multi match, got {:?}", other),
        }

        let after_a = storage.get_record(a.key.unwrap()).await.unwrap().unwrap();
        let after_b = storage.get_record(b.key.unwrap()).await.unwrap().unwrap();
        assert_eq!(after_a, a);
        assert_eq!(after_b, b);
    }

    #[tokio::test]
    async fn falls_back_to_report_id_only_when_allowed() {
        let storage = Arc::new(InMemoryStorage::new());
        let stored = seed(&storage, vec![TypeableId::new("MRN", "1")], 77).await;
        let resolver = MatchResolver::new(storage.clone());

        let incoming = report(vec![TypeableId::new("MRN", "other")], Some("77"));
        let with_fallback = resolver
            .resolve(&incoming, MatchScope::IdentifiersThenReportId)
            .await
            .unwrap();
        assert_eq!(with_fallback.outcome, MatchOutcome::SingleMatch(stored));
        assert!(with_fallback.matched_identifier.is_none());

        let without = resolver
            .resolve(&incoming, MatchScope::IdentifiersOnly)
            .await
            .unwrap();
        assert_eq!(without.outcome, MatchOutcome::NoMatch);
    }

    #[tokio::test]
    async fn nothing_matches() {
        let storage = Arc::new(InMemoryStorage::new());
        let resolver = MatchResolver::new(storage);
        let incoming = report(vec![TypeableId::new("MRN", "1")], Some("5"));
        let resolution = resolver
            .resolve(&incoming, MatchScope::IdentifiersThenReportId)
            .await
            .unwrap();
        assert_eq!(resolution.outcome, MatchOutcome::NoMatch);
    }
}
