use crate::domain::identifier;
use crate::domain::{CaseReport, Merge, TypeableId};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static ZIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{5})(?:-\d{4})?\b").expect("valid zip regex"));

/// First US ZIP code appearing in free-text address.
pub fn find_zip(address: &str) -> Option<String> {
    ZIP_RE
        .captures(address)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Stored case report plus the denormalized fields used to look it up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Surrogate storage key, assigned by the storage on first save.
    pub key: Option<Uuid>,
    pub report_id: i64,
    pub report: CaseReport,
    pub version: u32,
    pub patient_identifiers: String,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub zip_code: Option<String>,
    pub diagnosis_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl StoredRecord {
    /// New record around a fresh report; the report is stamped with `report_id`.
    pub fn new(mut report: CaseReport, report_id: i64) -> Self {
        report.report_id = Some(report_id.to_string());
        let now = Utc::now();
        let mut record = Self {
            key: None,
            report_id,
            report,
            version: 1,
            patient_identifiers: String::new(),
            last_name: None,
            first_name: None,
            zip_code: None,
            diagnosis_code: None,
            created_at: now,
            last_updated_at: now,
        };
        record.refresh_index();
        record
    }

    /// Audit copy of a prior version. The copy carries no storage key.
    pub fn snapshot(&self) -> Self {
        Self {
            key: None,
            ..self.clone()
        }
    }

    /// Merges `incoming` into the stored report, bumping version and timestamp.
    pub fn update(&mut self, incoming: &CaseReport) {
        self.version += 1;
        self.last_updated_at = Utc::now();
        self.report.merge(incoming);
        self.refresh_index();
    }

    pub fn typed_identifiers(&self) -> Vec<TypeableId> {
        identifier::decode_all(&self.patient_identifiers)
    }

    fn refresh_index(&mut self) {
        let Some(patient) = self.report.patient.as_ref() else {
            self.patient_identifiers = String::new();
            return;
        };
        self.patient_identifiers = identifier::encode_all(&patient.ids);
        if let Some(name) = &patient.name {
            if !name.family.is_empty() {
                self.last_name = Some(name.family.clone());
            }
            if !name.given.is_empty() {
                self.first_name = Some(name.given.clone());
            }
        }
        self.zip_code = find_zip(&patient.street_address);
        self.diagnosis_code = patient.diagnosis.first().map(|d| d.code.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CodedValue, Name, Patient};

    fn report() -> CaseReport {
        CaseReport {
            patient: Some(Patient {
                ids: vec![TypeableId::new("MRN", "12345"), TypeableId::new("SSN", " ")],
                name: Some(Name {
                    given: "Ada".into(),
                    family: "Lovelace".into(),
                }),
                street_address: "10 Downing St, Atlanta GA 30332-0001".into(),
                diagnosis: vec![CodedValue {
                    code: "A01".into(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn new_record_derives_index_fields() {
        let record = StoredRecord::new(report(), 7);
        assert_eq!(record.report.report_id.as_deref(), Some("7"));
        assert_eq!(record.version, 1);
        assert_eq!(record.patient_identifiers, "MRN|12345");
        assert_eq!(record.last_name.as_deref(), Some("Lovelace"));
        assert_eq!(record.first_name.as_deref(), Some("Ada"));
        assert_eq!(record.zip_code.as_deref(), Some("30332"));
        assert_eq!(record.diagnosis_code.as_deref(), Some("A01"));
        assert_eq!(record.created_at, record.last_updated_at);
    }

    #[test]
    fn update_bumps_version_once_and_reindexes() {
        let mut record = StoredRecord::new(report(), 7);
        let created = record.created_at;
        let incoming = CaseReport {
            patient: Some(Patient {
                ids: vec![TypeableId::new("urn:oid:1.2.3", "abc")],
                ..Default::default()
            }),
            ..Default::default()
        };
        record.update(&incoming);
        assert_eq!(record.version, 2);
        assert_eq!(record.created_at, created);
        assert_eq!(record.patient_identifiers, "MRN|12345^urn:oid:1.2.3|abc");
        assert_eq!(record.typed_identifiers().len(), 2);
    }

    #[test]
    fn snapshot_drops_key() {
        let mut record = StoredRecord::new(report(), 1);
        record.key = Some(Uuid::new_v4());
        let snap = record.snapshot();
        assert!(snap.key.is_none());
        assert_eq!(snap.report, record.report);
    }

    #[test]
    fn zip_lookup() {
        assert_eq!(find_zip("PO Box 1, 98101"), Some("98101".to_string()));
        assert_eq!(find_zip("no zip here"), None);
    }
}
