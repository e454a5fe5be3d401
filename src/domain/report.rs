use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A `(type, value)` pair naming a patient, provider or facility under some
/// identifier system.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeableId {
    #[serde(rename = "type", default)]
    pub id_type: String,
    #[serde(default)]
    pub value: String,
}

impl TypeableId {
    pub fn new(id_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id_type: id_type.into(),
            value: value.into(),
        }
    }

    /// Both parts carry something other than whitespace.
    pub fn is_complete(&self) -> bool {
        !self.id_type.trim().is_empty() && !self.value.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    #[serde(default)]
    pub given: String,
    #[serde(default)]
    pub family: String,
}

impl Name {
    pub fn is_empty(&self) -> bool {
        self.given.trim().is_empty() && self.family.trim().is_empty()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = format!("{} {}", self.given.trim(), self.family.trim());
        write!(f, "{}", full.trim())
    }
}

/// Coded clinical value (lab result, diagnosis).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodedValue {
    #[serde(rename = "Code", default)]
    pub code: String,
    #[serde(rename = "System", default)]
    pub system: String,
    #[serde(rename = "Display", default)]
    pub display: String,
    #[serde(rename = "Date", default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

pub type LabResult = CodedValue;
pub type Diagnosis = CodedValue;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabOrderCode {
    #[serde(rename = "Code", default)]
    pub code: String,
    #[serde(rename = "System", default)]
    pub system: String,
    #[serde(rename = "Display", default)]
    pub display: String,
    #[serde(rename = "Date", default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "Laboratory_Results", default)]
    pub laboratory_results: Vec<LabResult>,
}

impl LabOrderCode {
    /// Earliest date among the order itself and its results.
    pub fn earliest_date(&self) -> Option<&str> {
        self.date
            .iter()
            .chain(self.laboratory_results.iter().filter_map(|r| r.date.as_ref()))
            .map(|d| d.as_str())
            .filter(|d| !d.trim().is_empty())
            .min()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    #[serde(rename = "ID", default)]
    pub ids: Vec<TypeableId>,
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Name>,
    #[serde(rename = "Street_Address", default)]
    pub street_address: String,
    #[serde(rename = "Birth_Date", default)]
    pub birth_date: String,
    #[serde(rename = "Sex", default)]
    pub sex: String,
    #[serde(rename = "Lab_Order_Code", default)]
    pub lab_order_code: Vec<LabOrderCode>,
    #[serde(rename = "Laboratory_Results", default)]
    pub laboratory_results: Vec<LabResult>,
    #[serde(rename = "Diagnosis", default)]
    pub diagnosis: Vec<Diagnosis>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    #[serde(rename = "ID", default)]
    pub id: TypeableId,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Phone", default)]
    pub phone: String,
    #[serde(rename = "Address", default)]
    pub address: String,
    #[serde(rename = "Type", default)]
    pub facility_type: String,
    #[serde(rename = "Hospital_Unit", default)]
    pub hospital_unit: String,
}

/// Reporting provider. Equality, ordering and hashing look only at the
/// identifying fields (identifier, then name); contact details are payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Provider {
    #[serde(rename = "ID", default)]
    pub id: TypeableId,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Phone", default)]
    pub phone: String,
    #[serde(rename = "Fax", default)]
    pub fax: String,
    #[serde(rename = "Email", default)]
    pub email: String,
    #[serde(rename = "Facility", default)]
    pub facility: String,
    #[serde(rename = "Address", default)]
    pub address: String,
    #[serde(rename = "Country", default)]
    pub country: String,
}

impl Provider {
    pub fn new(id: TypeableId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Default::default()
        }
    }

    fn identity(&self) -> (&str, &str, &str) {
        (
            self.id.id_type.trim(),
            self.id.value.trim(),
            self.name.trim(),
        )
    }
}

impl PartialEq for Provider {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Provider {}

impl PartialOrd for Provider {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Provider {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl Hash for Provider {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

/// Electronic case report as exchanged with PACER endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(rename = "Status", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "StatusLog", default, skip_serializing_if = "Option::is_none")]
    pub status_log: Option<String>,
    #[serde(rename = "Provider", default)]
    pub providers: Vec<Provider>,
    #[serde(rename = "Facility", default, skip_serializing_if = "Option::is_none")]
    pub facility: Option<Facility>,
    #[serde(rename = "Patient", default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<Patient>,
    #[serde(
        rename = "Sending Application",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sending_application: Option<String>,
    #[serde(rename = "Notes", default)]
    pub notes: Vec<String>,
}

impl CaseReport {
    /// Numeric form of the report ID, when it carries one.
    pub fn report_number(&self) -> Option<i64> {
        self.report_id
            .as_deref()
            .and_then(|id| id.trim().parse::<i64>().ok())
    }

    pub fn patient_ids(&self) -> &[TypeableId] {
        self.patient.as_ref().map(|p| p.ids.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_equality_ignores_contact_details() {
        let mut a = Provider::new(TypeableId::new("NPI", "123"), "Dr. Who");
        let b = Provider::new(TypeableId::new("NPI", "123"), "Dr. Who");
        a.phone = "555-0100".to_string();
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn providers_order_by_identifier_then_name() {
        let a = Provider::new(TypeableId::new("NPI", "1"), "Zed");
        let b = Provider::new(TypeableId::new("NPI", "2"), "Alpha");
        let c = Provider::new(TypeableId::new("NPI", "2"), "Beta");
        let mut v = vec![c.clone(), a.clone(), b.clone()];
        v.sort();
        assert_eq!(v, vec![a, b, c]);
    }

    #[test]
    fn deserializes_ecr_document_keys() {
        let doc = r#"{
            "Id": "42",
            "Provider": [{"ID": {"type": "NPI", "value": "9"}, "Name": "Clinic"}],
            "Patient": {
                "ID": [{"type": "MRN", "value": "12345"}],
                "Name": {"given": "Ada", "family": "Lovelace"},
                "Diagnosis": [{"Code": "A01", "System": "ICD10"}]
            },
            "Sending Application": "EHR",
            "Notes": ["first"],
            "Unknown": true
        }"#;
        let report: CaseReport = serde_json::from_str(doc).unwrap();
        assert_eq!(report.report_number(), Some(42));
        assert_eq!(report.providers.len(), 1);
        assert_eq!(report.patient_ids()[0], TypeableId::new("MRN", "12345"));
        let name = report.patient.unwrap().name.unwrap();
        assert_eq!(name.to_string(), "Ada Lovelace");
        assert_eq!(report.sending_application.as_deref(), Some("EHR"));
    }

    #[test]
    fn earliest_lab_date_spans_results() {
        let order = LabOrderCode {
            date: Some("2024-03-01".into()),
            laboratory_results: vec![CodedValue {
                date: Some("2024-01-01".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(order.earliest_date(), Some("2024-01-01"));
    }
}
