//! Field-level reconciliation of an incoming case report into a stored one.
//!
//! Scalars are overwritten only by non-blank incoming values, lists
//! accumulate without duplicates, and nothing present only on the stored side
//! is ever dropped. Applying the same incoming report twice leaves the content
//! exactly as after the first application.

use super::report::{CaseReport, Facility, LabOrderCode, Name, Patient, Provider, TypeableId};

/// In-place merge of `incoming` onto `self`.
pub trait Merge {
    fn merge(&mut self, incoming: &Self);
}

/// Outcome of probing a list for an entry equal to a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    Found(usize),
    NotFound,
}

/// Full linear scan; sorted order alone is not trusted to place equal entries
/// next to each other.
pub fn find_equal<T: PartialEq>(items: &[T], candidate: &T) -> MatchResult {
    match items.iter().position(|item| item == candidate) {
        Some(index) => MatchResult::Found(index),
        None => MatchResult::NotFound,
    }
}

fn overwrite(target: &mut String, incoming: &str) {
    if !incoming.trim().is_empty() && target.as_str() != incoming {
        *target = incoming.to_string();
    }
}

fn overwrite_opt(target: &mut Option<String>, incoming: &Option<String>) {
    if let Some(value) = incoming {
        if !value.trim().is_empty() {
            *target = Some(value.clone());
        }
    }
}

fn overwrite_id(target: &mut TypeableId, incoming: &TypeableId) {
    if incoming.is_complete() {
        *target = incoming.clone();
    }
}

fn merge_optional<T: Merge + Clone>(target: &mut Option<T>, incoming: &Option<T>) {
    match (target.as_mut(), incoming) {
        (Some(stored), Some(incoming)) => stored.merge(incoming),
        (None, Some(incoming)) => *target = Some(incoming.clone()),
        _ => {}
    }
}

fn accumulate<T: PartialEq + Clone>(target: &mut Vec<T>, incoming: &[T]) {
    for item in incoming {
        if find_equal(target, item) == MatchResult::NotFound {
            target.push(item.clone());
        }
    }
}

/// Merges later duplicates into their first occurrence.
fn collapse_duplicates<T: Merge + PartialEq>(items: &mut Vec<T>) {
    let mut kept: Vec<T> = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        match find_equal(&kept, &item) {
            MatchResult::Found(index) => kept[index].merge(&item),
            MatchResult::NotFound => kept.push(item),
        }
    }
    *items = kept;
}

/// Sort-then-match provider reconciliation.
pub fn reconcile_providers(stored: &mut Vec<Provider>, incoming: &[Provider]) {
    let mut incoming = incoming.to_vec();
    incoming.sort();
    stored.sort();
    collapse_duplicates(stored);

    for provider in &incoming {
        match find_equal(stored, provider) {
            MatchResult::Found(index) => stored[index].merge(provider),
            MatchResult::NotFound => stored.push(provider.clone()),
        }
    }
}

impl Merge for Provider {
    fn merge(&mut self, incoming: &Self) {
        overwrite_id(&mut self.id, &incoming.id);
        overwrite(&mut self.name, &incoming.name);
        overwrite(&mut self.phone, &incoming.phone);
        overwrite(&mut self.fax, &incoming.fax);
        overwrite(&mut self.email, &incoming.email);
        overwrite(&mut self.facility, &incoming.facility);
        overwrite(&mut self.address, &incoming.address);
        overwrite(&mut self.country, &incoming.country);
    }
}

impl Merge for Facility {
    fn merge(&mut self, incoming: &Self) {
        overwrite_id(&mut self.id, &incoming.id);
        overwrite(&mut self.name, &incoming.name);
        overwrite(&mut self.phone, &incoming.phone);
        overwrite(&mut self.address, &incoming.address);
        overwrite(&mut self.facility_type, &incoming.facility_type);
        overwrite(&mut self.hospital_unit, &incoming.hospital_unit);
    }
}

impl Merge for Name {
    fn merge(&mut self, incoming: &Self) {
        overwrite(&mut self.given, &incoming.given);
        overwrite(&mut self.family, &incoming.family);
    }
}

impl Merge for LabOrderCode {
    fn merge(&mut self, incoming: &Self) {
        overwrite(&mut self.system, &incoming.system);
        overwrite(&mut self.display, &incoming.display);
        overwrite_opt(&mut self.date, &incoming.date);
        accumulate(&mut self.laboratory_results, &incoming.laboratory_results);
    }
}

impl Merge for Patient {
    fn merge(&mut self, incoming: &Self) {
        let incoming_ids: Vec<TypeableId> = incoming
            .ids
            .iter()
            .filter(|id| !id.value.trim().is_empty())
            .cloned()
            .collect();
        accumulate(&mut self.ids, &incoming_ids);

        merge_optional(&mut self.name, &incoming.name);
        overwrite(&mut self.street_address, &incoming.street_address);
        overwrite(&mut self.birth_date, &incoming.birth_date);
        overwrite(&mut self.sex, &incoming.sex);

        // Lab orders with a code line up by code; uncoded ones by full equality.
        for order in &incoming.lab_order_code {
            let existing = if order.code.trim().is_empty() {
                find_equal(&self.lab_order_code, order)
            } else {
                match self.lab_order_code.iter().position(|o| o.code == order.code) {
                    Some(index) => MatchResult::Found(index),
                    None => MatchResult::NotFound,
                }
            };
            match existing {
                MatchResult::Found(index) => self.lab_order_code[index].merge(order),
                MatchResult::NotFound => self.lab_order_code.push(order.clone()),
            }
        }

        accumulate(&mut self.laboratory_results, &incoming.laboratory_results);
        accumulate(&mut self.diagnosis, &incoming.diagnosis);
    }
}

impl Merge for CaseReport {
    fn merge(&mut self, incoming: &Self) {
        reconcile_providers(&mut self.providers, &incoming.providers);
        merge_optional(&mut self.facility, &incoming.facility);
        merge_optional(&mut self.patient, &incoming.patient);
        accumulate(&mut self.notes, &incoming.notes);
        if incoming.sending_application.is_some() {
            self.sending_application = incoming.sending_application.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::CodedValue;

    fn provider(value: &str, name: &str) -> Provider {
        Provider::new(TypeableId::new("NPI", value), name)
    }

    fn report_with_notes(notes: &[&str]) -> CaseReport {
        CaseReport {
            notes: notes.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn notes_accumulate_without_duplicates() {
        let mut stored = report_with_notes(&["x"]);
        stored.merge(&report_with_notes(&["y"]));
        assert_eq!(stored.notes, vec!["x", "y"]);

        let mut stored = report_with_notes(&["x"]);
        stored.merge(&report_with_notes(&["x"]));
        assert_eq!(stored.notes, vec!["x"]);
    }

    #[test]
    fn provider_merge_is_idempotent() {
        let mut stored = CaseReport {
            providers: vec![provider("2", "B"), provider("1", "A")],
            ..Default::default()
        };
        let mut updated = provider("1", "A");
        updated.phone = "555-0100".to_string();
        let incoming = CaseReport {
            providers: vec![provider("3", "C"), updated, provider("3", "C")],
            ..Default::default()
        };

        stored.merge(&incoming);
        let once = stored.clone();
        stored.merge(&incoming);

        assert_eq!(stored, once);
        assert_eq!(stored.providers.len(), 3);
        let a = stored.providers.iter().find(|p| p.name == "A").unwrap();
        assert_eq!(a.phone, "555-0100");
    }

    #[test]
    fn stored_duplicates_are_collapsed() {
        let mut dup = provider("1", "A");
        dup.email = "a@example.org".to_string();
        let mut stored = vec![provider("1", "A"), provider("2", "B"), dup];
        reconcile_providers(&mut stored, &[]);
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].email, "a@example.org");
    }

    #[test]
    fn find_equal_scans_whole_list() {
        let items = vec![provider("9", "Z"), provider("1", "A")];
        assert_eq!(find_equal(&items, &provider("1", "A")), MatchResult::Found(1));
        assert_eq!(find_equal(&items, &provider("5", "Q")), MatchResult::NotFound);
    }

    #[test]
    fn patient_merge_preserves_stored_only_fields() {
        let mut stored = Patient {
            ids: vec![TypeableId::new("MRN", "1")],
            name: Some(Name {
                given: "Ada".into(),
                family: "Lovelace".into(),
            }),
            street_address: "1 Main St, Springfield 30332".into(),
            ..Default::default()
        };
        let incoming = Patient {
            ids: vec![TypeableId::new("SSN", "123"), TypeableId::new("MRN", "1")],
            name: Some(Name {
                given: "".into(),
                family: "King".into(),
            }),
            diagnosis: vec![CodedValue {
                code: "A01".into(),
                ..Default::default()
            }],
            ..Default::default()
        };

        stored.merge(&incoming);

        assert_eq!(stored.ids.len(), 2);
        let name = stored.name.as_ref().unwrap();
        assert_eq!(name.given, "Ada");
        assert_eq!(name.family, "King");
        assert_eq!(stored.street_address, "1 Main St, Springfield 30332");
        assert_eq!(stored.diagnosis.len(), 1);
    }

    #[test]
    fn lab_orders_merge_by_code() {
        let result = CodedValue {
            code: "94500-6".into(),
            display: "Glucose".into(),
            ..Default::default()
        };
        let mut stored = Patient {
            lab_order_code: vec![LabOrderCode {
                code: "94500-6".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let incoming = Patient {
            lab_order_code: vec![LabOrderCode {
                code: "94500-6".into(),
                display: "Glucose".into(),
                laboratory_results: vec![result.clone()],
                ..Default::default()
            }],
            ..Default::default()
        };
        stored.merge(&incoming);
        stored.merge(&incoming);
        assert_eq!(stored.lab_order_code.len(), 1);
        assert_eq!(stored.lab_order_code[0].display, "Glucose");
        assert_eq!(stored.lab_order_code[0].laboratory_results, vec![result]);
    }

    #[test]
    fn facility_and_sending_application_policies() {
        let mut stored = CaseReport {
            facility: Some(Facility {
                name: "General".into(),
                phone: "555".into(),
                ..Default::default()
            }),
            sending_application: Some("Old".into()),
            ..Default::default()
        };
        let incoming = CaseReport {
            facility: Some(Facility {
                name: "General Hospital".into(),
                ..Default::default()
            }),
            sending_application: Some("New".into()),
            ..Default::default()
        };
        stored.merge(&incoming);
        let facility = stored.facility.as_ref().unwrap();
        assert_eq!(facility.name, "General Hospital");
        assert_eq!(facility.phone, "555");
        assert_eq!(stored.sending_application.as_deref(), Some("New"));

        stored.merge(&CaseReport::default());
        assert_eq!(stored.sending_application.as_deref(), Some("New"));
    }
}
