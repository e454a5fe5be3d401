//! Flat matching-string encoding of typed patient identifiers.
//!
//! A single identifier encodes as `type|value`; a list joins those with `^`.
//! Both separators are matched literally, never as patterns. Values that
//! themselves contain `|` or `^` do not survive a round trip.

use super::report::TypeableId;
use tracing::warn;

pub const TYPE_VALUE_SEPARATOR: char = '|';
pub const LIST_SEPARATOR: char = '^';

/// `trim(type)|trim(value)`, or an empty string when the value is blank.
pub fn encode(id_type: Option<&str>, value: Option<&str>) -> String {
    let value = match value {
        Some(v) if !v.trim().is_empty() => v.trim(),
        _ => {
            warn!("Patient identifier does not have a value");
            return String::new();
        }
    };
    let id_type = id_type.unwrap_or("").trim();
    format!("{}{}{}", id_type, TYPE_VALUE_SEPARATOR, value)
}

pub fn encode_id(id: &TypeableId) -> String {
    encode(Some(&id.id_type), Some(&id.value))
}

/// Joins every non-blank encoding with `^`, keeping input order.
pub fn encode_all<'a, I>(ids: I) -> String
where
    I: IntoIterator<Item = &'a TypeableId>,
{
    ids.into_iter()
        .map(encode_id)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(&LIST_SEPARATOR.to_string())
}

/// Splits on the first `|`. Both halves must be non-empty.
pub fn decode_one(s: &str) -> Option<TypeableId> {
    if s.is_empty() {
        return None;
    }
    let (id_type, value) = s.split_once(TYPE_VALUE_SEPARATOR)?;
    if id_type.is_empty() || value.is_empty() {
        return None;
    }
    Some(TypeableId::new(id_type, value))
}

/// Decodes a `^`-joined list, dropping segments that fail to decode.
pub fn decode_all(s: &str) -> Vec<TypeableId> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split(LIST_SEPARATOR).filter_map(decode_one).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_trims_and_joins() {
        assert_eq!(encode(Some(" MRN "), Some(" 12345 ")), "MRN|12345");
    }

    #[test]
    fn encode_blank_value_is_empty() {
        assert_eq!(encode(Some("MRN"), Some("   ")), "");
        assert_eq!(encode(Some("MRN"), None), "");
    }

    #[test]
    fn encode_missing_type_is_empty_prefix() {
        assert_eq!(encode(None, Some("7")), "|7");
    }

    #[test]
    fn encode_all_skips_blanks_in_order() {
        let ids = vec![
            TypeableId::new("A", "1"),
            TypeableId::new("", ""),
            TypeableId::new("B", "2"),
        ];
        assert_eq!(encode_all(&ids), "A|1^B|2");
        assert_eq!(encode_all(&[TypeableId::new("X", " ")]), "");
        assert_eq!(encode_all(&Vec::<TypeableId>::new()), "");
    }

    #[test]
    fn decode_one_round_trips_well_formed_pairs() {
        for (t, v) in [("MRN", "12345"), ("http://hl7.org/fhir/sid/us-ssn", "123-45-6789")] {
            let encoded = encode(Some(t), Some(v));
            assert_eq!(decode_one(&encoded), Some(TypeableId::new(t, v)));
        }
    }

    #[test]
    fn decode_one_rejects_malformed() {
        assert_eq!(decode_one(""), None);
        assert_eq!(decode_one("novalue"), None);
        assert_eq!(decode_one("|7"), None);
        assert_eq!(decode_one("MRN|"), None);
    }

    #[test]
    fn decode_all_drops_failures() {
        let ids = decode_all("A|1^broken^B|2");
        assert_eq!(ids, vec![TypeableId::new("A", "1"), TypeableId::new("B", "2")]);
        assert!(decode_all("").is_empty());
    }
}
