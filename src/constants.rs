//! Shared constants for polling, intake and the remote wire format.

// Scheduling cadence (seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 120;
pub const DEFAULT_INTAKE_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_REARM_INTERVAL_SECS: u64 = 120;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 4;

// Remote job submission
pub const JOB_TYPE_ECR: &str = "ECR";
pub const JOB_NAME_PREFIX: &str = "STD_ECR_";
pub const JOB_NAME_TIME_FORMAT: &str = "%Y%m%d%H%M%S";
pub const DEFAULT_LAB_ORDER_DATE: &str = "2019-10-10";

// History entry source tag
pub const HISTORY_SOURCE_EHR: &str = "ehr";

// Placeholder provider attached to bulk-ingested reports
pub const LOCAL_PROVIDER_NAME: &str = "LOCAL PROVIDER";
pub const LOCAL_PROVIDER_TYPE: &str = "LOCAL_PROVIDER";
pub const LOCAL_PROVIDER_VALUE: &str = "1";

// Lab code system used for LOINC entries in bulk files
pub const LOINC_SYSTEM: &str = "LN";

// Patient identifier type normalization
pub const US_SSN_SYSTEM: &str = "http://hl7.org/fhir/sid/us-ssn";
pub const SSN_TYPE_ALIASES: [&str; 2] = ["SS", "SSN"];
pub const PREFERRED_ID_SCHEMES: [&str; 3] = ["http:", "urn:", "oid:"];

/// True when `id_type` names the US social security number under any alias.
pub fn is_ssn_type(id_type: &str) -> bool {
    SSN_TYPE_ALIASES
        .iter()
        .any(|alias| alias.eq_ignore_ascii_case(id_type.trim()))
}

/// True when `id_type` is a URI, URN or OID style identifier system.
pub fn is_preferred_scheme(id_type: &str) -> bool {
    PREFERRED_ID_SCHEMES
        .iter()
        .any(|scheme| id_type.starts_with(scheme))
}
