//! JSON shapes exchanged with the PACER index service and job endpoints.

use crate::constants::{JOB_NAME_PREFIX, JOB_NAME_TIME_FORMAT, JOB_TYPE_ECR};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One patient in an outbound job request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListElement {
    pub record_id: i64,
    pub reference_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub lab_order_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub name: String,
    pub job_type: String,
    pub list_elements: Vec<ListElement>,
}

impl JobRequest {
    pub fn new(at: DateTime<Utc>, list_elements: Vec<ListElement>) -> Self {
        Self {
            name: format!("{}{}", JOB_NAME_PREFIX, at.format(JOB_NAME_TIME_FORMAT)),
            job_type: JOB_TYPE_ECR.to_string(),
            list_elements,
        }
    }
}

/// Raw answer from a job endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct PacerResponse {
    pub status: u16,
    pub body: String,
}

impl PacerResponse {
    pub fn is_success(&self) -> bool {
        self.status == 200 || self.status == 201
    }

    /// `[]` means the remote found no data for the request.
    pub fn is_empty_result(&self) -> bool {
        self.body.trim() == "[]"
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexResponse {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub list: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub pacer_source: Option<PacerSource>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacerSource {
    #[serde(rename = "type", default)]
    pub source_type: String,
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub security: Option<SourceSecurity>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceSecurity {
    #[serde(rename = "type", default)]
    pub security_type: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}
