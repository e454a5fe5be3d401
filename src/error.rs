use crate::job::JobStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("No matching case report: {0}")]
    NotFound(String),

    #[error("Ambiguous match: {count} case reports for {key}")]
    AmbiguousMatch { key: String, count: usize },

    #[error("Received with HTTP code with {status}")]
    RemoteRejection { status: u16 },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl SyncError {
    /// Job state a polling attempt lands in when it fails with this error.
    pub fn job_status(&self) -> Option<JobStatus> {
        match self {
            SyncError::RemoteRejection { .. } => Some(JobStatus::Warning),
            SyncError::Transport(_) | SyncError::Http(_) | SyncError::Json(_) => {
                Some(JobStatus::Error)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_maps_to_warning_and_transport_to_error() {
        assert_eq!(
            SyncError::RemoteRejection { status: 500 }.job_status(),
            Some(JobStatus::Warning)
        );
        assert_eq!(
            SyncError::Transport("timed out".into()).job_status(),
            Some(JobStatus::Error)
        );
        assert_eq!(SyncError::Validation("x".into()).job_status(), None);
    }

    #[test]
    fn rejection_message_mentions_status() {
        let msg = SyncError::RemoteRejection { status: 500 }.to_string();
        assert!(msg.contains("500"));
    }
}
