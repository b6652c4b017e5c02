use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::CaseStatus;

pub const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    Validation,
    NotFound,
    Transient,
    Aggregate,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, rename = "pageErrors", skip_serializing_if = "Vec::is_empty")]
    pub page_errors: Vec<ErrorEntry>,
}

/// Payload attached to a failed remote call. The shapes mirror what record
/// services return: a list of field errors, or one object with a message
/// and/or page-level errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorBody {
    Entries(Vec<ErrorEntry>),
    Detail(ErrorDetail),
    Other(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub kind: RemoteErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            body: Some(ErrorBody::Detail(ErrorDetail {
                message: Some(message.into()),
                page_errors: Vec::new(),
            })),
            message: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Transient,
            body: None,
            message: Some(message.into()),
        }
    }

    /// Folds the failures of a fan-out batch into one error whose body lists
    /// every sub-failure.
    pub fn aggregate(failures: &[RemoteError]) -> Self {
        Self {
            kind: RemoteErrorKind::Aggregate,
            body: Some(ErrorBody::Entries(
                failures
                    .iter()
                    .map(|failure| ErrorEntry::new(normalize_error(failure)))
                    .collect(),
            )),
            message: Some(format!("{} request(s) failed", failures.len())),
        }
    }

    pub fn normalized(&self) -> String {
        normalize_error(self)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, normalize_error(self))
    }
}

impl std::error::Error for RemoteError {}

fn join_messages(entries: &[ErrorEntry]) -> Option<String> {
    let joined = entries
        .iter()
        .filter_map(|entry| entry.message.as_deref())
        .filter(|message| !message.is_empty())
        .collect::<Vec<_>>()
        .join("; ");
    (!joined.is_empty()).then_some(joined)
}

/// Reduces any remote failure to the single line shown to the user.
pub fn normalize_error(error: &RemoteError) -> String {
    match &error.body {
        Some(ErrorBody::Entries(entries)) => {
            if let Some(joined) = join_messages(entries) {
                return joined;
            }
        }
        Some(ErrorBody::Detail(detail)) => {
            if let Some(message) = &detail.message {
                return message.clone();
            }
            if let Some(joined) = join_messages(&detail.page_errors) {
                return joined;
            }
        }
        Some(ErrorBody::Other(_)) | None => {}
    }

    match &error.message {
        Some(message) => message.clone(),
        None => UNKNOWN_ERROR.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    #[error("unknown case status '{0}'")]
    Unknown(String),
    #[error("case status cannot move from {from} back to {to}")]
    Backward { from: CaseStatus, to: CaseStatus },
}
