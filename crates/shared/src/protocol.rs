use serde::{Deserialize, Serialize};

use crate::domain::CaseId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationVariant {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub variant: NotificationVariant,
}

impl Notification {
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            variant: NotificationVariant::Success,
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            variant: NotificationVariant::Error,
        }
    }
}

/// Upward signals from the item units to the workflow coordinator. Every
/// signal carries the case it belongs to so listeners can ignore foreign
/// traffic on a shared bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WorkflowSignal {
    ItemsCountChanged { case_id: CaseId, count: usize },
    AddConfirmed { case_id: CaseId },
    AddCancelled { case_id: CaseId },
}

impl WorkflowSignal {
    pub fn case_id(&self) -> &CaseId {
        match self {
            Self::ItemsCountChanged { case_id, .. }
            | Self::AddConfirmed { case_id }
            | Self::AddCancelled { case_id } => case_id,
        }
    }
}
