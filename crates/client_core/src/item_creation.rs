use shared::{
    domain::{fields, CaseId, FieldSet, ItemId},
    error::normalize_error,
    protocol::{Notification, WorkflowSignal},
};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{signals::SignalBus, WorkflowServices};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreationOutcome {
    Created(ItemId),
    Failed(String),
    Locked,
}

/// Add-item surface bound to one case. Handed out by the coordinator while
/// its add modal is open.
pub struct ItemCreationFlow {
    case_id: CaseId,
    services: WorkflowServices,
    signals: SignalBus,
    locked: watch::Receiver<bool>,
}

impl ItemCreationFlow {
    pub(crate) fn new(
        case_id: CaseId,
        services: WorkflowServices,
        signals: SignalBus,
        locked: watch::Receiver<bool>,
    ) -> Self {
        Self {
            case_id,
            services,
            signals,
            locked,
        }
    }

    pub fn case_id(&self) -> &CaseId {
        &self.case_id
    }

    /// The injected case link always replaces whatever the caller supplied.
    pub fn prepare_fields(&self, mut submitted: FieldSet) -> FieldSet {
        submitted.insert(fields::CASE_ID.into(), self.case_id.as_str().into());
        submitted
    }

    pub async fn submit(&self, submitted: FieldSet) -> CreationOutcome {
        if *self.locked.borrow() {
            warn!(case_id = %self.case_id, "add item: case is locked; create skipped");
            return CreationOutcome::Locked;
        }

        let record = self.prepare_fields(submitted);
        match self.services.records.create(record).await {
            Ok(id) => {
                info!(case_id = %self.case_id, item_id = %id, "add item: created");
                self.services
                    .notifier
                    .show(Notification::success("Added", "Item added"));
                self.signals
                    .emit(WorkflowSignal::AddConfirmed {
                        case_id: self.case_id.clone(),
                    })
                    .await;
                CreationOutcome::Created(ItemId(id))
            }
            Err(err) => {
                let message = normalize_error(&err);
                warn!(case_id = %self.case_id, "add item: create failed: {message}");
                self.services
                    .notifier
                    .show(Notification::error("Add failed", message.clone()));
                CreationOutcome::Failed(message)
            }
        }
    }

    pub async fn cancel(&self) {
        self.signals
            .emit(WorkflowSignal::AddCancelled {
                case_id: self.case_id.clone(),
            })
            .await;
    }
}

#[cfg(test)]
#[path = "tests/item_creation_tests.rs"]
mod tests;
