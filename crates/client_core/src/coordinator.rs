//! Top-level owner of one case workflow.
//!
//! The coordinator resolves the case id, folds three independently resolving
//! facts (case status, linked order, item count) into a [`WorkflowView`], and
//! drives the single forward transition it owns: `Open -> SubmittedToVendor`.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::{
    domain::{fields, CaseId, CaseStatus, FieldSet, OrderId, OrderRecord},
    error::normalize_error,
    protocol::{Notification, WorkflowSignal},
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    config::Settings, identity::CaseIdResolver, item_collection::ItemCollectionManager,
    item_creation::ItemCreationFlow,
    signals::{SignalBus, SignalSink},
    WorkflowServices,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowView {
    pub record_id: Option<CaseId>,
    pub case_status: Option<CaseStatus>,
    pub order_id: Option<OrderId>,
    pub order_number: Option<String>,
    pub items_count: usize,
    pub is_submitting: bool,
    pub add_modal_open: bool,
}

impl WorkflowView {
    pub fn is_locked(&self) -> bool {
        self.case_status.is_some_and(CaseStatus::is_locked)
    }

    pub fn has_order(&self) -> bool {
        self.order_id.is_some()
    }

    pub fn disable_submit(&self) -> bool {
        self.is_submitting || self.record_id.is_none() || self.items_count == 0
    }

    pub fn items_badge(&self) -> String {
        format!("Items: {}", self.items_count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Ignored,
    Submitted,
    Failed(String),
}

#[derive(Debug, Default)]
struct CoordinatorState {
    observed_status: Option<CaseStatus>,
    order: Option<OrderRecord>,
    items_count: usize,
    is_submitting: bool,
    add_modal_open: bool,
}

impl CoordinatorState {
    // A known order outranks a status read that has not caught up yet.
    fn effective_status(&self) -> Option<CaseStatus> {
        match (self.observed_status, self.order.is_some()) {
            (Some(status), true) => Some(status.max(CaseStatus::OrderCreated)),
            (None, true) => Some(CaseStatus::OrderCreated),
            (status, false) => status,
        }
    }

    // Status only moves forward; a stale read never regresses it.
    fn record_status(&mut self, status: CaseStatus) {
        self.observed_status = Some(match self.observed_status {
            Some(current) => current.max(status),
            None => status,
        });
    }

    fn view(&self, record_id: Option<&CaseId>) -> WorkflowView {
        WorkflowView {
            record_id: record_id.cloned(),
            case_status: self.effective_status(),
            order_id: self.order.as_ref().map(|order| order.id.clone()),
            order_number: self.order.as_ref().map(|order| order.order_number.clone()),
            items_count: self.items_count,
            is_submitting: self.is_submitting,
            add_modal_open: self.add_modal_open,
        }
    }
}

struct SubmittingGuard<'a> {
    state: &'a Mutex<CoordinatorState>,
}

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().is_submitting = false;
    }
}

pub struct WorkflowCoordinator {
    resolver: CaseIdResolver,
    services: WorkflowServices,
    signals: SignalBus,
    lock_tx: watch::Sender<bool>,
    items: Arc<ItemCollectionManager>,
    state: Mutex<CoordinatorState>,
}

impl WorkflowCoordinator {
    pub fn new(
        services: WorkflowServices,
        explicit_id: Option<CaseId>,
        settings: &Settings,
    ) -> Arc<Self> {
        let resolver = CaseIdResolver::new(
            explicit_id,
            Arc::clone(&services.navigation),
            settings.navigation_param.clone(),
        );
        let case_id = resolver.resolve().cloned();

        Arc::new_cyclic(|this: &Weak<Self>| {
            let parent: Weak<dyn SignalSink> = this.clone();
            let signals = SignalBus::new(settings.signal_capacity).with_parent(parent);
            let (lock_tx, lock_rx) = watch::channel(false);
            let items =
                ItemCollectionManager::new(case_id, services.clone(), signals.clone(), lock_rx);

            Self {
                resolver,
                services,
                signals,
                lock_tx,
                items,
                state: Mutex::new(CoordinatorState::default()),
            }
        })
    }

    pub fn record_id(&self) -> Option<&CaseId> {
        self.resolver.resolve()
    }

    pub fn signals(&self) -> &SignalBus {
        &self.signals
    }

    pub fn items(&self) -> &Arc<ItemCollectionManager> {
        &self.items
    }

    pub fn view(&self) -> WorkflowView {
        self.state.lock().view(self.record_id())
    }

    fn publish_lock(&self) {
        let locked = self.view().is_locked();
        self.lock_tx.send_if_modified(|current| {
            let changed = *current != locked;
            *current = locked;
            changed
        });
    }

    /// Loads every independent observation concurrently: case status, linked
    /// order and the item list. None of them waits for, or fails, another.
    pub async fn start(&self) {
        tokio::join!(
            self.observe_case_status(),
            self.observe_order(),
            self.items.load()
        );
    }

    pub async fn observe_case_status(&self) -> bool {
        let Some(case_id) = self.record_id() else {
            return false;
        };

        let record = match self
            .services
            .records
            .read_by_id(case_id.as_str(), &[fields::STATUS])
            .await
        {
            Ok(record) => record,
            Err(err) => {
                warn!(case_id = %case_id, "workflow: case status read failed: {err}");
                return false;
            }
        };

        let status = match record.get(fields::STATUS).and_then(|value| value.as_str()) {
            Some(raw) => raw.parse::<CaseStatus>(),
            None => {
                warn!(case_id = %case_id, "workflow: case record has no status field");
                return false;
            }
        };

        match status {
            Ok(status) => {
                debug!(case_id = %case_id, %status, "workflow: case status observed");
                self.state.lock().record_status(status);
                self.publish_lock();
                true
            }
            Err(err) => {
                warn!(case_id = %case_id, "workflow: {err}");
                false
            }
        }
    }

    pub async fn observe_order(&self) -> bool {
        let Some(case_id) = self.record_id() else {
            return false;
        };

        match self.services.queries.order_for_case(case_id).await {
            Ok(order) => {
                debug!(case_id = %case_id, found = order.is_some(), "workflow: order observed");
                self.state.lock().order = order;
                self.publish_lock();
                true
            }
            Err(err) => {
                warn!(case_id = %case_id, "workflow: order lookup failed: {err}");
                false
            }
        }
    }

    pub fn open_add_modal(&self) {
        self.state.lock().add_modal_open = true;
    }

    pub fn close_add_modal(&self) {
        self.state.lock().add_modal_open = false;
    }

    /// The add-item surface, available only while the modal is open for an
    /// unlocked, identified case.
    pub fn add_item_flow(&self) -> Option<ItemCreationFlow> {
        let view = self.view();
        if !view.add_modal_open || view.is_locked() {
            return None;
        }
        let case_id = view.record_id?;
        Some(ItemCreationFlow::new(
            case_id,
            self.services.clone(),
            self.signals.clone(),
            self.lock_tx.subscribe(),
        ))
    }

    /// Applies one upward signal. Children deliver through the bus as part of
    /// their own call; signals scoped to another case are ignored.
    pub async fn handle_signal(&self, signal: WorkflowSignal) {
        if self.record_id() != Some(signal.case_id()) {
            debug!(?signal, "workflow: ignoring signal for another case");
            return;
        }

        match signal {
            WorkflowSignal::ItemsCountChanged { count, .. } => {
                self.state.lock().items_count = count;
            }
            WorkflowSignal::AddConfirmed { .. } => {
                self.close_add_modal();
                self.items.refresh().await;
            }
            WorkflowSignal::AddCancelled { .. } => {
                self.close_add_modal();
            }
        }
    }

    /// Single-flight submission. Calls made while blocked, including while a
    /// submission is already in flight, return [`SubmitOutcome::Ignored`].
    pub async fn submit_case(&self) -> SubmitOutcome {
        let record_id = self.record_id();
        {
            let mut state = self.state.lock();
            let view = state.view(record_id);
            if view.disable_submit() || view.is_locked() {
                debug!(
                    is_submitting = view.is_submitting,
                    items = view.items_count,
                    locked = view.is_locked(),
                    "workflow: submit ignored"
                );
                return SubmitOutcome::Ignored;
            }
            state.is_submitting = true;
        }
        let _release = SubmittingGuard { state: &self.state };
        let Some(case_id) = record_id else {
            return SubmitOutcome::Ignored;
        };

        let mut update = FieldSet::new();
        update.insert(fields::ID.into(), case_id.as_str().into());
        update.insert(
            fields::STATUS.into(),
            CaseStatus::SubmittedToVendor.as_str().into(),
        );

        match self.services.records.update(update).await {
            Ok(()) => {
                info!(case_id = %case_id, "workflow: case submitted to vendor");
                self.state
                    .lock()
                    .record_status(CaseStatus::SubmittedToVendor);
                self.publish_lock();
                if let Err(err) = self.services.records.invalidate(case_id.as_str()).await {
                    warn!(case_id = %case_id, "workflow: cache invalidation failed: {err}");
                }
                self.services.notifier.show(Notification::success(
                    "Submitted",
                    "Case status set to \"Submit to Vendor\".",
                ));
                SubmitOutcome::Submitted
            }
            Err(err) => {
                let message = normalize_error(&err);
                warn!(case_id = %case_id, "workflow: submit failed: {message}");
                self.services
                    .notifier
                    .show(Notification::error("Submit failed", message.clone()));
                SubmitOutcome::Failed(message)
            }
        }
    }
}

#[async_trait]
impl SignalSink for WorkflowCoordinator {
    async fn deliver(&self, signal: WorkflowSignal) {
        self.handle_signal(signal).await;
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
