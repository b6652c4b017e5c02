//! In-process collaborators with fault injection, shared by the unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::{
    domain::{
        fields, CaseId, CaseStatus, FieldSet, ItemId, ItemRecord, OrderId, OrderRecord, ProductRef,
    },
    error::RemoteError,
    protocol::{Notification, NotificationVariant, WorkflowSignal},
};
use tokio::sync::{broadcast, Notify};

use crate::{NotifierService, QueryService, RecordDataService, WorkflowServices};

pub(crate) fn item(id: &str, case_id: &str, quantity: u32) -> ItemRecord {
    ItemRecord {
        id: ItemId::from(id),
        case_id: CaseId::from(case_id),
        product: Some(ProductRef {
            code: format!("P-{id}"),
            name: format!("Product {id}"),
        }),
        quantity,
    }
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    statuses: Mutex<HashMap<String, CaseStatus>>,
    items: Mutex<Vec<ItemRecord>>,
    orders: Mutex<Vec<OrderRecord>>,
    failing: Mutex<HashMap<String, RemoteError>>,
    list_failure: Mutex<Option<RemoteError>>,
    order_failure: Mutex<Option<RemoteError>>,
    create_failure: Mutex<Option<RemoteError>>,
    invalidate_failure: Mutex<Option<RemoteError>>,
    update_gate: Mutex<Option<Arc<Notify>>>,
    list_gate: Mutex<Option<Arc<Notify>>>,
    pub updates: Mutex<Vec<FieldSet>>,
    pub creates: Mutex<Vec<FieldSet>>,
    pub deletes: Mutex<Vec<String>>,
    pub invalidations: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
    created: AtomicUsize,
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_case(self: &Arc<Self>, id: &str, status: CaseStatus) -> Arc<Self> {
        self.statuses.lock().insert(id.to_string(), status);
        Arc::clone(self)
    }

    pub(crate) fn with_items(self: &Arc<Self>, items: Vec<ItemRecord>) -> Arc<Self> {
        self.items.lock().extend(items);
        Arc::clone(self)
    }

    pub(crate) fn with_order(self: &Arc<Self>, case_id: &str, number: &str) -> Arc<Self> {
        self.orders.lock().push(OrderRecord {
            id: OrderId::from(format!("O-{case_id}").as_str()),
            order_number: number.to_string(),
            case_id: CaseId::from(case_id),
        });
        Arc::clone(self)
    }

    pub(crate) fn fail_record(&self, id: &str, err: RemoteError) {
        self.failing.lock().insert(id.to_string(), err);
    }

    pub(crate) fn fail_list(&self, err: Option<RemoteError>) {
        *self.list_failure.lock() = err;
    }

    pub(crate) fn fail_order(&self, err: RemoteError) {
        *self.order_failure.lock() = Some(err);
    }

    pub(crate) fn fail_create(&self, err: RemoteError) {
        *self.create_failure.lock() = Some(err);
    }

    pub(crate) fn fail_invalidate(&self, err: RemoteError) {
        *self.invalidate_failure.lock() = Some(err);
    }

    /// Holds every `update` call until the returned gate is notified.
    pub(crate) fn gate_updates(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.update_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    /// Holds every `list_items_for_case` call until the gate is notified once
    /// per call.
    pub(crate) fn gate_lists(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.list_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn update_calls(&self) -> usize {
        self.updates.lock().len()
    }

    pub(crate) fn status_of(&self, id: &str) -> Option<CaseStatus> {
        self.statuses.lock().get(id).copied()
    }

    pub(crate) fn item_ids(&self) -> Vec<String> {
        self.items.lock().iter().map(|item| item.id.0.clone()).collect()
    }

    fn failure_for(&self, id: &str) -> Option<RemoteError> {
        self.failing.lock().get(id).cloned()
    }
}

fn field_str<'a>(fields: &'a FieldSet, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(|value| value.as_str())
}

#[async_trait]
impl RecordDataService for FakeBackend {
    async fn read_by_id(&self, id: &str, _fields: &[&str]) -> Result<FieldSet, RemoteError> {
        if let Some(err) = self.failure_for(id) {
            return Err(err);
        }
        let status = self
            .status_of(id)
            .ok_or_else(|| RemoteError::not_found(format!("record '{id}' not found")))?;
        let mut out = FieldSet::new();
        out.insert(fields::ID.into(), id.into());
        out.insert(fields::STATUS.into(), status.as_str().into());
        Ok(out)
    }

    async fn update(&self, values: FieldSet) -> Result<(), RemoteError> {
        self.updates.lock().push(values.clone());
        let gate = self.update_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let id = field_str(&values, fields::ID).unwrap_or_default().to_string();
        if let Some(err) = self.failure_for(&id) {
            return Err(err);
        }
        if let Some(status) = field_str(&values, fields::STATUS) {
            let status = status
                .parse::<CaseStatus>()
                .map_err(|err| RemoteError::validation(err.to_string()))?;
            self.statuses.lock().insert(id.clone(), status);
        }
        if let Some(quantity) = values.get(fields::QUANTITY).and_then(|v| v.as_u64()) {
            if let Some(item) = self.items.lock().iter_mut().find(|item| item.id.0 == id) {
                item.quantity = quantity as u32;
            }
        }
        Ok(())
    }

    async fn create(&self, values: FieldSet) -> Result<String, RemoteError> {
        self.creates.lock().push(values.clone());
        if let Some(err) = self.create_failure.lock().clone() {
            return Err(err);
        }
        let id = format!("new-{}", self.created.fetch_add(1, Ordering::SeqCst) + 1);
        self.items.lock().push(ItemRecord {
            id: ItemId::from(id.as_str()),
            case_id: CaseId::from(field_str(&values, fields::CASE_ID).unwrap_or_default()),
            product: None,
            quantity: values
                .get(fields::QUANTITY)
                .and_then(|v| v.as_u64())
                .unwrap_or_default() as u32,
        });
        Ok(id)
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        self.deletes.lock().push(id.to_string());
        if let Some(err) = self.failure_for(id) {
            return Err(err);
        }
        self.items.lock().retain(|item| item.id.0 != id);
        Ok(())
    }

    async fn invalidate(&self, id: &str) -> Result<(), RemoteError> {
        self.invalidations.lock().push(id.to_string());
        match self.invalidate_failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl QueryService for FakeBackend {
    async fn list_items_for_case(&self, case_id: &CaseId) -> Result<Vec<ItemRecord>, RemoteError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.list_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(err) = self.list_failure.lock().clone() {
            return Err(err);
        }
        Ok(self
            .items
            .lock()
            .iter()
            .filter(|item| &item.case_id == case_id)
            .cloned()
            .collect())
    }

    async fn order_for_case(&self, case_id: &CaseId) -> Result<Option<OrderRecord>, RemoteError> {
        if let Some(err) = self.order_failure.lock().clone() {
            return Err(err);
        }
        Ok(self
            .orders
            .lock()
            .iter()
            .find(|order| &order.case_id == case_id)
            .cloned())
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    shown: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub(crate) fn shown(&self) -> Vec<Notification> {
        self.shown.lock().clone()
    }

    pub(crate) fn titles(&self) -> Vec<String> {
        self.shown
            .lock()
            .iter()
            .map(|notification| notification.title.clone())
            .collect()
    }

    pub(crate) fn errors(&self) -> Vec<Notification> {
        self.shown
            .lock()
            .iter()
            .filter(|notification| notification.variant == NotificationVariant::Error)
            .cloned()
            .collect()
    }
}

impl NotifierService for RecordingNotifier {
    fn show(&self, notification: Notification) {
        self.shown.lock().push(notification);
    }
}

pub(crate) struct Harness {
    pub backend: Arc<FakeBackend>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub(crate) fn new(backend: Arc<FakeBackend>) -> Self {
        Self {
            backend,
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub(crate) fn services(&self) -> WorkflowServices {
        WorkflowServices::new(
            self.backend.clone(),
            self.backend.clone(),
            self.notifier.clone(),
        )
    }
}

pub(crate) fn drain(rx: &mut broadcast::Receiver<WorkflowSignal>) -> Vec<WorkflowSignal> {
    let mut signals = Vec::new();
    while let Ok(signal) = rx.try_recv() {
        signals.push(signal);
    }
    signals
}
