use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use shared::{
    domain::{CaseId, FieldSet, ItemRecord, OrderRecord},
    error::RemoteError,
    protocol::{Notification, NotificationVariant},
};
use tracing::{info, warn};

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod identity;
pub mod item_collection;
pub mod item_creation;
pub mod signals;
mod sqlite_backend;

pub use coordinator::{SubmitOutcome, WorkflowCoordinator, WorkflowView};
pub use item_collection::{BatchOutcome, ItemCollectionManager, ItemTableState, SkipReason};
pub use item_creation::{CreationOutcome, ItemCreationFlow};
pub use signals::SignalBus;
pub use sqlite_backend::SqliteRecordService;

/// Generic record CRUD with a keyed read cache.
#[async_trait]
pub trait RecordDataService: Send + Sync {
    async fn read_by_id(&self, id: &str, fields: &[&str]) -> Result<FieldSet, RemoteError>;
    async fn update(&self, fields: FieldSet) -> Result<(), RemoteError>;
    async fn create(&self, fields: FieldSet) -> Result<String, RemoteError>;
    async fn delete(&self, id: &str) -> Result<(), RemoteError>;
    /// Marks the cached read for `id` stale.
    async fn invalidate(&self, id: &str) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait QueryService: Send + Sync {
    async fn list_items_for_case(&self, case_id: &CaseId) -> Result<Vec<ItemRecord>, RemoteError>;
    async fn order_for_case(&self, case_id: &CaseId) -> Result<Option<OrderRecord>, RemoteError>;
}

pub trait NotifierService: Send + Sync {
    fn show(&self, notification: Notification);
}

pub trait NavigationStateProvider: Send + Sync {
    fn state_param(&self, key: &str) -> Option<String>;
}

pub struct MissingRecordDataService;

#[async_trait]
impl RecordDataService for MissingRecordDataService {
    async fn read_by_id(&self, id: &str, _fields: &[&str]) -> Result<FieldSet, RemoteError> {
        Err(RemoteError::transient(format!(
            "record data service unavailable; cannot read '{id}'"
        )))
    }

    async fn update(&self, _fields: FieldSet) -> Result<(), RemoteError> {
        Err(RemoteError::transient("record data service unavailable"))
    }

    async fn create(&self, _fields: FieldSet) -> Result<String, RemoteError> {
        Err(RemoteError::transient("record data service unavailable"))
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        Err(RemoteError::transient(format!(
            "record data service unavailable; cannot delete '{id}'"
        )))
    }

    async fn invalidate(&self, _id: &str) -> Result<(), RemoteError> {
        Ok(())
    }
}

pub struct MissingQueryService;

#[async_trait]
impl QueryService for MissingQueryService {
    async fn list_items_for_case(&self, case_id: &CaseId) -> Result<Vec<ItemRecord>, RemoteError> {
        Err(RemoteError::transient(format!(
            "query service unavailable; cannot list items for case '{case_id}'"
        )))
    }

    async fn order_for_case(&self, case_id: &CaseId) -> Result<Option<OrderRecord>, RemoteError> {
        Err(RemoteError::transient(format!(
            "query service unavailable; cannot look up order for case '{case_id}'"
        )))
    }
}

/// Renders notifications as log lines.
pub struct TracingNotifier;

impl NotifierService for TracingNotifier {
    fn show(&self, notification: Notification) {
        match notification.variant {
            NotificationVariant::Success => {
                info!(title = %notification.title, "{}", notification.message)
            }
            NotificationVariant::Error => {
                warn!(title = %notification.title, "{}", notification.message)
            }
        }
    }
}

pub struct NoNavigationState;

impl NavigationStateProvider for NoNavigationState {
    fn state_param(&self, _key: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticNavigationState {
    params: HashMap<String, String>,
}

impl StaticNavigationState {
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl NavigationStateProvider for StaticNavigationState {
    fn state_param(&self, key: &str) -> Option<String> {
        self.params.get(key).cloned()
    }
}

/// External collaborators shared by the workflow units.
#[derive(Clone)]
pub struct WorkflowServices {
    pub records: Arc<dyn RecordDataService>,
    pub queries: Arc<dyn QueryService>,
    pub notifier: Arc<dyn NotifierService>,
    pub navigation: Arc<dyn NavigationStateProvider>,
}

impl WorkflowServices {
    pub fn new(
        records: Arc<dyn RecordDataService>,
        queries: Arc<dyn QueryService>,
        notifier: Arc<dyn NotifierService>,
    ) -> Self {
        Self {
            records,
            queries,
            notifier,
            navigation: Arc::new(NoNavigationState),
        }
    }

    pub fn with_navigation(mut self, navigation: Arc<dyn NavigationStateProvider>) -> Self {
        self.navigation = navigation;
        self
    }
}

impl Default for WorkflowServices {
    fn default() -> Self {
        Self::new(
            Arc::new(MissingRecordDataService),
            Arc::new(MissingQueryService),
            Arc::new(TracingNotifier),
        )
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
