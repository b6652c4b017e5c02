//! Live item table for one case: cache-backed loading, selection, staged
//! quantity edits and the two destructive batch operations.

use std::{collections::BTreeSet, sync::Arc};

use futures::future::join_all;
use parking_lot::Mutex;
use shared::{
    domain::{CaseId, ItemId, ItemRecord, ItemRow, QuantityEdit},
    error::RemoteError,
    protocol::{Notification, WorkflowSignal},
};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{cache::QueryCache, signals::SignalBus, WorkflowServices};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemTableState {
    pub rows: Vec<ItemRow>,
    pub selection: BTreeSet<ItemId>,
    pub drafts: Vec<QuantityEdit>,
    pub is_loading: bool,
    /// Set once any load has succeeded.
    pub loaded: bool,
    refreshes_in_flight: usize,
}

impl ItemTableState {
    fn apply_loaded(&mut self, records: &[ItemRecord]) -> usize {
        self.rows = records.iter().map(ItemRow::from).collect();
        self.loaded = true;
        self.rows.len()
    }

    pub fn no_selection(&self) -> bool {
        self.selection.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NothingToApply,
    Locked,
    NoCase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Skipped(SkipReason),
    Applied {
        count: usize,
    },
    Failed {
        attempted: usize,
        failed: usize,
        message: String,
    },
}

struct LoadingGuard<'a> {
    state: &'a Mutex<ItemTableState>,
}

impl<'a> LoadingGuard<'a> {
    fn engage(state: &'a Mutex<ItemTableState>) -> Self {
        let mut table = state.lock();
        table.refreshes_in_flight += 1;
        table.is_loading = true;
        drop(table);
        Self { state }
    }
}

// Loading stays up until the last overlapping refresh settles.
impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut table = self.state.lock();
        table.refreshes_in_flight = table.refreshes_in_flight.saturating_sub(1);
        table.is_loading = table.refreshes_in_flight > 0;
    }
}

pub struct ItemCollectionManager {
    case_id: Option<CaseId>,
    services: WorkflowServices,
    signals: SignalBus,
    locked: watch::Receiver<bool>,
    cache: QueryCache<CaseId, Vec<ItemRecord>>,
    state: Mutex<ItemTableState>,
}

impl ItemCollectionManager {
    pub fn new(
        case_id: Option<CaseId>,
        services: WorkflowServices,
        signals: SignalBus,
        locked: watch::Receiver<bool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            case_id,
            services,
            signals,
            locked,
            cache: QueryCache::new("case-items"),
            state: Mutex::new(ItemTableState::default()),
        })
    }

    pub fn case_id(&self) -> Option<&CaseId> {
        self.case_id.as_ref()
    }

    pub fn snapshot(&self) -> ItemTableState {
        self.state.lock().clone()
    }

    pub fn rows(&self) -> Vec<ItemRow> {
        self.state.lock().rows.clone()
    }

    pub fn selection(&self) -> BTreeSet<ItemId> {
        self.state.lock().selection.clone()
    }

    pub fn drafts(&self) -> Vec<QuantityEdit> {
        self.state.lock().drafts.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().is_loading
    }

    fn is_locked(&self) -> bool {
        *self.locked.borrow()
    }

    /// Resolves the list subscription, serving a cached list when present.
    pub async fn load(&self) -> bool {
        self.resolve(false).await
    }

    /// Re-fetches the list from the source, bypassing the cache.
    pub async fn refresh(&self) -> bool {
        let _loading = LoadingGuard::engage(&self.state);
        self.resolve(true).await
    }

    async fn resolve(&self, bypass_cache: bool) -> bool {
        let Some(case_id) = self.case_id.clone() else {
            return false;
        };

        let queries = Arc::clone(&self.services.queries);
        let fetch = || async { queries.list_items_for_case(&case_id).await };
        let result = if bypass_cache {
            self.cache.refetch(&case_id, fetch).await
        } else {
            self.cache.get_or_fetch(&case_id, fetch).await
        };

        match result {
            Ok(records) => {
                let count = self.state.lock().apply_loaded(&records);
                self.signals
                    .emit(WorkflowSignal::ItemsCountChanged {
                        case_id: case_id.clone(),
                        count,
                    })
                    .await;
                true
            }
            Err(err) => {
                warn!(case_id = %case_id, "items: list load failed: {err}");
                false
            }
        }
    }

    /// Replaces the selection wholesale.
    pub fn set_selection(&self, ids: impl IntoIterator<Item = ItemId>) {
        self.state.lock().selection = ids.into_iter().collect();
    }

    /// Replaces the pending edit buffer wholesale.
    pub fn stage_edits(&self, edits: Vec<QuantityEdit>) {
        self.state.lock().drafts = edits;
    }

    pub async fn delete_selected(&self) -> BatchOutcome {
        let selected = self.selection().into_iter().collect::<Vec<_>>();
        if let Some(reason) = self.precheck(selected.is_empty()) {
            return BatchOutcome::Skipped(reason);
        }

        let records = &self.services.records;
        let results = join_all(selected.iter().map(|id| records.delete(id.as_str()))).await;
        let failures = results
            .into_iter()
            .filter_map(Result::err)
            .collect::<Vec<_>>();

        if !failures.is_empty() {
            return self.report_failure("Delete failed", selected.len(), &failures);
        }

        self.state.lock().selection.clear();
        info!(count = selected.len(), "items: batch delete applied");
        self.services
            .notifier
            .show(Notification::success("Deleted", "Selected items deleted"));
        self.refresh().await;
        BatchOutcome::Applied {
            count: selected.len(),
        }
    }

    /// Saves `edits` when given, otherwise the staged buffer. The buffer is
    /// cleared only when every update succeeds.
    pub async fn save_edits(&self, edits: Option<Vec<QuantityEdit>>) -> BatchOutcome {
        let edits = edits.unwrap_or_else(|| self.drafts());
        if let Some(reason) = self.precheck(edits.is_empty()) {
            return BatchOutcome::Skipped(reason);
        }

        let records = &self.services.records;
        let results = join_all(edits.iter().map(|edit| records.update(edit.to_fields()))).await;
        let failures = results
            .into_iter()
            .filter_map(Result::err)
            .collect::<Vec<_>>();

        if !failures.is_empty() {
            return self.report_failure("Save failed", edits.len(), &failures);
        }

        self.state.lock().drafts.clear();
        info!(count = edits.len(), "items: batch save applied");
        self.services
            .notifier
            .show(Notification::success("Saved", "Items updated"));
        self.refresh().await;
        BatchOutcome::Applied { count: edits.len() }
    }

    fn precheck(&self, empty: bool) -> Option<SkipReason> {
        if self.case_id.is_none() {
            return Some(SkipReason::NoCase);
        }
        if empty {
            return Some(SkipReason::NothingToApply);
        }
        if self.is_locked() {
            warn!("items: case is locked; batch mutation skipped");
            return Some(SkipReason::Locked);
        }
        None
    }

    // Successful members of a partially failed batch are not rolled back and
    // the list is not reloaded; the user retries from the retained state.
    fn report_failure(&self, title: &str, attempted: usize, failures: &[RemoteError]) -> BatchOutcome {
        let message = RemoteError::aggregate(failures).normalized();
        warn!(
            attempted,
            failed = failures.len(),
            "items: {}: {message}",
            title.to_ascii_lowercase()
        );
        self.services
            .notifier
            .show(Notification::error(title, message.clone()));
        BatchOutcome::Failed {
            attempted,
            failed: failures.len(),
            message,
        }
    }
}

#[cfg(test)]
#[path = "tests/item_collection_tests.rs"]
mod tests;
