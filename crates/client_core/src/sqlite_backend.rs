//! Record and query services backed by the local SQLite store.

use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{fields, CaseId, CaseStatus, FieldSet, ItemId, ItemRecord, OrderRecord},
    error::RemoteError,
};
use storage::{Storage, StorageError};
use tracing::debug;

use crate::{cache::QueryCache, QueryService, RecordDataService};

fn remote_error(err: StorageError) -> RemoteError {
    match err {
        StorageError::NotFound { .. } => RemoteError::not_found(err.to_string()),
        StorageError::Validation(_) | StorageError::Status(_) => {
            RemoteError::validation(err.to_string())
        }
        StorageError::Database(_) => RemoteError::transient(err.to_string()),
    }
}

fn required_str<'a>(values: &'a FieldSet, key: &str) -> Result<&'a str, RemoteError> {
    values
        .get(key)
        .and_then(|value| value.as_str())
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| RemoteError::validation(format!("field '{key}' is required")))
}

fn integer_field(values: &FieldSet, key: &str) -> Result<Option<i64>, RemoteError> {
    match values.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| RemoteError::validation(format!("field '{key}' must be an integer"))),
    }
}

/// Case reads go through a keyed cache that only [`RecordDataService::invalidate`]
/// clears, so a write is not visible to `read_by_id` until the record is
/// invalidated.
pub struct SqliteRecordService {
    store: Storage,
    reads: QueryCache<String, FieldSet>,
}

impl SqliteRecordService {
    pub fn new(store: Storage) -> Arc<Self> {
        Arc::new(Self {
            store,
            reads: QueryCache::new("record reads"),
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.store
    }

    async fn load_case_fields(&self, id: &str) -> Result<FieldSet, RemoteError> {
        let case = self
            .store
            .load_case(&CaseId::from(id))
            .await
            .map_err(remote_error)?;
        let mut out = FieldSet::new();
        out.insert(fields::ID.into(), case.id.as_str().into());
        out.insert(fields::STATUS.into(), case.status.as_str().into());
        out.insert("subject".into(), case.subject.into());
        out.insert("updatedAt".into(), case.updated_at.to_rfc3339().into());
        Ok(out)
    }
}

#[async_trait]
impl RecordDataService for SqliteRecordService {
    async fn read_by_id(&self, id: &str, requested: &[&str]) -> Result<FieldSet, RemoteError> {
        let record = self
            .reads
            .get_or_fetch(&id.to_string(), || self.load_case_fields(id))
            .await?;
        if requested.is_empty() {
            return Ok(record);
        }
        Ok(record
            .into_iter()
            .filter(|(key, _)| key == fields::ID || requested.contains(&key.as_str()))
            .collect())
    }

    async fn update(&self, values: FieldSet) -> Result<(), RemoteError> {
        let id = required_str(&values, fields::ID)?;
        let status = values.get(fields::STATUS).and_then(|value| value.as_str());
        let quantity = integer_field(&values, fields::QUANTITY)?;

        match (status, quantity) {
            (Some(status), _) => {
                let status = status
                    .parse::<CaseStatus>()
                    .map_err(|err| RemoteError::validation(err.to_string()))?;
                let applied = self
                    .store
                    .set_case_status(&CaseId::from(id), status)
                    .await
                    .map_err(remote_error)?;
                debug!(case_id = id, status = %applied, "sqlite: case status updated");
            }
            (None, Some(quantity)) => {
                self.store
                    .update_item_quantity(&ItemId::from(id), quantity)
                    .await
                    .map_err(remote_error)?;
                debug!(item_id = id, quantity, "sqlite: item quantity updated");
            }
            (None, None) => {
                return Err(RemoteError::validation(format!(
                    "nothing to update on record '{id}'"
                )));
            }
        }
        Ok(())
    }

    async fn create(&self, values: FieldSet) -> Result<String, RemoteError> {
        let case_id = CaseId::from(required_str(&values, fields::CASE_ID)?);
        let quantity = integer_field(&values, fields::QUANTITY)?
            .ok_or_else(|| RemoteError::validation("field 'quantity' is required"))?;
        let product_code = values
            .get(fields::PRODUCT_CODE)
            .and_then(|value| value.as_str())
            .filter(|code| !code.trim().is_empty());

        let id = self
            .store
            .create_item(&case_id, product_code, quantity)
            .await
            .map_err(remote_error)?;
        debug!(case_id = %case_id, item_id = %id, "sqlite: item created");
        Ok(id.0)
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        self.store
            .delete_item(&ItemId::from(id))
            .await
            .map_err(remote_error)
    }

    async fn invalidate(&self, id: &str) -> Result<(), RemoteError> {
        self.reads.invalidate(&id.to_string());
        Ok(())
    }
}

#[async_trait]
impl QueryService for SqliteRecordService {
    async fn list_items_for_case(&self, case_id: &CaseId) -> Result<Vec<ItemRecord>, RemoteError> {
        self.store
            .list_items_for_case(case_id)
            .await
            .map_err(remote_error)
    }

    async fn order_for_case(&self, case_id: &CaseId) -> Result<Option<OrderRecord>, RemoteError> {
        self.store.order_for_case(case_id).await.map_err(remote_error)
    }
}

#[cfg(test)]
#[path = "tests/sqlite_backend_tests.rs"]
mod tests;
