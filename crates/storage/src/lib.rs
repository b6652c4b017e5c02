use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use uuid::Uuid;

use shared::{
    domain::{CaseId, CaseStatus, ItemId, ItemRecord, OrderId, OrderRecord, ProductRef},
    error::StatusError,
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Status(#[from] StatusError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredCase {
    pub id: CaseId,
    pub subject: String,
    pub status: CaseStatus,
    pub updated_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // every in-memory connection is a separate database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open database '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to apply storage migrations")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_case(&self, subject: &str) -> StorageResult<CaseId> {
        let id = CaseId(Uuid::new_v4().simple().to_string());
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO cases (id, subject, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(subject)
        .bind(CaseStatus::Open.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn load_case(&self, case_id: &CaseId) -> StorageResult<StoredCase> {
        let row = sqlx::query("SELECT id, subject, status, updated_at FROM cases WHERE id = ?")
            .bind(case_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                entity: "case",
                id: case_id.to_string(),
            })?;

        Ok(StoredCase {
            id: CaseId(row.get::<String, _>("id")),
            subject: row.get::<String, _>("subject"),
            status: row.get::<String, _>("status").parse()?,
            updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        })
    }

    pub async fn list_cases(&self) -> StorageResult<Vec<StoredCase>> {
        let rows = sqlx::query(
            "SELECT id, subject, status, updated_at FROM cases ORDER BY created_at, rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> StorageResult<StoredCase> {
                Ok(StoredCase {
                    id: CaseId(row.get::<String, _>("id")),
                    subject: row.get::<String, _>("subject"),
                    status: row.get::<String, _>("status").parse()?,
                    updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
                })
            })
            .collect()
    }

    /// Moves the case forward. Requests that would move it backward are
    /// rejected; repeating the current status is accepted.
    pub async fn set_case_status(
        &self,
        case_id: &CaseId,
        status: CaseStatus,
    ) -> StorageResult<CaseStatus> {
        let current = self.load_case(case_id).await?.status;
        let next = current.advance_to(status)?;
        if self.write_status_unless_past(case_id, next).await? {
            return Ok(next);
        }

        // another writer moved the case past `next` after it was read
        match self.load_case(case_id).await?.status.advance_to(next) {
            Err(err) => Err(err.into()),
            Ok(_) => Err(StorageError::Validation(format!(
                "case '{case_id}' changed while its status was being set"
            ))),
        }
    }

    /// Writes `status` only while the stored status is not already past it.
    /// Returns whether a row was written.
    async fn write_status_unless_past(
        &self,
        case_id: &CaseId,
        status: CaseStatus,
    ) -> StorageResult<bool> {
        let allowed = CaseStatus::ALL
            .into_iter()
            .filter(|candidate| *candidate <= status)
            .collect::<Vec<_>>();
        let placeholders = vec!["?"; allowed.len()].join(", ");
        let sql = format!(
            "UPDATE cases SET status = ?, updated_at = ? WHERE id = ? AND status IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(case_id.as_str());
        for candidate in allowed {
            query = query.bind(candidate.as_str());
        }
        Ok(query.execute(&self.pool).await?.rows_affected() > 0)
    }

    pub async fn upsert_product(&self, code: &str, name: &str) -> StorageResult<()> {
        if code.trim().is_empty() {
            return Err(StorageError::Validation(
                "product code must not be empty".to_string(),
            ));
        }
        sqlx::query(
            "INSERT INTO products (id, code, name) VALUES (?, ?, ?)
             ON CONFLICT(code) DO UPDATE SET name = excluded.name",
        )
        .bind(Uuid::new_v4().simple().to_string())
        .bind(code)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn create_item(
        &self,
        case_id: &CaseId,
        product_code: Option<&str>,
        quantity: i64,
    ) -> StorageResult<ItemId> {
        let quantity = checked_quantity(quantity)?;
        self.load_case(case_id).await?;

        let product_id = match product_code {
            Some(code) => Some(
                sqlx::query_scalar::<_, String>("SELECT id FROM products WHERE code = ?")
                    .bind(code)
                    .fetch_optional(&self.pool)
                    .await?
                    .ok_or_else(|| {
                        StorageError::Validation(format!("unknown product code '{code}'"))
                    })?,
            ),
            None => None,
        };

        let id = ItemId(Uuid::new_v4().simple().to_string());
        sqlx::query(
            "INSERT INTO items (id, case_id, product_id, quantity, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(case_id.as_str())
        .bind(product_id)
        .bind(i64::from(quantity))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn update_item_quantity(&self, item_id: &ItemId, quantity: i64) -> StorageResult<()> {
        let quantity = checked_quantity(quantity)?;
        let result = sqlx::query("UPDATE items SET quantity = ? WHERE id = ?")
            .bind(i64::from(quantity))
            .bind(item_id.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "item",
                id: item_id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn delete_item(&self, item_id: &ItemId) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(item_id.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "item",
                id: item_id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn list_items_for_case(&self, case_id: &CaseId) -> StorageResult<Vec<ItemRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.case_id, i.quantity, p.code AS product_code, p.name AS product_name
            FROM items i
            LEFT JOIN products p ON p.id = i.product_id
            WHERE i.case_id = ?
            ORDER BY i.created_at, i.rowid
            "#,
        )
        .bind(case_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> StorageResult<ItemRecord> {
                let product = match (
                    row.get::<Option<String>, _>("product_code"),
                    row.get::<Option<String>, _>("product_name"),
                ) {
                    (Some(code), Some(name)) => Some(ProductRef { code, name }),
                    _ => None,
                };
                Ok(ItemRecord {
                    id: ItemId(row.get::<String, _>("id")),
                    case_id: CaseId(row.get::<String, _>("case_id")),
                    product,
                    quantity: checked_quantity(row.get::<i64, _>("quantity"))?,
                })
            })
            .collect()
    }

    pub async fn order_for_case(&self, case_id: &CaseId) -> StorageResult<Option<OrderRecord>> {
        let row = sqlx::query("SELECT id, order_number, case_id FROM orders WHERE case_id = ?")
            .bind(case_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(order_from_row))
    }

    /// Stands in for the downstream process that turns a submitted case into
    /// an order. Only submitted cases qualify; an existing order is returned
    /// unchanged.
    pub async fn create_order_for_case(&self, case_id: &CaseId) -> StorageResult<OrderRecord> {
        let mut tx = self.pool.begin().await?;

        // Writing first takes the database write lock, so concurrent callers
        // for the same case run one after the other from here on.
        let finalized = sqlx::query(
            "UPDATE cases
             SET status = ?, updated_at = CASE WHEN status = ? THEN updated_at ELSE ? END
             WHERE id = ? AND status IN (?, ?)",
        )
        .bind(CaseStatus::OrderCreated.as_str())
        .bind(CaseStatus::OrderCreated.as_str())
        .bind(Utc::now())
        .bind(case_id.as_str())
        .bind(CaseStatus::SubmittedToVendor.as_str())
        .bind(CaseStatus::OrderCreated.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if finalized == 0 {
            tx.rollback().await?;
            let status = self.load_case(case_id).await?.status;
            return Err(StorageError::Validation(format!(
                "case '{case_id}' must be '{}' before an order is created (current: '{status}')",
                CaseStatus::SubmittedToVendor
            )));
        }

        let existing = sqlx::query("SELECT id, order_number, case_id FROM orders WHERE case_id = ?")
            .bind(case_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(row) = existing {
            tx.commit().await?;
            return Ok(order_from_row(row));
        }

        let sequence: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&mut *tx)
            .await?;
        let order = OrderRecord {
            id: OrderId(Uuid::new_v4().simple().to_string()),
            order_number: format!("ORD-{:06}", sequence + 1),
            case_id: case_id.clone(),
        };
        sqlx::query("INSERT INTO orders (id, case_id, order_number, created_at) VALUES (?, ?, ?, ?)")
            .bind(order.id.as_str())
            .bind(case_id.as_str())
            .bind(&order.order_number)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(order)
    }
}

fn order_from_row(row: SqliteRow) -> OrderRecord {
    OrderRecord {
        id: OrderId(row.get::<String, _>("id")),
        order_number: row.get::<String, _>("order_number"),
        case_id: CaseId(row.get::<String, _>("case_id")),
    }
}

fn checked_quantity(quantity: i64) -> StorageResult<u32> {
    u32::try_from(quantity).map_err(|_| {
        StorageError::Validation(format!(
            "quantity must be a non-negative integer no larger than {}, got {quantity}",
            u32::MAX
        ))
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
