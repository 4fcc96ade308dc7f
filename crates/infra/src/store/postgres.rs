//! Postgres-backed store.
//!
//! A unit of work is one sqlx transaction. Row locks are `SELECT … FOR UPDATE`
//! held until commit or rollback; dropping the transaction rolls back.
//! Integrity is enforced by the schema (`CHECK (quantity >= 0)`, foreign keys
//! with `ON DELETE SET NULL` for categories and `RESTRICT` for item
//! references, a unique index on lower-cased category names).
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `Conflict` |
//! | Database (check constraint violation) | `23514` | `Conflict` |
//! | RowNotFound | N/A | `NotFound` |
//! | anything else | | `Backend` |

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use storekeep_core::{ApprovalId, CategoryId, IssuanceId, ItemId, RequestId, RequestItemId, UserId};
use storekeep_inventory::{Category, IssuanceRecord, Item};
use storekeep_requests::{
    Approval, Approver, Decision, Request, RequestItem, RequestStatus, RequestType, RequesterInfo,
};

use crate::error::{StoreError, StoreResult};

use super::{InventoryStore, UnitOfWork};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS categories_name_key ON categories (LOWER(name))",
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        category_id UUID REFERENCES categories(id) ON DELETE SET NULL,
        quantity BIGINT NOT NULL CHECK (quantity >= 0),
        low_stock_threshold BIGINT NOT NULL CHECK (low_stock_threshold >= 0),
        description TEXT,
        unit TEXT,
        location TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS issuances (
        id UUID PRIMARY KEY,
        person_name TEXT NOT NULL,
        item_id UUID NOT NULL REFERENCES items(id) ON DELETE RESTRICT,
        quantity BIGINT NOT NULL CHECK (quantity > 0),
        issued_by UUID NOT NULL,
        issued_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS issuances_issued_at ON issuances (issued_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS approvers (
        user_id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT,
        active BOOLEAN NOT NULL DEFAULT TRUE,
        registered_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS requests (
        id UUID PRIMARY KEY,
        request_type TEXT NOT NULL,
        status TEXT NOT NULL,
        created_by UUID NOT NULL,
        requester_name TEXT NOT NULL,
        team TEXT,
        purpose TEXT,
        contact TEXT,
        released_by TEXT,
        finalized_by UUID,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        decided_at TIMESTAMPTZ,
        completed_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS request_items (
        id UUID PRIMARY KEY,
        request_id UUID NOT NULL REFERENCES requests(id),
        item_id UUID NOT NULL REFERENCES items(id) ON DELETE RESTRICT,
        position INTEGER NOT NULL,
        quantity_requested BIGINT NOT NULL CHECK (quantity_requested > 0),
        quantity_received BIGINT CHECK (quantity_received BETWEEN 0 AND quantity_requested),
        quantity_returned BIGINT CHECK (quantity_returned BETWEEN 0 AND quantity_requested)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS request_approvers (
        request_id UUID NOT NULL REFERENCES requests(id),
        approver_id UUID NOT NULL REFERENCES approvers(user_id),
        PRIMARY KEY (request_id, approver_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS approvals (
        id UUID PRIMARY KEY,
        request_id UUID NOT NULL REFERENCES requests(id),
        approver_id UUID NOT NULL,
        decision TEXT NOT NULL,
        comment TEXT,
        signature TEXT,
        decided_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

const ITEM_COLUMNS: &str = "id, name, category_id, quantity, low_stock_threshold, description, unit, location, created_at, updated_at";
const REQUEST_COLUMNS: &str = "id, request_type, status, created_by, requester_name, team, purpose, contact, released_by, finalized_by, created_at, updated_at, decided_at, completed_at";

/// Postgres [`InventoryStore`].
///
/// ## Thread Safety
///
/// Uses the SQLx connection pool, which is `Send + Sync`. Each unit of work
/// checks out one connection for the lifetime of its transaction.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Open a pool against `database_url`.
    #[instrument(skip(database_url), err)]
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Box::new(PostgresUnit { tx }))
    }

    async fn item(&self, id: ItemId) -> StoreResult<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("item", e))?;
        row.map(|r| Item::try_from(decode::<ItemRow>(&r)?)).transpose()
    }

    async fn items(&self) -> StoreResult<Vec<Item>> {
        let rows = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY name"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("items", e))?;
        rows.iter().map(|r| Item::try_from(decode::<ItemRow>(r)?)).collect()
    }

    async fn categories(&self) -> StoreResult<Vec<Category>> {
        let rows = sqlx::query("SELECT id, name, description, created_at FROM categories ORDER BY name")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("categories", e))?;
        rows.iter().map(|r| decode::<CategoryRow>(r).map(Category::from)).collect()
    }

    async fn issuances(&self) -> StoreResult<Vec<IssuanceRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, person_name, item_id, quantity, issued_by, issued_at
            FROM issuances
            ORDER BY issued_at DESC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("issuances", e))?;
        rows.iter().map(|r| decode::<IssuanceRow>(r).map(IssuanceRecord::from)).collect()
    }

    async fn request(&self, id: RequestId) -> StoreResult<Option<Request>> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("request", e))?;
        let mut found = fetch_requests(&mut *conn, Some(*id.as_uuid()), false).await?;
        Ok(found.pop())
    }

    async fn requests(&self) -> StoreResult<Vec<Request>> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("requests", e))?;
        fetch_requests(&mut *conn, None, false).await
    }

    async fn approvers(&self) -> StoreResult<Vec<Approver>> {
        let rows = sqlx::query("SELECT user_id, name, email, active, registered_at FROM approvers ORDER BY name")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("approvers", e))?;
        rows.iter().map(|r| decode::<ApproverRow>(r).map(Approver::from)).collect()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// One Postgres transaction.
pub struct PostgresUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnit {
    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn lock_item(&mut self, id: ItemId) -> StoreResult<Item> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1 FOR UPDATE"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_item", e))?
            .ok_or_else(|| StoreError::NotFound(format!("item {id}")))?;
        Item::try_from(decode::<ItemRow>(&row)?)
    }

    async fn update_item(&mut self, item: &Item) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE items
            SET name = $2,
                category_id = $3,
                quantity = $4,
                low_stock_threshold = $5,
                description = $6,
                unit = $7,
                location = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(item.category_id.map(Uuid::from))
        .bind(item.quantity())
        .bind(item.low_stock_threshold)
        .bind(&item.description)
        .bind(&item.unit)
        .bind(&item.location)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_item", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("item {}", item.id)));
        }
        Ok(())
    }

    async fn insert_item(&mut self, item: &Item) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO items ({ITEM_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(item.category_id.map(Uuid::from))
        .bind(item.quantity())
        .bind(item.low_stock_threshold)
        .bind(&item.description)
        .bind(&item.unit)
        .bind(&item.location)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn delete_item(&mut self, id: ItemId) -> StoreResult<()> {
        self.lock_item(id).await?;
        sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_item", e))?;
        Ok(())
    }

    async fn lock_category(&mut self, id: CategoryId) -> StoreResult<Category> {
        let row = sqlx::query("SELECT id, name, description, created_at FROM categories WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_category", e))?
            .ok_or_else(|| StoreError::NotFound(format!("category {id}")))?;
        Ok(decode::<CategoryRow>(&row)?.into())
    }

    async fn insert_category(&mut self, category: &Category) -> StoreResult<()> {
        sqlx::query("INSERT INTO categories (id, name, description, created_at) VALUES ($1, $2, $3, $4)")
            .bind(category.id.as_uuid())
            .bind(&category.name)
            .bind(&category.description)
            .bind(category.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_category", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(category_id = %id, detached = tracing::field::Empty), err)]
    async fn delete_category(&mut self, id: CategoryId) -> StoreResult<u64> {
        self.lock_category(id).await?;

        // Take the item locks in id order before touching them.
        sqlx::query("SELECT id FROM items WHERE category_id = $1 ORDER BY id FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_category", e))?;

        let detached = sqlx::query("UPDATE items SET category_id = NULL, updated_at = NOW() WHERE category_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_category", e))?
            .rows_affected();

        sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_category", e))?;

        Span::current().record("detached", detached);
        Ok(detached)
    }

    async fn insert_issuance(&mut self, record: &IssuanceRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO issuances (id, person_name, item_id, quantity, issued_by, issued_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(&record.person_name)
        .bind(record.item_id.as_uuid())
        .bind(record.quantity)
        .bind(record.issued_by.as_uuid())
        .bind(record.issued_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_issuance", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(request_id = %id), err)]
    async fn lock_request(&mut self, id: RequestId) -> StoreResult<Request> {
        fetch_requests(&mut *self.tx, Some(*id.as_uuid()), true)
            .await?
            .pop()
            .ok_or_else(|| StoreError::NotFound(format!("request {id}")))
    }

    #[instrument(skip(self, request), fields(request_id = %request.id, lines = request.lines.len()), err)]
    async fn insert_request(&mut self, request: &Request) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO requests ({REQUEST_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        ))
        .bind(request.id.as_uuid())
        .bind(request.request_type.as_str())
        .bind(request.status.as_str())
        .bind(request.created_by.as_uuid())
        .bind(&request.requester.requester_name)
        .bind(&request.requester.team)
        .bind(&request.requester.purpose)
        .bind(&request.requester.contact)
        .bind(&request.released_by)
        .bind(request.finalized_by.map(Uuid::from))
        .bind(request.created_at)
        .bind(request.updated_at)
        .bind(request.decided_at)
        .bind(request.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_request", e))?;

        for (position, line) in request.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO request_items
                    (id, request_id, item_id, position, quantity_requested, quantity_received, quantity_returned)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(request.id.as_uuid())
            .bind(line.item_id.as_uuid())
            .bind(position as i32)
            .bind(line.quantity_requested)
            .bind(line.quantity_received)
            .bind(line.quantity_returned)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_request", e))?;
        }

        for approver in &request.assigned_approvers {
            sqlx::query("INSERT INTO request_approvers (request_id, approver_id) VALUES ($1, $2)")
                .bind(request.id.as_uuid())
                .bind(approver.as_uuid())
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("insert_request", e))?;
        }
        Ok(())
    }

    async fn update_request(&mut self, request: &Request) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE requests
            SET status = $2,
                released_by = $3,
                finalized_by = $4,
                updated_at = $5,
                decided_at = $6,
                completed_at = $7
            WHERE id = $1
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.status.as_str())
        .bind(&request.released_by)
        .bind(request.finalized_by.map(Uuid::from))
        .bind(request.updated_at)
        .bind(request.decided_at)
        .bind(request.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_request", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("request {}", request.id)));
        }

        for line in &request.lines {
            sqlx::query("UPDATE request_items SET quantity_received = $2, quantity_returned = $3 WHERE id = $1")
                .bind(line.id.as_uuid())
                .bind(line.quantity_received)
                .bind(line.quantity_returned)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("update_request", e))?;
        }
        Ok(())
    }

    async fn insert_approval(&mut self, approval: &Approval) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO approvals (id, request_id, approver_id, decision, comment, signature, decided_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(approval.id.as_uuid())
        .bind(approval.request_id.as_uuid())
        .bind(approval.approver_id.as_uuid())
        .bind(approval.decision.as_str())
        .bind(&approval.comment)
        .bind(&approval.signature)
        .bind(approval.decided_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_approval", e))?;
        Ok(())
    }

    async fn insert_approver(&mut self, approver: &Approver) -> StoreResult<()> {
        sqlx::query("INSERT INTO approvers (user_id, name, email, active, registered_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(approver.user_id.as_uuid())
            .bind(&approver.name)
            .bind(&approver.email)
            .bind(approver.active)
            .bind(approver.registered_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_approver", e))?;
        Ok(())
    }

    async fn set_approver_active(&mut self, user_id: UserId, active: bool) -> StoreResult<Approver> {
        let row = sqlx::query(
            r#"
            UPDATE approvers SET active = $2 WHERE user_id = $1
            RETURNING user_id, name, email, active, registered_at
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(active)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("set_approver_active", e))?
        .ok_or_else(|| StoreError::NotFound(format!("approver {user_id}")))?;
        Ok(decode::<ApproverRow>(&row)?.into())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }
}

/// Requests with their lines, approver assignment and approvals.
/// `only` narrows to one id; `lock` takes `FOR UPDATE` on the request rows.
async fn fetch_requests(
    conn: &mut PgConnection,
    only: Option<Uuid>,
    lock: bool,
) -> StoreResult<Vec<Request>> {
    let lock_clause = if lock { " FOR UPDATE" } else { "" };
    let rows = sqlx::query(&format!(
        "SELECT {REQUEST_COLUMNS} FROM requests WHERE ($1::uuid IS NULL OR id = $1) ORDER BY created_at DESC{lock_clause}"
    ))
    .bind(only)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("fetch_requests", e))?;

    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let line_rows = sqlx::query(
        r#"
        SELECT id, request_id, item_id, quantity_requested, quantity_received, quantity_returned
        FROM request_items
        WHERE ($1::uuid IS NULL OR request_id = $1)
        ORDER BY request_id, position
        "#,
    )
    .bind(only)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("fetch_requests", e))?;

    let approver_rows = sqlx::query(
        "SELECT request_id, approver_id FROM request_approvers WHERE ($1::uuid IS NULL OR request_id = $1) ORDER BY approver_id",
    )
    .bind(only)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("fetch_requests", e))?;

    let approval_rows = sqlx::query(
        r#"
        SELECT id, request_id, approver_id, decision, comment, signature, decided_at
        FROM approvals
        WHERE ($1::uuid IS NULL OR request_id = $1)
        ORDER BY decided_at
        "#,
    )
    .bind(only)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("fetch_requests", e))?;

    let mut lines: HashMap<Uuid, Vec<RequestItem>> = HashMap::new();
    for row in &line_rows {
        let line = decode::<RequestItemRow>(row)?;
        lines.entry(line.request_id).or_default().push(line.into());
    }

    let mut assigned: HashMap<Uuid, Vec<UserId>> = HashMap::new();
    for row in &approver_rows {
        let request_id: Uuid = row.try_get("request_id").map_err(|e| map_sqlx_error("fetch_requests", e))?;
        let approver_id: Uuid = row.try_get("approver_id").map_err(|e| map_sqlx_error("fetch_requests", e))?;
        assigned.entry(request_id).or_default().push(UserId::from_uuid(approver_id));
    }

    let mut approvals: HashMap<Uuid, Vec<Approval>> = HashMap::new();
    for row in &approval_rows {
        let approval = decode::<ApprovalRow>(row)?;
        approvals
            .entry(approval.request_id)
            .or_default()
            .push(approval.try_into()?);
    }

    rows.iter()
        .map(|row| {
            let r = decode::<RequestRow>(row)?;
            let id = r.id;
            r.into_request(
                lines.remove(&id).unwrap_or_default(),
                assigned.remove(&id).unwrap_or_default(),
                approvals.remove(&id).unwrap_or_default(),
            )
        })
        .collect()
}

fn decode<T>(row: &PgRow) -> StoreResult<T>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    T::from_row(row).map_err(|e| StoreError::Backend(format!("failed to decode row: {e}")))
}

fn corrupt(what: impl core::fmt::Display) -> StoreError {
    StoreError::Backend(format!("stored data rejected: {what}"))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{} in {}", db_err.message(), operation);
            match db_err.code().as_deref() {
                Some("23505") | Some("23503") | Some("23514") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("row not found in {operation}")),
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

// SQLx row types

struct ItemRow {
    id: Uuid,
    name: String,
    category_id: Option<Uuid>,
    quantity: i64,
    low_stock_threshold: i64,
    description: Option<String>,
    unit: Option<String>,
    location: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            category_id: row.try_get("category_id")?,
            quantity: row.try_get("quantity")?,
            low_stock_threshold: row.try_get("low_stock_threshold")?,
            description: row.try_get("description")?,
            unit: row.try_get("unit")?,
            location: row.try_get("location")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<ItemRow> for Item {
    type Error = StoreError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Item::restore(
            ItemId::from_uuid(row.id),
            row.name,
            row.category_id.map(CategoryId::from_uuid),
            row.quantity,
            row.low_stock_threshold,
            row.description,
            row.unit,
            row.location,
            row.created_at,
            row.updated_at,
        )
        .map_err(corrupt)
    }
}

struct CategoryRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for CategoryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CategoryRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: CategoryId::from_uuid(row.id),
            name: row.name,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

struct IssuanceRow {
    id: Uuid,
    person_name: String,
    item_id: Uuid,
    quantity: i64,
    issued_by: Uuid,
    issued_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for IssuanceRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(IssuanceRow {
            id: row.try_get("id")?,
            person_name: row.try_get("person_name")?,
            item_id: row.try_get("item_id")?,
            quantity: row.try_get("quantity")?,
            issued_by: row.try_get("issued_by")?,
            issued_at: row.try_get("issued_at")?,
        })
    }
}

impl From<IssuanceRow> for IssuanceRecord {
    fn from(row: IssuanceRow) -> Self {
        IssuanceRecord {
            id: IssuanceId::from_uuid(row.id),
            person_name: row.person_name,
            item_id: ItemId::from_uuid(row.item_id),
            quantity: row.quantity,
            issued_by: UserId::from_uuid(row.issued_by),
            issued_at: row.issued_at,
        }
    }
}

struct ApproverRow {
    user_id: Uuid,
    name: String,
    email: Option<String>,
    active: bool,
    registered_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ApproverRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ApproverRow {
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            active: row.try_get("active")?,
            registered_at: row.try_get("registered_at")?,
        })
    }
}

impl From<ApproverRow> for Approver {
    fn from(row: ApproverRow) -> Self {
        Approver {
            user_id: UserId::from_uuid(row.user_id),
            name: row.name,
            email: row.email,
            active: row.active,
            registered_at: row.registered_at,
        }
    }
}

struct RequestItemRow {
    id: Uuid,
    request_id: Uuid,
    item_id: Uuid,
    quantity_requested: i64,
    quantity_received: Option<i64>,
    quantity_returned: Option<i64>,
}

impl<'r> FromRow<'r, PgRow> for RequestItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RequestItemRow {
            id: row.try_get("id")?,
            request_id: row.try_get("request_id")?,
            item_id: row.try_get("item_id")?,
            quantity_requested: row.try_get("quantity_requested")?,
            quantity_received: row.try_get("quantity_received")?,
            quantity_returned: row.try_get("quantity_returned")?,
        })
    }
}

impl From<RequestItemRow> for RequestItem {
    fn from(row: RequestItemRow) -> Self {
        RequestItem {
            id: RequestItemId::from_uuid(row.id),
            request_id: RequestId::from_uuid(row.request_id),
            item_id: ItemId::from_uuid(row.item_id),
            quantity_requested: row.quantity_requested,
            quantity_received: row.quantity_received,
            quantity_returned: row.quantity_returned,
        }
    }
}

struct ApprovalRow {
    id: Uuid,
    request_id: Uuid,
    approver_id: Uuid,
    decision: String,
    comment: Option<String>,
    signature: Option<String>,
    decided_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ApprovalRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ApprovalRow {
            id: row.try_get("id")?,
            request_id: row.try_get("request_id")?,
            approver_id: row.try_get("approver_id")?,
            decision: row.try_get("decision")?,
            comment: row.try_get("comment")?,
            signature: row.try_get("signature")?,
            decided_at: row.try_get("decided_at")?,
        })
    }
}

impl TryFrom<ApprovalRow> for Approval {
    type Error = StoreError;

    fn try_from(row: ApprovalRow) -> Result<Self, Self::Error> {
        Ok(Approval {
            id: ApprovalId::from_uuid(row.id),
            request_id: RequestId::from_uuid(row.request_id),
            approver_id: UserId::from_uuid(row.approver_id),
            decision: row.decision.parse::<Decision>().map_err(corrupt)?,
            comment: row.comment,
            signature: row.signature,
            decided_at: row.decided_at,
        })
    }
}

struct RequestRow {
    id: Uuid,
    request_type: String,
    status: String,
    created_by: Uuid,
    requester_name: String,
    team: Option<String>,
    purpose: Option<String>,
    contact: Option<String>,
    released_by: Option<String>,
    finalized_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    decided_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for RequestRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RequestRow {
            id: row.try_get("id")?,
            request_type: row.try_get("request_type")?,
            status: row.try_get("status")?,
            created_by: row.try_get("created_by")?,
            requester_name: row.try_get("requester_name")?,
            team: row.try_get("team")?,
            purpose: row.try_get("purpose")?,
            contact: row.try_get("contact")?,
            released_by: row.try_get("released_by")?,
            finalized_by: row.try_get("finalized_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            decided_at: row.try_get("decided_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

impl RequestRow {
    fn into_request(
        self,
        lines: Vec<RequestItem>,
        assigned_approvers: Vec<UserId>,
        approvals: Vec<Approval>,
    ) -> StoreResult<Request> {
        Ok(Request {
            id: RequestId::from_uuid(self.id),
            request_type: self.request_type.parse::<RequestType>().map_err(corrupt)?,
            status: self.status.parse::<RequestStatus>().map_err(corrupt)?,
            created_by: UserId::from_uuid(self.created_by),
            requester: RequesterInfo {
                requester_name: self.requester_name,
                team: self.team,
                purpose: self.purpose,
                contact: self.contact,
            },
            assigned_approvers,
            lines,
            approvals,
            released_by: self.released_by,
            finalized_by: self.finalized_by.map(UserId::from_uuid),
            created_at: self.created_at,
            updated_at: self.updated_at,
            decided_at: self.decided_at,
            completed_at: self.completed_at,
        })
    }
}
