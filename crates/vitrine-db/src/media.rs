//! PostgreSQL media store.
//!
//! Attached rows live in one table per [`MediaFamily`]; pooled rows live in
//! `available_images`. Every mutation that touches `display_order` runs in a
//! [`PgMediaTransaction`] which first takes a transaction-scoped advisory
//! lock keyed by the owner scope, then row locks (`FOR UPDATE`).
//!
//! The `(owner, display_order)` unique constraints are deferred, so a swap
//! or a renumbering is only checked at commit. So is the rule that an id is
//! held by exactly one table: moving a row between the pool and an owner is
//! an insert plus a delete in either order.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, trace};
use uuid::Uuid;

use vitrine_core::{
    AttachedMedia, Error, MediaFamily, MediaFile, MediaStore, MediaTransaction, OwnerScope,
    PoolMedia, Result,
};

/// Postgres SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

const POOL_COLUMNS: &str =
    "id, path, original_name, mime_type, size, comment, created_at, updated_at";

/// Column list of an attached table, with the owner column aliased.
fn attached_columns(family: MediaFamily) -> String {
    format!(
        "id, {} AS owner_id, path, original_name, mime_type, size, alt_text, display_order, \
         created_at, updated_at",
        family.owner_column()
    )
}

fn attached_from_row(row: &PgRow, family: MediaFamily) -> Result<AttachedMedia> {
    Ok(AttachedMedia {
        id: row.try_get("id")?,
        family,
        owner_id: row.try_get("owner_id")?,
        file: MediaFile {
            path: row.try_get("path")?,
            original_name: row.try_get("original_name")?,
            mime_type: row.try_get("mime_type")?,
            size: row.try_get("size")?,
        },
        alt_text: row.try_get("alt_text")?,
        display_order: row.try_get("display_order")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn pooled_from_row(row: &PgRow) -> Result<PoolMedia> {
    Ok(PoolMedia {
        id: row.try_get("id")?,
        file: MediaFile {
            path: row.try_get("path")?,
            original_name: row.try_get("original_name")?,
            mime_type: row.try_get("mime_type")?,
            size: row.try_get("size")?,
        },
        comment: row.try_get("comment")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Map unique violations to [`Error::Conflict`], everything else to
/// [`Error::Database`].
fn map_write_error(e: sqlx::Error, what: &str) -> Error {
    let is_unique = e
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION);
    if is_unique {
        Error::Conflict(format!("{}: {}", what, e))
    } else {
        Error::Database(e)
    }
}

/// PostgreSQL implementation of [`MediaStore`].
#[derive(Clone)]
pub struct PgMediaStore {
    pool: PgPool,
}

impl PgMediaStore {
    /// Create a new PgMediaStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a pooled row outside of any caller transaction.
    pub async fn insert_pooled(&self, media: &PoolMedia) -> Result<()> {
        let mut tx = self.begin_pg().await?;
        tx.insert_pooled(media).await?;
        Box::new(tx).commit().await
    }

    async fn begin_pg(&self) -> Result<PgMediaTransaction> {
        let tx = self.pool.begin().await.map_err(Error::Database)?;
        Ok(PgMediaTransaction { tx })
    }
}

#[async_trait]
impl MediaStore for PgMediaStore {
    async fn begin(&self) -> Result<Box<dyn MediaTransaction + '_>> {
        Ok(Box::new(self.begin_pg().await?))
    }

    async fn list_by_owner(&self, scope: OwnerScope) -> Result<Vec<AttachedMedia>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1 ORDER BY display_order, id",
            attached_columns(scope.family),
            scope.family.table(),
            scope.family.owner_column()
        );
        let rows = sqlx::query(&sql)
            .bind(scope.owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.iter()
            .map(|row| attached_from_row(row, scope.family))
            .collect()
    }

    async fn next_order(&self, scope: OwnerScope) -> Result<i32> {
        let sql = format!(
            "SELECT COALESCE(MAX(display_order), 0) FROM {} WHERE {} = $1",
            scope.family.table(),
            scope.family.owner_column()
        );
        let max: i32 = sqlx::query_scalar::<_, i32>(&sql)
            .bind(scope.owner_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(max + 1)
    }

    async fn find_attached(&self, family: MediaFamily, id: Uuid) -> Result<Option<AttachedMedia>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1",
            attached_columns(family),
            family.table()
        );
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .map(|row| attached_from_row(&row, family))
            .transpose()
    }

    async fn find_pooled(&self, id: Uuid) -> Result<Option<PoolMedia>> {
        let sql = format!("SELECT {} FROM available_images WHERE id = $1", POOL_COLUMNS);
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .map(|row| pooled_from_row(&row))
            .transpose()
    }

    async fn list_pool(&self, limit: i64, offset: i64) -> Result<Vec<PoolMedia>> {
        let sql = format!(
            "SELECT {} FROM available_images ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
            POOL_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(pooled_from_row).collect()
    }
}

/// A PostgreSQL transaction; rolls back when dropped uncommitted.
pub struct PgMediaTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl MediaTransaction for PgMediaTransaction {
    async fn lock_owner(&mut self, scope: OwnerScope) -> Result<()> {
        debug!(
            subsystem = "db",
            component = "media",
            op = "lock_owner",
            family = %scope.family,
            owner_id = %scope.owner_id,
            "Acquiring owner lock"
        );
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(scope.lock_key())
            .execute(&mut *self.tx)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn lock_attached(
        &mut self,
        family: MediaFamily,
        id: Uuid,
    ) -> Result<Option<AttachedMedia>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1 FOR UPDATE",
            attached_columns(family),
            family.table()
        );
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(Error::Database)?
            .map(|row| attached_from_row(&row, family))
            .transpose()
    }

    async fn lock_attached_at(
        &mut self,
        scope: OwnerScope,
        order: i32,
    ) -> Result<Option<AttachedMedia>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1 AND display_order = $2 LIMIT 1 FOR UPDATE",
            attached_columns(scope.family),
            scope.family.table(),
            scope.family.owner_column()
        );
        sqlx::query(&sql)
            .bind(scope.owner_id)
            .bind(order)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(Error::Database)?
            .map(|row| attached_from_row(&row, scope.family))
            .transpose()
    }

    async fn lock_siblings(&mut self, scope: OwnerScope) -> Result<Vec<AttachedMedia>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1 ORDER BY display_order, id FOR UPDATE",
            attached_columns(scope.family),
            scope.family.table(),
            scope.family.owner_column()
        );
        let rows = sqlx::query(&sql)
            .bind(scope.owner_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(Error::Database)?;
        rows.iter()
            .map(|row| attached_from_row(row, scope.family))
            .collect()
    }

    async fn max_order(&mut self, scope: OwnerScope) -> Result<i32> {
        let sql = format!(
            "SELECT COALESCE(MAX(display_order), 0) FROM {} WHERE {} = $1",
            scope.family.table(),
            scope.family.owner_column()
        );
        sqlx::query_scalar::<_, i32>(&sql)
            .bind(scope.owner_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(Error::Database)
    }

    async fn set_display_order(
        &mut self,
        family: MediaFamily,
        id: Uuid,
        order: i32,
    ) -> Result<()> {
        trace!(family = %family, media_id = %id, display_order = order, "set_display_order");
        let sql = format!(
            "UPDATE {} SET display_order = $1, updated_at = NOW() WHERE id = $2",
            family.table()
        );
        sqlx::query(&sql)
            .bind(order)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn shift_range(
        &mut self,
        scope: OwnerScope,
        from: i32,
        to: i32,
        delta: i32,
    ) -> Result<u64> {
        let sql = format!(
            "UPDATE {} SET display_order = display_order + $1, updated_at = NOW()
             WHERE {} = $2 AND display_order BETWEEN $3 AND $4",
            scope.family.table(),
            scope.family.owner_column()
        );
        let result = sqlx::query(&sql)
            .bind(delta)
            .bind(scope.owner_id)
            .bind(from)
            .bind(to)
            .execute(&mut *self.tx)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn update_alt_text(
        &mut self,
        family: MediaFamily,
        id: Uuid,
        alt_text: Option<&str>,
    ) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET alt_text = $1, updated_at = NOW() WHERE id = $2",
            family.table()
        );
        let result = sqlx::query(&sql)
            .bind(alt_text)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_attached(&mut self, media: &AttachedMedia) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, {}, path, original_name, mime_type, size, alt_text,
                             display_order, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            media.family.table(),
            media.family.owner_column()
        );
        sqlx::query(&sql)
            .bind(media.id)
            .bind(media.owner_id)
            .bind(&media.file.path)
            .bind(&media.file.original_name)
            .bind(&media.file.mime_type)
            .bind(media.file.size)
            .bind(&media.alt_text)
            .bind(media.display_order)
            .bind(media.created_at)
            .bind(media.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_write_error(e, "attached media id already exists"))?;
        Ok(())
    }

    async fn delete_attached(&mut self, family: MediaFamily, id: Uuid) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = $1", family.table());
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn lock_pooled(&mut self, id: Uuid) -> Result<Option<PoolMedia>> {
        let sql = format!(
            "SELECT {} FROM available_images WHERE id = $1 FOR UPDATE",
            POOL_COLUMNS
        );
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(Error::Database)?
            .map(|row| pooled_from_row(&row))
            .transpose()
    }

    async fn insert_pooled(&mut self, media: &PoolMedia) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO available_images
               (id, path, original_name, mime_type, size, comment, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(media.id)
        .bind(&media.file.path)
        .bind(&media.file.original_name)
        .bind(&media.file.mime_type)
        .bind(media.file.size)
        .bind(&media.comment)
        .bind(media.created_at)
        .bind(media.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_write_error(e, "pool media id already exists"))?;
        Ok(())
    }

    async fn delete_pooled(&mut self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM available_images WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn path_referenced(
        &mut self,
        families: &[MediaFamily],
        pooled: bool,
        path: &str,
    ) -> Result<bool> {
        let tables = families
            .iter()
            .map(|family| family.table())
            .chain(pooled.then_some("available_images"));
        for table in tables {
            let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE path = $1)", table);
            let found = sqlx::query_scalar::<_, bool>(&sql)
                .bind(path)
                .fetch_one(&mut *self.tx)
                .await
                .map_err(Error::Database)?;
            if found {
                trace!(table, path, "path still referenced");
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_write_error(e, "deferred constraint violated at commit"))
    }
}
