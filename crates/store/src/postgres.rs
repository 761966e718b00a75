//! Postgres-backed association store.
//!
//! All three relations carry a database-level UNIQUE constraint on their
//! composite key, so uniqueness holds even when two requests race past
//! the proactive guard check. Unique violations (Postgres error code
//! `23505`) surface as [`EngineError::DuplicateAssociation`]; every other
//! database failure maps to [`EngineError::Storage`].
//!
//! ## Thread Safety
//!
//! `PgStore` wraps a SQLx connection pool and is `Send + Sync`; it can be
//! shared across request-handling tasks without additional locking.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use grantlink_core::{
    EngineError, EngineResult, Page, PageRequest, PermissionGrantFilter, PermissionId, RoleId, TenantId, TenantRole,
    TenantRoleFilter, TenantRoleId, TenantRolePermission, TenantRolePermissionId, TenantRoleUser, TenantRoleUserId,
    UserGrantFilter, UserId,
};

use crate::{keys, AssociationStore};

/// Postgres-backed store over the three association tables.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Create the association tables and their composite-key constraints
    /// if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> EngineResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenant_roles (
                id BIGSERIAL PRIMARY KEY,
                tenant_id BIGINT NOT NULL,
                role_id BIGINT NOT NULL,
                CONSTRAINT tenant_roles_tenant_role_key UNIQUE (tenant_id, role_id)
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenant_role_permissions (
                id BIGSERIAL PRIMARY KEY,
                tenant_role_id BIGINT NOT NULL,
                permission_id BIGINT NOT NULL,
                CONSTRAINT tenant_role_permissions_pair_key UNIQUE (tenant_role_id, permission_id)
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenant_role_users (
                id BIGSERIAL PRIMARY KEY,
                tenant_role_id BIGINT NOT NULL,
                user_id BIGINT NOT NULL,
                CONSTRAINT tenant_role_users_pair_key UNIQUE (tenant_role_id, user_id)
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Map SQLx errors to the engine taxonomy. Unique violations are handled
/// separately by the insert/update paths so they can name the key.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EngineError {
    match err {
        sqlx::Error::Database(db_err) => {
            EngineError::storage(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => EngineError::storage(format!("connection pool closed in {}", operation)),
        other => EngineError::storage(format!("sqlx error in {}: {}", operation, other)),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

/// Unique violation becomes a duplicate of the named composite key;
/// everything else goes through [`map_sqlx_error`].
fn map_write_error(operation: &str, key: &str, err: sqlx::Error) -> EngineError {
    if is_unique_violation(&err) {
        EngineError::duplicate(key)
    } else {
        map_sqlx_error(operation, err)
    }
}

fn read_count(row: &PgRow, operation: &str) -> EngineResult<u64> {
    let total: i64 = row
        .try_get("total")
        .map_err(|e| EngineError::storage(format!("failed to read count in {}: {}", operation, e)))?;
    Ok(total as u64)
}

fn read_exists(row: &PgRow, operation: &str) -> EngineResult<bool> {
    row.try_get("present")
        .map_err(|e| EngineError::storage(format!("failed to read flag in {}: {}", operation, e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Row types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct TenantRoleRow {
    id: i64,
    tenant_id: i64,
    role_id: i64,
}

impl<'r> FromRow<'r, PgRow> for TenantRoleRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            role_id: row.try_get("role_id")?,
        })
    }
}

impl From<TenantRoleRow> for TenantRole {
    fn from(row: TenantRoleRow) -> Self {
        Self {
            id: TenantRoleId::new(row.id),
            tenant_id: TenantId::new(row.tenant_id),
            role_id: RoleId::new(row.role_id),
        }
    }
}

#[derive(Debug)]
struct PermissionGrantRow {
    id: i64,
    tenant_role_id: i64,
    permission_id: i64,
}

impl<'r> FromRow<'r, PgRow> for PermissionGrantRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            tenant_role_id: row.try_get("tenant_role_id")?,
            permission_id: row.try_get("permission_id")?,
        })
    }
}

impl From<PermissionGrantRow> for TenantRolePermission {
    fn from(row: PermissionGrantRow) -> Self {
        Self {
            id: TenantRolePermissionId::new(row.id),
            tenant_role_id: TenantRoleId::new(row.tenant_role_id),
            permission_id: PermissionId::new(row.permission_id),
        }
    }
}

#[derive(Debug)]
struct UserGrantRow {
    id: i64,
    tenant_role_id: i64,
    user_id: i64,
}

impl<'r> FromRow<'r, PgRow> for UserGrantRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            tenant_role_id: row.try_get("tenant_role_id")?,
            user_id: row.try_get("user_id")?,
        })
    }
}

impl From<UserGrantRow> for TenantRoleUser {
    fn from(row: UserGrantRow) -> Self {
        Self {
            id: TenantRoleUserId::new(row.id),
            tenant_role_id: TenantRoleId::new(row.tenant_role_id),
            user_id: UserId::new(row.user_id),
        }
    }
}

fn collect_rows<R, T>(rows: Vec<PgRow>, operation: &str) -> EngineResult<Vec<T>>
where
    R: for<'r> FromRow<'r, PgRow> + Into<T>,
{
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let parsed = R::from_row(&row)
            .map_err(|e| EngineError::storage(format!("failed to read row in {}: {}", operation, e)))?;
        out.push(parsed.into());
    }
    Ok(out)
}

#[async_trait]
impl AssociationStore for PgStore {
    // ── TenantRole ──────────────────────────────────────────────────────

    async fn tenant_role_by_id(&self, id: TenantRoleId) -> EngineResult<Option<TenantRole>> {
        let row = sqlx::query("SELECT id, tenant_id, role_id FROM tenant_roles WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("tenant_role_by_id", e))?;
        match row {
            Some(row) => {
                let parsed = TenantRoleRow::from_row(&row)
                    .map_err(|e| EngineError::storage(format!("failed to read row in tenant_role_by_id: {}", e)))?;
                Ok(Some(parsed.into()))
            }
            None => Ok(None),
        }
    }

    async fn tenant_role_id_for(&self, tenant_id: TenantId, role_id: RoleId)
        -> EngineResult<Option<TenantRoleId>>
    {
        let row = sqlx::query("SELECT id FROM tenant_roles WHERE tenant_id = $1 AND role_id = $2")
            .bind(tenant_id.value())
            .bind(role_id.value())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("tenant_role_id_for", e))?;
        match row {
            Some(row) => {
                let id: i64 = row
                    .try_get("id")
                    .map_err(|e| EngineError::storage(format!("failed to read id in tenant_role_id_for: {}", e)))?;
                Ok(Some(TenantRoleId::new(id)))
            }
            None => Ok(None),
        }
    }

    async fn tenant_roles_by_ids(&self, ids: &[TenantRoleId]) -> EngineResult<Vec<TenantRole>> {
        let id_values: Vec<i64> = ids.iter().map(|id| id.value()).collect();
        let rows = sqlx::query(
            "SELECT id, tenant_id, role_id FROM tenant_roles WHERE id = ANY($1) ORDER BY id ASC",
        )
        .bind(&id_values)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("tenant_roles_by_ids", e))?;
        collect_rows::<TenantRoleRow, _>(rows, "tenant_roles_by_ids")
    }

    async fn tenant_roles_paged(
        &self,
        tenant_id: Option<TenantId>,
        role_id: Option<RoleId>,
        page: PageRequest,
    ) -> EngineResult<Page<TenantRole>> {
        let tenant = tenant_id.map(|id| id.value());
        let role = role_id.map(|id| id.value());

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) as total
            FROM tenant_roles
            WHERE ($1::bigint IS NULL OR tenant_id = $1)
                AND ($2::bigint IS NULL OR role_id = $2)
            "#,
        )
        .bind(tenant)
        .bind(role)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_tenant_roles_paged", e))?;
        let total = read_count(&count_row, "count_tenant_roles_paged")?;

        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, role_id
            FROM tenant_roles
            WHERE ($1::bigint IS NULL OR tenant_id = $1)
                AND ($2::bigint IS NULL OR role_id = $2)
            ORDER BY id ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(tenant)
        .bind(role)
        .bind(page.size as i64)
        .bind(page.offset() as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("tenant_roles_paged", e))?;

        let items = collect_rows::<TenantRoleRow, _>(rows, "tenant_roles_paged")?;
        Ok(Page::new(items, page, total))
    }

    async fn tenant_roles_filtered(&self, filter: &TenantRoleFilter) -> EngineResult<Vec<TenantRole>> {
        // The CASE mirrors the in-memory predicate fold: under AND an
        // absent field is neutral-true, under OR neutral-false.
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, role_id
            FROM tenant_roles
            WHERE CASE WHEN $3::boolean THEN
                    ($1::bigint IS NULL OR tenant_id = $1)
                    AND ($2::bigint IS NULL OR role_id = $2)
                ELSE
                    ($1::bigint IS NOT NULL AND tenant_id = $1)
                    OR ($2::bigint IS NOT NULL AND role_id = $2)
                END
            ORDER BY id ASC
            "#,
        )
        .bind(filter.tenant_id.map(|id| id.value()))
        .bind(filter.role_id.map(|id| id.value()))
        .bind(filter.conjunction)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("tenant_roles_filtered", e))?;
        collect_rows::<TenantRoleRow, _>(rows, "tenant_roles_filtered")
    }

    async fn tenant_role_conflicts(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        exclude: Option<TenantRoleId>,
    ) -> EngineResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM tenant_roles
                WHERE tenant_id = $1 AND role_id = $2
                    AND ($3::bigint IS NULL OR id <> $3)
            ) as present
            "#,
        )
        .bind(tenant_id.value())
        .bind(role_id.value())
        .bind(exclude.map(|id| id.value()))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("tenant_role_conflicts", e))?;
        read_exists(&row, "tenant_role_conflicts")
    }

    async fn insert_tenant_role(&self, tenant_id: TenantId, role_id: RoleId) -> EngineResult<TenantRole> {
        let row = sqlx::query("INSERT INTO tenant_roles (tenant_id, role_id) VALUES ($1, $2) RETURNING id")
            .bind(tenant_id.value())
            .bind(role_id.value())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_write_error("insert_tenant_role", keys::TENANT_ROLE, e))?;
        let id: i64 = row
            .try_get("id")
            .map_err(|e| EngineError::storage(format!("failed to read id in insert_tenant_role: {}", e)))?;
        Ok(TenantRole {
            id: TenantRoleId::new(id),
            tenant_id,
            role_id,
        })
    }

    async fn update_tenant_role(&self, record: &TenantRole) -> EngineResult<()> {
        let result = sqlx::query("UPDATE tenant_roles SET tenant_id = $2, role_id = $3 WHERE id = $1")
            .bind(record.id.value())
            .bind(record.tenant_id.value())
            .bind(record.role_id.value())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_write_error("update_tenant_role", keys::TENANT_ROLE, e))?;
        if result.rows_affected() == 0 {
            return Err(EngineError::not_found(format!("tenant role {}", record.id)));
        }
        Ok(())
    }

    async fn delete_tenant_role(&self, id: TenantRoleId) -> EngineResult<bool> {
        let result = sqlx::query("DELETE FROM tenant_roles WHERE id = $1")
            .bind(id.value())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_tenant_role", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_tenant_roles(&self) -> EngineResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) as total FROM tenant_roles")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_tenant_roles", e))?;
        read_count(&row, "count_tenant_roles")
    }

    // ── TenantRolePermission ────────────────────────────────────────────

    async fn permission_grant_by_id(&self, id: TenantRolePermissionId)
        -> EngineResult<Option<TenantRolePermission>>
    {
        let row = sqlx::query(
            "SELECT id, tenant_role_id, permission_id FROM tenant_role_permissions WHERE id = $1",
        )
        .bind(id.value())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("permission_grant_by_id", e))?;
        match row {
            Some(row) => {
                let parsed = PermissionGrantRow::from_row(&row).map_err(|e| {
                    EngineError::storage(format!("failed to read row in permission_grant_by_id: {}", e))
                })?;
                Ok(Some(parsed.into()))
            }
            None => Ok(None),
        }
    }

    async fn permission_grant_id_for(
        &self,
        tenant_role_id: TenantRoleId,
        permission_id: PermissionId,
    ) -> EngineResult<Option<TenantRolePermissionId>> {
        let row = sqlx::query(
            "SELECT id FROM tenant_role_permissions WHERE tenant_role_id = $1 AND permission_id = $2",
        )
        .bind(tenant_role_id.value())
        .bind(permission_id.value())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("permission_grant_id_for", e))?;
        match row {
            Some(row) => {
                let id: i64 = row.try_get("id").map_err(|e| {
                    EngineError::storage(format!("failed to read id in permission_grant_id_for: {}", e))
                })?;
                Ok(Some(TenantRolePermissionId::new(id)))
            }
            None => Ok(None),
        }
    }

    async fn permission_grants_paged(
        &self,
        tenant_role_id: Option<TenantRoleId>,
        permission_id: Option<PermissionId>,
        page: PageRequest,
    ) -> EngineResult<Page<TenantRolePermission>> {
        let tenant_role = tenant_role_id.map(|id| id.value());
        let permission = permission_id.map(|id| id.value());

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) as total
            FROM tenant_role_permissions
            WHERE ($1::bigint IS NULL OR tenant_role_id = $1)
                AND ($2::bigint IS NULL OR permission_id = $2)
            "#,
        )
        .bind(tenant_role)
        .bind(permission)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_permission_grants_paged", e))?;
        let total = read_count(&count_row, "count_permission_grants_paged")?;

        let rows = sqlx::query(
            r#"
            SELECT id, tenant_role_id, permission_id
            FROM tenant_role_permissions
            WHERE ($1::bigint IS NULL OR tenant_role_id = $1)
                AND ($2::bigint IS NULL OR permission_id = $2)
            ORDER BY id ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(tenant_role)
        .bind(permission)
        .bind(page.size as i64)
        .bind(page.offset() as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("permission_grants_paged", e))?;

        let items = collect_rows::<PermissionGrantRow, _>(rows, "permission_grants_paged")?;
        Ok(Page::new(items, page, total))
    }

    async fn permission_grants_filtered(
        &self,
        filter: &PermissionGrantFilter,
    ) -> EngineResult<Vec<TenantRolePermission>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_role_id, permission_id
            FROM tenant_role_permissions
            WHERE CASE WHEN $3::boolean THEN
                    ($1::bigint IS NULL OR tenant_role_id = $1)
                    AND ($2::bigint IS NULL OR permission_id = $2)
                ELSE
                    ($1::bigint IS NOT NULL AND tenant_role_id = $1)
                    OR ($2::bigint IS NOT NULL AND permission_id = $2)
                END
            ORDER BY id ASC
            "#,
        )
        .bind(filter.tenant_role_id.map(|id| id.value()))
        .bind(filter.permission_id.map(|id| id.value()))
        .bind(filter.conjunction)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("permission_grants_filtered", e))?;
        collect_rows::<PermissionGrantRow, _>(rows, "permission_grants_filtered")
    }

    async fn permission_grants_for(&self, tenant_role_ids: &[TenantRoleId])
        -> EngineResult<Vec<TenantRolePermission>>
    {
        let ids: Vec<i64> = tenant_role_ids.iter().map(|id| id.value()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_role_id, permission_id
            FROM tenant_role_permissions
            WHERE (cardinality($1::bigint[]) = 0 OR tenant_role_id = ANY($1))
            ORDER BY id ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("permission_grants_for", e))?;
        collect_rows::<PermissionGrantRow, _>(rows, "permission_grants_for")
    }

    async fn permission_grant_conflicts(
        &self,
        tenant_role_id: TenantRoleId,
        permission_id: PermissionId,
        exclude: Option<TenantRolePermissionId>,
    ) -> EngineResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM tenant_role_permissions
                WHERE tenant_role_id = $1 AND permission_id = $2
                    AND ($3::bigint IS NULL OR id <> $3)
            ) as present
            "#,
        )
        .bind(tenant_role_id.value())
        .bind(permission_id.value())
        .bind(exclude.map(|id| id.value()))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("permission_grant_conflicts", e))?;
        read_exists(&row, "permission_grant_conflicts")
    }

    async fn insert_permission_grant(
        &self,
        tenant_role_id: TenantRoleId,
        permission_id: PermissionId,
    ) -> EngineResult<TenantRolePermission> {
        let row = sqlx::query(
            "INSERT INTO tenant_role_permissions (tenant_role_id, permission_id) VALUES ($1, $2) RETURNING id",
        )
        .bind(tenant_role_id.value())
        .bind(permission_id.value())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_write_error("insert_permission_grant", keys::PERMISSION_GRANT, e))?;
        let id: i64 = row
            .try_get("id")
            .map_err(|e| EngineError::storage(format!("failed to read id in insert_permission_grant: {}", e)))?;
        Ok(TenantRolePermission {
            id: TenantRolePermissionId::new(id),
            tenant_role_id,
            permission_id,
        })
    }

    async fn update_permission_grant(&self, record: &TenantRolePermission) -> EngineResult<()> {
        let result = sqlx::query(
            "UPDATE tenant_role_permissions SET tenant_role_id = $2, permission_id = $3 WHERE id = $1",
        )
        .bind(record.id.value())
        .bind(record.tenant_role_id.value())
        .bind(record.permission_id.value())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_write_error("update_permission_grant", keys::PERMISSION_GRANT, e))?;
        if result.rows_affected() == 0 {
            return Err(EngineError::not_found(format!("tenant role permission {}", record.id)));
        }
        Ok(())
    }

    async fn delete_permission_grant(&self, id: TenantRolePermissionId) -> EngineResult<bool> {
        let result = sqlx::query("DELETE FROM tenant_role_permissions WHERE id = $1")
            .bind(id.value())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_permission_grant", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_permission_grants_for(&self, tenant_role_id: TenantRoleId) -> EngineResult<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) as total FROM tenant_role_permissions WHERE tenant_role_id = $1",
        )
        .bind(tenant_role_id.value())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_permission_grants_for", e))?;
        read_count(&row, "count_permission_grants_for")
    }

    async fn count_permission_grants(&self) -> EngineResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) as total FROM tenant_role_permissions")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_permission_grants", e))?;
        read_count(&row, "count_permission_grants")
    }

    // ── TenantRoleUser ──────────────────────────────────────────────────

    async fn user_grant_by_id(&self, id: TenantRoleUserId) -> EngineResult<Option<TenantRoleUser>> {
        let row = sqlx::query("SELECT id, tenant_role_id, user_id FROM tenant_role_users WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user_grant_by_id", e))?;
        match row {
            Some(row) => {
                let parsed = UserGrantRow::from_row(&row)
                    .map_err(|e| EngineError::storage(format!("failed to read row in user_grant_by_id: {}", e)))?;
                Ok(Some(parsed.into()))
            }
            None => Ok(None),
        }
    }

    async fn user_grant_id_for(&self, tenant_role_id: TenantRoleId, user_id: UserId)
        -> EngineResult<Option<TenantRoleUserId>>
    {
        let row = sqlx::query("SELECT id FROM tenant_role_users WHERE tenant_role_id = $1 AND user_id = $2")
            .bind(tenant_role_id.value())
            .bind(user_id.value())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user_grant_id_for", e))?;
        match row {
            Some(row) => {
                let id: i64 = row
                    .try_get("id")
                    .map_err(|e| EngineError::storage(format!("failed to read id in user_grant_id_for: {}", e)))?;
                Ok(Some(TenantRoleUserId::new(id)))
            }
            None => Ok(None),
        }
    }

    async fn user_grants_paged(
        &self,
        tenant_role_id: Option<TenantRoleId>,
        user_id: Option<UserId>,
        page: PageRequest,
    ) -> EngineResult<Page<TenantRoleUser>> {
        let tenant_role = tenant_role_id.map(|id| id.value());
        let user = user_id.map(|id| id.value());

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) as total
            FROM tenant_role_users
            WHERE ($1::bigint IS NULL OR tenant_role_id = $1)
                AND ($2::bigint IS NULL OR user_id = $2)
            "#,
        )
        .bind(tenant_role)
        .bind(user)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_user_grants_paged", e))?;
        let total = read_count(&count_row, "count_user_grants_paged")?;

        let rows = sqlx::query(
            r#"
            SELECT id, tenant_role_id, user_id
            FROM tenant_role_users
            WHERE ($1::bigint IS NULL OR tenant_role_id = $1)
                AND ($2::bigint IS NULL OR user_id = $2)
            ORDER BY id ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(tenant_role)
        .bind(user)
        .bind(page.size as i64)
        .bind(page.offset() as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("user_grants_paged", e))?;

        let items = collect_rows::<UserGrantRow, _>(rows, "user_grants_paged")?;
        Ok(Page::new(items, page, total))
    }

    async fn user_grants_filtered(&self, filter: &UserGrantFilter) -> EngineResult<Vec<TenantRoleUser>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_role_id, user_id
            FROM tenant_role_users
            WHERE CASE WHEN $3::boolean THEN
                    ($1::bigint IS NULL OR tenant_role_id = $1)
                    AND ($2::bigint IS NULL OR user_id = $2)
                ELSE
                    ($1::bigint IS NOT NULL AND tenant_role_id = $1)
                    OR ($2::bigint IS NOT NULL AND user_id = $2)
                END
            ORDER BY id ASC
            "#,
        )
        .bind(filter.tenant_role_id.map(|id| id.value()))
        .bind(filter.user_id.map(|id| id.value()))
        .bind(filter.conjunction)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("user_grants_filtered", e))?;
        collect_rows::<UserGrantRow, _>(rows, "user_grants_filtered")
    }

    async fn user_grants_for(
        &self,
        tenant_role_ids: &[TenantRoleId],
        user_id: Option<UserId>,
    ) -> EngineResult<Vec<TenantRoleUser>> {
        let ids: Vec<i64> = tenant_role_ids.iter().map(|id| id.value()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_role_id, user_id
            FROM tenant_role_users
            WHERE (cardinality($1::bigint[]) = 0 OR tenant_role_id = ANY($1))
                AND ($2::bigint IS NULL OR user_id = $2)
            ORDER BY id ASC
            "#,
        )
        .bind(&ids)
        .bind(user_id.map(|id| id.value()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("user_grants_for", e))?;
        collect_rows::<UserGrantRow, _>(rows, "user_grants_for")
    }

    async fn user_grant_ids_for(
        &self,
        tenant_id: TenantId,
        role_ids: &[RoleId],
        user_id: UserId,
    ) -> EngineResult<Vec<TenantRoleUserId>> {
        let roles: Vec<i64> = role_ids.iter().map(|id| id.value()).collect();
        let rows = sqlx::query(
            r#"
            SELECT u.id
            FROM tenant_role_users u
            JOIN tenant_roles tr ON tr.id = u.tenant_role_id
            WHERE tr.tenant_id = $1
                AND (cardinality($2::bigint[]) = 0 OR tr.role_id = ANY($2))
                AND u.user_id = $3
            ORDER BY u.id ASC
            "#,
        )
        .bind(tenant_id.value())
        .bind(&roles)
        .bind(user_id.value())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("user_grant_ids_for", e))?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row
                .try_get("id")
                .map_err(|e| EngineError::storage(format!("failed to read id in user_grant_ids_for: {}", e)))?;
            ids.push(TenantRoleUserId::new(id));
        }
        Ok(ids)
    }

    async fn user_ids_paged(
        &self,
        tenant_id: Option<TenantId>,
        role_id: Option<RoleId>,
        page: PageRequest,
    ) -> EngineResult<Page<UserId>> {
        let tenant = tenant_id.map(|id| id.value());
        let role = role_id.map(|id| id.value());

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(DISTINCT u.user_id) as total
            FROM tenant_role_users u
            JOIN tenant_roles tr ON tr.id = u.tenant_role_id
            WHERE ($1::bigint IS NULL OR tr.tenant_id = $1)
                AND ($2::bigint IS NULL OR tr.role_id = $2)
            "#,
        )
        .bind(tenant)
        .bind(role)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_user_ids_paged", e))?;
        let total = read_count(&count_row, "count_user_ids_paged")?;

        let rows = sqlx::query(
            r#"
            SELECT DISTINCT u.user_id
            FROM tenant_role_users u
            JOIN tenant_roles tr ON tr.id = u.tenant_role_id
            WHERE ($1::bigint IS NULL OR tr.tenant_id = $1)
                AND ($2::bigint IS NULL OR tr.role_id = $2)
            ORDER BY u.user_id ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(tenant)
        .bind(role)
        .bind(page.size as i64)
        .bind(page.offset() as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("user_ids_paged", e))?;

        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row
                .try_get("user_id")
                .map_err(|e| EngineError::storage(format!("failed to read user_id in user_ids_paged: {}", e)))?;
            users.push(UserId::new(id));
        }
        Ok(Page::new(users, page, total))
    }

    async fn user_has_tenant_association(&self, user_id: UserId, tenant_id: TenantId) -> EngineResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM tenant_role_users u
                JOIN tenant_roles tr ON tr.id = u.tenant_role_id
                WHERE u.user_id = $1 AND tr.tenant_id = $2
            ) as present
            "#,
        )
        .bind(user_id.value())
        .bind(tenant_id.value())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("user_has_tenant_association", e))?;
        read_exists(&row, "user_has_tenant_association")
    }

    async fn user_grant_conflicts(
        &self,
        tenant_role_id: TenantRoleId,
        user_id: UserId,
        exclude: Option<TenantRoleUserId>,
    ) -> EngineResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM tenant_role_users
                WHERE tenant_role_id = $1 AND user_id = $2
                    AND ($3::bigint IS NULL OR id <> $3)
            ) as present
            "#,
        )
        .bind(tenant_role_id.value())
        .bind(user_id.value())
        .bind(exclude.map(|id| id.value()))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("user_grant_conflicts", e))?;
        read_exists(&row, "user_grant_conflicts")
    }

    async fn insert_user_grant(&self, tenant_role_id: TenantRoleId, user_id: UserId)
        -> EngineResult<TenantRoleUser>
    {
        let row = sqlx::query(
            "INSERT INTO tenant_role_users (tenant_role_id, user_id) VALUES ($1, $2) RETURNING id",
        )
        .bind(tenant_role_id.value())
        .bind(user_id.value())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_write_error("insert_user_grant", keys::USER_GRANT, e))?;
        let id: i64 = row
            .try_get("id")
            .map_err(|e| EngineError::storage(format!("failed to read id in insert_user_grant: {}", e)))?;
        Ok(TenantRoleUser {
            id: TenantRoleUserId::new(id),
            tenant_role_id,
            user_id,
        })
    }

    async fn update_user_grant(&self, record: &TenantRoleUser) -> EngineResult<()> {
        let result = sqlx::query("UPDATE tenant_role_users SET tenant_role_id = $2, user_id = $3 WHERE id = $1")
            .bind(record.id.value())
            .bind(record.tenant_role_id.value())
            .bind(record.user_id.value())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_write_error("update_user_grant", keys::USER_GRANT, e))?;
        if result.rows_affected() == 0 {
            return Err(EngineError::not_found(format!("tenant role user {}", record.id)));
        }
        Ok(())
    }

    async fn delete_user_grant(&self, id: TenantRoleUserId) -> EngineResult<bool> {
        let result = sqlx::query("DELETE FROM tenant_role_users WHERE id = $1")
            .bind(id.value())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_user_grant", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user_grants(&self, ids: &[TenantRoleUserId]) -> EngineResult<bool> {
        let id_values: Vec<i64> = ids.iter().map(|id| id.value()).collect();
        let result = sqlx::query("DELETE FROM tenant_role_users WHERE id = ANY($1)")
            .bind(&id_values)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_user_grants", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_user_grants_for(&self, tenant_role_id: TenantRoleId) -> EngineResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) as total FROM tenant_role_users WHERE tenant_role_id = $1")
            .bind(tenant_role_id.value())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_user_grants_for", e))?;
        read_count(&row, "count_user_grants_for")
    }

    async fn count_user_grants(&self) -> EngineResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) as total FROM tenant_role_users")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_user_grants", e))?;
        read_count(&row, "count_user_grants")
    }
}
