use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::auth::credentials::{CredentialKind, CredentialRecord};
use crate::auth::{Role, RoleSet};
use crate::config::DatabaseConfig;
use crate::database::models::{BenefitLink, DirectoryEntry, DirectoryKind, User};
use crate::database::store::{CredentialStore, DirectoryStore, Store, StoreError, UserStore};

/// PostgreSQL-backed store. Table and column names are static identifiers
/// from `DirectoryKind`/`BenefitLink`/`CredentialKind`; values are always bound.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    password_hash: String,
    registered_at: DateTime<Utc>,
    city_id: Option<String>,
    verified: bool,
}

const USER_COLUMNS: &str = "id, name, email, password_hash, registered_at, city_id, verified";

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let url = config.url.as_deref().ok_or(StoreError::ConfigMissing("DATABASE_URL"))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(url)
            .await?;

        info!("Created database pool (max {} connections)", config.max_connections);
        Ok(Self { pool })
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("migration failed: {}", e)))?;
        info!("Database migrations applied");
        Ok(())
    }

    async fn roles_for(&self, user_id: &str) -> Result<RoleSet, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT role FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(role,)| role.parse::<Role>().map_err(|e| StoreError::Corrupt(e.to_string())))
            .collect()
    }

    async fn hydrate(&self, row: UserRow) -> Result<User, StoreError> {
        let roles = self.roles_for(&row.id).await?;
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            registered_at: row.registered_at,
            city_id: row.city_id,
            roles,
            verified: row.verified,
        })
    }

    fn entry_select(kind: DirectoryKind) -> String {
        let description = if kind.has_description() { "description" } else { "NULL::text" };
        let parent = kind.parent_column().unwrap_or("NULL::text");
        format!(
            "SELECT id, name, {} AS description, {} AS parent_id FROM {}",
            description,
            parent,
            kind.table()
        )
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE lower(email) = lower($1)", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE lower(email) = lower($1))")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, registered_at, city_id, verified)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.registered_at)
        .bind(&user.city_id)
        .bind(user.verified)
        .execute(&mut *tx)
        .await?;

        for role in user.roles.iter() {
            sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2)")
                .bind(&user.id)
                .bind(role.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = $2, email = $3, password_hash = $4, city_id = $5, verified = $6
            WHERE id = $1
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.city_id)
        .bind(user.verified)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Query(format!("no user with id {}", user.id)));
        }

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(&user.id)
            .execute(&mut *tx)
            .await?;
        for role in user.roles.iter() {
            sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2)")
                .bind(&user.id)
                .bind(role.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_user(&self, id: &str) -> Result<bool, StoreError> {
        // credential and role rows cascade
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_users_with_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let sql = format!(
            "SELECT {} FROM users u WHERE EXISTS (SELECT 1 FROM user_roles r WHERE r.user_id = u.id AND r.role = $1) ORDER BY registered_at",
            USER_COLUMNS
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(role.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            users.push(self.hydrate(row).await?);
        }
        Ok(users)
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn put_credential(&self, kind: CredentialKind, record: &CredentialRecord) -> Result<(), StoreError> {
        let sql = format!(
            r#"
            INSERT INTO {} (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET token_hash = EXCLUDED.token_hash, expires_at = EXCLUDED.expires_at, attempts = 0
            "#,
            kind.table()
        );
        sqlx::query(&sql)
            .bind(&record.user_id)
            .bind(&record.token_hash)
            .bind(record.expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_credential(&self, kind: CredentialKind, token_hash: &str) -> Result<Option<CredentialRecord>, StoreError> {
        let sql = format!(
            "SELECT user_id, token_hash, expires_at FROM {} WHERE token_hash = $1",
            kind.table()
        );
        Ok(sqlx::query_as::<_, CredentialRecord>(&sql)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_credential_for_user(
        &self,
        kind: CredentialKind,
        user_id: &str,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        let sql = format!(
            "SELECT user_id, token_hash, expires_at FROM {} WHERE user_id = $1",
            kind.table()
        );
        Ok(sqlx::query_as::<_, CredentialRecord>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_credential(&self, kind: CredentialKind, user_id: &str) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {} WHERE user_id = $1", kind.table());
        let result = sqlx::query(&sql).bind(user_id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn rotate_credential(
        &self,
        kind: CredentialKind,
        previous_hash: &str,
        record: &CredentialRecord,
    ) -> Result<bool, StoreError> {
        let sql = format!(
            r#"
            UPDATE {}
            SET token_hash = $3, expires_at = $4, attempts = 0
            WHERE user_id = $1 AND token_hash = $2
            "#,
            kind.table()
        );
        let result = sqlx::query(&sql)
            .bind(&record.user_id)
            .bind(previous_hash)
            .bind(&record.token_hash)
            .bind(record.expires_at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_failed_attempt(&self, kind: CredentialKind, user_id: &str) -> Result<u32, StoreError> {
        let sql = format!(
            "UPDATE {} SET attempts = attempts + 1 WHERE user_id = $1 RETURNING attempts",
            kind.table()
        );
        let row: Option<(i32,)> = sqlx::query_as(&sql).bind(user_id).fetch_optional(&self.pool).await?;
        Ok(row.map(|(attempts,)| attempts.max(0) as u32).unwrap_or(0))
    }
}

#[async_trait]
impl DirectoryStore for PgStore {
    async fn list_entries(&self, kind: DirectoryKind) -> Result<Vec<DirectoryEntry>, StoreError> {
        let sql = format!("{} ORDER BY name", Self::entry_select(kind));
        Ok(sqlx::query_as::<_, DirectoryEntry>(&sql).fetch_all(&self.pool).await?)
    }

    async fn find_entry(&self, kind: DirectoryKind, id: &str) -> Result<Option<DirectoryEntry>, StoreError> {
        let sql = format!("{} WHERE id = $1", Self::entry_select(kind));
        Ok(sqlx::query_as::<_, DirectoryEntry>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn entry_exists(&self, kind: DirectoryKind, id: &str) -> Result<bool, StoreError> {
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)", kind.table());
        let (exists,): (bool,) = sqlx::query_as(&sql).bind(id).fetch_one(&self.pool).await?;
        Ok(exists)
    }

    async fn name_exists(&self, kind: DirectoryKind, name: &str) -> Result<bool, StoreError> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE lower(name) = lower($1))",
            kind.table()
        );
        let (exists,): (bool,) = sqlx::query_as(&sql).bind(name).fetch_one(&self.pool).await?;
        Ok(exists)
    }

    async fn has_children(&self, child: DirectoryKind, parent_id: &str) -> Result<bool, StoreError> {
        let Some(column) = child.parent_column() else {
            return Ok(false);
        };
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE {} = $1)", child.table(), column);
        let (exists,): (bool,) = sqlx::query_as(&sql).bind(parent_id).fetch_one(&self.pool).await?;
        Ok(exists)
    }

    async fn insert_entry(&self, kind: DirectoryKind, entry: &DirectoryEntry) -> Result<(), StoreError> {
        let mut columns = vec!["id", "name"];
        if kind.has_description() {
            columns.push("description");
        }
        if let Some(parent) = kind.parent_column() {
            columns.push(parent);
        }
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            kind.table(),
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut query = sqlx::query(&sql).bind(&entry.id).bind(&entry.name);
        if kind.has_description() {
            query = query.bind(&entry.description);
        }
        if kind.parent_column().is_some() {
            query = query.bind(&entry.parent_id);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn update_entry(&self, kind: DirectoryKind, entry: &DirectoryEntry) -> Result<bool, StoreError> {
        let mut assignments = vec!["name = $2".to_string()];
        if kind.has_description() {
            assignments.push(format!("description = ${}", assignments.len() + 2));
        }
        if let Some(parent) = kind.parent_column() {
            assignments.push(format!("{} = ${}", parent, assignments.len() + 2));
        }
        let sql = format!("UPDATE {} SET {} WHERE id = $1", kind.table(), assignments.join(", "));

        let mut query = sqlx::query(&sql).bind(&entry.id).bind(&entry.name);
        if kind.has_description() {
            query = query.bind(&entry.description);
        }
        if kind.parent_column().is_some() {
            query = query.bind(&entry.parent_id);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_entry(&self, kind: DirectoryKind, id: &str) -> Result<bool, StoreError> {
        // join rows cascade
        let sql = format!("DELETE FROM {} WHERE id = $1", kind.table());
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn link_exists(&self, link: BenefitLink, benefit_id: &str, target_id: &str) -> Result<bool, StoreError> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE benefit_id = $1 AND {} = $2)",
            link.table(),
            link.target_column()
        );
        let (exists,): (bool,) = sqlx::query_as(&sql)
            .bind(benefit_id)
            .bind(target_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn insert_link(&self, link: BenefitLink, benefit_id: &str, target_id: &str) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (benefit_id, {}) VALUES ($1, $2)",
            link.table(),
            link.target_column()
        );
        sqlx::query(&sql)
            .bind(benefit_id)
            .bind(target_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn linked_ids(&self, link: BenefitLink, benefit_id: &str) -> Result<Vec<String>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE benefit_id = $1 ORDER BY 1",
            link.target_column(),
            link.table()
        );
        let rows: Vec<(String,)> = sqlx::query_as(&sql).bind(benefit_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[async_trait]
impl Store for PgStore {
    /// Pings the pool to ensure connectivity
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_select_fills_missing_columns_with_nulls() {
        let city = PgStore::entry_select(DirectoryKind::City);
        assert_eq!(
            city,
            "SELECT id, name, NULL::text AS description, NULL::text AS parent_id FROM cities"
        );

        let institution = PgStore::entry_select(DirectoryKind::Institution);
        assert!(institution.contains("city_id AS parent_id"));

        let benefit = PgStore::entry_select(DirectoryKind::Benefit);
        assert!(benefit.contains("description AS description"));
    }

    #[tokio::test]
    async fn connect_requires_url() {
        let config = crate::config::AppConfig::development().database;
        assert!(matches!(
            PgStore::connect(&config).await,
            Err(StoreError::ConfigMissing("DATABASE_URL"))
        ));
    }
}
