use async_trait::async_trait;
use thiserror::Error;

use crate::auth::credentials::{CredentialKind, CredentialRecord};
use crate::auth::Role;
use crate::database::models::{BenefitLink, DirectoryEntry, DirectoryKind, User};

/// Errors from a persistence backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A uniqueness constraint rejected the write.
    #[error("Duplicate value violates {0}")]
    Conflict(String),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

/// Postgres `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return StoreError::Conflict(db.constraint().unwrap_or("a unique index").to_string());
            }
        }
        StoreError::Sqlx(err)
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError>;

    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Overwrites every mutable column and the role set. The id never changes.
    async fn update_user(&self, user: &User) -> Result<(), StoreError>;

    /// Removes the user together with all of their credentials.
    async fn delete_user(&self, id: &str) -> Result<bool, StoreError>;

    async fn list_users_with_role(&self, role: Role) -> Result<Vec<User>, StoreError>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert or replace the user's credential of this kind.
    async fn put_credential(&self, kind: CredentialKind, record: &CredentialRecord) -> Result<(), StoreError>;

    async fn find_credential(&self, kind: CredentialKind, token_hash: &str) -> Result<Option<CredentialRecord>, StoreError>;

    async fn find_credential_for_user(
        &self,
        kind: CredentialKind,
        user_id: &str,
    ) -> Result<Option<CredentialRecord>, StoreError>;

    async fn delete_credential(&self, kind: CredentialKind, user_id: &str) -> Result<bool, StoreError>;

    /// Replace the user's credential only if it still has `previous_hash`.
    /// Returns false when another writer got there first.
    async fn rotate_credential(
        &self,
        kind: CredentialKind,
        previous_hash: &str,
        record: &CredentialRecord,
    ) -> Result<bool, StoreError>;

    /// Count a failed confirmation against the user's credential and return
    /// the new total. Zero when there is no credential.
    async fn record_failed_attempt(&self, kind: CredentialKind, user_id: &str) -> Result<u32, StoreError>;
}

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn list_entries(&self, kind: DirectoryKind) -> Result<Vec<DirectoryEntry>, StoreError>;

    async fn find_entry(&self, kind: DirectoryKind, id: &str) -> Result<Option<DirectoryEntry>, StoreError>;

    async fn entry_exists(&self, kind: DirectoryKind, id: &str) -> Result<bool, StoreError>;

    async fn name_exists(&self, kind: DirectoryKind, name: &str) -> Result<bool, StoreError>;

    /// Whether any row of `child` references `parent_id`.
    async fn has_children(&self, child: DirectoryKind, parent_id: &str) -> Result<bool, StoreError>;

    async fn insert_entry(&self, kind: DirectoryKind, entry: &DirectoryEntry) -> Result<(), StoreError>;

    async fn update_entry(&self, kind: DirectoryKind, entry: &DirectoryEntry) -> Result<bool, StoreError>;

    /// Removes the entry and any benefit links pointing at it.
    async fn delete_entry(&self, kind: DirectoryKind, id: &str) -> Result<bool, StoreError>;

    async fn link_exists(&self, link: BenefitLink, benefit_id: &str, target_id: &str) -> Result<bool, StoreError>;

    async fn insert_link(&self, link: BenefitLink, benefit_id: &str, target_id: &str) -> Result<(), StoreError>;

    async fn linked_ids(&self, link: BenefitLink, benefit_id: &str) -> Result<Vec<String>, StoreError>;
}

/// Everything the service needs from persistence.
#[async_trait]
pub trait Store: UserStore + CredentialStore + DirectoryStore {
    async fn health_check(&self) -> Result<(), StoreError>;

    async fn close(&self);
}
