use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::auth::credentials::{CredentialKind, CredentialRecord};
use crate::auth::Role;
use crate::database::models::{BenefitLink, DirectoryEntry, DirectoryKind, User};
use crate::database::store::{CredentialStore, DirectoryStore, Store, StoreError, UserStore};

#[derive(Default)]
struct Tables {
    users: BTreeMap<String, User>,
    credentials: HashMap<CredentialKind, HashMap<String, CredentialRecord>>,
    attempts: HashMap<(CredentialKind, String), u32>,
    entries: HashMap<DirectoryKind, BTreeMap<String, DirectoryEntry>>,
    links: HashMap<BenefitLink, BTreeSet<(String, String)>>,
}

impl Tables {
    /// Mirrors the case-insensitive unique index on `users.email`.
    fn email_taken(&self, email: &str, except_id: &str) -> bool {
        self.users
            .values()
            .any(|u| u.id != except_id && u.email.eq_ignore_ascii_case(email))
    }

    fn name_taken(&self, kind: DirectoryKind, name: &str, except_id: &str) -> bool {
        self.entries
            .get(&kind)
            .map(|rows| rows.values().any(|e| e.id != except_id && e.name.eq_ignore_ascii_case(name)))
            .unwrap_or(false)
    }
}

/// In-process store used in development when no database is configured, and by tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self.find_user_by_email(email).await?.is_some())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&user.id) {
            return Err(StoreError::Query(format!("duplicate user id {}", user.id)));
        }
        if tables.email_taken(&user.email, &user.id) {
            return Err(StoreError::Conflict("users_email_unique".to_string()));
        }
        tables.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.email_taken(&user.email, &user.id) {
            return Err(StoreError::Conflict("users_email_unique".to_string()));
        }
        match tables.users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(StoreError::Query(format!("no user with id {}", user.id))),
        }
    }

    async fn delete_user(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        for records in tables.credentials.values_mut() {
            records.remove(id);
        }
        tables.attempts.retain(|(_, user_id), _| user_id != id);
        Ok(tables.users.remove(id).is_some())
    }

    async fn list_users_with_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|u| u.roles.contains(role))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn put_credential(&self, kind: CredentialKind, record: &CredentialRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.attempts.remove(&(kind, record.user_id.clone()));
        tables
            .credentials
            .entry(kind)
            .or_default()
            .insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn find_credential(&self, kind: CredentialKind, token_hash: &str) -> Result<Option<CredentialRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .credentials
            .get(&kind)
            .and_then(|records| records.values().find(|r| r.token_hash == token_hash))
            .cloned())
    }

    async fn find_credential_for_user(
        &self,
        kind: CredentialKind,
        user_id: &str,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.credentials.get(&kind).and_then(|records| records.get(user_id)).cloned())
    }

    async fn delete_credential(&self, kind: CredentialKind, user_id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        tables.attempts.remove(&(kind, user_id.to_string()));
        Ok(tables
            .credentials
            .get_mut(&kind)
            .map(|records| records.remove(user_id).is_some())
            .unwrap_or(false))
    }

    async fn rotate_credential(
        &self,
        kind: CredentialKind,
        previous_hash: &str,
        record: &CredentialRecord,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(current) = tables
            .credentials
            .get_mut(&kind)
            .and_then(|records| records.get_mut(&record.user_id))
        else {
            return Ok(false);
        };
        if current.token_hash != previous_hash {
            return Ok(false);
        }
        *current = record.clone();
        tables.attempts.remove(&(kind, record.user_id.clone()));
        Ok(true)
    }

    async fn record_failed_attempt(&self, kind: CredentialKind, user_id: &str) -> Result<u32, StoreError> {
        let mut tables = self.tables.write().await;
        let exists = tables
            .credentials
            .get(&kind)
            .map(|records| records.contains_key(user_id))
            .unwrap_or(false);
        if !exists {
            return Ok(0);
        }
        let attempts = tables.attempts.entry((kind, user_id.to_string())).or_insert(0);
        *attempts += 1;
        Ok(*attempts)
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn list_entries(&self, kind: DirectoryKind) -> Result<Vec<DirectoryEntry>, StoreError> {
        let tables = self.tables.read().await;
        let mut entries: Vec<DirectoryEntry> = tables
            .entries
            .get(&kind)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn find_entry(&self, kind: DirectoryKind, id: &str) -> Result<Option<DirectoryEntry>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.entries.get(&kind).and_then(|rows| rows.get(id)).cloned())
    }

    async fn entry_exists(&self, kind: DirectoryKind, id: &str) -> Result<bool, StoreError> {
        Ok(self.find_entry(kind, id).await?.is_some())
    }

    async fn name_exists(&self, kind: DirectoryKind, name: &str) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .entries
            .get(&kind)
            .map(|rows| rows.values().any(|e| e.name.eq_ignore_ascii_case(name)))
            .unwrap_or(false))
    }

    async fn has_children(&self, child: DirectoryKind, parent_id: &str) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .entries
            .get(&child)
            .map(|rows| rows.values().any(|e| e.parent_id.as_deref() == Some(parent_id)))
            .unwrap_or(false))
    }

    async fn insert_entry(&self, kind: DirectoryKind, entry: &DirectoryEntry) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.name_taken(kind, &entry.name, &entry.id) {
            return Err(StoreError::Conflict(format!("{}_name_unique", kind.table())));
        }
        let rows = tables.entries.entry(kind).or_default();
        if rows.contains_key(&entry.id) {
            return Err(StoreError::Query(format!("duplicate {} id {}", kind.table(), entry.id)));
        }
        rows.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn update_entry(&self, kind: DirectoryKind, entry: &DirectoryEntry) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.name_taken(kind, &entry.name, &entry.id) {
            return Err(StoreError::Conflict(format!("{}_name_unique", kind.table())));
        }
        match tables.entries.get_mut(&kind).and_then(|rows| rows.get_mut(&entry.id)) {
            Some(existing) => {
                *existing = entry.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_entry(&self, kind: DirectoryKind, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let removed = tables
            .entries
            .get_mut(&kind)
            .map(|rows| rows.remove(id).is_some())
            .unwrap_or(false);

        if removed && kind == DirectoryKind::City {
            for user in tables.users.values_mut() {
                if user.city_id.as_deref() == Some(id) {
                    user.city_id = None;
                }
            }
        }

        if removed {
            for (link, pairs) in tables.links.iter_mut() {
                if kind == DirectoryKind::Benefit {
                    pairs.retain(|(benefit, _)| benefit != id);
                } else if link.target() == kind {
                    pairs.retain(|(_, target)| target != id);
                }
            }
        }
        Ok(removed)
    }

    async fn link_exists(&self, link: BenefitLink, benefit_id: &str, target_id: &str) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .links
            .get(&link)
            .map(|pairs| pairs.contains(&(benefit_id.to_string(), target_id.to_string())))
            .unwrap_or(false))
    }

    async fn insert_link(&self, link: BenefitLink, benefit_id: &str, target_id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let inserted = tables
            .links
            .entry(link)
            .or_default()
            .insert((benefit_id.to_string(), target_id.to_string()));
        if !inserted {
            return Err(StoreError::Conflict(format!("{}_pkey", link.table())));
        }
        Ok(())
    }

    async fn linked_ids(&self, link: BenefitLink, benefit_id: &str) -> Result<Vec<String>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .links
            .get(&link)
            .map(|pairs| {
                pairs
                    .iter()
                    .filter(|(benefit, _)| benefit == benefit_id)
                    .map(|(_, target)| target.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) {
        tracing::info!("Closed in-memory store");
    }
}
