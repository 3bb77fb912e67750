pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

use std::sync::Arc;

use crate::config::{AppConfig, Environment};

pub use memory::MemoryStore;
pub use models::{new_id, BenefitLink, DirectoryEntry, DirectoryKind, User, ID_LENGTH};
pub use postgres::PgStore;
pub use store::{CredentialStore, DirectoryStore, Store, StoreError, UserStore};

/// Pick the backend for this configuration: PostgreSQL when a URL is set,
/// the in-memory store in development otherwise.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn Store>, StoreError> {
    match (&config.database.url, config.environment) {
        (Some(_), _) => Ok(Arc::new(PgStore::connect(&config.database).await?)),
        (None, Environment::Development) => {
            tracing::warn!("DATABASE_URL not set; using in-memory store (data is lost on restart)");
            Ok(Arc::new(MemoryStore::new()))
        }
        (None, _) => Err(StoreError::ConfigMissing("DATABASE_URL")),
    }
}
