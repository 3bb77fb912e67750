use std::sync::Arc;

use anyhow::Context;

use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::database::Store;
use crate::mail::MailSender;
use crate::routing::RouteTable;

/// Collaborators shared by every request. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub mailer: Arc<dyn MailSender>,
    pub auth: Arc<AuthService>,
    pub routes: Arc<RouteTable>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn Store>, mailer: Arc<dyn MailSender>) -> anyhow::Result<Self> {
        let auth = AuthService::new(store.clone(), &config.security).context("invalid JWT configuration")?;
        let routes = RouteTable::standard().context("invalid route rule")?;

        Ok(Self {
            config: Arc::new(config),
            store,
            mailer,
            auth: Arc::new(auth),
            routes: Arc::new(routes),
        })
    }

    pub async fn shutdown(&self) {
        self.store.close().await;
        tracing::info!("Store closed");
    }
}
