use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::services::{
    AuthService, LogNotifier, Notifier, OpaqueTokenIssuer, SeaOrmAuthService, TokenIssuer,
};

/// Application-wide wiring: the store plus the workflow collaborators.
#[derive(Clone)]
pub struct SharedState {
    pub config: Config,

    pub store: Store,

    pub auth_service: Arc<dyn AuthService>,

    pub notifier: Arc<dyn Notifier>,

    pub token_issuer: Arc<dyn TokenIssuer>,
}

impl SharedState {
    /// Default collaborators: log-only notifier, opaque token issuer.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::with_collaborators(config, Arc::new(LogNotifier), Arc::new(OpaqueTokenIssuer)).await
    }

    /// Explicit collaborators, used by deployments with a real mail relay
    /// and by tests with recording fakes.
    pub async fn with_collaborators(
        config: Config,
        notifier: Arc<dyn Notifier>,
        token_issuer: Arc<dyn TokenIssuer>,
    ) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let auth_service = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            config.security.clone(),
            notifier.clone(),
            token_issuer.clone(),
        ));

        Ok(Self {
            config,
            store,
            auth_service,
            notifier,
            token_issuer,
        })
    }
}
