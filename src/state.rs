use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::db::Store;

/// Process-wide state: the parsed config and the storage handle. Everything
/// else (services, routers) is built on top of this.
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    /// Captured before the config moves behind the lock; the blob store and
    /// the static mount both need it synchronously.
    pub upload_path: String,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
            Duration::from_secs(config.general.storage_timeout_seconds),
        )
        .await?;

        let upload_path = config.uploads.upload_path.clone();
        let config = Arc::new(RwLock::new(config));

        Ok(Self {
            config,
            store,
            upload_path,
        })
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }
}
