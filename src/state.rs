use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::database::RedisStore;
use crate::error::AppError;
use crate::feed::FeedComposer;
use crate::ledger::EngagementLedger;
use crate::store::{MemoryStore, Storage};

pub struct AppState {
    pub config: Config,
    pub feed: FeedComposer,
    pub ledger: EngagementLedger,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>, AppError> {
        let store: Arc<dyn Storage> = match config.store.as_str() {
            "redis" => {
                info!("Connecting to redis at {}", config.redis_url);
                Arc::new(RedisStore::connect(&config.redis_url).await?)
            }
            "memory" => Arc::new(MemoryStore::new()),
            other => {
                warn!("Unknown store backend {other:?}, falling back to memory");
                Arc::new(MemoryStore::new())
            }
        };

        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: Config, store: Arc<dyn Storage>) -> Arc<Self> {
        Arc::new(Self {
            config,
            feed: FeedComposer::new(store.clone()),
            ledger: EngagementLedger::new(store),
        })
    }
}
