//! Configuration resolution for mcat-catalog
//!
//! Turns the bootstrap [`TomlConfig`] (already carrying environment
//! overrides) into concrete paths, the analysis client and quota settings,
//! and opens the store from them.

use crate::db::SqliteKvStore;
use crate::error::CatalogResult;
use crate::models::QuotaTier;
use crate::services::analysis_client::{AnalysisClient, HttpAnalysisClient, LocalAnalysisClient};
use crate::store::{CatalogStore, CatalogStoreBuilder};
use mcat_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use mcat_common::events::EventBus;
use mcat_common::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Fully resolved catalog settings
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSettings {
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
    pub cache_dir: PathBuf,
    /// None = offline analysis
    pub analysis_endpoint: Option<String>,
    pub analysis_timeout: Duration,
    pub quota_tier: QuotaTier,
    pub quota_cap: Option<u64>,
}

impl CatalogSettings {
    /// Resolve settings; `cli_root` wins over every other root folder source
    pub fn resolve(config: &TomlConfig, cli_root: Option<PathBuf>) -> Result<Self> {
        let root_folder = RootFolderResolver::new()
            .with_cli_arg(cli_root)
            .with_toml(config)
            .resolve();
        let initializer = RootFolderInitializer::new(root_folder.clone());

        let quota_tier: QuotaTier = config
            .quota
            .tier
            .parse()
            .map_err(Error::Config)?;

        let analysis_endpoint = config
            .analysis
            .endpoint
            .as_ref()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        if config.analysis.timeout_secs == 0 {
            return Err(Error::Config("analysis.timeout_secs must be positive".to_string()));
        }

        Ok(Self {
            database_path: config
                .database_path
                .clone()
                .unwrap_or_else(|| initializer.database_path()),
            cache_dir: config
                .cache_dir
                .clone()
                .unwrap_or_else(|| initializer.cache_dir()),
            root_folder,
            analysis_endpoint,
            analysis_timeout: Duration::from_secs(config.analysis.timeout_secs),
            quota_tier,
            quota_cap: config.quota.monthly_cap,
        })
    }

    /// HTTP client when an endpoint is configured, offline analysis otherwise
    pub fn analysis_client(&self) -> CatalogResult<Arc<dyn AnalysisClient>> {
        match &self.analysis_endpoint {
            Some(endpoint) => {
                info!(endpoint = %endpoint, "Using analysis service");
                Ok(Arc::new(HttpAnalysisClient::new(endpoint, self.analysis_timeout)?))
            }
            None => {
                warn!("No analysis endpoint configured; using offline analysis");
                Ok(Arc::new(LocalAnalysisClient))
            }
        }
    }

    /// Create the root folder, open the database and load the store
    ///
    /// The returned store still needs [`CatalogStore::start_rehydration`].
    pub async fn open_store(&self, events: EventBus) -> CatalogResult<CatalogStore> {
        RootFolderInitializer::new(self.root_folder.clone()).ensure_directory_exists()?;

        info!("Database: {}", self.database_path.display());
        let persistence = SqliteKvStore::open(&self.database_path).await?;

        CatalogStoreBuilder::new(Arc::new(persistence), self.cache_dir.clone())
            .with_analysis_client(self.analysis_client()?)
            .with_quota(self.quota_tier, self.quota_cap)
            .with_event_bus(events)
            .open()
            .await
    }
}
