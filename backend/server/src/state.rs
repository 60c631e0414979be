use std::{path::PathBuf, sync::Arc};

use catalog::load_catalog;
use tracing::info;

use super::{
    config::Config,
    engagement::Engagement,
    error::StartupError,
    geo::Geolocator,
    identity::IdentityHasher,
    ledger::Ledger,
};

pub struct State {
    pub engagement: Engagement,
    pub platform_user: String,
    pub platform_password: String,
    /// Source for `/api/platform/catalog/reload`, `None` for in-memory catalogs.
    pub catalog_path: Option<PathBuf>,
}

impl State {
    pub fn new(config: Config) -> Result<Arc<Self>, StartupError> {
        let catalog = load_catalog(&config.catalog_path)?;
        info!("Loaded {} candidates from {}", catalog.len(), config.catalog_path.display());

        let ledger = Ledger::open(&config.db_path)?;
        info!("Opened ledger at {}", config.db_path.display());

        let geo = Geolocator::open(&config.geoip_path);

        let engagement = Engagement::new(
            ledger,
            catalog,
            Arc::new(geo),
            IdentityHasher::new(config.salt),
            config.policy,
        );

        Ok(Arc::new(Self {
            engagement,
            platform_user: config.platform_user,
            platform_password: config.platform_password,
            catalog_path: Some(config.catalog_path),
        }))
    }

    pub fn from_parts(
        engagement: Engagement,
        platform_user: impl Into<String>,
        platform_password: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            engagement,
            platform_user: platform_user.into(),
            platform_password: platform_password.into(),
            catalog_path: None,
        })
    }
}
