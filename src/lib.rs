use std::path::PathBuf;
use std::sync::Arc;

use vidlink_core::core::events::ProgressEmitter;
use vidlink_core::fs_paths::AppPaths;
use vidlink_core::models::settings::AppSettings;

pub mod commands;
pub mod core;
pub mod error;
pub mod models;
pub mod platforms;
pub mod storage;

const DATABASE_FILE: &str = "vidlink.db";

/// Everything the boundary commands need, built once per process.
pub struct AppState {
    pub registry: core::registry::PlatformRegistry,
    pub asset_proxy: core::asset_proxy::AssetProxy,
    pub video_cache: core::video_cache::VideoCache,
    pub downloads: core::download_manager::DownloadManager,
    pub store: Arc<storage::db::Store>,
    pub data_dir: PathBuf,
}

impl AppState {
    pub fn new(
        settings: &AppSettings,
        paths: &dyn AppPaths,
        emitter: Arc<dyn ProgressEmitter>,
    ) -> anyhow::Result<Self> {
        core::http_client::init_proxy(settings.proxy.clone());

        let data_dir = paths.data_dir();
        let store = Arc::new(storage::db::Store::open(&data_dir.join(DATABASE_FILE))?);
        let cache_dir = settings
            .cache
            .dir
            .clone()
            .unwrap_or_else(|| paths.cache_dir().join("videos"));
        tracing::info!(
            "[state] data dir {}, video cache {}",
            data_dir.display(),
            cache_dir.display()
        );

        let net = &settings.network;
        Ok(Self {
            registry: core::registry::PlatformRegistry::with_default_platforms(net)?,
            asset_proxy: core::asset_proxy::AssetProxy::new(net, &settings.asset_proxy)?,
            video_cache: core::video_cache::VideoCache::new(cache_dir, &settings.cache, net)?,
            downloads: core::download_manager::DownloadManager::new(
                store.clone(),
                emitter,
                net,
                &settings.download,
            )?,
            store,
            data_dir,
        })
    }
}
