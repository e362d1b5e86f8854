pub mod asset_proxy;
pub mod download_manager;
pub mod events;
pub mod filename;
pub mod http_client;
pub mod normalizer;
pub mod redirect;
pub mod registry;
pub mod video_cache;
