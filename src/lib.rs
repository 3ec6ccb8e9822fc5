pub mod bazaar;
pub mod config;
pub mod download;
pub mod error;
pub mod messages;
pub mod models;
pub mod search;
pub mod utils;

use std::sync::Arc;

use bazaar::{BazaarClient, Transport};
use config::AppConfig;
use download::Downloader;
use search::{RequestExecutor, SearchCoordinator};

/// Build the HTTP transport from the loaded config / 根据配置创建HTTP传输
pub fn build_transport(config: &AppConfig) -> anyhow::Result<Arc<dyn Transport>> {
    let client = BazaarClient::new(
        config.api.endpoint.clone(),
        config.api_key(),
        config.request_timeout(),
    )?;
    Ok(Arc::new(client))
}

/// Wire a coordinator on top of a transport / 在传输层之上组装协调器
pub fn build_coordinator(config: &AppConfig, transport: Arc<dyn Transport>) -> SearchCoordinator {
    let executor = Arc::new(RequestExecutor::new(transport, config.executor_settings()));
    SearchCoordinator::new(executor, config.coordinator_settings())
}

/// Downloader writing into the configured directory / 写入配置目录的下载器
pub fn build_downloader(config: &AppConfig, transport: Arc<dyn Transport>) -> Downloader {
    Downloader::new(transport, config.get_download_dir())
}
