use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::plugins::{plugin_events::PluginEvents, plugin_uploads::PluginUploads};
use crate::sys_config::core::AppConfig;
use crate::sys_core::{core::PluginManager, handlers::run_server};
use crate::sys_events::{
    core::{EventStore, JsonlEventStore, MemoryEventStore},
    handlers::EventsContext,
};

pub mod plugins;
pub mod sys_config;
pub mod sys_core;
pub mod sys_events;
pub mod sys_statichost;
pub mod sys_upload;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let policy = Arc::new(config.upload_policy());

    let store: Arc<dyn EventStore> = match &config.data_file {
        Some(path) => {
            tracing::info!(path = %path.display(), "persisting events to file");
            Arc::new(JsonlEventStore::new(path.clone()))
        }
        None => {
            tracing::warn!("EVENTS_DATA_FILE not set; events are kept in memory only");
            Arc::new(MemoryEventStore::new())
        }
    };

    tokio::spawn(sys_upload::core::sweep_staging(
        policy.staging_directory(),
        Duration::from_secs(config.staging_max_age_secs),
        Duration::from_secs(config.sweep_interval_secs),
    ));

    let mut manager = PluginManager::new();
    manager.apply_plugin(Box::new(PluginEvents::new(EventsContext {
        policy: policy.clone(),
        store,
        public_prefix: config.public_prefix.clone(),
    })));
    manager.apply_plugin(Box::new(PluginUploads::new(
        config.upload_dir.clone(),
        config.public_prefix.clone(),
    )));
    manager.init_plugins().await;
    let manager = Arc::new(manager);

    run_server(config.port, manager).await.context("server error")?;
    Ok(())
}
