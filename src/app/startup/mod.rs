//! Builds the ordered startup pipeline: config and
//! logging first since every later task may want to log, then the
//! config/bidder stores, then the stateless building blocks
//! (breaker, currency, user-sync, events), then the adapter registry
//! and exchange that depend on them, and finally the HTTP listener.

mod tasks;

use crate::app::context::StartupContext;
use crate::core::config_manager::ConfigManager;
use crate::pipeline::{Pipeline, PipelineBuilder};
use std::path::PathBuf;
use std::sync::Arc;

pub fn build_start_pipeline(cfg_path: PathBuf) -> Pipeline<Arc<StartupContext>, anyhow::Error> {
    let cfg_manager = Arc::new(ConfigManager::new(cfg_path));

    PipelineBuilder::new()
        .with_blocking(Box::new(tasks::ConfigLoadTask::new(cfg_manager)))
        .with_blocking(Box::new(tasks::ObservabilityTask))
        .with_blocking(Box::new(tasks::HttpClientTask))
        .with_async(Box::new(tasks::ResolverLoadTask))
        .with_blocking(Box::new(tasks::DeviceGeoTask))
        .with_blocking(Box::new(tasks::UserSyncTask))
        .with_blocking(Box::new(tasks::BreakerTask))
        .with_blocking(Box::new(tasks::CurrencyTask))
        .with_blocking(Box::new(tasks::EventsTask))
        .with_blocking(Box::new(tasks::AdapterRegistryTask))
        .with_blocking(Box::new(tasks::ExchangeBuildTask))
        .with_async(Box::new(tasks::StartServerTask))
        .build()
        .expect("startup pipeline should have tasks")
}
