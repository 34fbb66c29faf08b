//! Static-mapping-file fallback provider, used under the
//! `db_with_file_fallback` resolver mode. Reads a YAML file once at
//! startup and never emits change events — the resolver falls back to
//! this provider's snapshot when the live store is unhealthy.

use crate::core::providers::{Provider, ProviderEvent};
use anyhow::{Context, Error};
use async_trait::async_trait;
use config::{Config, File as ConfigFile};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::path::PathBuf;
use tracing::info;

pub struct FileProvider<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T> FileProvider<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T> Provider<T> for FileProvider<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn start(
        &self,
        _on_event: Box<dyn Fn(ProviderEvent<T>) + Send + Sync>,
    ) -> Result<Vec<T>, Error> {
        let path = self.path.clone();
        let items: Vec<T> = tokio::task::spawn_blocking(move || -> Result<Vec<T>, Error> {
            let settings = Config::builder()
                .add_source(ConfigFile::from(path.clone()))
                .build()
                .with_context(|| format!("reading fallback file {}", path.display()))?;

            settings
                .try_deserialize()
                .with_context(|| format!("parsing fallback file {}", path.display()))
        })
        .await
        .context("fallback file load task panicked")??;

        info!(
            "Loaded {} entries from fallback file {}",
            items.len(),
            self.path.display()
        );
        Ok(items)
    }
}
