//! Owns the process-wide [`RexConfig`]: loads it once at
//! startup and hands out read guards. Not to be confused with the
//! [`crate::core::resolver`], which resolves per-request bidder params
//! from the account/publisher/ad-slot hierarchy.

use crate::app::config::RexConfig;
use anyhow::Error;
use parking_lot::{RwLock, RwLockReadGuard};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct ConfigManager {
    path: PathBuf,
    cfg: Arc<RwLock<RexConfig>>,
    started: AtomicBool,
}

impl ConfigManager {
    pub fn new(cfg_path: PathBuf) -> ConfigManager {
        ConfigManager {
            path: cfg_path,
            cfg: Arc::new(RwLock::new(RexConfig::default())),
            started: AtomicBool::new(false),
        }
    }

    fn reload(&self) -> Result<(), Error> {
        let cfg = RexConfig::load(&self.path)?;
        *self.cfg.write() = cfg;
        Ok(())
    }

    /// Loads the initial config. Must be called once before [`get`].
    pub fn start(&self) -> Result<(), Error> {
        self.reload()?;
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    pub fn get(&self) -> RwLockReadGuard<'_, RexConfig> {
        if !self.started.load(Ordering::Acquire) {
            panic!("ConfigManager not started yet but fetching config");
        }
        self.cfg.read()
    }
}
