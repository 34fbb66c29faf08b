//! Cookie-sync pixel deployment config for a bidder or publisher.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// How a sync pixel is deployed on the page.
#[derive(Debug, Clone, Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Image,
    Iframe,
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(rename_all = "lowercase")]
pub struct SyncConfig {
    pub url: String,
    pub kind: SyncKind,
}
