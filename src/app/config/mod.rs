//! Process-wide configuration, loaded once at startup by
//! [`crate::core::config_manager::ConfigManager`] from a single YAML
//! file via the `config` crate.

use crate::rtb::bid_response::MediaType;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct CacheConfig {
    pub cache_device_sz: usize,
    pub cache_resolver_sz: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_device_sz: 250_000,
            cache_resolver_sz: 50_000,
        }
    }
}

/// Where the config resolver gets its account/publisher/ad
/// slot hierarchy from, and how it reacts when the live store is
/// unavailable. Defaults to `DbWithFileFallback`: the live store wins
/// when healthy, the static file otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverMode {
    Db,
    File,
    DbWithFileFallback,
}

impl Default for ResolverMode {
    fn default() -> Self {
        ResolverMode::DbWithFileFallback
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub mode: ResolverMode,
    pub firestore_project_id: Option<String>,
    pub fallback_accounts_path: Option<PathBuf>,
    pub fallback_publishers_path: Option<PathBuf>,
    pub fallback_slots_path: Option<PathBuf>,
    pub fallback_bidders_path: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            mode: ResolverMode::default(),
            firestore_project_id: None,
            fallback_accounts_path: None,
            fallback_publishers_path: None,
            fallback_slots_path: None,
            fallback_bidders_path: None,
            cache_ttl: Duration::from_secs(60),
        }
    }
}

/// Circuit breaker thresholds, shared by every bidder
/// unless a per-bidder override is added later.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    #[serde(with = "humantime_serde")]
    pub failure_window: Duration,
    #[serde(with = "humantime_serde")]
    pub open_duration: Duration,
    pub half_open_max_probes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(30),
            open_duration: Duration::from_secs(30),
            half_open_max_probes: 1,
        }
    }
}

impl BreakerConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.failure_threshold == 0 {
            anyhow::bail!("breaker.failure_threshold must be greater than 0");
        }
        if self.half_open_max_probes == 0 {
            anyhow::bail!("breaker.half_open_max_probes must be greater than 0");
        }
        Ok(())
    }
}

/// Multibid caps: how many ranked bids a single
/// bidder may contribute per impression, and in total across an
/// auction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultibidConfig {
    pub enabled: bool,
    pub max_bids_per_bidder_per_imp: usize,
    pub max_bids_per_bidder: usize,
}

impl Default for MultibidConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_bids_per_bidder_per_imp: 1,
            max_bids_per_bidder: 1,
        }
    }
}

impl MultibidConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_bids_per_bidder_per_imp == 0 {
            anyhow::bail!("multibid.max_bids_per_bidder_per_imp must be greater than 0");
        }
        if self.max_bids_per_bidder_per_imp > 3 {
            anyhow::bail!("multibid.max_bids_per_bidder_per_imp cannot exceed 3");
        }
        if self.max_bids_per_bidder == 0 {
            anyhow::bail!("multibid.max_bids_per_bidder must be greater than 0");
        }
        Ok(())
    }
}

/// Tie-break policy between formats on a multiformat impression.
/// `Server` is the default:
/// deal beats non-deal, then the preferred format gets a 5% CPM
/// advantage, then highest CPM wins outright. `PreferDeal` drops the
/// format advantage entirely (deal, then CPM). `PreferMediaType` still
/// applies the format advantage but is meant for configs that care more
/// about format match than deal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiformatStrategy {
    Server,
    PreferDeal,
    PreferMediaType,
}

impl Default for MultiformatStrategy {
    fn default() -> Self {
        MultiformatStrategy::Server
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiformatConfig {
    pub strategy: MultiformatStrategy,
    /// The format that earns the 5% CPM advantage under `Server` and
    /// `PreferMediaType`; `None` disables the advantage (plain CPM
    /// after the deal tie-break).
    pub preferred_media_type: Option<MediaType>,
}

impl Default for MultiformatConfig {
    fn default() -> Self {
        Self {
            strategy: MultiformatStrategy::default(),
            preferred_media_type: Some(MediaType::Banner),
        }
    }
}

/// Auction-wide deadline and fan-out caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    #[serde(with = "humantime_serde")]
    pub default_tmax: Duration,
    #[serde(with = "humantime_serde")]
    pub min_tmax: Duration,
    pub max_bidders: usize,
    pub max_concurrent_bidders: usize,
    #[serde(with = "humantime_serde")]
    pub default_bidder_timeout: Duration,
    pub multibid: MultibidConfig,
    pub multiformat: MultiformatConfig,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            default_tmax: Duration::from_millis(2500),
            min_tmax: Duration::from_millis(50),
            max_bidders: 50,
            max_concurrent_bidders: 10,
            default_bidder_timeout: Duration::from_millis(2500),
            multibid: MultibidConfig::default(),
            multiformat: MultiformatConfig::default(),
        }
    }
}

impl ExchangeConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.min_tmax > self.default_tmax {
            anyhow::bail!("exchange.min_tmax cannot exceed exchange.default_tmax");
        }
        if self.max_bidders == 0 {
            anyhow::bail!("exchange.max_bidders must be greater than 0");
        }
        if self.max_concurrent_bidders == 0 {
            anyhow::bail!("exchange.max_concurrent_bidders must be greater than 0");
        }
        self.multibid.validate()?;
        Ok(())
    }
}

/// Currency conversion source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencyConfig {
    pub rates_url: Option<String>,
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
    pub default_currency: String,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            rates_url: None,
            refresh_interval: Duration::from_secs(30 * 60),
            default_currency: "USD".to_string(),
        }
    }
}

/// User-sync store TTLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSyncConfig {
    #[serde(with = "humantime_serde")]
    pub sync_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub stale_after: Duration,
    #[serde(with = "humantime_serde")]
    pub prune_interval: Duration,
}

impl Default for UserSyncConfig {
    fn default() -> Self {
        Self {
            sync_ttl: Duration::from_secs(90 * 24 * 60 * 60),
            stale_after: Duration::from_secs(180 * 24 * 60 * 60),
            prune_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Event recorder buffering and flush behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub sink_url: Option<String>,
    pub buffer_capacity: usize,
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            sink_url: None,
            buffer_capacity: 10_000,
            flush_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub workers: Option<usize>,
    /// Publicly reachable base URL, used to build the `/setuid`
    /// redirect embedded in outbound cookie-sync pixel URLs.
    pub external_url: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            workers: None,
            external_url: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtelProto {
    Http,
    Grpc,
}

impl Default for OtelProto {
    fn default() -> Self {
        OtelProto::Grpc
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    Daily,
    Hourly,
    Never,
}

impl Default for FileRotation {
    fn default() -> Self {
        FileRotation::Daily
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSink {
    pub spans: bool,
    pub dest: LogType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogType {
    Stdout {
        #[serde(default = "default_logtype_color")]
        color: bool,
        #[serde(default)]
        json: bool,
    },
    File {
        path: PathBuf,
        #[serde(default)]
        json: bool,
        #[serde(default)]
        rotation: FileRotation,
        #[serde(default)]
        max_files: usize,
    },
    Otel {
        endpoint: String,
        #[serde(default)]
        proto: OtelProto,
    },
}

fn default_logtype_color() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub span_sample_rate: f32,
    #[serde(default)]
    pub sinks: Vec<LogSink>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            span_sample_rate: 0.01,
            sinks: vec![LogSink {
                spans: true,
                dest: LogType::Stdout {
                    color: true,
                    json: false,
                },
            }],
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.sinks.is_empty() {
            anyhow::bail!("At least one logging sink must be configured");
        }

        self.level.parse::<tracing::Level>().map_err(|_| {
            anyhow::anyhow!(
                "Invalid log level: '{}'. Valid levels: trace, debug, info, warn, error",
                self.level
            )
        })?;

        if !(0.0..=1.0).contains(&self.span_sample_rate) {
            anyhow::bail!(
                "span_sample_rate must be between 0.0 and 1.0, got {}",
                self.span_sample_rate
            );
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default)]
pub struct RexConfig {
    pub caches: CacheConfig,
    pub resolver: ResolverConfig,
    pub breaker: BreakerConfig,
    pub exchange: ExchangeConfig,
    pub currency: CurrencyConfig,
    pub usersync: UserSyncConfig,
    pub events: EventsConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

impl RexConfig {
    pub fn load(path: &PathBuf) -> Result<RexConfig, anyhow::Error> {
        let cfg = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()))
            .build()?;

        let cfg: RexConfig = cfg.try_deserialize()?;
        cfg.logging.validate()?;
        cfg.exchange.validate()?;
        cfg.breaker.validate()?;
        Ok(cfg)
    }
}
