//! Logging/tracing bootstrap, wired once at startup from
//! [`crate::app::config::LoggingConfig`].

mod provider;

pub use provider::{init, shutdown};
