//! The auction core: every domain component lives under one of these
//! modules, leaves first — `models`/`providers` underpin `resolver`,
//! which `exchange` consults alongside `adapter`, `breaker`,
//! `usersync` and `pricing` to run one auction.

pub mod adapter;
pub mod breaker;
pub mod config_manager;
pub mod enrichment;
pub mod events;
pub mod exchange;
pub mod models;
pub mod normalizer;
pub mod observability;
pub mod pricing;
pub mod providers;
pub mod resolver;
pub mod response_builder;
pub mod spec;
pub mod usersync;
