//! Process wiring: configuration, shared runtime state, and the
//! startup/shutdown pipelines that assemble and tear it down.

pub mod config;
pub mod context;
pub mod handlers;
pub mod shutdown;
pub mod startup;
