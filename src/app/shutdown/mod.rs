//! Builds the shutdown pipeline: stop accepting new
//! connections first, drain the event recorder so no in-flight
//! auction's analytics are lost, then flush tracing.

mod tasks;

use crate::app::context::StartupContext;
use crate::pipeline::{Pipeline, PipelineBuilder};
use std::sync::Arc;

pub fn build_shutdown_pipeline() -> Pipeline<Arc<StartupContext>, anyhow::Error> {
    PipelineBuilder::new()
        .with_async(Box::new(tasks::StopServerTask))
        .with_async(Box::new(tasks::DrainEventsTask))
        .with_blocking(Box::new(tasks::ObservabilityShutdownTask))
        .build()
        .expect("shutdown pipeline should have tasks")
}
