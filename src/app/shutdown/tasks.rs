use crate::app::context::StartupContext;
use crate::pipeline::{AsyncTask, BlockingTask};
use anyhow::{Context, Error};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub(super) struct StopServerTask;

#[async_trait]
impl AsyncTask<Arc<StartupContext>, Error> for StopServerTask {
    async fn run(&self, ctx: &Arc<StartupContext>) -> Result<(), Error> {
        let Some(server) = ctx.server.get() else {
            return Ok(());
        };
        info!("stopping http listener");
        server.stop().await;
        Ok(())
    }
}

/// Drains the event recorder after the listener stops accepting new
/// requests, so no auction still in flight loses its win/billing
/// events.
pub(super) struct DrainEventsTask;

#[async_trait]
impl AsyncTask<Arc<StartupContext>, Error> for DrainEventsTask {
    async fn run(&self, ctx: &Arc<StartupContext>) -> Result<(), Error> {
        let Some(events) = ctx.events.get() else {
            return Ok(());
        };
        info!("draining event recorder");
        events.close().await;
        Ok(())
    }
}

pub(super) struct ObservabilityShutdownTask;

impl BlockingTask<Arc<StartupContext>, Error> for ObservabilityShutdownTask {
    fn run(&self, ctx: &Arc<StartupContext>) -> Result<(), Error> {
        let Some(provider) = ctx.tracer_provider.get() else {
            return Ok(());
        };
        crate::core::observability::shutdown(provider).context("flushing tracer provider on shutdown")
    }
}
