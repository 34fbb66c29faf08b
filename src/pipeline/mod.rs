//! A minimal ordered task-chain executor.
//!
//! Every request-handling flow in this crate (startup, shutdown, the
//! auction itself) is expressed as a [`Pipeline`]: an ordered list of
//! small, independently testable steps run against a single shared
//! context. Steps come in two flavors:
//!
//! * [`BlockingTask`] — synchronous, CPU-only work (validation,
//!   parsing, field extraction). Run inline, in order.
//! * [`AsyncTask`] — awaits something (an outbound HTTP call, a store
//!   read). Run in order, each one polled to completion before the next
//!   starts; concurrency *within* a step is the step's own business
//!   (see the exchange engine's fan-out step for an example).
//!
//! The first step to return `Err` stops the pipeline; later steps do
//! not run. This is deliberately simple — there is no rollback/retry
//! machinery here, just ordered composition with a single error type.

use async_trait::async_trait;

/// A synchronous pipeline step.
pub trait BlockingTask<Ctx, E>: Send + Sync {
    fn run(&self, ctx: &Ctx) -> Result<(), E>;
}

/// An asynchronous pipeline step.
#[async_trait]
pub trait AsyncTask<Ctx, E>: Send + Sync {
    async fn run(&self, ctx: &Ctx) -> Result<(), E>;
}

enum Step<Ctx, E> {
    Blocking(Box<dyn BlockingTask<Ctx, E>>),
    Async(Box<dyn AsyncTask<Ctx, E>>),
}

/// An ordered, immutable chain of [`BlockingTask`]/[`AsyncTask`] steps
/// sharing one context type.
pub struct Pipeline<Ctx, E> {
    steps: Vec<Step<Ctx, E>>,
}

impl<Ctx, E> Pipeline<Ctx, E>
where
    Ctx: Send + Sync,
{
    /// Runs every step in order against `ctx`, stopping at the first
    /// error.
    pub async fn run(&self, ctx: &Ctx) -> Result<(), E> {
        for step in &self.steps {
            match step {
                Step::Blocking(task) => task.run(ctx)?,
                Step::Async(task) => task.run(ctx).await?,
            }
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

/// Builds a [`Pipeline`] by appending steps in the order they should
/// run.
#[derive(Default)]
pub struct PipelineBuilder<Ctx, E> {
    steps: Vec<Step<Ctx, E>>,
}

impl<Ctx, E> PipelineBuilder<Ctx, E>
where
    Ctx: Send + Sync,
{
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Chainable append of a blocking step.
    pub fn with_blocking(mut self, task: Box<dyn BlockingTask<Ctx, E>>) -> Self {
        self.steps.push(Step::Blocking(task));
        self
    }

    /// Chainable append of an async step.
    pub fn with_async(mut self, task: Box<dyn AsyncTask<Ctx, E>>) -> Self {
        self.steps.push(Step::Async(task));
        self
    }

    /// Non-chaining append, for call sites that build the list
    /// conditionally.
    pub fn add_blocking(&mut self, task: Box<dyn BlockingTask<Ctx, E>>) {
        self.steps.push(Step::Blocking(task));
    }

    /// Non-chaining append, for call sites that build the list
    /// conditionally.
    pub fn add_async(&mut self, task: Box<dyn AsyncTask<Ctx, E>>) {
        self.steps.push(Step::Async(task));
    }

    /// Returns `None` if no steps were ever added — most call sites
    /// treat an empty pipeline as "nothing to wire" rather than an
    /// error.
    pub fn build(self) -> Option<Pipeline<Ctx, E>> {
        if self.steps.is_empty() {
            None
        } else {
            Some(Pipeline { steps: self.steps })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    struct Incr;
    impl BlockingTask<Counter, anyhow::Error> for Incr {
        fn run(&self, ctx: &Counter) -> Result<(), anyhow::Error> {
            ctx.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fail;
    impl BlockingTask<Counter, anyhow::Error> for Fail {
        fn run(&self, _ctx: &Counter) -> Result<(), anyhow::Error> {
            anyhow::bail!("boom")
        }
    }

    #[tokio::test]
    async fn runs_steps_in_order() {
        let pipeline = PipelineBuilder::new()
            .with_blocking(Box::new(Incr))
            .with_blocking(Box::new(Incr))
            .build()
            .unwrap();

        let ctx = Counter(AtomicUsize::new(0));
        pipeline.run(&ctx).await.unwrap();

        assert_eq!(ctx.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stops_at_first_error() {
        let pipeline = PipelineBuilder::new()
            .with_blocking(Box::new(Incr))
            .with_blocking(Box::new(Fail))
            .with_blocking(Box::new(Incr))
            .build()
            .unwrap();

        let ctx = Counter(AtomicUsize::new(0));
        let res = pipeline.run(&ctx).await;

        assert!(res.is_err());
        assert_eq!(ctx.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_builder_yields_no_pipeline() {
        let builder: PipelineBuilder<Counter, anyhow::Error> = PipelineBuilder::new();
        assert!(builder.build().is_none());
    }
}
