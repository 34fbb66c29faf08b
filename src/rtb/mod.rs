//! The exchange's narrowed OpenRTB model plus a handful of span
//! macros shared by every pipeline stage: the typed request/response
//! graph, small transport helpers, and the `*_span_*!` macro family
//! that every pipeline task instruments itself with. Kept as a plain
//! module here since this crate has no sibling workspace members.

pub mod bid_request;
pub mod bid_response;
pub mod client;
pub mod common;
pub mod server;

pub use bid_request::BidRequest;
pub use bid_response::BidResponse;

use std::sync::atomic::{AtomicU32, Ordering};

/// Current span sample rate, stored as a fraction of `u32::MAX` so the
/// per-span dice roll is a single relaxed atomic load instead of a
/// lock. Set once at startup from `LoggingConfig::span_sample_rate`.
static SPAN_SAMPLE_RATE: AtomicU32 = AtomicU32::new(u32::MAX);

pub fn set_span_sample_rate(rate: f32) {
    SPAN_SAMPLE_RATE.store((rate.clamp(0.0, 1.0) * u32::MAX as f32) as u32, Ordering::Relaxed);
}

/// True if this call should start a new sampled trace. Only consulted
/// at root spans — children always inherit the parent's span, sampled
/// or not, so an unsampled root costs its descendants nothing.
pub fn roll_sampled() -> bool {
    fastrand::u32(..) < SPAN_SAMPLE_RATE.load(Ordering::Relaxed)
}

/// Starts (or attaches to) the root span for one inbound request.
/// Call once per request at the handler boundary; every `child_span_*`
/// call downstream attaches under whatever this produced.
macro_rules! sample_or_attach_root_span {
    ($name:expr) => {{
        let current = tracing::Span::current();
        if !current.is_disabled() {
            tracing::info_span!(parent: current, $name)
        } else if $crate::rtb::roll_sampled() {
            tracing::info_span!($name, sampled = true)
        } else {
            tracing::Span::none()
        }
    }};
}
pub(crate) use sample_or_attach_root_span;

macro_rules! child_span_info {
    ($name:expr) => {
        tracing::info_span!(parent: tracing::Span::current(), $name)
    };
}
pub(crate) use child_span_info;

macro_rules! child_span_debug {
    ($name:expr) => {
        tracing::debug_span!(parent: tracing::Span::current(), $name)
    };
}
pub(crate) use child_span_debug;

macro_rules! child_span_trace {
    ($name:expr) => {
        tracing::trace_span!(parent: tracing::Span::current(), $name)
    };
}
pub(crate) use child_span_trace;

macro_rules! child_span_warn {
    ($name:expr) => {
        tracing::warn_span!(parent: tracing::Span::current(), $name)
    };
}
pub(crate) use child_span_warn;

macro_rules! child_span_error {
    ($name:expr) => {
        tracing::error_span!(parent: tracing::Span::current(), $name)
    };
}
pub(crate) use child_span_error;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_rate_bounds_are_clamped() {
        set_span_sample_rate(2.0);
        assert_eq!(SPAN_SAMPLE_RATE.load(Ordering::Relaxed), u32::MAX);

        set_span_sample_rate(0.0);
        assert_eq!(SPAN_SAMPLE_RATE.load(Ordering::Relaxed), 0);
        assert!(!roll_sampled());

        set_span_sample_rate(1.0);
        assert!(roll_sampled());
    }
}
