//! # Logging Configuration
//!
//! Structured logging for the gateway, configured the way the rest of this lineage
//! does it: `tracing` + `tracing-subscriber`, level driven by `RUST_LOG`, and a filter
//! layer that drops the Streaming Hub's per-tick fan-out spans so a busy quote feed
//! doesn't drown out order lifecycle and session events.
//!
//! ```rust,ignore
//! use gateway_core::logging::init_logging;
//!
//! fn main() {
//!     init_logging();
//!     tracing::info!("gateway started");
//! }
//! ```
//!
//! `init_json_logging` emits the same events as single-line JSON, for log aggregators.

use gateway_execution::streaming::STREAM_FANOUT_SPAN_NAME;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(StreamFanoutFilter)
        .init()
}

pub fn init_json_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .with(StreamFanoutFilter)
        .init()
}

struct StreamFanoutFilter;

impl<S> tracing_subscriber::layer::Layer<S> for StreamFanoutFilter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn event_enabled(&self, _: &tracing::Event<'_>, ctx: tracing_subscriber::layer::Context<'_, S>) -> bool {
        if let Some(span) = ctx.lookup_current() {
            span.name() != STREAM_FANOUT_SPAN_NAME
        } else {
            true
        }
    }
}
