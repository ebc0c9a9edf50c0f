//! # NeuroTriage Ingestion
//!
//! Inbound boundary of the pipeline: a pluggable [`source::EventSource`]
//! yields raw channel-tagged envelopes in arrival order, and the
//! [`dispatch::DispatchLoop`] decodes them at the validation boundary,
//! records per-channel metrics, and hands decoded events to the correlation
//! engine, enqueuing any triggered evaluations on the worker pool.
//!
//! Transport is deliberately abstract: the engine only depends on the shape
//! of the inbound payloads. [`source::ChannelSource`] adapts any in-process
//! producer (stdin reader, file replayer, broker consumer) via a bounded
//! tokio channel.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod dispatch;
pub mod source;

/// Commonly used ingestion exports
pub mod prelude {
    pub use crate::dispatch::DispatchLoop;
    pub use crate::source::{channel_source, ChannelSource, EventEnvelope, EventSource};
}
