// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Asynchronous delivery pipeline for analytics events.
//!
//! Application code reports discrete events (feature flag evaluations, custom
//! metrics) through an [`EventProcessor`]. Events are buffered in a bounded
//! queue and a single background worker batches them and ships them to a
//! remote collector, either on a periodic flush interval or on demand via
//! [`EventProcessor::flush`]. Reporting an event never blocks the caller:
//! when the queue is full the incoming event is dropped and counted rather
//! than applying backpressure.
//!
//! Delivery is best effort. A failed transport call discards the affected
//! batch and the worker keeps running; the only delivery guarantee in the
//! contract is [`EventProcessor::shutdown`], which drains whatever is still
//! buffered before returning (bounded by the configured shutdown timeout).
//!
//! The payload type is opaque to the pipeline. Any `Send + 'static` type can
//! flow through it; the bundled [`HttpEventTransport`] additionally requires
//! `serde::Serialize` to encode batches as JSON.

pub mod config;
pub mod errors;
pub mod processor;
pub mod queue;
pub mod transport;
pub(crate) mod worker;

pub use config::Config;
pub use processor::{
    build_processor, BatchProcessor, EventProcessor, NullEventProcessor, ProcessorState,
};
pub use transport::{EventTransport, HttpEventTransport};
