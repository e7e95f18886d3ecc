// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::ConfigError;
use std::env;
use std::time::Duration;

const DEFAULT_FLUSH_INTERVAL_MS: u64 = 5_000;
const DEFAULT_MAX_QUEUE_SIZE: usize = 10_000;
const DEFAULT_MAX_BATCH_SIZE: usize = 500;
const DEFAULT_MAX_BATCHES_PER_FLUSH: usize = 10;
const DEFAULT_TRANSPORT_DEADLINE_MS: u64 = 5_000;
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2_000;

/// Configuration for the event delivery pipeline.
///
/// All values are fixed at construction time; the pipeline never re-reads
/// them while running.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether analytics delivery is enabled at all. When false, the factory
    /// hands out a no-op processor and nothing is buffered or sent.
    pub enabled: bool,
    /// How often the background worker delivers buffered events.
    pub flush_interval: Duration,
    /// Maximum number of events held while awaiting delivery. Events arriving
    /// at a full queue are dropped and counted.
    pub max_queue_size: usize,
    /// Maximum number of events handed to the transport in one batch.
    pub max_batch_size: usize,
    /// Maximum number of batches sent in one timer tick or flush pass, so a
    /// deep queue cannot stall the worker indefinitely.
    pub max_batches_per_flush: usize,
    /// Deadline passed to the transport for each batch delivery attempt.
    pub transport_deadline: Duration,
    /// Upper bound on how long shutdown may wait for the final drain.
    pub shutdown_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_batches_per_flush: DEFAULT_MAX_BATCHES_PER_FLUSH,
            transport_deadline: Duration::from_millis(DEFAULT_TRANSPORT_DEADLINE_MS),
            shutdown_timeout: Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS),
        }
    }
}

impl Config {
    /// Create configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let enabled = env::var("ANALYTICS_ENABLED")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(true);
        let flush_interval_ms = env::var("ANALYTICS_FLUSH_INTERVAL_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(DEFAULT_FLUSH_INTERVAL_MS);
        let max_queue_size = env::var("ANALYTICS_MAX_QUEUE_SIZE")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_QUEUE_SIZE);
        let max_batch_size = env::var("ANALYTICS_MAX_BATCH_SIZE")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_BATCH_SIZE);
        let max_batches_per_flush = env::var("ANALYTICS_MAX_BATCHES_PER_FLUSH")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_BATCHES_PER_FLUSH);
        let transport_deadline_ms = env::var("ANALYTICS_TRANSPORT_DEADLINE_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TRANSPORT_DEADLINE_MS);
        let shutdown_timeout_ms = env::var("ANALYTICS_SHUTDOWN_TIMEOUT_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_MS);

        Self {
            enabled,
            flush_interval: Duration::from_millis(flush_interval_ms),
            max_queue_size,
            max_batch_size,
            max_batches_per_flush,
            transport_deadline: Duration::from_millis(transport_deadline_ms),
            shutdown_timeout: Duration::from_millis(shutdown_timeout_ms),
        }
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_queue_size must be non-zero".to_string(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_batch_size must be non-zero".to_string(),
            ));
        }
        if self.max_batches_per_flush == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_batches_per_flush must be non-zero".to_string(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "flush_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
