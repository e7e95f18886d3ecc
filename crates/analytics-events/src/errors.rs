// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors raised while delivering a batch to the collector.
///
/// These never reach producers; the delivery worker logs them and moves on
/// to the next batch.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to build payload: {0}")]
    Payload(String),

    #[error("Failed to deliver batch ({0:?}): {1}")]
    Destination(Option<StatusCode>, String),
}

/// Errors raised when constructing the pipeline from invalid inputs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
