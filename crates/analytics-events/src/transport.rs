// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::TransportError;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Capability that physically delivers one batch of events to the collector.
///
/// The pipeline never inspects event contents; it hands the transport an
/// ordered batch and a deadline and only cares about success or failure.
/// Retry policy, serialization, and authentication all live behind this
/// seam.
#[async_trait]
pub trait EventTransport<E>: Send + Sync {
    /// Deliver one ordered batch. `deadline` bounds the whole attempt.
    async fn send_batch(&self, batch: Vec<E>, deadline: Duration) -> Result<(), TransportError>;
}

/// Ships batches to an HTTP intake endpoint as a JSON array.
pub struct HttpEventTransport {
    client: reqwest::Client,
    intake_url: String,
    api_key: String,
}

impl HttpEventTransport {
    pub fn new(intake_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            intake_url,
            api_key,
        }
    }
}

#[async_trait]
impl<E> EventTransport<E> for HttpEventTransport
where
    E: Serialize + Send + Sync + 'static,
{
    async fn send_batch(&self, batch: Vec<E>, deadline: Duration) -> Result<(), TransportError> {
        let body = serde_json::to_vec(&batch)
            .map_err(|err| TransportError::Payload(err.to_string()))?;

        let response = self
            .client
            .post(&self.intake_url)
            .header("DD-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .timeout(deadline)
            .body(body)
            .send()
            .await
            .map_err(|err| TransportError::Destination(None, err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!("Delivered {} events to {}", batch.len(), self.intake_url);
            Ok(())
        } else {
            Err(TransportError::Destination(
                Some(status),
                response.text().await.unwrap_or_default(),
            ))
        }
    }
}
