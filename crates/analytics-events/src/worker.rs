// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::processor::ProcessorState;
use crate::queue::EventQueue;
use crate::transport::EventTransport;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Background task that drains the queue and hands batches to the transport.
///
/// One worker runs per processor, multiplexing three wakeups: the periodic
/// flush interval, an explicit flush signal, and cancellation. On
/// cancellation it performs one final full drain before terminating.
/// Transport failures are logged and the batch discarded; they never stop
/// the worker.
pub(crate) struct DeliveryWorker<E> {
    pub(crate) queue: Arc<EventQueue<E>>,
    pub(crate) transport: Arc<dyn EventTransport<E>>,
    pub(crate) flush_interval: Duration,
    pub(crate) max_batch_size: usize,
    pub(crate) max_batches_per_flush: usize,
    pub(crate) transport_deadline: Duration,
    pub(crate) flush_signal: Arc<Notify>,
    pub(crate) cancel_token: CancellationToken,
    pub(crate) state: Arc<AtomicU8>,
}

impl<E: Send + 'static> DeliveryWorker<E> {
    pub(crate) async fn run(self) {
        debug!("Delivery worker started");
        let mut ticker = interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // An interval's first tick completes immediately; consume it so the
        // first delivery happens one full interval after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_pass(false).await;
                }
                _ = self.flush_signal.notified() => {
                    debug!("Flush requested, draining queue");
                    self.run_pass(false).await;
                }
                _ = self.cancel_token.cancelled() => {
                    debug!("Shutdown requested, draining remaining events");
                    self.run_pass(true).await;
                    break;
                }
            }
        }
        debug!("Delivery worker stopped");
    }

    /// One drain-and-send pass. Regular passes stop after
    /// `max_batches_per_flush` batches so a deep queue cannot stall the
    /// worker; the final shutdown pass drains everything.
    async fn run_pass(&self, final_drain: bool) {
        let _ = self.state.compare_exchange(
            ProcessorState::Running as u8,
            ProcessorState::Flushing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        let mut batches_sent = 0;
        loop {
            let batch = self.queue.drain_up_to(self.max_batch_size);
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len();
            match self
                .transport
                .send_batch(batch, self.transport_deadline)
                .await
            {
                Ok(()) => debug!("Delivered batch of {batch_len} events"),
                Err(err) => {
                    // Best effort: the batch is gone, the worker lives on.
                    error!("Failed to deliver batch of {batch_len} events: {err}");
                }
            }
            batches_sent += 1;
            if !final_drain && batches_sent >= self.max_batches_per_flush {
                break;
            }
        }

        let _ = self.state.compare_exchange(
            ProcessorState::Flushing as u8,
            ProcessorState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}
