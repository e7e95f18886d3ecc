// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::Config;
use crate::errors::ConfigError;
use crate::queue::EventQueue;
use crate::transport::EventTransport;
use crate::worker::DeliveryWorker;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Lifecycle state of a [`BatchProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcessorState {
    /// Accepting events; the worker is idle or waiting on its timer.
    Running = 0,
    /// A drain-and-send pass is in progress.
    Flushing = 1,
    /// Shutdown was requested; the final drain is underway.
    ShuttingDown = 2,
    /// Terminal. All further calls are no-ops.
    Stopped = 3,
}

impl ProcessorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Flushing,
            2 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }
}

/// An object that can accept and deliver analytics events.
///
/// Two implementations exist: [`BatchProcessor`] buffers and ships events in
/// the background, and [`NullEventProcessor`] discards everything. Callers
/// hold an `Arc<dyn EventProcessor<E>>` and never branch on whether
/// analytics is enabled.
#[async_trait]
pub trait EventProcessor<E>: Send + Sync {
    /// Queue one event for background delivery. Fire and forget: the event
    /// may be sent on the next timer tick or a later flush. Never blocks and
    /// never fails; a full queue drops the event and counts it.
    fn send_event(&self, event: E);

    /// Ask the worker to deliver buffered events as soon as it is scheduled,
    /// rather than waiting for the next interval. Does not block and does
    /// not wait for delivery; rapid repeated calls coalesce into at most one
    /// extra delivery pass.
    fn flush(&self);

    /// Stop the pipeline, draining whatever is still buffered. This is the
    /// one blocking operation in the contract: it waits for the final drain,
    /// bounded by the configured shutdown timeout. Returns whether the drain
    /// completed cleanly; on timeout any undelivered events are discarded
    /// and `false` is returned. Idempotent, and callers are free to ignore
    /// the result.
    async fn shutdown(&self) -> bool;
}

/// The buffering event processor: owns the queue and the delivery worker.
pub struct BatchProcessor<E> {
    queue: Arc<EventQueue<E>>,
    flush_signal: Arc<Notify>,
    cancel_token: CancellationToken,
    state: Arc<AtomicU8>,
    shutdown_timeout: std::time::Duration,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<E: Send + 'static> BatchProcessor<E> {
    /// Validate the configuration and spawn the delivery worker. Must be
    /// called from within a tokio runtime.
    pub fn start(
        config: &Config,
        transport: Arc<dyn EventTransport<E>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let queue = Arc::new(EventQueue::new(config.max_queue_size));
        let flush_signal = Arc::new(Notify::new());
        let cancel_token = CancellationToken::new();
        let state = Arc::new(AtomicU8::new(ProcessorState::Running as u8));

        let worker = DeliveryWorker {
            queue: Arc::clone(&queue),
            transport,
            flush_interval: config.flush_interval,
            max_batch_size: config.max_batch_size,
            max_batches_per_flush: config.max_batches_per_flush,
            transport_deadline: config.transport_deadline,
            flush_signal: Arc::clone(&flush_signal),
            cancel_token: cancel_token.clone(),
            state: Arc::clone(&state),
        };
        let worker_handle = tokio::spawn(worker.run());

        Ok(Self {
            queue,
            flush_signal,
            cancel_token,
            state,
            shutdown_timeout: config.shutdown_timeout,
            worker_handle: Mutex::new(Some(worker_handle)),
        })
    }

    pub fn state(&self) -> ProcessorState {
        ProcessorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Events discarded because the queue was full. Side-channel metric;
    /// producers are never told about drops inline.
    pub fn events_dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Events currently buffered and awaiting delivery.
    pub fn events_queued(&self) -> usize {
        self.queue.len()
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self.state(),
            ProcessorState::ShuttingDown | ProcessorState::Stopped
        )
    }
}

#[async_trait]
impl<E: Send + 'static> EventProcessor<E> for BatchProcessor<E> {
    fn send_event(&self, event: E) {
        if self.is_terminal() {
            return;
        }
        self.queue.push(event);
    }

    fn flush(&self) {
        if self.is_terminal() {
            return;
        }
        // Notify stores a single permit, so N calls in quick succession wake
        // the worker for at most one extra pass.
        self.flush_signal.notify_one();
    }

    async fn shutdown(&self) -> bool {
        let handle = {
            #[allow(clippy::expect_used)]
            let mut guard = self.worker_handle.lock().expect("lock poisoned");
            guard.take()
        };
        let Some(handle) = handle else {
            // Shutdown already ran (or is running on another task).
            return self.state() == ProcessorState::Stopped;
        };

        self.state
            .store(ProcessorState::ShuttingDown as u8, Ordering::Release);
        self.cancel_token.cancel();

        let abort_handle = handle.abort_handle();
        let clean = match tokio::time::timeout(self.shutdown_timeout, handle).await {
            Ok(Ok(())) => {
                debug!("Event processor shut down cleanly");
                true
            }
            Ok(Err(err)) => {
                error!("Delivery worker failed during shutdown: {err}");
                false
            }
            Err(_) => {
                // The worker (or a hung transport underneath it) did not
                // finish in time; reclaim the task and accept the data loss.
                abort_handle.abort();
                error!(
                    "Shutdown timed out after {:?}; {} undelivered events discarded",
                    self.shutdown_timeout,
                    self.queue.len()
                );
                false
            }
        };

        self.state
            .store(ProcessorState::Stopped as u8, Ordering::Release);
        clean
    }
}

/// Processor used when analytics is disabled: accepts and discards
/// everything, immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventProcessor;

#[async_trait]
impl<E: Send + 'static> EventProcessor<E> for NullEventProcessor {
    fn send_event(&self, _event: E) {}

    fn flush(&self) {}

    async fn shutdown(&self) -> bool {
        true
    }
}

/// Build the processor variant selected by the configuration: a
/// [`BatchProcessor`] when analytics is enabled, otherwise a
/// [`NullEventProcessor`].
pub fn build_processor<E: Send + 'static>(
    config: &Config,
    transport: Arc<dyn EventTransport<E>>,
) -> Result<Arc<dyn EventProcessor<E>>, ConfigError> {
    if config.enabled {
        Ok(Arc::new(BatchProcessor::start(config, transport)?))
    } else {
        debug!("Analytics disabled, events will be discarded");
        Ok(Arc::new(NullEventProcessor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransportError;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::{Duration, Instant};
    use tokio::time::sleep;

    /// Transport double that records every batch it receives and can be
    /// configured to stall or to fail its first call.
    struct RecordingTransport {
        batches: Mutex<Vec<Vec<u32>>>,
        calls: AtomicUsize,
        stall: Option<Duration>,
        hang_forever: bool,
        fail_first: AtomicBool,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                stall: None,
                hang_forever: false,
                fail_first: AtomicBool::new(false),
            }
        }

        fn stalling(stall: Duration) -> Self {
            Self {
                stall: Some(stall),
                ..Self::new()
            }
        }

        fn hanging() -> Self {
            Self {
                hang_forever: true,
                ..Self::new()
            }
        }

        fn failing_first() -> Self {
            let transport = Self::new();
            transport.fail_first.store(true, Ordering::SeqCst);
            transport
        }

        fn received(&self) -> Vec<Vec<u32>> {
            self.batches.lock().unwrap().clone()
        }

        fn received_flat(&self) -> Vec<u32> {
            self.received().into_iter().flatten().collect()
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventTransport<u32> for RecordingTransport {
        async fn send_batch(
            &self,
            batch: Vec<u32>,
            _deadline: Duration,
        ) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang_forever {
                std::future::pending::<()>().await;
            }
            if let Some(stall) = self.stall {
                sleep(stall).await;
            }
            if self.fail_first.swap(false, Ordering::SeqCst) {
                return Err(TransportError::Destination(
                    None,
                    "connection refused".to_string(),
                ));
            }
            self.batches.lock().unwrap().push(batch);
            Ok(())
        }
    }

    fn as_dyn(transport: &Arc<RecordingTransport>) -> Arc<dyn EventTransport<u32>> {
        Arc::clone(transport) as Arc<dyn EventTransport<u32>>
    }

    fn test_config() -> Config {
        Config {
            // Long enough that the timer never fires during a test; delivery
            // only happens on flush or shutdown unless a test overrides it.
            flush_interval: Duration::from_secs(300),
            max_queue_size: 1_000,
            max_batch_size: 100,
            shutdown_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_events() {
        let transport = Arc::new(RecordingTransport::new());
        let processor =
            BatchProcessor::start(&test_config(), as_dyn(&transport)).unwrap();

        for i in 0..25 {
            processor.send_event(i);
        }
        assert!(processor.shutdown().await);

        assert_eq!(transport.received_flat(), (0..25).collect::<Vec<u32>>());
        assert_eq!(processor.state(), ProcessorState::Stopped);
    }

    #[tokio::test]
    async fn test_single_producer_order_survives_batching() {
        let transport = Arc::new(RecordingTransport::new());
        let config = Config {
            max_batch_size: 7,
            ..test_config()
        };
        let processor = BatchProcessor::start(&config, as_dyn(&transport)).unwrap();

        for i in 0..100 {
            processor.send_event(i);
        }
        assert!(processor.shutdown().await);

        let batches = transport.received();
        assert!(batches.iter().all(|batch| batch.len() <= 7));
        assert_eq!(transport.received_flat(), (0..100).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn test_periodic_timer_delivers_without_flush() {
        let transport = Arc::new(RecordingTransport::new());
        let config = Config {
            flush_interval: Duration::from_millis(50),
            ..test_config()
        };
        let processor = BatchProcessor::start(&config, as_dyn(&transport)).unwrap();

        processor.send_event(1);
        processor.send_event(2);
        sleep(Duration::from_millis(250)).await;

        assert_eq!(transport.received_flat(), vec![1, 2]);
        processor.shutdown().await;
    }

    #[tokio::test]
    async fn test_flush_delivers_ahead_of_timer() {
        let transport = Arc::new(RecordingTransport::new());
        let processor =
            BatchProcessor::start(&test_config(), as_dyn(&transport)).unwrap();

        processor.send_event(7);
        processor.flush();
        sleep(Duration::from_millis(200)).await;

        assert_eq!(transport.received_flat(), vec![7]);
        processor.shutdown().await;
    }

    #[tokio::test]
    async fn test_send_event_does_not_block_on_stalled_transport() {
        let transport = Arc::new(RecordingTransport::hanging());
        let config = Config {
            shutdown_timeout: Duration::from_millis(200),
            ..test_config()
        };
        let processor = BatchProcessor::start(&config, as_dyn(&transport)).unwrap();

        // Get the worker stuck inside the transport.
        processor.send_event(0);
        processor.flush();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.calls(), 1);

        let started = Instant::now();
        for i in 0..10_000 {
            processor.send_event(i);
        }
        // Producers must be unaffected by transport latency.
        assert!(started.elapsed() < Duration::from_secs(1));

        processor.shutdown().await;
    }

    #[tokio::test]
    async fn test_flush_calls_coalesce() {
        let transport = Arc::new(RecordingTransport::stalling(Duration::from_millis(100)));
        let processor =
            BatchProcessor::start(&test_config(), as_dyn(&transport)).unwrap();

        // First pass: worker is inside the transport for 100ms.
        processor.send_event(1);
        processor.flush();
        sleep(Duration::from_millis(30)).await;

        // Ten flushes while the worker is busy must collapse into at most
        // one extra pass.
        for i in 2..=5 {
            processor.send_event(i);
        }
        for _ in 0..10 {
            processor.flush();
        }
        sleep(Duration::from_millis(400)).await;

        assert_eq!(transport.received(), vec![vec![1], vec![2, 3, 4, 5]]);
        processor.shutdown().await;
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_transport_failure_does_not_stop_worker() {
        let transport = Arc::new(RecordingTransport::failing_first());
        let processor =
            BatchProcessor::start(&test_config(), as_dyn(&transport)).unwrap();

        processor.send_event(1);
        processor.flush();
        sleep(Duration::from_millis(100)).await;
        // First batch was lost to the failure, observable only in the log.
        assert_eq!(transport.calls(), 1);
        assert!(transport.received().is_empty());
        assert!(logs_contain("Failed to deliver batch"));

        processor.send_event(2);
        processor.flush();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.received_flat(), vec![2]);

        processor.shutdown().await;
    }

    #[tokio::test]
    async fn test_drop_counter_exposed_on_processor() {
        let transport = Arc::new(RecordingTransport::new());
        let config = Config {
            max_queue_size: 10,
            ..test_config()
        };
        let processor = BatchProcessor::start(&config, as_dyn(&transport)).unwrap();

        for i in 0..15 {
            processor.send_event(i);
        }
        assert_eq!(processor.events_queued(), 10);
        assert_eq!(processor.events_dropped(), 5);

        assert!(processor.shutdown().await);
        assert_eq!(transport.received_flat(), (0..10).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn test_shutdown_timeout_with_hung_transport() {
        let transport = Arc::new(RecordingTransport::hanging());
        let config = Config {
            shutdown_timeout: Duration::from_millis(200),
            ..test_config()
        };
        let processor = BatchProcessor::start(&config, as_dyn(&transport)).unwrap();

        processor.send_event(1);
        let started = Instant::now();
        let clean = processor.shutdown().await;

        assert!(!clean);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(processor.state(), ProcessorState::Stopped);
    }

    #[tokio::test]
    async fn test_post_shutdown_calls_are_noops() {
        let transport = Arc::new(RecordingTransport::new());
        let processor =
            BatchProcessor::start(&test_config(), as_dyn(&transport)).unwrap();

        processor.send_event(1);
        assert!(processor.shutdown().await);

        processor.send_event(2);
        processor.flush();
        assert_eq!(processor.events_queued(), 0);
        // A second shutdown reports the (already reached) terminal state.
        assert!(processor.shutdown().await);
        assert_eq!(transport.received_flat(), vec![1]);
    }

    #[tokio::test]
    async fn test_null_processor_is_inert() {
        let processor = NullEventProcessor;
        <NullEventProcessor as EventProcessor<u32>>::send_event(&processor, 1);
        <NullEventProcessor as EventProcessor<u32>>::flush(&processor);
        assert!(<NullEventProcessor as EventProcessor<u32>>::shutdown(&processor).await);
    }

    #[tokio::test]
    async fn test_factory_selects_null_when_disabled() {
        let transport = Arc::new(RecordingTransport::new());
        let config = Config {
            enabled: false,
            ..test_config()
        };
        let processor = build_processor(&config, as_dyn(&transport)).unwrap();

        processor.send_event(1);
        processor.flush();
        assert!(processor.shutdown().await);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_factory_rejects_invalid_config() {
        let transport = Arc::new(RecordingTransport::new());
        let config = Config {
            max_queue_size: 0,
            ..test_config()
        };
        assert!(build_processor(&config, as_dyn(&transport)).is_err());
    }
}
