//! # Dispatch Pool
//!
//! Bounded pool of workers that run handler invocations off the publisher's
//! path. Each invocation runs in its own task so that a panic surfaces as a
//! `JoinError` instead of taking the worker down.

use crate::errors::{BusError, HandlerError};
use crate::events::Event;
use crate::subscriber::Registration;
use bl_telemetry::metrics::HANDLER_FAILURES;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Where an event entered the dispatch step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchPath {
    /// Published by this process.
    Local,
    /// Received on the shared channel from another process.
    Remote,
    /// Re-driven from the durable store.
    Replay,
}

impl DispatchPath {
    /// Metric label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Replay => "replay",
        }
    }
}

/// One handler invocation.
pub struct DispatchJob {
    pub event: Arc<Event>,
    pub registration: Registration,
    pub path: DispatchPath,
}

/// Counters over every finished invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub succeeded: u64,
    pub failed: u64,
    pub panicked: u64,
}

#[derive(Default)]
struct Counters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    in_flight: AtomicUsize,
    idle: Notify,
}

impl Counters {
    fn finish(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Fixed set of workers pulling jobs from a bounded queue.
///
/// `submit` waits only when the queue is full; it never waits for a handler
/// to finish.
pub struct DispatchPool {
    sender: Mutex<Option<mpsc::Sender<DispatchJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl DispatchPool {
    /// Spawn `workers` workers sharing a queue of `queue_capacity` jobs.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let receiver = Arc::new(AsyncMutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let handles = (0..workers)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    Arc::clone(&receiver),
                    Arc::clone(&counters),
                ))
            })
            .collect();

        debug!(workers, queue_capacity, "Dispatch pool started");

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            counters,
        }
    }

    /// Queue a handler invocation.
    ///
    /// # Errors
    ///
    /// `BusError::Closed` after [`DispatchPool::shutdown`].
    pub async fn submit(&self, job: DispatchJob) -> Result<(), BusError> {
        let sender = self.sender.lock().clone().ok_or(BusError::Closed)?;
        self.counters.in_flight.fetch_add(1, Ordering::AcqRel);
        if sender.send(job).await.is_err() {
            self.counters.finish();
            return Err(BusError::Closed);
        }
        Ok(())
    }

    /// Jobs queued or running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::Acquire)
    }

    /// Resolve once every submitted job has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.counters.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Outcome counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }

    /// Whether [`DispatchPool::shutdown`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stop accepting jobs, drain the queue and wait for the workers.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let handles: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Dispatch worker ended abnormally");
            }
        }
        debug!("Dispatch pool stopped");
    }
}

async fn run_worker(
    worker: usize,
    receiver: Arc<AsyncMutex<mpsc::Receiver<DispatchJob>>>,
    counters: Arc<Counters>,
) {
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };
        match invoke(&job).await {
            Ok(()) => {
                counters.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Err(HandlerError::Failed(reason)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                HANDLER_FAILURES.with_label_values(&["error"]).inc();
                error!(
                    worker,
                    handler = job.registration.handler.name(),
                    event_id = %job.event.id,
                    event_type = %job.event.event_type,
                    path = job.path.as_str(),
                    %reason,
                    "Event handler failed"
                );
            }
            Err(HandlerError::Panicked(reason)) => {
                counters.panicked.fetch_add(1, Ordering::Relaxed);
                HANDLER_FAILURES.with_label_values(&["panic"]).inc();
                error!(
                    worker,
                    handler = job.registration.handler.name(),
                    event_id = %job.event.id,
                    event_type = %job.event.event_type,
                    path = job.path.as_str(),
                    %reason,
                    "Event handler panicked"
                );
            }
        }
        counters.finish();
    }
}

async fn invoke(job: &DispatchJob) -> Result<(), HandlerError> {
    let handler = Arc::clone(&job.registration.handler);
    let event = Arc::clone(&job.event);
    let task = tokio::spawn(async move { handler.handle(&event).await });
    match task.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(HandlerError::Panicked(panic_message(e.into_panic()))),
        Err(e) => Err(HandlerError::Panicked(e.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
