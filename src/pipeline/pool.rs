//! Bounded transformation worker pool.
//!
//! # Responsibilities
//! - Limit concurrent transformation jobs to the configured worker count
//! - Parse a sealed capture, run the enabled transformers in order
//! - Stream the final content to the owning session's delivery queue
//! - Always report completion, even when the job fails
//!
//! # Design Decisions
//! - Jobs run on the blocking pool; they never touch session sockets
//! - Excess jobs wait on the semaphore
//! - A bounded delivery queue gives backpressure towards slow clients

use std::io::Read;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::pipeline::capture::{remove_quietly, SealedCapture};
use crate::pipeline::flags::TransformFlags;
use crate::pipeline::transform::{self, Transformer};

/// Size of the chunks streamed to a session.
const CHUNK_SIZE: usize = 16 * 1024;

/// Message from a pipeline job to its session.
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Transformed message bytes, in order.
    Chunk(Vec<u8>),
    /// The job is over; `delivered` is false when the client got nothing.
    Finished { capture_id: u64, delivered: bool },
}

#[derive(Debug, Clone)]
pub struct TransformPool {
    permits: Arc<Semaphore>,
    transformers: Arc<Vec<Box<dyn Transformer>>>,
    flags: Arc<TransformFlags>,
}

impl TransformPool {
    pub fn new(workers: usize, flags: Arc<TransformFlags>) -> Self {
        Self::with_transformers(workers, flags, transform::builtin())
    }

    pub fn with_transformers(
        workers: usize,
        flags: Arc<TransformFlags>,
        transformers: Vec<Box<dyn Transformer>>,
    ) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            transformers: Arc::new(transformers),
            flags,
        }
    }

    pub fn flags(&self) -> &Arc<TransformFlags> {
        &self.flags
    }

    /// Idle workers right now.
    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Queue a job for `capture`. Its output goes to `sink`, followed by exactly
    /// one [`Delivery::Finished`].
    pub fn submit(&self, capture: SealedCapture, sink: mpsc::Sender<Delivery>) -> JoinHandle<()> {
        let permits = self.permits.clone();
        let transformers = self.transformers.clone();
        let flags = self.flags.clone();
        let capture_id = capture.id();

        tokio::spawn(async move {
            let delivered = match permits.acquire_owned().await {
                Ok(_permit) => {
                    let job_sink = sink.clone();
                    let job = tokio::task::spawn_blocking(move || {
                        run_job(capture, &transformers, &flags, &job_sink)
                    });
                    match job.await {
                        Ok(delivered) => delivered,
                        Err(e) => {
                            tracing::error!(capture_id, error = %e, "Transformation job panicked");
                            false
                        }
                    }
                }
                Err(_) => {
                    tracing::warn!(capture_id, "Worker pool closed, dropping capture");
                    capture.discard();
                    false
                }
            };

            let outcome = if delivered { "delivered" } else { "dropped" };
            metrics::counter!("pop3_proxy_transformations_total", "outcome" => outcome).increment(1);
            // The session may already be gone.
            let _ = sink.send(Delivery::Finished { capture_id, delivered }).await;
        })
    }
}

/// Parse, transform and stream one capture. Blocking. Returns whether the
/// full content reached the delivery queue.
fn run_job(
    capture: SealedCapture,
    transformers: &[Box<dyn Transformer>],
    flags: &TransformFlags,
    sink: &mpsc::Sender<Delivery>,
) -> bool {
    let capture_id = capture.id();
    let path = capture.path().to_path_buf();

    let parsed = match capture.parse() {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(capture_id, error = %e, "Failed to parse capture");
            remove_quietly(capture_id, &path);
            return false;
        }
    };

    for transformer in transformers {
        if !flags.is_enabled(transformer.feature()) {
            continue;
        }
        if let Err(e) = transformer.transform(&parsed) {
            tracing::warn!(capture_id, transformer = transformer.name(), error = %e, "Transformation failed");
            parsed.discard();
            return false;
        }
    }

    let delivered = match stream(&path, sink) {
        Ok(delivered) => delivered,
        Err(e) => {
            tracing::warn!(capture_id, error = %e, "Failed to stream capture");
            false
        }
    };
    parsed.discard();
    delivered
}

fn stream(path: &std::path::Path, sink: &mpsc::Sender<Delivery>) -> std::io::Result<bool> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            return Ok(true);
        }
        if sink.blocking_send(Delivery::Chunk(buf[..n].to_vec())).is_err() {
            return Ok(false);
        }
    }
}
