//! Sequential batch worker.
//!
//! One dedicated thread walks the batch in order and runs at most one encoder at a
//! time. The batch-wide cancel flag is the only state shared with the caller: it is
//! polled by the converter before every progress read and re-checked before each job,
//! so a cancel stops the running job and skips everything after it.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use serde::Serialize;

use super::BatchItem;
use super::job::JobStatus;
use crate::error::AppError;
use crate::ffmpeg::{ConversionResult, Converter};

/// Events published by the worker. `index` is the job's position in the queue.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BatchEvent {
    StatusChanged { index: usize, status: JobStatus },
    Progress { index: usize, fraction: f64 },
    JobFinished { index: usize, result: ConversionResult },
    BatchFinished,
}

pub type BatchEventEmitter = Arc<dyn Fn(BatchEvent) + Send + Sync>;

pub struct QueueRunner {
    converter: Converter,
    emitter: BatchEventEmitter,
}

impl QueueRunner {
    pub fn new(converter: Converter, emitter: BatchEventEmitter) -> Self {
        Self { converter, emitter }
    }

    /// Run every item on the current thread. Returns one result per item, in order.
    pub fn run(&self, items: &[BatchItem], cancel: &AtomicBool) -> Vec<ConversionResult> {
        log::info!(
            target: "audio2video::queue",
            "Batch started: {} job(s)",
            items.len()
        );
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let result = if cancel.load(Ordering::SeqCst) {
                log::info!(
                    target: "audio2video::queue",
                    "Skipping {} (batch cancelled)",
                    item.audio_path.display()
                );
                self.emit(BatchEvent::StatusChanged {
                    index: item.index,
                    status: JobStatus::Cancelled,
                });
                ConversionResult::cancelled()
            } else {
                self.emit(BatchEvent::StatusChanged {
                    index: item.index,
                    status: JobStatus::Converting,
                });
                let result = self.convert_item(item, cancel);
                self.emit(BatchEvent::StatusChanged {
                    index: item.index,
                    status: JobStatus::for_result(&result),
                });
                result
            };
            self.emit(BatchEvent::JobFinished {
                index: item.index,
                result: result.clone(),
            });
            results.push(result);
        }

        let completed = results.iter().filter(|r| r.success).count();
        log::info!(
            target: "audio2video::queue",
            "Batch finished: {}/{} converted",
            completed,
            results.len()
        );
        self.emit(BatchEvent::BatchFinished);
        results
    }

    fn convert_item(&self, item: &BatchItem, cancel: &AtomicBool) -> ConversionResult {
        let index = item.index;
        self.converter.convert(
            &item.audio_path,
            &item.cover_image_path,
            &item.output_path,
            |fraction| self.emit(BatchEvent::Progress { index, fraction }),
            || cancel.load(Ordering::SeqCst),
        )
    }

    fn emit(&self, event: BatchEvent) {
        (self.emitter)(event);
    }

    /// Run the batch on a dedicated worker thread.
    pub fn spawn(self, items: Vec<BatchItem>) -> io::Result<BatchHandle> {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let worker = thread::Builder::new()
            .name("audio2video-batch".to_string())
            .spawn(move || self.run(&items, &flag))?;
        Ok(BatchHandle { cancel, worker })
    }
}

/// Caller's side of a running batch.
pub struct BatchHandle {
    cancel: Arc<AtomicBool>,
    worker: JoinHandle<Vec<ConversionResult>>,
}

impl BatchHandle {
    /// Stop the running job and skip the rest. Returns immediately.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn join(self) -> Result<Vec<ConversionResult>, AppError> {
        self.worker
            .join()
            .map_err(|_| AppError::Unexpected("Batch worker panicked".to_string()))
    }
}
