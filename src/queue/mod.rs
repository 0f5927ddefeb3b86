//! Caller-owned conversion queue: job list, shared cover image and output folder.
//!
//! The queue never converts anything itself. `prepare_batch` freezes the selection
//! into [`BatchItem`]s for a [`QueueRunner`], and `apply_event` folds the runner's
//! events back into the job list.

mod job;
mod runner;

pub use job::{Job, JobStatus};
pub use runner::{BatchEvent, BatchEventEmitter, BatchHandle, QueueRunner};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::AppError;
use crate::paths::{
    ensure_output_folder, is_supported_audio_file, is_supported_image_file, output_base_name,
    reserve_output_path,
};

/// One job as handed to the worker. `index` points back into the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub index: usize,
    pub audio_path: PathBuf,
    pub cover_image_path: PathBuf,
    pub output_path: PathBuf,
}

/// Outcome counts of the last batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }

    pub fn message(&self) -> String {
        let mut message = format!("Converted {} of {} file(s)", self.completed, self.total());
        match (self.failed, self.cancelled) {
            (0, 0) => {}
            (f, 0) => message.push_str(&format!(", {} failed", f)),
            (0, c) => message.push_str(&format!(", {} cancelled", c)),
            (f, c) => message.push_str(&format!(", {} failed, {} cancelled", f, c)),
        }
        message
    }
}

#[derive(Debug)]
pub struct ConversionQueue {
    jobs: Vec<Job>,
    cover_image: Option<PathBuf>,
    output_folder: PathBuf,
    running: bool,
    last_batch: Vec<usize>,
}

impl ConversionQueue {
    pub fn new(output_folder: impl Into<PathBuf>) -> Self {
        Self {
            jobs: Vec::new(),
            cover_image: None,
            output_folder: output_folder.into(),
            running: false,
            last_batch: Vec::new(),
        }
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn cover_image(&self) -> Option<&Path> {
        self.cover_image.as_deref()
    }

    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn ensure_idle(&self) -> Result<(), AppError> {
        if self.running {
            return Err(AppError::NotReady("A batch is already running".to_string()));
        }
        Ok(())
    }

    /// Append an audio file. Returns its index.
    pub fn add_audio_file(&mut self, path: impl Into<PathBuf>) -> Result<usize, AppError> {
        let path = path.into();
        if !is_supported_audio_file(&path) {
            return Err(AppError::Unsupported(format!(
                "Unsupported audio file: {}",
                path.display()
            )));
        }
        if self.jobs.iter().any(|j| j.audio_path == path) {
            return Err(AppError::Unsupported(format!(
                "Already queued: {}",
                path.display()
            )));
        }
        log::debug!(target: "audio2video::queue", "Queued {}", path.display());
        self.jobs.push(Job::new(path));
        Ok(self.jobs.len() - 1)
    }

    pub fn set_cover_image(&mut self, path: impl Into<PathBuf>) -> Result<(), AppError> {
        self.ensure_idle()?;
        let path = path.into();
        if !is_supported_image_file(&path) {
            return Err(AppError::Unsupported(format!(
                "Unsupported cover image: {}",
                path.display()
            )));
        }
        self.cover_image = Some(path);
        Ok(())
    }

    pub fn set_output_folder(&mut self, folder: impl Into<PathBuf>) -> Result<(), AppError> {
        self.ensure_idle()?;
        self.output_folder = folder.into();
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<Job, AppError> {
        self.ensure_idle()?;
        if index >= self.jobs.len() {
            return Err(AppError::Unexpected(format!("No job at index {}", index)));
        }
        self.last_batch.clear();
        Ok(self.jobs.remove(index))
    }

    pub fn clear(&mut self) -> Result<(), AppError> {
        self.ensure_idle()?;
        self.jobs.clear();
        self.last_batch.clear();
        Ok(())
    }

    /// Select every job that is not `Completed`, reset it, create the output folder
    /// and assign unique output paths in queue order. Marks the queue as running.
    pub fn prepare_batch(&mut self, extension: &str) -> Result<Vec<BatchItem>, AppError> {
        self.ensure_idle()?;
        let cover = self
            .cover_image
            .clone()
            .ok_or_else(|| AppError::NotReady("No cover image selected".to_string()))?;
        let selected: Vec<usize> = self
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.status != JobStatus::Completed)
            .map(|(i, _)| i)
            .collect();
        if selected.is_empty() {
            return Err(AppError::NotReady("No audio files to convert".to_string()));
        }

        ensure_output_folder(&self.output_folder)?;

        // Outputs of completed jobs stay theirs even if deleted since.
        let mut reserved: HashSet<PathBuf> = self
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Completed)
            .filter_map(|j| j.output_path.clone())
            .collect();

        let mut items = Vec::with_capacity(selected.len());
        for index in selected.iter().copied() {
            let job = &mut self.jobs[index];
            job.reset_for_retry()?;
            let output_path = reserve_output_path(
                &self.output_folder,
                &output_base_name(&job.audio_path),
                extension,
                &mut reserved,
            );
            job.output_path = Some(output_path.clone());
            items.push(BatchItem {
                index,
                audio_path: job.audio_path.clone(),
                cover_image_path: cover.clone(),
                output_path,
            });
        }

        self.running = true;
        self.last_batch = selected;
        Ok(items)
    }

    /// Fold one worker event into the job list.
    pub fn apply_event(&mut self, event: &BatchEvent) {
        match event {
            BatchEvent::StatusChanged { index, status } => {
                if let Some(job) = self.jobs.get_mut(*index) {
                    if job.status != *status {
                        if let Err(e) = job.transition(*status) {
                            log::warn!(target: "audio2video::queue", "Job {}: {}", index, e);
                        }
                    }
                }
            }
            BatchEvent::Progress { index, fraction } => {
                if let Some(job) = self.jobs.get_mut(*index) {
                    job.set_progress(*fraction);
                }
            }
            BatchEvent::JobFinished { index, result } => {
                if let Some(job) = self.jobs.get_mut(*index) {
                    if job.status.is_terminal() {
                        job.apply_outcome(result);
                    } else if let Err(e) = job.record_result(result) {
                        log::warn!(target: "audio2video::queue", "Job {}: {}", index, e);
                    }
                }
            }
            BatchEvent::BatchFinished => {
                self.running = false;
                log::info!(target: "audio2video::queue", "{}", self.summary().message());
            }
        }
    }

    /// End a batch whose worker died without finishing it: every job of the batch
    /// that is still queued or converting fails with `detail`.
    pub fn abandon_batch(&mut self, detail: &str) {
        for index in &self.last_batch {
            if let Some(job) = self.jobs.get_mut(*index) {
                job.abandon(detail);
            }
        }
        self.running = false;
        log::warn!(target: "audio2video::queue", "Batch abandoned: {}", detail);
    }

    /// Counts over the jobs of the last prepared batch.
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for job in self.last_batch.iter().filter_map(|i| self.jobs.get(*i)) {
            match job.status {
                JobStatus::Completed => summary.completed += 1,
                JobStatus::Failed => summary.failed += 1,
                JobStatus::Cancelled => summary.cancelled += 1,
                JobStatus::Queued | JobStatus::Converting => {}
            }
        }
        summary
    }
}
