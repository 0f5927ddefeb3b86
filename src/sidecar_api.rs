use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::AppError;
use crate::ffmpeg::{
    ConversionSettings, Converter, Toolchain, build_conversion_args,
    format_args_for_display_multiline, path_to_string,
};
use crate::queue::{
    BatchEvent, BatchEventEmitter, BatchHandle, BatchSummary, ConversionQueue, Job, QueueRunner,
};

pub const PROTOCOL_VERSION: u8 = 1;

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsResult {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub ffmpeg_found: bool,
    pub ffprobe_found: bool,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedFile {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFilesResult {
    pub added: Vec<usize>,
    pub rejected: Vec<RejectedFile>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub jobs: Vec<Job>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub output_folder: String,
    pub running: bool,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStarted {
    pub indices: Vec<usize>,
    pub output_paths: Vec<String>,
}

/// Process-wide state behind the sidecar protocol: one queue, one toolchain, at most
/// one running batch.
pub struct Session {
    queue: Arc<Mutex<ConversionQueue>>,
    tools: Mutex<Toolchain>,
    settings: Mutex<ConversionSettings>,
    active: Mutex<Option<BatchHandle>>,
    started_at: Mutex<Option<Instant>>,
}

impl Session {
    pub fn new(output_folder: impl Into<PathBuf>, tools: Toolchain) -> Self {
        Self {
            queue: Arc::new(Mutex::new(ConversionQueue::new(output_folder))),
            tools: Mutex::new(tools),
            settings: Mutex::new(ConversionSettings::default()),
            active: Mutex::new(None),
            started_at: Mutex::new(None),
        }
    }

    /// Re-run tool discovery and report what was found.
    pub fn locate_tools(&self) -> ToolsResult {
        let tools = Toolchain::discover();
        let result = ToolsResult {
            ffmpeg: path_to_string(&tools.ffmpeg),
            ffprobe: path_to_string(&tools.ffprobe),
            ffmpeg_found: tools.has_ffmpeg(),
            ffprobe_found: tools.has_ffprobe(),
        };
        *self.tools.lock() = tools;
        result
    }

    /// Queue several files. Unsupported or duplicate files are reported, not fatal.
    pub fn add_audio_files(&self, paths: Vec<PathBuf>) -> AddFilesResult {
        let mut queue = self.queue.lock();
        let mut result = AddFilesResult::default();
        for path in paths {
            match queue.add_audio_file(path.clone()) {
                Ok(index) => result.added.push(index),
                Err(e) => result.rejected.push(RejectedFile {
                    path: path_to_string(&path),
                    reason: e.to_string(),
                }),
            }
        }
        result
    }

    pub fn set_cover_image(&self, path: PathBuf) -> Result<(), AppError> {
        self.reap_finished_batch();
        self.queue.lock().set_cover_image(path)
    }

    pub fn set_output_folder(&self, folder: PathBuf) -> Result<(), AppError> {
        self.reap_finished_batch();
        self.queue.lock().set_output_folder(folder)
    }

    pub fn remove(&self, index: usize) -> Result<(), AppError> {
        self.reap_finished_batch();
        self.queue.lock().remove(index).map(|_| ())
    }

    pub fn clear(&self) -> Result<(), AppError> {
        self.reap_finished_batch();
        self.queue.lock().clear()
    }

    pub fn list(&self) -> QueueSnapshot {
        self.reap_finished_batch();
        let queue = self.queue.lock();
        QueueSnapshot {
            jobs: queue.jobs().to_vec(),
            cover_image: queue.cover_image().map(|p| path_to_string(p)),
            output_folder: path_to_string(queue.output_folder()),
            running: queue.is_running(),
        }
    }

    pub fn summary(&self) -> BatchSummary {
        self.queue.lock().summary()
    }

    /// Drop the handle of a batch that is over. The queue going idle counts as over
    /// even while the worker is still delivering `BatchFinished`.
    fn reap_finished_batch(&self) {
        let mut active = self.active.lock();
        let idle = !self.queue.lock().is_running();
        if active.as_ref().is_some_and(|h| idle || h.is_finished())
            && let Some(handle) = active.take()
        {
            self.join_batch(handle);
        }
    }

    /// A worker that died before `BatchFinished` leaves its jobs failed, not stuck.
    fn join_batch(&self, handle: BatchHandle) {
        if let Err(e) = handle.join() {
            log::error!(target: "audio2video::sidecar", "{}", e);
            let mut queue = self.queue.lock();
            if queue.is_running() {
                queue.abandon_batch(&e.to_string());
            }
        }
    }

    /// Start converting every job that is not completed. Events are applied to the
    /// queue first, then handed to `forward`.
    pub fn start_batch(
        &self,
        settings: Option<ConversionSettings>,
        forward: BatchEventEmitter,
    ) -> Result<BatchStarted, AppError> {
        self.reap_finished_batch();
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(AppError::NotReady("A batch is already running".to_string()));
        }

        let settings = {
            let mut current = self.settings.lock();
            if let Some(settings) = settings {
                *current = settings;
            }
            current.clone()
        };
        let items = self
            .queue
            .lock()
            .prepare_batch(&settings.effective_output_extension())?;
        let started = BatchStarted {
            indices: items.iter().map(|i| i.index).collect(),
            output_paths: items.iter().map(|i| path_to_string(&i.output_path)).collect(),
        };

        let queue = Arc::clone(&self.queue);
        let emitter: BatchEventEmitter = Arc::new(move |event: BatchEvent| {
            queue.lock().apply_event(&event);
            forward(event);
        });
        let converter = Converter::new(self.tools.lock().clone(), settings);
        *self.started_at.lock() = Some(Instant::now());
        match QueueRunner::new(converter, emitter).spawn(items) {
            Ok(handle) => {
                *active = Some(handle);
                Ok(started)
            }
            Err(e) => {
                self.queue.lock().apply_event(&BatchEvent::BatchFinished);
                Err(AppError::Unexpected(format!(
                    "Failed to start batch worker: {}",
                    e
                )))
            }
        }
    }

    /// Time since the last batch started.
    pub fn batch_elapsed(&self) -> Duration {
        self.started_at
            .lock()
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }

    /// Returns false when no batch is running.
    pub fn cancel_batch(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(handle) if !handle.is_finished() => {
                log::info!(target: "audio2video::sidecar", "Cancelling batch");
                handle.cancel();
                true
            }
            _ => false,
        }
    }

    /// Encoder command line for the current queue, one argument per line.
    pub fn command_preview(&self, audio_path: Option<String>) -> String {
        let cover = self
            .queue
            .lock()
            .cover_image()
            .map(|p| path_to_string(p))
            .unwrap_or_else(|| "<cover>".to_string());
        let audio = audio_path.unwrap_or_else(|| "<audio>".to_string());
        let args = build_conversion_args(&cover, &audio, "<output>", &self.settings.lock());
        format!("ffmpeg\n{}", format_args_for_display_multiline(&args))
    }

    /// Block until the running batch (if any) has finished.
    pub fn wait(&self) {
        let handle = self.active.lock().take();
        if let Some(handle) = handle {
            self.join_batch(handle);
        }
    }

    /// Cancel and wait for the running batch.
    pub fn shutdown(&self) {
        self.cancel_batch();
        self.wait();
    }
}
