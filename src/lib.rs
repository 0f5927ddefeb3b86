pub mod error;
pub mod ffmpeg;
pub mod paths;
pub mod queue;
pub mod sidecar_api;

pub use error::AppError;
pub use ffmpeg::{ConversionResult, ConversionSettings, Converter, Toolchain};
pub use queue::{BatchEvent, BatchHandle, ConversionQueue, JobStatus, QueueRunner};
