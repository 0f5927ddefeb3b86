use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use audio2video_core::error::AppError;
use audio2video_core::ffmpeg::{ConversionResult, ConversionSettings, Toolchain, parse_ffmpeg_error};
use audio2video_core::paths::format_duration;
use audio2video_core::queue::{BatchEvent, BatchEventEmitter};
use audio2video_core::sidecar_api::{self, Session};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: u64,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcSuccess {
    id: u64,
    result: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcFailure {
    id: u64,
    error: RpcErrorPayload,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcErrorPayload {
    summary: String,
    detail: String,
}

#[derive(Debug, serde::Serialize)]
struct RpcEvent {
    event: String,
    payload: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddParams {
    paths: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PathParams {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexParams {
    index: usize,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct StartParams {
    settings: Option<ConversionSettings>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CommandPreviewParams {
    audio_path: Option<String>,
}

type SharedWriter = Arc<Mutex<io::Stdout>>;

fn write_json_line<T: serde::Serialize>(writer: &mut impl Write, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, value)
        .map_err(|e| io::Error::other(format!("serialize response: {}", e)))?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn write_json_line_shared<T: serde::Serialize>(writer: &SharedWriter, value: &T) -> io::Result<()> {
    let mut guard = writer.lock();
    write_json_line(&mut *guard, value)
}

fn emit_rpc_event(writer: &SharedWriter, event: &str, payload: Value) {
    let message = RpcEvent {
        event: event.to_string(),
        payload,
    };
    let _ = write_json_line_shared(writer, &message);
}

fn job_finished_payload(index: usize, result: &ConversionResult) -> Value {
    let mut payload = json!({
        "index": index,
        "success": result.success,
        "cancelled": result.cancelled,
        "outputPath": result.output_path,
    });
    if let Some(message) = result.error_message.as_deref()
        && !result.cancelled
    {
        let parsed = parse_ffmpeg_error(message, result.exit_code);
        payload["summary"] = json!(parsed.summary);
        payload["detail"] = json!(parsed.detail);
        payload["exitCode"] = json!(result.exit_code);
    }
    payload
}

fn emit_batch_event(writer: &SharedWriter, session: &Session, event: BatchEvent) {
    match event {
        BatchEvent::StatusChanged { index, status } => emit_rpc_event(
            writer,
            "batch.job.status",
            json!({ "index": index, "status": status }),
        ),
        BatchEvent::Progress { index, fraction } => emit_rpc_event(
            writer,
            "batch.job.progress",
            json!({ "index": index, "progress": fraction }),
        ),
        BatchEvent::JobFinished { index, result } => emit_rpc_event(
            writer,
            "batch.job.finished",
            job_finished_payload(index, &result),
        ),
        BatchEvent::BatchFinished => {
            let summary = session.summary();
            emit_rpc_event(
                writer,
                "batch.finished",
                json!({
                    "completed": summary.completed,
                    "failed": summary.failed,
                    "cancelled": summary.cancelled,
                    "message": summary.message(),
                    "elapsed": format_duration(session.batch_elapsed().as_secs_f64()),
                }),
            );
        }
    }
}

fn parse_error_payload(err: &AppError) -> RpcErrorPayload {
    match err {
        AppError::NonZeroExit { code, stderr_tail } => {
            let parsed = parse_ffmpeg_error(stderr_tail, Some(*code));
            RpcErrorPayload {
                summary: parsed.summary,
                detail: parsed.detail,
            }
        }
        _ => {
            let text = err.to_string();
            RpcErrorPayload {
                summary: text.clone(),
                detail: text,
            }
        }
    }
}

fn params_from_value<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, AppError> {
    serde_json::from_value(params)
        .map_err(|e| AppError::from(format!("Invalid params payload: {}", e)))
}

/// Like `params_from_value`, but a missing/null params object means "all defaults".
fn optional_params<T: serde::de::DeserializeOwned + Default>(params: Value) -> Result<T, AppError> {
    if params.is_null() {
        return Ok(T::default());
    }
    params_from_value(params)
}

fn to_value<T: serde::Serialize>(value: T, what: &str) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::from(format!("Failed to serialize {}: {}", what, e)))
}

fn dispatch(
    method: &str,
    params: Value,
    session: &Arc<Session>,
    writer: &SharedWriter,
) -> Result<Value, AppError> {
    match method {
        "app.capabilities" => Ok(json!({ "protocolVersion": sidecar_api::PROTOCOL_VERSION })),
        "tools.locate" => to_value(session.locate_tools(), "tools"),
        "queue.add" => {
            let parsed: AddParams = params_from_value(params)?;
            to_value(session.add_audio_files(parsed.paths), "add result")
        }
        "queue.setCover" => {
            let parsed: PathParams = params_from_value(params)?;
            session.set_cover_image(parsed.path)?;
            Ok(json!({ "ok": true }))
        }
        "queue.setOutputFolder" => {
            let parsed: PathParams = params_from_value(params)?;
            session.set_output_folder(parsed.path)?;
            Ok(json!({ "ok": true }))
        }
        "queue.remove" => {
            let parsed: IndexParams = params_from_value(params)?;
            session.remove(parsed.index)?;
            Ok(json!({ "ok": true }))
        }
        "queue.clear" => {
            session.clear()?;
            Ok(json!({ "ok": true }))
        }
        "queue.list" => to_value(session.list(), "queue"),
        "batch.start" => {
            let parsed: StartParams = optional_params(params)?;
            let writer_for_events = Arc::clone(writer);
            let session_for_events = Arc::downgrade(session);
            let forward: BatchEventEmitter = Arc::new(move |event: BatchEvent| {
                if let Some(session) = session_for_events.upgrade() {
                    emit_batch_event(&writer_for_events, &session, event);
                }
            });
            to_value(session.start_batch(parsed.settings, forward)?, "batch")
        }
        "batch.cancel" => Ok(json!({ "cancelled": session.cancel_batch() })),
        "batch.commandPreview" => {
            let parsed: CommandPreviewParams = optional_params(params)?;
            Ok(Value::String(session.command_preview(parsed.audio_path)))
        }
        _ => Err(AppError::from(format!("Unknown method: {}", method))),
    }
}

fn handle_request(request: RpcRequest, writer: &SharedWriter, session: &Arc<Session>) {
    let response = match dispatch(&request.method, request.params, session, writer) {
        Ok(result) => serde_json::to_value(RpcSuccess {
            id: request.id,
            result,
        })
        .map_err(|e| io::Error::other(format!("serialize success: {}", e))),
        Err(err) => {
            log::debug!(
                target: "audio2video::sidecar",
                "{} failed: {}",
                request.method,
                err
            );
            serde_json::to_value(RpcFailure {
                id: request.id,
                error: parse_error_payload(&err),
            })
            .map_err(|e| io::Error::other(format!("serialize failure: {}", e)))
        }
    };

    match response {
        Ok(value) => {
            let _ = write_json_line_shared(writer, &value);
        }
        Err(err) => {
            let failure = RpcFailure {
                id: request.id,
                error: RpcErrorPayload {
                    summary: "Serialization error".to_string(),
                    detail: err.to_string(),
                },
            };
            let _ = write_json_line_shared(writer, &failure);
        }
    }
}

fn default_output_folder() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("videos")
}

fn main() -> io::Result<()> {
    // stdout carries the protocol; logs go to stderr.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .try_init();

    let tools = Toolchain::discover();
    log::info!(
        target: "audio2video::sidecar",
        "ffmpeg={} ffprobe={}",
        tools.ffmpeg.display(),
        tools.ffprobe.display()
    );
    let session = Arc::new(Session::new(default_output_folder(), tools));
    let stdin = io::stdin();
    let stdout: SharedWriter = Arc::new(Mutex::new(io::stdout()));

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                let failure = RpcFailure {
                    id: 0,
                    error: RpcErrorPayload {
                        summary: "Invalid input stream".to_string(),
                        detail: err.to_string(),
                    },
                };
                let _ = write_json_line_shared(&stdout, &failure);
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                let failure = RpcFailure {
                    id: 0,
                    error: RpcErrorPayload {
                        summary: "Invalid request".to_string(),
                        detail: err.to_string(),
                    },
                };
                let _ = write_json_line_shared(&stdout, &failure);
                continue;
            }
        };

        handle_request(request, &stdout, &session);
    }

    // Host went away: stop the encoder rather than leave it orphaned.
    session.shutdown();
    Ok(())
}
