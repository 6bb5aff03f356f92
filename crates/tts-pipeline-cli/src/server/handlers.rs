use crate::reference;
use crate::server::state::ServerContext;
use axum::{
    Json,
    extract::{Multipart, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tts_pipeline::pipeline::ReferenceAnalysis;
use tts_pipeline::{Deadline, Error, SynthesisRequest};

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

pub async fn health_check(State(ctx): State<ServerContext>) -> Response {
    if ctx.pipeline.is_ready() {
        Json(HealthResponse {
            status: "ok",
            message: None,
        })
        .into_response()
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(HealthResponse {
                status: "error",
                message: Some("synthesis engines are not ready".to_string()),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct TtsQuery {
    text: Option<String>,
    reference_audio: Option<String>,
    language: Option<String>,
    sample_rate: Option<u32>,
}

pub async fn tts(State(ctx): State<ServerContext>, Query(query): Query<TtsQuery>) -> Response {
    let Some(text) = query.text.filter(|t| !t.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Text parameter is required").into_response();
    };
    info!(
        chars = text.chars().count(),
        reference = query.reference_audio.is_some(),
        "TTS request"
    );

    let deadline = Deadline::start(ctx.pipeline.options().timeout);
    let task_ctx = ctx.clone();
    let result = run_blocking(ctx.config.request_timeout(), move || {
        let config = &task_ctx.config;
        // Keeps a decoded upload alive until synthesis is done
        let reference = query
            .reference_audio
            .as_deref()
            .filter(|spec| !spec.trim().is_empty())
            .map(|spec| reference::resolve(config, spec))
            .transpose()?;

        let mut request = SynthesisRequest::new(text)?
            .with_sample_rate(query.sample_rate.unwrap_or(config.audio.sample_rate));
        if let Some(reference) = &reference {
            request = request.with_reference_audio(reference.path());
        }
        if let Some(language) = query.language {
            request = request.with_language(language);
        }

        let result = task_ctx.pipeline.synthesize_within(&request, &deadline)?;
        let bytes = std::fs::read(&result.output_path)?;
        Ok((result.output_path, bytes))
    })
    .await;

    match result {
        Ok((path, bytes)) => {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "tts.wav".to_string());
            (
                [
                    (header::CONTENT_TYPE, "audio/wav".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", file_name),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            let status = status_for(&e);
            warn!(status = status.as_u16(), "TTS request failed: {}", e);
            (status, e.to_string()).into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InferResult {
    #[serde(flatten)]
    reference: ReferenceAnalysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct InferResponse {
    result: InferResult,
}

/// Analyze an uploaded reference clip, optionally synthesizing `text` with it.
pub async fn infer(State(ctx): State<ServerContext>, mut multipart: Multipart) -> Response {
    let mut upload = None;
    let mut text = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return json_error(StatusCode::BAD_REQUEST, e.body_text()),
        };
        let name = field.name().map(str::to_owned);
        let read = match name.as_deref() {
            Some("audio") => field.bytes().await.map(|b| upload = Some(b)),
            Some("text") => field.text().await.map(|t| text = Some(t)),
            _ => Ok(()),
        };
        if let Err(e) = read {
            return json_error(StatusCode::BAD_REQUEST, e.body_text());
        }
    }

    let Some(upload) = upload else {
        return json_error(StatusCode::BAD_REQUEST, "No audio file provided".to_string());
    };
    info!(bytes = upload.len(), with_text = text.is_some(), "Infer request");

    // One budget covers analysis and synthesis
    let deadline = Deadline::start(ctx.pipeline.options().timeout);
    let task_ctx = ctx.clone();
    let result = run_blocking(ctx.config.request_timeout(), move || {
        let config = &task_ctx.config;
        std::fs::create_dir_all(&config.upload_dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".wav")
            .tempfile_in(&config.upload_dir)?;
        file.write_all(&upload)?;
        file.flush()?;

        let reference = task_ctx
            .pipeline
            .analyze_reference_within(file.path(), &deadline)?;
        let output_path = match text {
            Some(text) => {
                let request = SynthesisRequest::new(text)?
                    .with_reference_audio(file.path())
                    .with_sample_rate(config.audio.sample_rate);
                let result = task_ctx.pipeline.synthesize_within(&request, &deadline)?;
                Some(result.output_path)
            }
            None => None,
        };
        Ok(InferResult {
            reference,
            output_path,
        })
    })
    .await;

    match result {
        Ok(result) => Json(InferResponse { result }).into_response(),
        Err(e) => {
            let status = status_for(&e);
            warn!(status = status.as_u16(), "Infer request failed: {}", e);
            json_error(status, e.to_string())
        }
    }
}

/// Run pipeline work on the blocking pool, bounded by `timeout` (zero = none).
async fn run_blocking<T, F>(timeout: Duration, task: F) -> tts_pipeline::Result<T>
where
    F: FnOnce() -> tts_pipeline::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(task);
    let joined = if timeout.is_zero() {
        handle.await
    } else {
        tokio::time::timeout(timeout, handle)
            .await
            .map_err(|_| Error::Timeout(timeout))?
    };
    joined.map_err(|e| Error::Io(std::io::Error::other(e)))?
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidInput(_) | Error::Decode { .. } => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::Model { .. } | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn json_error(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
