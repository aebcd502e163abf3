//! Gateway handlers for the authentication core.
//!
//! The gateway is a thin layer: JSON in, JSON out. Requests may carry
//! pre-extracted embeddings, or raw PCM samples that are run through the
//! configured collaborator backends here — never inside the core. Store and
//! collaborator calls are blocking, so every handler body runs on the
//! blocking pool.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use vocalis_core::{
    AccessLogEntry, AuthError, Challenge, ChallengeEngine, Complexity, DecisionEngine,
    IdentifyMatch, ProfileStore, SpeakerSummary, TemplateFusion, VerificationVerdict,
    VerifyOptions, VocalisConfig,
};
use vocalis_voice::{pcm_f32_to_wav, EmbeddingExtractor, Transcriber};

/// Shared gateway state: one store handle, the engines wired to it, and the
/// collaborator backends.
pub struct AppState {
    pub config: VocalisConfig,
    pub store: Arc<ProfileStore>,
    pub fusion: TemplateFusion,
    pub challenges: ChallengeEngine,
    pub decisions: DecisionEngine,
    pub extractor: Box<dyn EmbeddingExtractor>,
    pub transcriber: Box<dyn Transcriber>,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn error_response(err: AuthError) -> ApiError {
    let status = match &err {
        AuthError::Validation(_) => StatusCode::BAD_REQUEST,
        AuthError::Conflict(_) => StatusCode::CONFLICT,
        AuthError::NotFound(_) => StatusCode::NOT_FOUND,
        AuthError::ChallengeUsed(_) | AuthError::ChallengeExpired(_) => StatusCode::BAD_REQUEST,
        AuthError::Dependency(_) => StatusCode::BAD_GATEWAY,
        AuthError::DimensionMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        AuthError::Storage(_) | AuthError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(error = %err, "gateway internal error");
    }
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

fn bad_request(msg: &str) -> ApiError {
    error_response(AuthError::Validation(msg.to_string()))
}

/// Run a blocking handler body on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: format!("task join error: {e}"),
            }),
        )
    })?
}

// ==================== requests / responses ====================

#[derive(Deserialize)]
pub struct EnrollRequest {
    pub user_id: String,
    pub display_name: String,
    /// Pre-extracted sample embeddings.
    #[serde(default)]
    pub samples: Option<Vec<Vec<f32>>>,
    /// Raw PCM sample buffers; the gateway extracts embeddings from them.
    #[serde(default)]
    pub audio_samples: Option<Vec<Vec<f32>>>,
}

#[derive(Serialize)]
pub struct EnrollResponse {
    pub user_id: String,
    pub display_name: String,
    pub sample_count: u32,
    pub status: &'static str,
}

#[derive(Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub samples: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    pub audio_samples: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    pub replace: bool,
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub user_id: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub audio_pcm: Option<Vec<f32>>,
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub challenge_id: Option<String>,
    /// Transcribed challenge response; when absent and `audio_pcm` is
    /// present, the gateway transcribes it.
    #[serde(default)]
    pub transcription: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Deserialize)]
pub struct IdentifyRequest {
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub audio_pcm: Option<Vec<f32>>,
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub top_n: Option<usize>,
}

#[derive(Deserialize)]
pub struct ChallengeRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub complexity: Option<String>,
}

#[derive(Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub user_id: String,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

// ==================== collaborator plumbing ====================

impl AppState {
    /// Resolve a probe embedding from the request: prefer a pre-extracted
    /// vector, otherwise run the extractor. Extraction failure is fatal to
    /// the request.
    fn resolve_embedding(
        &self,
        embedding: Option<Vec<f32>>,
        audio_pcm: Option<&[f32]>,
    ) -> Result<Vec<f32>, ApiError> {
        if let Some(v) = embedding {
            return Ok(v);
        }
        let pcm = audio_pcm.ok_or_else(|| bad_request("embedding or audio_pcm required"))?;
        self.extractor
            .extract(pcm)
            .map_err(|e| error_response(AuthError::Dependency(e.to_string())))
    }

    /// Resolve the challenge transcription: prefer the provided text,
    /// otherwise transcribe the audio. A transcriber failure degrades the
    /// liveness signal (None) instead of failing the request.
    fn resolve_transcription(
        &self,
        transcription: Option<String>,
        audio_pcm: Option<&[f32]>,
        language: &str,
    ) -> Option<String> {
        if transcription.is_some() {
            return transcription;
        }
        let pcm = audio_pcm?;
        let wav = pcm_f32_to_wav(pcm, self.config.audio.sample_rate);
        match self.transcriber.transcribe(&wav, language) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, "transcription failed; liveness degrades to fail");
                None
            }
        }
    }

    fn resolve_sample_batch(
        &self,
        samples: Option<Vec<Vec<f32>>>,
        audio_samples: Option<Vec<Vec<f32>>>,
    ) -> Result<Vec<Vec<f32>>, ApiError> {
        if let Some(samples) = samples {
            return Ok(samples);
        }
        let audio =
            audio_samples.ok_or_else(|| bad_request("samples or audio_samples required"))?;
        let mut out = Vec::with_capacity(audio.len());
        for pcm in &audio {
            let embedding = self
                .extractor
                .extract(pcm)
                .map_err(|e| error_response(AuthError::Dependency(e.to_string())))?;
            out.push(embedding);
        }
        Ok(out)
    }
}

// ==================== handlers ====================

pub async fn enroll(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<EnrollResponse>), ApiError> {
    run_blocking(move || {
        let samples = state.resolve_sample_batch(req.samples, req.audio_samples)?;
        let row = state
            .fusion
            .enroll(&req.user_id, &req.display_name, &samples)
            .map_err(error_response)?;
        Ok((
            StatusCode::CREATED,
            Json(EnrollResponse {
                user_id: row.user_id,
                display_name: row.display_name,
                sample_count: row.sample_count,
                status: "enrolled",
            }),
        ))
    })
    .await
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<EnrollResponse>, ApiError> {
    run_blocking(move || {
        let samples = state.resolve_sample_batch(req.samples, req.audio_samples)?;
        let row = state
            .fusion
            .update(&user_id, &samples, req.replace)
            .map_err(error_response)?;
        Ok(Json(EnrollResponse {
            user_id: row.user_id,
            display_name: row.display_name,
            sample_count: row.sample_count,
            status: "updated",
        }))
    })
    .await
}

pub async fn verify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerificationVerdict>, ApiError> {
    run_blocking(move || {
        let probe = state.resolve_embedding(req.embedding, req.audio_pcm.as_deref())?;
        let language = req.language.as_deref().unwrap_or("en");
        let transcription = if req.challenge_id.is_some() {
            state.resolve_transcription(req.transcription, req.audio_pcm.as_deref(), language)
        } else {
            None
        };
        let verdict = state
            .decisions
            .verify(
                &probe,
                &req.user_id,
                VerifyOptions {
                    threshold: req.threshold,
                    challenge_id: req.challenge_id,
                    transcription,
                },
            )
            .map_err(error_response)?;
        Ok(Json(verdict))
    })
    .await
}

pub async fn identify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IdentifyRequest>,
) -> Result<Json<Vec<IdentifyMatch>>, ApiError> {
    run_blocking(move || {
        let probe = state.resolve_embedding(req.embedding, req.audio_pcm.as_deref())?;
        let matches = state
            .decisions
            .identify(&probe, req.threshold, req.top_n.unwrap_or(5))
            .map_err(error_response)?;
        Ok(Json(matches))
    })
    .await
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SpeakerSummary>>, ApiError> {
    run_blocking(move || {
        let users = state.store.list_speakers().map_err(error_response)?;
        Ok(Json(users))
    })
    .await
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<SpeakerSummary>, ApiError> {
    run_blocking(move || {
        let row = state
            .store
            .get_speaker(&user_id)
            .map_err(error_response)?
            .ok_or_else(|| {
                error_response(AuthError::NotFound(format!("user '{user_id}' not found")))
            })?;
        Ok(Json(SpeakerSummary {
            user_id: row.user_id,
            display_name: row.display_name,
            sample_count: row.sample_count,
            created_at_ms: row.created_at_ms,
            updated_at_ms: row.updated_at_ms,
        }))
    })
    .await
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    run_blocking(move || {
        let deleted = state.store.delete_speaker(&user_id).map_err(error_response)?;
        if !deleted {
            return Err(error_response(AuthError::NotFound(format!(
                "user '{user_id}' not found"
            ))));
        }
        Ok(Json(DeleteResponse {
            user_id,
            status: "deleted",
        }))
    })
    .await
}

pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<AccessLogEntry>>, ApiError> {
    run_blocking(move || {
        let logs = state
            .store
            .access_logs(query.user_id.as_deref(), query.limit.unwrap_or(50))
            .map_err(error_response)?;
        Ok(Json(logs))
    })
    .await
}

pub async fn generate_challenge(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChallengeRequest>,
) -> Result<(StatusCode, Json<Challenge>), ApiError> {
    run_blocking(move || {
        let complexity = match req.complexity.as_deref() {
            None => None,
            Some(raw) => Some(raw.parse::<Complexity>().map_err(|e| bad_request(&e))?),
        };
        let challenge = state
            .challenges
            .issue(req.user_id.as_deref(), complexity)
            .map_err(error_response)?;
        Ok((StatusCode::CREATED, Json(challenge)))
    })
    .await
}

pub async fn get_challenge(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
) -> Result<Json<Challenge>, ApiError> {
    run_blocking(move || {
        let challenge = state
            .challenges
            .get(&challenge_id)
            .map_err(error_response)?
            .ok_or_else(|| {
                error_response(AuthError::NotFound(format!(
                    "challenge '{challenge_id}' not found"
                )))
            })?;
        Ok(Json(challenge))
    })
    .await
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}
