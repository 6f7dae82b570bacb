//! HTTP surface of the gateway.
//!
//! Every handler here is thin: decode the request, call into
//! `spellingbee-core`, persist, encode the response. Response field names
//! match what the web client has always consumed.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use spellingbee_core::assistant::{self, Assistant};
use spellingbee_core::intent;
use spellingbee_core::letters::{normalize_word, Transcripts};
use spellingbee_core::session::{now_ms, Session};
use spellingbee_core::store::{find_student_sessions, SessionStore, StoreError};
use spellingbee_core::turn::{TurnEngine, TurnError, TurnOutcome};

use crate::speech::Transcriber;

/// Uploaded spelling-list photos can be large; multipart bodies get a
/// wider limit than the axum default.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub assistant: Arc<dyn Assistant>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub engine: TurnEngine,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/classify_intent", post(classify_intent))
        .route("/session/start", post(start_session))
        .route("/session/resume", post(resume_session))
        .route("/session/{session_id}", get(session_status))
        .route("/sessions/find", get(find_sessions))
        .route("/turn/ask", post(turn_ask))
        .route("/turn/answer", post(turn_answer))
        .route("/word/context", post(word_context))
        .route("/words/random", post(random_words))
        .route("/extract_words", post(extract_words))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An HTTP failure with a discriminating reason, rendered as
/// `{"detail": "..."}` the way the client expects.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    fn conflict(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, detail)
    }

    fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, detail)
    }

    fn unprocessable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, detail)
    }

    fn not_implemented(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_IMPLEMENTED, detail)
    }

    fn bad_gateway(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, detail)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("session store failure: {e}"),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

fn load_session(state: &AppState, session_id: &str) -> Result<Session, ApiError> {
    state
        .store
        .get(session_id)?
        .ok_or_else(|| ApiError::not_found("Unknown session_id"))
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct StartSessionRequest {
    pub words: Vec<String>,
    #[serde(default)]
    pub student_name: Option<String>,
}

#[derive(Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub idx: usize,
    pub word: String,
    pub total: usize,
}

#[derive(Deserialize)]
pub struct ResumeSessionRequest {
    pub session_id: String,
}

#[derive(Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub student_name: String,
    pub words: Vec<String>,
    pub idx: usize,
    pub total: usize,
    pub score_correct: u32,
    pub score_total: u32,
    pub wrong_words: Vec<String>,
    pub skipped_words: Vec<String>,
    pub completed: bool,
    pub round: u32,
    pub created_ms: u64,
    pub last_active_ms: u64,
}

#[derive(Deserialize)]
pub struct FindSessionsQuery {
    pub student: String,
}

#[derive(Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub student_name: String,
    pub idx: usize,
    pub total: usize,
    pub score_correct: u32,
    pub score_total: u32,
    pub last_active_ms: u64,
}

#[derive(Deserialize)]
pub struct ClassifyIntentRequest {
    pub session_id: String,
    pub transcript: String,
}

#[derive(Serialize)]
pub struct ClassifyIntentResponse {
    pub intent: &'static str,
    pub message: String,
}

#[derive(Deserialize)]
pub struct AskForm {
    pub session_id: String,
}

#[derive(Serialize)]
pub struct AskResponse {
    pub session_id: String,
    pub idx: usize,
    pub word: String,
    pub prompt_text: String,
}

#[derive(Serialize)]
pub struct AnswerResponse {
    pub session_id: String,
    pub idx: usize,
    pub word: String,
    pub transcript: String,
    pub letters: String,
    pub correct: bool,
    pub attempts_for_word: u32,
    pub feedback_text: String,
    pub next_idx: usize,
    pub done: bool,
    pub score_correct: u32,
    pub score_total: u32,
    pub wrong_words: Vec<String>,
    pub is_guardrail: bool,
}

impl AnswerResponse {
    fn from_outcome(session_id: String, outcome: TurnOutcome) -> Self {
        Self {
            session_id,
            idx: outcome.idx,
            word: outcome.word,
            transcript: outcome.transcript,
            letters: outcome.letters,
            correct: outcome.correct,
            attempts_for_word: outcome.attempts_for_word,
            feedback_text: outcome.feedback,
            next_idx: outcome.next_idx,
            done: outcome.done,
            score_correct: outcome.score_correct,
            score_total: outcome.score_total,
            wrong_words: outcome.wrong_words,
            is_guardrail: outcome.is_guardrail,
        }
    }
}

#[derive(Deserialize)]
pub struct WordContextRequest {
    pub session_id: String,
    pub word: String,
}

#[derive(Serialize)]
pub struct WordContextResponse {
    pub word: String,
    pub definition: String,
    pub sentence: String,
}

#[derive(Serialize)]
pub struct WordsResponse {
    pub words: Vec<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn healthz(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "ts": now_ms(),
        "store": state.store.healthy(),
    }))
}

async fn classify_intent(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClassifyIntentRequest>,
) -> Result<Json<ClassifyIntentResponse>, ApiError> {
    load_session(&state, &request.session_id)?;
    let classification = intent::classify(&request.transcript);
    Ok(Json(ClassifyIntentResponse {
        intent: classification.intent.as_str(),
        message: classification.message,
    }))
}

async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartSessionRequest>,
) -> Result<Json<StartSessionResponse>, ApiError> {
    let words = Session::normalize_words(&request.words);
    if words.is_empty() {
        return Err(ApiError::bad_request("No valid words"));
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    let session = Session::new(words, request.student_name, now_ms());
    state.store.put(&session_id, &session)?;

    tracing::info!(
        "started session {session_id} for {} with {} words",
        session.student_name,
        session.total()
    );
    Ok(Json(StartSessionResponse {
        session_id,
        idx: 0,
        word: session.words[0].clone(),
        total: session.total(),
    }))
}

async fn session_status(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatusResponse>, ApiError> {
    let session = state
        .store
        .get(&session_id)?
        .ok_or_else(|| ApiError::not_found("Session not found or expired"))?;
    Ok(Json(SessionStatusResponse {
        session_id,
        student_name: session.student_name,
        idx: session.idx,
        total: session.words.len(),
        words: session.words,
        score_correct: session.score_correct,
        score_total: session.score_total,
        wrong_words: session.wrong_words,
        skipped_words: session.skipped_words,
        completed: session.completed,
        round: session.round,
        created_ms: session.created_ms,
        last_active_ms: session.last_active_ms,
    }))
}

async fn resume_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResumeSessionRequest>,
) -> Result<Json<StartSessionResponse>, ApiError> {
    let mut session = state
        .store
        .get(&request.session_id)?
        .ok_or_else(|| ApiError::not_found("Session not found or expired"))?;
    let Some(word) = session.current_word().map(str::to_string) else {
        return Err(ApiError::conflict("Session already completed"));
    };

    session.touch(now_ms());
    state.store.put(&request.session_id, &session)?;
    Ok(Json(StartSessionResponse {
        session_id: request.session_id,
        idx: session.idx,
        word,
        total: session.total(),
    }))
}

async fn find_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FindSessionsQuery>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let sessions = find_student_sessions(state.store.as_ref(), &query.student)?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|(session_id, s)| SessionSummary {
                session_id,
                student_name: s.student_name,
                idx: s.idx,
                total: s.words.len(),
                score_correct: s.score_correct,
                score_total: s.score_total,
                last_active_ms: s.last_active_ms,
            })
            .collect(),
    ))
}

async fn turn_ask(
    State(state): State<Arc<AppState>>,
    Form(form): Form<AskForm>,
) -> Result<Json<AskResponse>, ApiError> {
    let session = load_session(&state, &form.session_id)?;
    let Some(word) = session.current_word() else {
        return Err(ApiError::conflict("Session already complete"));
    };

    let prompt_text = if session.idx == 0 {
        format!("Spell {word}. Say one letter at a time.")
    } else {
        format!("Spell {word}.")
    };
    Ok(Json(AskResponse {
        session_id: form.session_id,
        idx: session.idx,
        word: word.to_string(),
        prompt_text,
    }))
}

async fn turn_answer(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<AnswerResponse>, ApiError> {
    let mut session_id: Option<String> = None;
    let mut transcript: Option<String> = None;
    let mut audio: Option<(Vec<u8>, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("session_id") => {
                session_id = Some(field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("unreadable session_id field: {e}"))
                })?);
            }
            Some("transcript") => {
                transcript = Some(field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("unreadable transcript field: {e}"))
                })?);
            }
            Some("audio") => {
                let filename = field
                    .file_name()
                    .unwrap_or("audio.webm")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("unreadable audio field: {e}")))?;
                audio = Some((bytes.to_vec(), filename));
            }
            _ => {}
        }
    }

    let session_id = session_id.ok_or_else(|| ApiError::bad_request("Missing session_id"))?;
    let mut session = load_session(&state, &session_id)?;

    // Transcribe uploaded audio through the external recognizer. A
    // recognizer outage degrades to the live transcript instead of
    // failing the turn.
    let recognizer_transcript = match audio {
        Some((bytes, filename)) if !bytes.is_empty() => match &state.transcriber {
            Some(transcriber) => match transcriber.transcribe(bytes, filename).await {
                Ok(text) => Some(text),
                Err(e) => {
                    tracing::warn!("speech-to-text failed, continuing without it: {e:#}");
                    None
                }
            },
            None => {
                if transcript.as_deref().map_or(true, |t| t.trim().is_empty()) {
                    return Err(ApiError::not_implemented(
                        "ASR_API_KEY not configured (set env or use the live transcript)",
                    ));
                }
                None
            }
        },
        _ => None,
    };

    let sources = Transcripts::new(transcript, recognizer_transcript);
    let outcome = state
        .engine
        .resolve(&mut session, &sources, state.assistant.as_ref(), now_ms())
        .await
        .map_err(|e| match e {
            TurnError::NoInput => ApiError::bad_request("Provide transcript or audio"),
        })?;

    state.store.put(&session_id, &session)?;
    Ok(Json(AnswerResponse::from_outcome(session_id, outcome)))
}

async fn word_context(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WordContextRequest>,
) -> Result<Json<WordContextResponse>, ApiError> {
    let mut session = load_session(&state, &request.session_id)?;
    let word = normalize_word(&request.word);
    if !session.words.contains(&word) {
        return Err(ApiError::forbidden("Word not in session word list"));
    }

    let context = assistant::context_for_word(&mut session, &word, state.assistant.as_ref()).await;
    state.store.put(&request.session_id, &session)?;
    Ok(Json(WordContextResponse {
        word,
        definition: context.definition,
        sentence: context.sentence,
    }))
}

async fn random_words(
    State(state): State<Arc<AppState>>,
) -> Result<Json<WordsResponse>, ApiError> {
    let words = state
        .assistant
        .random_words(25)
        .await
        .map_err(|e| ApiError::bad_gateway(format!("Failed to generate random words: {e:#}")))?;
    Ok(Json(WordsResponse { words }))
}

async fn extract_words(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<WordsResponse>, ApiError> {
    let mut upload: Option<(Vec<u8>, String)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let content_type = field.content_type().unwrap_or("image/png").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("unreadable file field: {e}")))?;
            upload = Some((bytes.to_vec(), content_type));
        }
    }

    let Some((image, content_type)) = upload.filter(|(bytes, _)| !bytes.is_empty()) else {
        return Err(ApiError::bad_request("Empty image upload"));
    };

    let words = state
        .assistant
        .words_from_image(&image, &content_type)
        .await
        .map_err(|e| ApiError::bad_gateway(format!("VL extraction failed: {e:#}")))?;
    if words.is_empty() {
        return Err(ApiError::unprocessable(
            "No words extracted. Try a clearer image or edit list manually.",
        ));
    }
    Ok(Json(WordsResponse { words }))
}
