use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{get, post},
};
use dashmap::DashMap;
use intake_engine::format::{FormatKind, Formatted, field_summary};
use intake_engine::{
    Analysis, EngineError, FieldName, FieldSource, Session, SessionRunner, SessionState,
    StructuredRecord, Turn, TurnOutcome, looks_like_research_text,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::workflow::create_session_runner;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn engine_error(e: EngineError, session_id: &str) -> ApiError {
    match &e {
        EngineError::SessionNotFound(_) => not_found_error("Session not found", session_id),
        EngineError::SessionFinalized(_) => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": e.to_string(),
                "session_id": session_id
            })),
        ),
        EngineError::CaseCreation(details) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "error": "Case creation failed",
                "details": details,
                "session_id": session_id
            })),
        ),
        EngineError::Format(details) => bad_request_error(details),
        _ => {
            error!(session_id = %session_id, error = %e, "Request failed");
            internal_error("Request failed", &e.to_string())
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub runner: SessionRunner,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl AppState {
    pub fn new(runner: SessionRunner) -> Self {
        Self {
            runner,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Serializes turns for one session id.
    async fn lock_session(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Drops per-session locks nobody holds.
    fn prune_locks(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Periodically expires idle sessions and their locks.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match state.runner.store().expire().await {
                    Ok(0) => {}
                    Ok(expired) => info!(expired, "Expired idle sessions"),
                    Err(e) => warn!(error = %e, "Session sweep failed"),
                }
                state.prune_locks();
            }
        })
    }
}

/// Middleware to add correlation ID to all requests
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

/// Builds the router and its state from configuration. The state is
/// returned so the caller can start the session sweeper.
pub fn create_app(config: &ServiceConfig) -> anyhow::Result<(Router, AppState)> {
    let app_state = AppState::new(create_session_runner(config)?);
    Ok((build_router(app_state.clone()), app_state))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/analyze", post(analyze_text))
        .route("/sessions", post(start_session))
        .route("/sessions/{session_id}", get(get_session))
        .route("/sessions/{session_id}/turn", post(submit_turn))
        .route("/sessions/{session_id}/confirm", post(confirm_session))
        .route("/format", post(format_record))
        .route("/chat", post(chat))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TurnRequest {
    #[serde(default)]
    pub answers: Option<BTreeMap<FieldName, String>>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub restart: Option<String>,
}

impl TurnRequest {
    fn into_turn(self) -> Option<Turn> {
        if let Some(text) = self.restart.filter(|t| !t.trim().is_empty()) {
            return Some(Turn::Restart(text));
        }
        if let Some(answers) = self.answers.filter(|a| !a.is_empty()) {
            return Some(Turn::Answers(answers));
        }
        self.text
            .filter(|t| !t.trim().is_empty())
            .map(Turn::Text)
    }
}

#[derive(Debug, Deserialize)]
pub struct FormatRequest {
    pub fields: StructuredRecord,
    #[serde(default)]
    pub format: FormatKind,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: Option<String>,
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<SessionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Research Intake Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Field extraction, CALM/DPIA classification and guided completion of research requests",
        "endpoints": {
            "POST /analyze": "Analyze a request text without starting a session",
            "POST /sessions": "Start a completion session",
            "GET /sessions/{session_id}": "Get session state",
            "POST /sessions/{session_id}/turn": "Answer outstanding fields, or restart with new text",
            "POST /sessions/{session_id}/confirm": "Create the case for a complete record",
            "POST /format": "Render a record as a table or structured JSON",
            "POST /chat": "Conversational front end over sessions",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn require_text(text: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(bad_request_error("Text is required"));
    }
    Ok(())
}

async fn analyze_text(
    State(state): State<AppState>,
    Json(request): Json<TextRequest>,
) -> ApiResult<Analysis> {
    require_text(&request.text)?;
    info!(text_length = request.text.len(), "Analyzing request text");

    let analysis = state.runner.analyze(&request.text).await;
    info!(
        category = %analysis.classification.category,
        unresolved = analysis.unresolved.len(),
        enhanced = analysis.enhanced,
        "Analysis complete"
    );
    Ok(Json(analysis))
}

async fn start_session(
    State(state): State<AppState>,
    Json(request): Json<TextRequest>,
) -> ApiResult<TurnOutcome> {
    require_text(&request.text)?;
    let outcome = state
        .runner
        .start(&request.text)
        .await
        .map_err(|e| engine_error(e, ""))?;
    Ok(Json(outcome))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Session> {
    info!(session_id = %session_id, "Getting session");
    let session = state
        .runner
        .session(&session_id)
        .await
        .map_err(|e| engine_error(e, &session_id))?;
    Ok(Json(session))
}

async fn submit_turn(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<TurnRequest>,
) -> ApiResult<TurnOutcome> {
    let turn = request
        .into_turn()
        .ok_or_else(|| bad_request_error("One of answers, text or restart is required"))?;

    let _guard = state.lock_session(&session_id).await;
    let outcome = state
        .runner
        .continue_session(&session_id, turn)
        .await
        .map_err(|e| engine_error(e, &session_id))?;
    Ok(Json(outcome))
}

async fn confirm_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<TurnOutcome> {
    let _guard = state.lock_session(&session_id).await;
    let outcome = state
        .runner
        .continue_session(&session_id, Turn::Confirm)
        .await
        .map_err(|e| engine_error(e, &session_id))?;
    Ok(Json(outcome))
}

async fn format_record(
    State(state): State<AppState>,
    Json(request): Json<FormatRequest>,
) -> ApiResult<Formatted> {
    let record = request.fields.to_record(FieldSource::User);
    Ok(Json(state.runner.format(&record, request.format)))
}

const AFFIRMATIVE: &[&str] = &["yes", "y", "create", "confirm", "ok", "okay", "go ahead", "submit"];

fn is_affirmative(message: &str) -> bool {
    let message = message
        .trim()
        .trim_end_matches(['.', '!'])
        .to_lowercase();
    AFFIRMATIVE.contains(&message.as_str())
}

/// Chat rendering of a session outcome.
fn chat_reply(outcome: &TurnOutcome) -> String {
    let classification = &outcome.classification;
    match outcome.state {
        SessionState::Finalized => format!(
            "Case {} has been created for this {} request.",
            outcome.case_id.as_deref().unwrap_or("(no id)"),
            classification.category
        ),
        SessionState::Failed => format!(
            "Case creation failed: {}. Reply \"yes\" to try again.",
            outcome.last_error.as_deref().unwrap_or("unknown error")
        ),
        SessionState::Ready => format!(
            "All mandatory fields are complete:\n{}\n\nRecommended service: {} ({:.0}% confidence).\nReply \"yes\" to create the case.",
            field_summary(&outcome.record),
            classification.category,
            classification.confidence * 100.0
        ),
        SessionState::AwaitingAnswers | SessionState::Detecting => {
            let mut reply = String::new();
            if !outcome.rejected.is_empty() {
                let names = outcome
                    .rejected
                    .iter()
                    .map(|field| field.label())
                    .collect::<Vec<_>>()
                    .join(", ");
                reply.push_str(&format!(
                    "That answer is not one of the listed options for: {names}.\n\n"
                ));
            }
            let summary = field_summary(&outcome.record);
            if !summary.is_empty() {
                reply.push_str("Here is what I found so far:\n");
                reply.push_str(&summary);
                reply.push_str("\n\n");
            }
            reply.push_str("I still need a few details:\n");
            let questions = outcome
                .prompts
                .iter()
                .map(|prompt| prompt.render())
                .collect::<Vec<_>>()
                .join("\n");
            reply.push_str(&questions);
            reply
        }
    }
}

fn chat_response(outcome: &TurnOutcome) -> ChatResponse {
    ChatResponse {
        session_id: Some(outcome.session_id.clone()),
        reply: chat_reply(outcome),
        state: Some(outcome.state),
        case_id: outcome.case_id.clone(),
    }
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let message = request.message.trim().to_string();
    require_text(&message)?;

    let _guard = match &request.session_id {
        Some(id) => Some(state.lock_session(id).await),
        None => None,
    };
    let existing = match &request.session_id {
        Some(id) => match state.runner.session(id).await {
            Ok(session) if session.state != SessionState::Finalized => Some(session),
            Ok(_) | Err(EngineError::SessionNotFound(_)) => None,
            Err(e) => return Err(engine_error(e, id)),
        },
        None => None,
    };

    let Some(session) = existing else {
        if !looks_like_research_text(&message) {
            return Ok(Json(ChatResponse {
                session_id: None,
                reply: "Paste a description of your research request and I will extract the intake details and suggest a service."
                    .to_string(),
                state: None,
                case_id: None,
            }));
        }
        let outcome = state
            .runner
            .start(&message)
            .await
            .map_err(|e| engine_error(e, ""))?;
        info!(session_id = %outcome.session_id, "Chat started session");
        return Ok(Json(chat_response(&outcome)));
    };

    let session_id = session.id.clone();
    let turn = match session.state {
        SessionState::Ready | SessionState::Failed if is_affirmative(&message) => Turn::Confirm,
        _ if looks_like_research_text(&message) && session.outstanding.len() != 1 => {
            Turn::Restart(message)
        }
        _ => Turn::Text(message),
    };

    match state.runner.continue_session(&session_id, turn).await {
        Ok(outcome) => Ok(Json(chat_response(&outcome))),
        Err(EngineError::CaseCreation(details)) => Ok(Json(ChatResponse {
            session_id: Some(session_id),
            reply: format!("Case creation failed: {details}. Reply \"yes\" to try again."),
            state: Some(SessionState::Failed),
            case_id: None,
        })),
        Err(e) => Err(engine_error(e, &session_id)),
    }
}
