//! HTTP API for the companion UI
//!
//! `GET /health`, `GET /personas`, and `POST /persona/{summary,greet,chat}`.
//! Errors are JSON `{ "error": { code, message, retryable, hint } }` with a
//! status taken from [`Error::http_status`].

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::persona::prompts::{chat_prompt, greeting_prompt, system_prompt};
use crate::persona::{ChatTurn, PersonaRecord};
use crate::summary::SummaryEntry;

/// Identity used when no persona card exists at all
const GENERIC_IDENTITY: &str = "A helpful, concise assistant.";

type SharedContext = Arc<AppContext>;

// ─────────────────────────────────────────────────────────────────
// Request / Response Types
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PersonaRequest {
    pub persona: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PersonaView {
    pub key: String,
    pub display_name: String,
    pub style: String,
    pub label: String,
    /// `fresh`, `stale` or `missing`
    pub cache: String,
}

/// Error rendered as JSON with a status matching its kind
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self.0.format_for_log(), "Request failed");
        }

        let body = json!({
            "error": {
                "code": self.0.code().as_str(),
                "message": self.0.to_string(),
                "retryable": self.0.is_retryable(),
                "hint": self.0.suggestion(),
            }
        });
        (status, Json(body)).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────

pub fn router(ctx: SharedContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/personas", get(list_personas))
        .route("/persona/summary", post(summary))
        .route("/persona/greet", post(greet))
        .route("/persona/chat", post(chat))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Bind `server.host:server.port` and serve until Ctrl-C
pub async fn serve(ctx: SharedContext) -> Result<()> {
    let addr = ctx.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Config(format!("Cannot bind {}: {}", addr, e)))?;

    info!(addr = %addr, "Persona coordinator listening");
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C; stop the process to shut down");
        std::future::pending::<()>().await;
    }
}

// ─────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────

async fn health() -> &'static str {
    "OK"
}

async fn list_personas(State(ctx): State<SharedContext>) -> Json<Vec<PersonaView>> {
    let views = ctx
        .personas
        .list()
        .iter()
        .map(|p| PersonaView {
            key: p.key.clone(),
            display_name: p.name().to_string(),
            style: p.style_or_default().to_string(),
            label: p.label(),
            cache: ctx.summaries.status(p).as_str().to_string(),
        })
        .collect();
    Json(views)
}

async fn summary(
    State(ctx): State<SharedContext>,
    body: Option<Json<PersonaRequest>>,
) -> std::result::Result<Json<SummaryEntry>, ApiError> {
    let selector = body.and_then(|Json(b)| b.persona);
    Ok(Json(build_summary(&ctx, selector).await?))
}

async fn greet(
    State(ctx): State<SharedContext>,
    body: Option<Json<PersonaRequest>>,
) -> std::result::Result<Json<AnswerResponse>, ApiError> {
    let selector = body.and_then(|Json(b)| b.persona);
    let (record, identity) = persona_identity(&ctx, selector).await?;

    let system = system_prompt(&record, &identity);
    let answer = ctx.model.complete(&system, &greeting_prompt(&record)).await?;

    Ok(Json(AnswerResponse {
        answer: answer.trim().to_string(),
    }))
}

async fn chat(
    State(ctx): State<SharedContext>,
    Json(body): Json<ChatRequest>,
) -> std::result::Result<Json<AnswerResponse>, ApiError> {
    if body.message.trim().is_empty() {
        return Err(Error::invalid_request("message must not be empty").into());
    }

    let (record, identity) = persona_identity(&ctx, body.persona).await?;
    let system = system_prompt(&record, &identity);
    let user = chat_prompt(&body.history, &body.message, ctx.config.server.history_turns);
    let answer = ctx.model.complete(&system, &user).await?;

    Ok(Json(AnswerResponse {
        answer: answer.trim().to_string(),
    }))
}

// ─────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────

/// Get-or-build on a detached task so a dropped client does not cancel a
/// generation other requests are waiting on
async fn build_summary(ctx: &AppContext, selector: Option<String>) -> Result<SummaryEntry> {
    let service = Arc::clone(&ctx.summaries);
    tokio::spawn(async move { service.get_or_build(selector.as_deref()).await })
        .await
        .map_err(|e| Error::Internal(format!("summary task failed: {}", e)))?
}

/// [`build_summary`] for a persona that is already resolved
async fn build_record_summary(ctx: &AppContext, record: Arc<PersonaRecord>) -> Result<SummaryEntry> {
    let service = Arc::clone(&ctx.summaries);
    tokio::spawn(async move { service.get_or_build_record(&record).await })
        .await
        .map_err(|e| Error::Internal(format!("summary task failed: {}", e)))?
}

/// Persona plus the identity text for its system prompt
///
/// An empty persona directory falls back to the built-in card. A busy lock
/// degrades to a one-line identity instead of failing the conversation.
async fn persona_identity(
    ctx: &AppContext,
    selector: Option<String>,
) -> Result<(Arc<PersonaRecord>, String)> {
    if ctx.personas.is_empty() {
        return Ok((Arc::new(PersonaRecord::fallback()), GENERIC_IDENTITY.to_string()));
    }

    let record = ctx
        .personas
        .resolve(selector.as_deref())
        .ok_or_else(|| Error::invalid_request("Unknown persona."))?;

    match build_record_summary(ctx, Arc::clone(&record)).await {
        Ok(entry) => Ok((record, entry.summary)),
        Err(Error::Busy { .. }) => {
            let identity = format!("{} is a {} assistant.", record.who(), record.style_or_default());
            Ok((record, identity))
        }
        Err(e) => Err(e),
    }
}
