//! HTTP route handlers for the note session.
//!
//! These routes drive the state container the way the editor would: every one
//! performs a single container operation and answers with the resulting state.

use crate::models::{NotePatch, Suggestion};
use crate::store::StoreState;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

fn snapshot(state: &AppState) -> Json<StoreState> {
    Json(state.session.snapshot())
}

// ============================================================================
// Session Lifecycle
// ============================================================================

pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StoreState> {
    snapshot(&state)
}

#[derive(Deserialize, Default)]
pub struct StartSession {
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Starts a session. With an access token the session is logged in and
/// works against the remote store; without one it is local-only.
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartSession>,
) -> Json<StoreState> {
    let token = body.access_token.filter(|t| !t.trim().is_empty());
    let logged_in = token.is_some();

    state.autosave.cancel();
    state.session.reset();
    state.session.remote().set_access_token(token);
    state.session.set_logged_in(logged_in);
    log::info!("Session started (logged in: {})", logged_in);

    state.session.load().await;
    snapshot(&state)
}

pub async fn end_session(State(state): State<Arc<AppState>>) -> Json<StoreState> {
    state.autosave.cancel();
    state.session.reset();
    state.session.remote().set_access_token(None);
    log::info!("Session ended");
    snapshot(&state)
}

// ============================================================================
// Collection Handlers
// ============================================================================

pub async fn list_notes(State(state): State<Arc<AppState>>) -> Json<StoreState> {
    state.session.load().await;
    snapshot(&state)
}

pub async fn create_note(State(state): State<Arc<AppState>>) -> Json<StoreState> {
    state.autosave.cancel();
    state.session.create().await;
    snapshot(&state)
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

pub async fn search(
    Query(query): Query<SearchQuery>,
    State(state): State<Arc<AppState>>,
) -> Json<StoreState> {
    state.session.search(&query.q.unwrap_or_default()).await;
    snapshot(&state)
}

#[derive(Deserialize)]
pub struct TagQuery {
    pub tag: Option<String>,
}

pub async fn tagged(
    Query(query): Query<TagQuery>,
    State(state): State<Arc<AppState>>,
) -> Json<StoreState> {
    state.session.filter_by_tag(&query.tag.unwrap_or_default()).await;
    snapshot(&state)
}

pub async fn open_note(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    if !state.session.open(&id) {
        return (StatusCode::NOT_FOUND, "Note not found").into_response();
    }
    snapshot(&state).into_response()
}

pub async fn delete_note(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Json<StoreState> {
    state.session.delete(&id).await;
    snapshot(&state)
}

// ============================================================================
// Open Note Handlers
// ============================================================================

/// Applies an editor change and restarts the auto-save timer.
pub async fn update_current(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<NotePatch>,
) -> Json<StoreState> {
    state.session.set_field(&patch);

    let session = state.session.clone();
    state.autosave.schedule(async move {
        session.save().await;
    });
    snapshot(&state)
}

pub async fn save_current(State(state): State<Arc<AppState>>) -> Json<StoreState> {
    state.autosave.cancel();
    state.session.save().await;
    snapshot(&state)
}

pub async fn ai_action(Path(action): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let session = &state.session;
    match action.as_str() {
        "summarize" => session.summarize().await,
        "tags" => session.suggest_tags().await,
        "improve" => session.improve().await,
        "suggestions" => session.suggest().await,
        "related" => session.relate().await,
        _ => return (StatusCode::NOT_FOUND, "Unknown AI action").into_response(),
    }
    snapshot(&state).into_response()
}

pub async fn apply_suggestion(
    State(state): State<Arc<AppState>>,
    Json(suggestion): Json<Suggestion>,
) -> Json<StoreState> {
    state.session.apply_suggestion(&suggestion).await;
    snapshot(&state)
}

pub async fn clear_buffer(Path(buffer): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    match buffer.as_str() {
        "error" => state.session.clear_error(),
        "suggestions" => state.session.clear_suggestions(),
        "related" => state.session.clear_related(),
        "summary" => state.session.clear_summary(),
        _ => return (StatusCode::NOT_FOUND, "Unknown buffer").into_response(),
    }
    snapshot(&state).into_response()
}
