//! Smarkdown library - markdown notes with optional cloud sync and AI editing.
//!
//! - `models`: the note record, partial updates, AI byproducts, proxy bodies
//! - `config`: environment configuration
//! - `local` / `remote`: the two persistence adapters
//! - `ai_proxy`: server-side endpoints holding the model credentials
//! - `ai_client`: gateway the state container uses to reach those endpoints
//! - `store`: the note state container
//! - `autosave`: debounced save timer
//! - `handlers`: session routes driving the state container

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

pub mod ai_client;
pub mod ai_proxy;
pub mod autosave;
pub mod config;
pub mod error;
pub mod handlers;
pub mod local;
pub mod models;
pub mod remote;
pub mod store;

use ai_client::HttpAiService;
use ai_proxy::ModelProxy;
use autosave::AutoSave;
use config::Config;
use error::NotesError;
use local::LocalStore;
use remote::SupabaseNotes;
use store::NoteStore;

// ============================================================================
// Application State
// ============================================================================

/// The note session served by this process.
pub type Session = NoteStore<SupabaseNotes, HttpAiService>;

pub struct AppState {
    pub config: Config,
    pub db: sled::Db,
    pub proxy: ModelProxy,
    pub session: Arc<Session>,
    pub autosave: AutoSave,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, NotesError> {
        let db = sled::open(&config.db_path)?;

        let session = NoteStore::new(
            SupabaseNotes::new(config.remote.clone()),
            HttpAiService::new(config.proxy_url.clone(), &config.ai),
            LocalStore::new(db.clone()),
            config.mirror,
        );

        Ok(Self {
            proxy: ModelProxy::new(config.ai.clone()),
            db,
            session: Arc::new(session),
            autosave: AutoSave::default(),
            config,
        })
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        // AI proxy routes
        .route("/api/ai/summarize", post(ai_proxy::summarize))
        .route("/api/ai/tags", post(ai_proxy::tags))
        .route("/api/ai/improve", post(ai_proxy::improve))
        .route("/api/ai/suggestions", post(ai_proxy::suggestions))
        .route("/api/ai/relate", post(ai_proxy::relate))
        // Session routes
        .route("/api/state", get(handlers::get_state))
        .route(
            "/api/session",
            post(handlers::start_session).delete(handlers::end_session),
        )
        // Collection routes
        .route(
            "/api/notes",
            get(handlers::list_notes).post(handlers::create_note),
        )
        .route("/api/notes/search", get(handlers::search))
        .route("/api/notes/tagged", get(handlers::tagged))
        .route("/api/notes/{id}", delete(handlers::delete_note))
        .route("/api/notes/{id}/open", post(handlers::open_note))
        // Open note routes
        .route(
            "/api/current",
            axum::routing::patch(handlers::update_current),
        )
        .route("/api/current/save", post(handlers::save_current))
        .route("/api/current/ai/{action}", post(handlers::ai_action))
        .route(
            "/api/current/suggestions/apply",
            post(handlers::apply_suggestion),
        )
        .route("/api/current/clear/{buffer}", delete(handlers::clear_buffer))
        .with_state(state)
}
