//! Smarkdown - markdown notes with optional cloud sync and AI-assisted editing.
//!
//! This is the main entry point for the notes web server. It serves the AI
//! proxy endpoints and the note session routes from one process.

use std::sync::Arc;

use smarkdown::{app, config::Config, AppState};

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .format_module_path(true)
        .init();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    init_logger();

    let config = Config::from_env();
    let bind = config.bind.clone();
    let state = Arc::new(AppState::new(config).expect("Failed to open database"));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {}: {}", bind, e));

    log::info!("Notes server running at http://{}", bind);
    log::info!("Local storage: {}", state.config.db_path.display());

    if state.proxy.is_configured() {
        log::info!("AI: ENABLED (proxy at {})", state.config.proxy_url);
    } else {
        log::info!("AI: DISABLED (set NOTES_AI_URL and NOTES_AI_KEY to enable)");
    }

    if state.config.remote.is_configured() {
        log::info!("Cloud sync: AVAILABLE (start a session with an access token)");
    } else {
        log::info!("Cloud sync: DISABLED (set NOTES_REMOTE_URL and NOTES_REMOTE_KEY to enable)");
    }

    axum::serve(listener, app(state)).await.expect("Server error");
}
