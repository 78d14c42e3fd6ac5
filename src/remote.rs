//! Remote persistence against the hosted `notes` table.
//!
//! The table is reached through its REST interface. Each operation is a single
//! round trip and hands the store's own error back to the caller untouched.

use crate::config::RemoteConfig;
use crate::error::{NotesError, Result};
use crate::models::{NewNote, Note, NoteUpdate};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

pub const NOTES_TABLE: &str = "notes";

const LISTING_ORDER: &str = "updated_at.desc";

/// Remote operations used by the state container.
pub trait RemoteNotes: Send + Sync + 'static {
    /// All notes visible to the current user, newest `updated_at` first.
    fn list(&self) -> impl Future<Output = Result<Vec<Note>>> + Send;

    fn get(&self, id: &str) -> impl Future<Output = Result<Option<Note>>> + Send;

    /// Inserts a note owned by the authenticated user.
    fn insert(&self, note: NewNote) -> impl Future<Output = Result<Note>> + Send;

    /// Returns the row as stored after the update.
    fn update(&self, id: &str, update: NoteUpdate) -> impl Future<Output = Result<Note>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Case-insensitive substring search over title and content.
    fn search(&self, query: &str) -> impl Future<Output = Result<Vec<Note>>> + Send;

    /// Notes whose tag list contains `tag`.
    fn by_tag(&self, tag: &str) -> impl Future<Output = Result<Vec<Note>>> + Send;
}

// ============================================================================
// Hosted Table Client
// ============================================================================

pub struct SupabaseNotes {
    client: reqwest::Client,
    config: RemoteConfig,
    access_token: RwLock<Option<String>>,
}

#[derive(Serialize)]
struct InsertRow {
    title: String,
    content: String,
    tags: Vec<String>,
    user_id: String,
}

#[derive(Deserialize)]
struct AuthUser {
    id: String,
}

impl SupabaseNotes {
    pub fn new(config: RemoteConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            config,
            access_token: RwLock::new(None),
        }
    }

    /// Sets the access token issued to the signed-in user, or clears it.
    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn token(&self) -> Option<String> {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn credentials(&self) -> Result<(&str, &str)> {
        match (self.config.url.as_deref(), self.config.key.as_deref()) {
            (Some(url), Some(key)) => Ok((url.trim_end_matches('/'), key)),
            _ => Err(NotesError::NotConfigured {
                service: "Remote store",
            }),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder> {
        let (base, key) = self.credentials()?;
        let bearer = self.token().unwrap_or_else(|| key.to_string());
        Ok(self
            .client
            .request(method, format!("{}{}", base, path))
            .header("apikey", key)
            .bearer_auth(bearer))
    }

    fn table(&self, method: reqwest::Method) -> Result<reqwest::RequestBuilder> {
        self.request(method, &format!("/rest/v1/{}", NOTES_TABLE))
    }

    /// Resolves the signed-in user from the access token.
    async fn current_user_id(&self) -> Result<String> {
        if self.token().is_none() {
            return Err(NotesError::NotAuthenticated);
        }
        let response = self.request(reqwest::Method::GET, "/auth/v1/user")?.send().await?;
        if !response.status().is_success() {
            return Err(NotesError::NotAuthenticated);
        }
        let user: AuthUser = response.json().await?;
        Ok(user.id)
    }

    async fn fetch_rows(&self, filters: &[(&str, String)]) -> Result<Vec<Note>> {
        let response = self
            .table(reqwest::Method::GET)?
            .query(&[("select", "*")])
            .query(filters)
            .query(&[("order", LISTING_ORDER)])
            .send()
            .await?;
        let rows: Vec<Note> = check(response).await?.json().await?;
        Ok(rows)
    }
}

impl RemoteNotes for SupabaseNotes {
    async fn list(&self) -> Result<Vec<Note>> {
        self.fetch_rows(&[]).await
    }

    async fn get(&self, id: &str) -> Result<Option<Note>> {
        let rows = self.fetch_rows(&[("id", format!("eq.{}", id))]).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert(&self, note: NewNote) -> Result<Note> {
        let user_id = self.current_user_id().await?;
        let row = InsertRow {
            title: note.title,
            content: note.content,
            tags: note.tags,
            user_id,
        };
        let response = self
            .table(reqwest::Method::POST)?
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await?;
        single_row(check(response).await?).await
    }

    async fn update(&self, id: &str, update: NoteUpdate) -> Result<Note> {
        let response = self
            .table(reqwest::Method::PATCH)?
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&update)
            .send()
            .await?;
        single_row(check(response).await?).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let response = self
            .table(reqwest::Method::DELETE)?
            .query(&[("id", format!("eq.{}", id))])
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<Note>> {
        let pattern = quote_filter_value(&format!("*{}*", query));
        let filter = format!("(title.ilike.{p},content.ilike.{p})", p = pattern);
        self.fetch_rows(&[("or", filter)]).await
    }

    async fn by_tag(&self, tag: &str) -> Result<Vec<Note>> {
        let filter = format!("cs.{{{}}}", quote_filter_value(tag));
        self.fetch_rows(&[("tags", filter)]).await
    }
}

/// Passes a success response through, or turns the store's answer into an error.
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(NotesError::Remote {
        status: status.as_u16(),
        message,
    })
}

async fn single_row(response: reqwest::Response) -> Result<Note> {
    let status = response.status().as_u16();
    let rows: Vec<Note> = response.json().await?;
    rows.into_iter().next().ok_or(NotesError::Remote {
        status,
        message: "no row returned".to_string(),
    })
}

/// Double-quotes a filter value so commas and parentheses stay literal.
fn quote_filter_value(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
