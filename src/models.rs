//! Data models for the notes service.
//!
//! The note record itself, the partial update applied by the editor, the AI
//! byproducts, and the request/response bodies of the AI proxy endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_TITLE: &str = "Untitled";

/// Prefix of client-generated ids. Notes carrying it never reach the remote store.
pub const LOCAL_ID_PREFIX: &str = "local_";

/// Owner recorded on notes created while logged out.
pub const LOCAL_OWNER: &str = "local";

// ============================================================================
// Core Note Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Builds an offline note with a `local_<millis>` id.
    pub fn new_local(now: DateTime<Utc>) -> Self {
        Self {
            id: format!("{}{}", LOCAL_ID_PREFIX, now.timestamp_millis()),
            user_id: LOCAL_OWNER.to_string(),
            title: Some(DEFAULT_TITLE.to_string()),
            content: String::new(),
            tags: Vec::new(),
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_local(&self) -> bool {
        is_local_id(&self.id)
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_TITLE)
    }

    /// Shallow merge: every field present in the patch replaces the note's value.
    pub fn apply(&mut self, patch: &NotePatch) {
        if let Some(title) = &patch.title {
            self.title = Some(title.clone());
        }
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        if let Some(tags) = &patch.tags {
            self.tags = tags.clone();
        }
        if let Some(summary) = &patch.summary {
            self.summary = Some(summary.clone());
        }
    }

    /// Case-insensitive substring match across title, content and tags.
    pub fn matches_query(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.title
            .as_deref()
            .map(|t| t.to_lowercase().contains(&q))
            .unwrap_or(false)
            || self.content.to_lowercase().contains(&q)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&q))
    }
}

pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Partial note sent by the editor on every keystroke or tag edit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NotePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Fields pushed to the remote store on save.
#[derive(Debug, Clone, Serialize)]
pub struct NoteUpdate {
    pub title: Option<String>,
    pub content: String,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl NoteUpdate {
    pub fn from_note(note: &Note, now: DateTime<Utc>) -> Self {
        Self {
            title: note.title.clone(),
            content: note.content.clone(),
            tags: note.tags.clone(),
            summary: note.summary.clone(),
            updated_at: now,
        }
    }
}

/// Fields sent on remote insert. The owner is resolved by the adapter.
#[derive(Debug, Clone, Serialize)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

impl Default for NewNote {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            content: String::new(),
            tags: Vec::new(),
        }
    }
}

// ============================================================================
// AI Byproducts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Beginning,
    Middle,
    End,
}

impl Position {
    /// Anything other than `beginning` or `middle` lands at the end.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "beginning" => Position::Beginning,
            "middle" => Position::Middle,
            _ => Position::End,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub position: String,
}

impl Suggestion {
    pub fn position(&self) -> Position {
        Position::parse(&self.position)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelatedNote {
    pub id: String,
    pub score: f64,
}

/// Another note offered to the relate operation as a candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtherNote {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
}

impl From<&Note> for OtherNote {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id.clone(),
            content: note.content.clone(),
        }
    }
}

// ============================================================================
// AI Proxy Bodies
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelateRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub current: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub others: Vec<OtherNote>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagsResponse {
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImproveResponse {
    pub improved: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedResponse {
    pub related: Vec<RelatedNote>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Treats an explicit JSON `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
