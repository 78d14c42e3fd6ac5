//! AI proxy: server-side endpoints that hold the model credentials.
//!
//! Each endpoint turns its input into a prompt, forwards it to the external
//! model, and cleans up whatever text comes back. The model's reply shape is
//! not stable, so decoding tries the known shapes and otherwise reports the
//! reply as unparseable.

use crate::config::AiConfig;
use crate::error::{NotesError, Result};
use crate::models::{
    ContentRequest, ErrorResponse, ImproveResponse, OtherNote, RelateRequest, RelatedNote,
    RelatedResponse, Suggestion, SuggestionsResponse, SummaryResponse, TagsResponse,
};
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Most related notes ever returned by the relate endpoint.
pub const MAX_RELATED: usize = 5;

/// Characters of each candidate note included in the relate prompt.
pub const RELATE_EXCERPT_CHARS: usize = 800;

// ============================================================================
// Reply Decoding
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Text(String),
    Unparseable,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidatesReply {
    candidates: Vec<Candidate>,
}

/// Older single-name variant of the same payload.
#[derive(Deserialize)]
struct LegacyCandidateReply {
    candidate: Vec<Candidate>,
}

fn first_text(candidates: Vec<Candidate>) -> Option<String> {
    candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .next()?
        .text
}

impl ModelReply {
    pub fn decode(body: &Value) -> Self {
        if let Some(text) = CandidatesReply::deserialize(body)
            .ok()
            .and_then(|r| first_text(r.candidates))
        {
            return ModelReply::Text(text);
        }
        if let Some(text) = LegacyCandidateReply::deserialize(body)
            .ok()
            .and_then(|r| first_text(r.candidate))
        {
            return ModelReply::Text(text);
        }
        ModelReply::Unparseable
    }
}

// ============================================================================
// Post-processing
// ============================================================================

/// Removes a surrounding markdown code fence (with or without a `json` tag).
pub fn strip_code_fence(text: &str) -> String {
    let mut cleaned = text.trim().to_string();
    if !cleaned.starts_with("```") {
        return cleaned;
    }
    if let Ok(open) = Regex::new(r"^```(?:json|JSON)?\s*") {
        cleaned = open.replace(&cleaned, "").into_owned();
    }
    if let Ok(close) = Regex::new(r"\s*```$") {
        cleaned = close.replace(&cleaned, "").into_owned();
    }
    cleaned.trim().to_string()
}

/// A JSON array of strings, or failing that a comma-separated list.
pub fn parse_tags(text: &str) -> Vec<String> {
    let cleaned = strip_code_fence(text);
    match serde_json::from_str::<Vec<String>>(&cleaned) {
        Ok(tags) => tags,
        Err(e) => {
            log::warn!("Tag reply is not a JSON array ({}): {:?}", e, text);
            cleaned
                .replace(|c: char| matches!(c, '[' | ']' | '"'), "")
                .split(',')
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect()
        }
    }
}

pub fn parse_suggestions(text: &str) -> Vec<Suggestion> {
    serde_json::from_str(&strip_code_fence(text)).unwrap_or_else(|e| {
        log::warn!("Failed to parse suggestions JSON ({}): {:?}", e, text);
        Vec::new()
    })
}

pub fn parse_related(text: &str) -> Vec<RelatedNote> {
    let mut related: Vec<RelatedNote> =
        serde_json::from_str(&strip_code_fence(text)).unwrap_or_else(|e| {
            log::warn!("Failed to parse related notes JSON ({}): {:?}", e, text);
            Vec::new()
        });
    related.truncate(MAX_RELATED);
    related
}

// ============================================================================
// Prompts
// ============================================================================

pub fn summary_prompt(content: &str) -> String {
    format!("Summarize this content into 3-5 bullet points\n\n{}", content)
}

pub fn tags_prompt(content: &str) -> String {
    format!(
        "Generate 3-5 relevant tags for this content. Return ONLY a JSON array of tag strings, \
        no other text. Example: [\"tag1\", \"tag2\", \"tag3\"]\n\nContent: {}",
        content
    )
}

pub fn improve_prompt(content: &str) -> String {
    format!(
        "Improve this markdown content by fixing grammar, improving clarity, and enhancing \
        structure while preserving the original meaning and formatting. IMPORTANT: Do NOT modify \
        anything inside code blocks (between ``` markers); keep code blocks exactly as they are. \
        Only improve the markdown text outside of code blocks.\n\n{}",
        content
    )
}

pub fn suggestions_prompt(content: &str) -> String {
    format!(
        "Based on this markdown content, suggest 2-3 specific additions or improvements that \
        could be added to enhance the note. For each suggestion, provide:\n\
        1. A brief title/description\n\
        2. The actual markdown content to add\n\
        3. Where it should be inserted (beginning, middle, or end)\n\n\
        Return as JSON array: [{{\"title\": \"suggestion title\", \"content\": \"markdown content to add\", \"position\": \"beginning|middle|end\"}}]\n\n\
        Content: {}",
        content
    )
}

pub fn relate_prompt(current: &str, others: &[OtherNote]) -> String {
    let listing = others
        .iter()
        .map(|other| {
            let excerpt: String = other.content.chars().take(RELATE_EXCERPT_CHARS).collect();
            format!("[{}] {}", other.id, excerpt)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Given a current note and a list of other notes, return the top {max} related by topic. \
        Output ONLY a JSON array of objects with {{id, score}} where score is 0..1. Do not include \
        any markdown formatting or code blocks.\n\n\
        CURRENT:\n{current}\n\n\
        OTHERS:\n{listing}\n\n\
        Return format: [{{\"id\": \"note_id\", \"score\": 0.85}}]",
        max = MAX_RELATED,
        current = current,
        listing = listing,
    )
}

// ============================================================================
// Model Client
// ============================================================================

pub struct ModelProxy {
    client: reqwest::Client,
    config: AiConfig,
}

impl ModelProxy {
    pub fn new(config: AiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    /// Sends one prompt to the model and decodes the first text part of the reply.
    pub async fn generate(&self, prompt: &str) -> Result<ModelReply> {
        let (model_url, key) = self
            .config
            .credentials()
            .ok_or(NotesError::NotConfigured { service: "AI" })?;

        let mut endpoint = url::Url::parse(model_url)
            .map_err(|e| NotesError::Upstream(format!("invalid model URL: {}", e)))?;
        endpoint.query_pairs_mut().append_pair("key", key);

        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
        let response = self.client.post(endpoint).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            log::error!("Model responded with {}: {}", status, error_text);
            return Err(NotesError::Upstream(format!("{} - {}", status, error_text)));
        }

        let data: Value = response.json().await?;
        log::debug!("Model reply: {}", data);
        Ok(ModelReply::decode(&data))
    }

    async fn generate_text(&self, prompt: &str) -> Result<String> {
        match self.generate(prompt).await? {
            ModelReply::Text(text) => Ok(text.trim().to_string()),
            ModelReply::Unparseable => Err(NotesError::UnparseableReply),
        }
    }

    /// Structured replies that cannot be decoded count as an empty answer.
    async fn generate_structured(&self, prompt: &str) -> Result<String> {
        match self.generate(prompt).await? {
            ModelReply::Text(text) => Ok(text),
            ModelReply::Unparseable => {
                log::warn!("Model reply had no text part, treating it as empty");
                Ok(String::new())
            }
        }
    }

    pub async fn summarize(&self, content: &str) -> Result<String> {
        self.generate_text(&summary_prompt(content)).await
    }

    pub async fn tags(&self, content: &str) -> Result<Vec<String>> {
        let text = self.generate_structured(&tags_prompt(content)).await?;
        Ok(parse_tags(&text))
    }

    pub async fn improve(&self, content: &str) -> Result<String> {
        self.generate_text(&improve_prompt(content)).await
    }

    pub async fn suggestions(&self, content: &str) -> Result<Vec<Suggestion>> {
        let text = self.generate_structured(&suggestions_prompt(content)).await?;
        Ok(parse_suggestions(&text))
    }

    pub async fn relate(&self, current: &str, others: &[OtherNote]) -> Result<Vec<RelatedNote>> {
        let text = self.generate_structured(&relate_prompt(current, others)).await?;
        Ok(parse_related(&text))
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

fn failure(action: &str, err: NotesError) -> Response {
    let error = match err {
        NotesError::NotConfigured { .. } => err.to_string(),
        other => {
            log::error!("AI {} failed: {}", action, other);
            format!("Failed to {}: {}", action, other)
        }
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error })).into_response()
}

pub async fn summarize(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ContentRequest>,
) -> Response {
    match state.proxy.summarize(&body.content).await {
        Ok(summary) => Json(SummaryResponse { summary }).into_response(),
        Err(e) => failure("generate summary", e),
    }
}

pub async fn tags(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ContentRequest>,
) -> Response {
    match state.proxy.tags(&body.content).await {
        Ok(tags) => Json(TagsResponse { tags }).into_response(),
        Err(e) => failure("generate tags", e),
    }
}

pub async fn improve(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ContentRequest>,
) -> Response {
    match state.proxy.improve(&body.content).await {
        Ok(improved) => Json(ImproveResponse { improved }).into_response(),
        Err(e) => failure("improve content", e),
    }
}

pub async fn suggestions(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ContentRequest>,
) -> Response {
    match state.proxy.suggestions(&body.content).await {
        Ok(suggestions) => Json(SuggestionsResponse { suggestions }).into_response(),
        Err(e) => failure("generate suggestions", e),
    }
}

pub async fn relate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RelateRequest>,
) -> Response {
    match state.proxy.relate(&body.current, &body.others).await {
        Ok(related) => Json(RelatedResponse { related }).into_response(),
        Err(e) => failure("find related notes", e),
    }
}
