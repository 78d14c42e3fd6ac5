//! AI gateway client used by the state container.
//!
//! Talks to the proxy endpoints rather than the model, so the model key never
//! leaves the proxy.

use crate::config::AiConfig;
use crate::error::{NotesError, Result};
use crate::models::{
    ContentRequest, ErrorResponse, ImproveResponse, OtherNote, RelateRequest, RelatedNote,
    RelatedResponse, Suggestion, SuggestionsResponse, SummaryResponse, TagsResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

pub trait AiService: Send + Sync + 'static {
    fn summarize(&self, content: &str) -> impl Future<Output = Result<String>> + Send;

    /// Tags for a note; the title, when present, is sent ahead of the content.
    fn suggest_tags(
        &self,
        content: &str,
        title: &str,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn improve(&self, content: &str) -> impl Future<Output = Result<String>> + Send;

    fn suggestions(&self, content: &str) -> impl Future<Output = Result<Vec<Suggestion>>> + Send;

    fn related(
        &self,
        current: &str,
        others: &[OtherNote],
    ) -> impl Future<Output = Result<Vec<RelatedNote>>> + Send;
}

pub struct HttpAiService {
    client: reqwest::Client,
    base_url: String,
    enabled: bool,
}

impl HttpAiService {
    /// `base_url` points at the server hosting the `/api/ai/*` routes.
    pub fn new(base_url: impl Into<String>, ai: &AiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            enabled: ai.is_configured(),
        }
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        if !self.enabled {
            return Err(NotesError::NotConfigured { service: "AI" });
        }

        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorResponse>()
                .await
                .map(|e| e.error)
                .unwrap_or_default();
            return Err(NotesError::Upstream(format!("{} - {}", status, detail)));
        }
        Ok(response.json().await?)
    }
}

impl AiService for HttpAiService {
    async fn summarize(&self, content: &str) -> Result<String> {
        if content.trim().is_empty() {
            return Ok(String::new());
        }
        let body = ContentRequest {
            content: content.to_string(),
        };
        let reply: SummaryResponse = self.post("/api/ai/summarize", &body).await?;
        Ok(reply.summary)
    }

    async fn suggest_tags(&self, content: &str, title: &str) -> Result<Vec<String>> {
        if content.trim().is_empty() && title.trim().is_empty() {
            return Ok(Vec::new());
        }
        let full = if title.is_empty() {
            content.to_string()
        } else {
            format!("{}\n\n{}", title, content)
        };
        let reply: TagsResponse = self
            .post("/api/ai/tags", &ContentRequest { content: full })
            .await?;
        Ok(reply.tags)
    }

    async fn improve(&self, content: &str) -> Result<String> {
        if content.trim().is_empty() {
            return Ok(content.to_string());
        }
        let body = ContentRequest {
            content: content.to_string(),
        };
        let reply: ImproveResponse = self.post("/api/ai/improve", &body).await?;
        if reply.improved.is_empty() {
            return Ok(content.to_string());
        }
        Ok(reply.improved)
    }

    async fn suggestions(&self, content: &str) -> Result<Vec<Suggestion>> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let body = ContentRequest {
            content: content.to_string(),
        };
        let reply: SuggestionsResponse = self.post("/api/ai/suggestions", &body).await?;
        Ok(reply.suggestions)
    }

    async fn related(&self, current: &str, others: &[OtherNote]) -> Result<Vec<RelatedNote>> {
        if current.is_empty() || others.is_empty() {
            return Ok(Vec::new());
        }
        let body = RelateRequest {
            current: current.to_string(),
            others: others.to_vec(),
        };
        let reply: RelatedResponse = self.post("/api/ai/relate", &body).await?;
        Ok(reply.related)
    }
}
