//! Runtime configuration read from the environment.
//!
//! Nothing here is required: a server with no variables set still serves
//! local-only notes, and AI or remote calls report that they are unconfigured.

use std::env;
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = ".notes_db";
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// Whether edits are mirrored into the local slot while logged in.
///
/// `Always` matches the historical behavior of the web client. `LoggedOutOnly`
/// keeps one account's notes out of a shared machine's local slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MirrorPolicy {
    #[default]
    Always,
    LoggedOutOnly,
}

impl MirrorPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "always" => Some(MirrorPolicy::Always),
            "logged-out" | "logged_out" | "logged-out-only" => Some(MirrorPolicy::LoggedOutOnly),
            _ => None,
        }
    }

    pub fn mirrors(&self, logged_in: bool) -> bool {
        match self {
            MirrorPolicy::Always => true,
            MirrorPolicy::LoggedOutOnly => !logged_in,
        }
    }
}

/// Model endpoint and key. Both must be present for any AI call to proceed.
#[derive(Debug, Clone, Default)]
pub struct AiConfig {
    pub url: Option<String>,
    pub key: Option<String>,
}

impl AiConfig {
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.url.as_deref(), self.key.as_deref()) {
            (Some(url), Some(key)) => Some((url, key)),
            _ => None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RemoteConfig {
    pub url: Option<String>,
    pub key: Option<String>,
}

impl RemoteConfig {
    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.key.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub db_path: PathBuf,
    pub proxy_url: String,
    pub ai: AiConfig,
    pub remote: RemoteConfig,
    pub mirror: MirrorPolicy,
}

impl Config {
    pub fn from_env() -> Self {
        let bind = var("NOTES_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let proxy_url = var("NOTES_PROXY_URL").unwrap_or_else(|| format!("http://{}", bind));
        let mirror = match var("NOTES_MIRROR_LOCAL") {
            Some(raw) => MirrorPolicy::parse(&raw).unwrap_or_else(|| {
                log::warn!("Unknown NOTES_MIRROR_LOCAL value {:?}, using \"always\"", raw);
                MirrorPolicy::Always
            }),
            None => MirrorPolicy::Always,
        };

        Self {
            db_path: PathBuf::from(var("NOTES_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string())),
            proxy_url,
            bind,
            ai: AiConfig {
                url: var("NOTES_AI_URL"),
                key: var("NOTES_AI_KEY"),
            },
            remote: RemoteConfig {
                url: var("NOTES_REMOTE_URL"),
                key: var("NOTES_REMOTE_KEY"),
            },
            mirror,
        }
    }
}

/// Reads a variable, treating an empty value the same as an unset one.
fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_policy_parse() {
        assert_eq!(MirrorPolicy::parse("always"), Some(MirrorPolicy::Always));
        assert_eq!(MirrorPolicy::parse(" Logged-Out "), Some(MirrorPolicy::LoggedOutOnly));
        assert_eq!(MirrorPolicy::parse("sometimes"), None);
    }

    #[test]
    fn test_mirror_policy_decision() {
        assert!(MirrorPolicy::Always.mirrors(true));
        assert!(MirrorPolicy::Always.mirrors(false));
        assert!(!MirrorPolicy::LoggedOutOnly.mirrors(true));
        assert!(MirrorPolicy::LoggedOutOnly.mirrors(false));
    }

    #[test]
    fn test_ai_config_requires_both_values() {
        let half = AiConfig {
            url: Some("https://model.example/v1".to_string()),
            key: None,
        };
        assert!(!half.is_configured());

        let full = AiConfig {
            key: Some("secret".to_string()),
            ..half
        };
        assert_eq!(full.credentials(), Some(("https://model.example/v1", "secret")));
    }
}
