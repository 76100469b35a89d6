//! Credentials, lifecycle states and the handshake payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{DocError, DocResult};

/// Client lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClientState {
    /// No successful handshake yet.
    #[default]
    Uninitialized,
    /// A handshake is in progress.
    Handshaking,
    /// Uploads are accepted.
    Ready,
    /// Shut down; no further requests.
    Closed,
}

impl ClientState {
    /// Lowercase name, used in `NotReady` errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// API credentials. Loading them from the environment is left to the host.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    /// Sent as `X-API-KEY`.
    pub api_key: String,
    /// Sent as `X-API-SECRET`.
    pub api_secret: String,
    /// Project (or model) cuid, sent as `X-PROJECT-CUID`.
    pub project: String,
}

impl Credentials {
    /// Bundle credentials.
    #[must_use]
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            project: project.into(),
        }
    }

    /// Check presence before any network activity.
    ///
    /// # Errors
    ///
    /// - `MissingCredentials` listing every absent key or secret
    /// - `MissingModelId` when no project/model cuid is given
    pub fn check(&self) -> DocResult<()> {
        let mut missing = Vec::new();
        if self.api_key.trim().is_empty() {
            missing.push("api_key".to_string());
        }
        if self.api_secret.trim().is_empty() {
            missing.push("api_secret".to_string());
        }
        if !missing.is_empty() {
            return Err(DocError::MissingCredentials { missing });
        }
        if self.project.trim().is_empty() {
            return Err(DocError::MissingModelId);
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("project", &self.project)
            .finish()
    }
}

/// Project (or model) record returned by the handshake.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Cuid used as `run_cuid` on uploads.
    #[serde(default)]
    pub cuid: Option<String>,
    /// Any other fields the server sends.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of a successful `ping`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct PingResponse {
    /// Project or model record; servers send either key.
    #[serde(default, alias = "model")]
    pub project: Option<ProjectInfo>,
    /// Active documentation template.
    #[serde(default)]
    pub documentation_template: Option<Value>,
    /// Server-side feature flags.
    #[serde(default)]
    pub feature_flags: Map<String, Value>,
    /// Document type of the run.
    #[serde(default)]
    pub document_type: Option<String>,
    /// Error-reporting configuration; stored, not acted on.
    #[serde(default)]
    pub sentry_config: Option<Value>,
}

impl PingResponse {
    /// Parse a handshake body. An empty body is an empty response.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed JSON.
    pub fn parse(body: &str) -> DocResult<Self> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(body)
            .map_err(|e| DocError::serialization(format!("invalid handshake response: {e}")))
    }
}

/// State established by a successful handshake.
#[derive(Debug, Clone)]
pub struct ClientSession {
    /// Credentials the handshake succeeded with.
    pub credentials: Credentials,
    /// `run_cuid` for uploads.
    pub run_cuid: String,
    /// Server-provided configuration.
    pub ping: PingResponse,
}

impl ClientSession {
    /// Session from credentials and the handshake body.
    #[must_use]
    pub fn new(credentials: Credentials, ping: PingResponse) -> Self {
        let run_cuid = ping
            .project
            .as_ref()
            .and_then(|p| p.cuid.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| credentials.project.clone());
        Self {
            credentials,
            run_cuid,
            ping,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_credentials_listed() {
        let err = Credentials::new("", " ", "p").check().unwrap_err();
        match err {
            DocError::MissingCredentials { missing } => {
                assert_eq!(missing, ["api_key", "api_secret"]);
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_missing_model_id() {
        assert!(matches!(
            Credentials::new("k", "s", "").check(),
            Err(DocError::MissingModelId)
        ));
        assert!(Credentials::new("k", "s", "p").check().is_ok());
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let debug = format!("{:?}", Credentials::new("key123", "secret456", "p"));
        assert!(!debug.contains("key123"));
        assert!(!debug.contains("secret456"));
    }

    #[test]
    fn test_ping_accepts_model_alias() {
        let ping = PingResponse::parse(r#"{"model":{"name":"m","cuid":"p"}}"#).unwrap();
        let project = ping.project.unwrap();
        assert_eq!(project.name.as_deref(), Some("m"));
        assert_eq!(project.cuid.as_deref(), Some("p"));
    }

    #[test]
    fn test_ping_full_payload() {
        let body = json!({
            "project": {"name": "Credit", "cuid": "c1", "owner": "risk"},
            "documentation_template": {"sections": []},
            "feature_flags": {"log_figures_async": true},
            "document_type": "model_documentation",
            "sentry_config": {"dsn": ""}
        })
        .to_string();
        let ping = PingResponse::parse(&body).unwrap();
        assert_eq!(ping.feature_flags["log_figures_async"], json!(true));
        assert_eq!(ping.document_type.as_deref(), Some("model_documentation"));
        assert_eq!(ping.project.unwrap().extra["owner"], json!("risk"));
    }

    #[test]
    fn test_ping_malformed() {
        assert!(matches!(
            PingResponse::parse("<html>"),
            Err(DocError::Serialization(_))
        ));
        assert_eq!(PingResponse::parse("").unwrap(), PingResponse::default());
    }

    #[test]
    fn test_run_cuid_fallback() {
        let creds = Credentials::new("k", "s", "fallback");
        assert_eq!(ClientSession::new(creds.clone(), PingResponse::default()).run_cuid, "fallback");
        let ping = PingResponse::parse(r#"{"project":{"cuid":"server"}}"#).unwrap();
        assert_eq!(ClientSession::new(creds, ping).run_cuid, "server");
    }

    #[test]
    fn test_state_names() {
        assert_eq!(ClientState::default(), ClientState::Uninitialized);
        assert_eq!(ClientState::Closed.to_string(), "closed");
    }
}
