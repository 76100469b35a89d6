//! Documentation service client.
//!
//! [`ApiClient`] is an explicit, cloneable handle over one shared session.
//! Its lifecycle is `Uninitialized -> Handshaking -> Ready -> Closed`, with
//! `Ready -> Handshaking` on [`ApiClient::reload`]:
//!
//! - `init` checks credentials before touching the network, then performs
//!   the `ping` handshake and stores the server-provided configuration.
//! - `send` is accepted only while `Ready`. Requests share one pooled HTTP
//!   client created on first use; a semaphore bounds in-flight requests and
//!   callers beyond the bound wait for a permit.
//! - `shutdown` is idempotent and also runs when the last handle drops.
//!
//! Non-2xx responses surface as `Server` errors whose message is the
//! response body, unchanged. Nothing is retried automatically.

pub mod session;
pub mod uploader;

pub use session::{ClientSession, ClientState, Credentials, PingResponse, ProjectInfo};
pub use uploader::{ResultUploader, UploadOutcome};

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::config::ApiConfig;
use crate::error::{DocError, DocResult};
use crate::result::{
    to_json, Figure, MetadataRecord, MetricRecord, NumberMode, TestResult, ThresholdTestRecord,
    UploadBatch,
};

/// `log_metadata` endpoint.
pub const LOG_METADATA: &str = "log_metadata";
/// `log_metrics` endpoint.
pub const LOG_METRICS: &str = "log_metrics";
/// `log_test_results` endpoint.
pub const LOG_TEST_RESULTS: &str = "log_test_results";
/// `log_figure` endpoint.
pub const LOG_FIGURE: &str = "log_figure";

const USER_AGENT: &str = concat!("modeldoc/", env!("CARGO_PKG_VERSION"));

static CONNECTED_NOTICE: AtomicBool = AtomicBool::new(false);

/// Request body.
#[derive(Debug)]
enum Body {
    Json(Value),
    Multipart(Form),
}

/// Headers and run id captured for one request.
struct RequestAuth {
    credentials: Credentials,
    run_cuid: String,
}

#[derive(Debug, Default)]
struct Lifecycle {
    state: ClientState,
    session: Option<ClientSession>,
}

#[derive(Debug)]
struct Inner {
    config: ApiConfig,
    lifecycle: RwLock<Lifecycle>,
    http: Mutex<Option<Client>>,
    sessions_opened: AtomicUsize,
    in_flight: Semaphore,
}

impl Inner {
    fn close(&self) -> bool {
        let mut lifecycle = self.lifecycle.write().unwrap_or_else(PoisonError::into_inner);
        if lifecycle.state == ClientState::Closed {
            return false;
        }
        lifecycle.state = ClientState::Closed;
        drop(lifecycle);
        self.in_flight.close();
        let closed_session = self
            .http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        tracing::debug!(closed_session, "api client shut down");
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Handle to the documentation service.
#[derive(Debug, Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    /// Client for `config`; no network activity until [`Self::init`].
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        let permits = config.max_in_flight.max(1);
        Self {
            inner: Arc::new(Inner {
                config,
                lifecycle: RwLock::new(Lifecycle::default()),
                http: Mutex::new(None),
                sessions_opened: AtomicUsize::new(0),
                in_flight: Semaphore::new(permits),
            }),
        }
    }

    /// Connection settings.
    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.read().state
    }

    /// Number of HTTP sessions opened so far; stays at one across sends.
    #[must_use]
    pub fn sessions_opened(&self) -> usize {
        self.inner.sessions_opened.load(Ordering::Relaxed)
    }

    /// Handshake with the service and enter `Ready`.
    ///
    /// # Errors
    ///
    /// - `MissingCredentials` / `MissingModelId` before any request
    /// - `NotReady` if the client is closed or mid-handshake
    /// - `Transport` on network failure or handshake timeout
    /// - `Server` with the response body verbatim on a non-2xx reply
    pub async fn init(&self, credentials: Credentials) -> DocResult<()> {
        credentials.check()?;
        let previous = self.begin_handshake(false)?;
        match self.handshake(&credentials).await {
            Ok(ping) => {
                let session = ClientSession::new(credentials, ping);
                self.finish_handshake(session);
                Ok(())
            }
            Err(e) => {
                self.abort_handshake(previous);
                Err(e)
            }
        }
    }

    /// Repeat the handshake with the stored credentials and refresh the
    /// server-provided configuration.
    ///
    /// On failure the previous session stays in effect.
    ///
    /// # Errors
    ///
    /// `NotReady` unless `Ready`; otherwise as [`Self::init`].
    pub async fn reload(&self) -> DocResult<()> {
        let previous = self.begin_handshake(true)?;
        let credentials = self
            .read()
            .session
            .as_ref()
            .map(|s| s.credentials.clone())
            .unwrap_or_default();
        match self.handshake(&credentials).await {
            Ok(ping) => {
                self.finish_handshake(ClientSession::new(credentials, ping));
                Ok(())
            }
            Err(e) => {
                self.abort_handshake(previous);
                Err(e)
            }
        }
    }

    /// Close the session. Returns `false` if it was already closed.
    pub fn shutdown(&self) -> bool {
        self.inner.close()
    }

    /// Server feature flags from the last handshake.
    #[must_use]
    pub fn feature_flags(&self) -> Map<String, Value> {
        self.with_session(|s| s.ping.feature_flags.clone())
            .unwrap_or_default()
    }

    /// Whether a server feature flag is set to `true`.
    #[must_use]
    pub fn feature_enabled(&self, flag: &str) -> bool {
        self.with_session(|s| s.ping.feature_flags.get(flag) == Some(&Value::Bool(true)))
            .unwrap_or(false)
    }

    /// Document type from the last handshake.
    #[must_use]
    pub fn document_type(&self) -> Option<String> {
        self.with_session(|s| s.ping.document_type.clone()).flatten()
    }

    /// Active documentation template from the last handshake.
    #[must_use]
    pub fn documentation_template(&self) -> Option<Value> {
        self.with_session(|s| s.ping.documentation_template.clone())
            .flatten()
    }

    /// Project (or model) record from the last handshake.
    #[must_use]
    pub fn project(&self) -> Option<ProjectInfo> {
        self.with_session(|s| s.ping.project.clone()).flatten()
    }

    /// `run_cuid` attached to uploads.
    #[must_use]
    pub fn run_cuid(&self) -> Option<String> {
        self.with_session(|s| s.run_cuid.clone())
    }

    /// Numeric encoding mode for uploads.
    #[must_use]
    pub fn number_mode(&self) -> NumberMode {
        self.inner.config.number_mode()
    }

    /// POST a JSON payload to `endpoint`.
    ///
    /// # Errors
    ///
    /// - `NotReady` (no request is made) unless `Ready`
    /// - `Serialization` if `payload` cannot be represented as JSON, which
    ///   in strict number mode includes any NaN or infinity
    /// - `Transport` on network failure or timeout
    /// - `Server` with the response body verbatim on a non-2xx reply
    pub async fn send<T: Serialize + ?Sized>(&self, endpoint: &str, payload: &T) -> DocResult<Value> {
        self.send_with_query(endpoint, &[], payload).await
    }

    /// POST a JSON payload with extra query parameters.
    ///
    /// # Errors
    ///
    /// Same as [`Self::send`].
    pub async fn send_with_query<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
        payload: &T,
    ) -> DocResult<Value> {
        self.ready_auth()?;
        let body = to_json(payload, self.number_mode()).map_err(|e| match e {
            DocError::Serialization(detail) => {
                DocError::serialization(format!("payload for '{endpoint}': {detail}"))
            }
            other => other,
        })?;
        self.post(endpoint, query, Body::Json(body)).await
    }

    /// Log a metadata record.
    ///
    /// # Errors
    ///
    /// Same as [`Self::send`].
    pub async fn log_metadata(&self, record: &MetadataRecord) -> DocResult<Value> {
        self.send(LOG_METADATA, record).await
    }

    /// Log metric records as one JSON array.
    ///
    /// # Errors
    ///
    /// Same as [`Self::send`].
    pub async fn log_metrics(&self, records: &[MetricRecord]) -> DocResult<Value> {
        self.send(LOG_METRICS, records).await
    }

    /// Log a threshold test record, optionally placed in a section.
    ///
    /// # Errors
    ///
    /// Same as [`Self::send`].
    pub async fn log_test_result(
        &self,
        record: &ThresholdTestRecord,
        section_id: Option<&str>,
        position: Option<usize>,
    ) -> DocResult<Value> {
        let mut query = Vec::new();
        if let Some(section_id) = section_id {
            query.push(("section_id", section_id.to_string()));
        }
        if let Some(position) = position {
            query.push(("position", position.to_string()));
        }
        self.send_with_query(LOG_TEST_RESULTS, &query, record).await
    }

    /// Upload a figure as a multipart form.
    ///
    /// # Errors
    ///
    /// Same as [`Self::send`].
    pub async fn log_figure(&self, figure: Figure) -> DocResult<Value> {
        self.ready_auth()?;
        let metadata = figure.metadata_json(self.number_mode())?;
        let file_name = figure.file_name();
        let (key, format, bytes, _) = figure.into_parts();
        let image = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(format.mime_type())
            .map_err(|e| DocError::serialization(format!("figure '{key}': {e}")))?;
        let form = Form::new()
            .text("key", key)
            .text("type", format.as_str())
            .text("metadata", metadata.to_string())
            .part("image", image);
        self.post(LOG_FIGURE, &[], Body::Multipart(form)).await
    }

    /// Send every request of a batch: figures, then the metric or test
    /// record, then metadata. Returns the number of requests made.
    ///
    /// # Errors
    ///
    /// Stops at the first failed request and returns its error.
    pub async fn log_batch(&self, batch: UploadBatch) -> DocResult<usize> {
        let mut sent = 0;
        for figure in batch.figures {
            self.log_figure(figure).await?;
            sent += 1;
        }
        if let Some(metric) = &batch.metric {
            self.log_metrics(std::slice::from_ref(metric)).await?;
            sent += 1;
        }
        if let Some(record) = &batch.test_result {
            self.log_test_result(record, batch.section_id.as_deref(), batch.position)
                .await?;
            sent += 1;
        }
        for record in &batch.metadata {
            self.log_metadata(record).await?;
            sent += 1;
        }
        tracing::debug!(result_id = %batch.result_id, requests = sent, "result uploaded");
        Ok(sent)
    }

    /// Convert and upload one test result.
    ///
    /// # Errors
    ///
    /// `Serialization` if the result cannot be encoded; otherwise as
    /// [`Self::log_batch`].
    pub async fn log_result(
        &self,
        result: &TestResult,
        section_id: Option<&str>,
        position: Option<usize>,
    ) -> DocResult<usize> {
        let batch = result.to_upload_batch(section_id, position, self.number_mode())?;
        self.log_batch(batch).await
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Lifecycle> {
        self.inner
            .lifecycle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn with_session<R>(&self, f: impl FnOnce(&ClientSession) -> R) -> Option<R> {
        self.read().session.as_ref().map(f)
    }

    fn begin_handshake(&self, reload: bool) -> DocResult<ClientState> {
        let mut lifecycle = self
            .inner
            .lifecycle
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let allowed = match lifecycle.state {
            ClientState::Ready => true,
            ClientState::Uninitialized => !reload,
            ClientState::Handshaking | ClientState::Closed => false,
        };
        if !allowed {
            return Err(DocError::NotReady {
                state: lifecycle.state.to_string(),
            });
        }
        let previous = lifecycle.state;
        lifecycle.state = ClientState::Handshaking;
        Ok(previous)
    }

    fn finish_handshake(&self, session: ClientSession) {
        let mut lifecycle = self
            .inner
            .lifecycle
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if lifecycle.state == ClientState::Closed {
            return;
        }
        let project = session
            .ping
            .project
            .as_ref()
            .and_then(|p| p.name.clone())
            .unwrap_or_else(|| session.run_cuid.clone());
        let document_type = session.ping.document_type.clone().unwrap_or_default();
        lifecycle.state = ClientState::Ready;
        lifecycle.session = Some(session);
        drop(lifecycle);

        if !CONNECTED_NOTICE.swap(true, Ordering::SeqCst) {
            tracing::info!(
                project = %project,
                document_type = %document_type,
                "connected to documentation service: project '{project}'"
            );
        } else {
            tracing::debug!(project = %project, "handshake refreshed");
        }
    }

    fn abort_handshake(&self, previous: ClientState) {
        let mut lifecycle = self
            .inner
            .lifecycle
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if lifecycle.state == ClientState::Handshaking {
            lifecycle.state = previous;
        }
    }

    fn ready_auth(&self) -> DocResult<RequestAuth> {
        let lifecycle = self.read();
        match (&lifecycle.state, &lifecycle.session) {
            (ClientState::Ready, Some(session)) => Ok(RequestAuth {
                credentials: session.credentials.clone(),
                run_cuid: session.run_cuid.clone(),
            }),
            (state, _) => Err(DocError::NotReady {
                state: state.to_string(),
            }),
        }
    }

    fn http(&self) -> DocResult<Client> {
        let mut http = self.inner.http.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = http.as_ref() {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| DocError::transport(format!("failed to create HTTP client: {e}")))?;
        self.inner.sessions_opened.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(host = %self.inner.config.base_url(), "opened HTTP session");
        *http = Some(client.clone());
        Ok(client)
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.inner.config.base_url(),
            endpoint.trim_start_matches('/')
        )
    }

    fn authorize(&self, request: RequestBuilder, credentials: &Credentials) -> RequestBuilder {
        request
            .header("X-API-KEY", &credentials.api_key)
            .header("X-API-SECRET", &credentials.api_secret)
            .header("X-PROJECT-CUID", &credentials.project)
            .header(
                "X-MONITORING",
                if self.inner.config.monitoring { "true" } else { "false" },
            )
    }

    async fn handshake(&self, credentials: &Credentials) -> DocResult<PingResponse> {
        let client = self.http()?;
        let url = self.url("ping");
        tracing::debug!(url = %url, "handshake");
        let timeout = self.inner.config.handshake_timeout();
        let request = self
            .authorize(client.request(Method::GET, &url), credentials)
            .timeout(timeout);
        let body = execute(request, "handshake").await?;
        PingResponse::parse(&body)
    }

    async fn post(&self, endpoint: &str, query: &[(&str, String)], body: Body) -> DocResult<Value> {
        let _permit = self
            .inner
            .in_flight
            .acquire()
            .await
            .map_err(|_| DocError::NotReady {
                state: ClientState::Closed.to_string(),
            })?;
        // Re-read after waiting: the client may have been closed or reloaded.
        let auth = self.ready_auth()?;
        let client = self.http()?;

        let mut params: Vec<(&str, String)> = vec![("run_cuid", auth.run_cuid.clone())];
        params.extend(query.iter().cloned());
        let request = self
            .authorize(client.post(self.url(endpoint)), &auth.credentials)
            .query(&params)
            .timeout(self.inner.config.request_timeout());
        let request = match body {
            Body::Json(value) => request.json(&value),
            Body::Multipart(form) => request.multipart(form),
        };

        let text = execute(request, endpoint).await?;
        tracing::debug!(endpoint, "request succeeded");
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

async fn execute(request: RequestBuilder, context: &str) -> DocResult<String> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(context, &e))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(context, &e))?;
    if status.is_success() {
        Ok(body)
    } else {
        tracing::warn!(context, status = status.as_u16(), "request rejected");
        Err(DocError::Server {
            status: status.as_u16(),
            body,
        })
    }
}

fn transport_error(context: &str, error: &reqwest::Error) -> DocError {
    if error.is_timeout() {
        DocError::transport(format!("{context} timed out"))
    } else {
        DocError::transport(format!("{context} failed: {error}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn client() -> ApiClient {
        ApiClient::new(ApiConfig::new("http://127.0.0.1:9/"))
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        assert_eq!(client().url("/log_metadata"), "http://127.0.0.1:9/log_metadata");
        assert_eq!(client().url("ping"), "http://127.0.0.1:9/ping");
    }

    #[test]
    fn test_user_agent_has_version() {
        assert!(USER_AGENT.starts_with("modeldoc/"));
    }

    #[tokio::test]
    async fn test_send_before_init_is_not_ready() {
        let client = client();
        let err = client.send(LOG_METADATA, &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, DocError::NotReady { ref state } if state == "uninitialized"));
        assert_eq!(client.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn test_init_checks_credentials_first() {
        let client = client();
        let err = client.init(Credentials::new("", "s", "p")).await.unwrap_err();
        assert!(matches!(err, DocError::MissingCredentials { .. }));
        assert_eq!(client.state(), ClientState::Uninitialized);
        assert_eq!(client.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn test_reload_requires_ready() {
        let err = client().reload().await.unwrap_err();
        assert!(matches!(err, DocError::NotReady { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = client();
        let err = client.init(Credentials::new("k", "s", "p")).await.unwrap_err();
        assert!(matches!(err, DocError::Transport(_)));
        assert_eq!(client.state(), ClientState::Uninitialized);
    }

    #[test]
    fn test_shutdown_idempotent() {
        let client = client();
        assert!(client.shutdown());
        assert!(!client.shutdown());
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[tokio::test]
    async fn test_init_after_shutdown_rejected() {
        let client = client();
        client.shutdown();
        let err = client.init(Credentials::new("k", "s", "p")).await.unwrap_err();
        assert!(matches!(err, DocError::NotReady { ref state } if state == "closed"));
    }
}
