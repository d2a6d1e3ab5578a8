use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

use super::events::AuthBroadcaster;
use super::storage::{FileStorage, SessionStorage};
use crate::config::SupabaseConfig;
use crate::error::{AppError, AppResult};
use crate::models::{AuthChangeEvent, Session};

const AUTH_PATH: &str = "auth/v1/";
const CLIENT_INFO: &str = concat!("app-services/", env!("CARGO_PKG_VERSION"));

/// Auth behaviour fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthOptions {
    pub auto_refresh_token: bool,
    pub persist_session: bool,
    pub detect_session_in_url: bool,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            auto_refresh_token: true,
            persist_session: true,
            detect_session_in_url: true,
        }
    }
}

/// Client for the Supabase auth API.
///
/// Cloning is cheap; clones share the current session, storage and subscribers.
#[derive(Clone)]
pub struct SupabaseClient {
    http_client: Client,
    base_url: Url,
    auth_url: Url,
    anon_key: String,
    options: AuthOptions,
    storage: Option<Arc<dyn SessionStorage>>,
    storage_key: String,
    session: Arc<RwLock<Option<Session>>>,
    // Keeps the in-memory session and its persisted copy changing together.
    persist_lock: Arc<tokio::sync::Mutex<()>>,
    pub(super) refresh_lock: Arc<tokio::sync::Mutex<()>>,
    pub(super) events: AuthBroadcaster,
}

impl SupabaseClient {
    /// Application client: default options, session persisted under `config.session_dir`.
    pub fn new(config: &SupabaseConfig) -> AppResult<Self> {
        Self::with_options(
            &config.url,
            &config.anon_key,
            AuthOptions::default(),
            Arc::new(FileStorage::new(&config.session_dir)),
        )
    }

    /// `storage` is only consulted when `options.persist_session` is set.
    pub fn with_options(
        url: &str,
        anon_key: &str,
        options: AuthOptions,
        storage: Arc<dyn SessionStorage>,
    ) -> AppResult<Self> {
        if url.trim().is_empty() || anon_key.trim().is_empty() {
            return Err(AppError::Config(
                "Missing Supabase environment variables".to_string(),
            ));
        }

        let mut base_url = Url::parse(url.trim())
            .map_err(|e| AppError::Config(format!("Invalid Supabase URL '{}': {}", url, e)))?;

        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "Supabase URL must be http(s): {}",
                url
            )));
        }

        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let auth_url = base_url
            .join(AUTH_PATH)
            .map_err(|e| AppError::Config(format!("Invalid Supabase URL '{}': {}", url, e)))?;

        let storage_key = storage_key_for(&base_url);

        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        tracing::debug!(
            url = %base_url,
            auto_refresh_token = options.auto_refresh_token,
            persist_session = options.persist_session,
            detect_session_in_url = options.detect_session_in_url,
            "Supabase client created"
        );

        Ok(Self {
            http_client,
            base_url,
            auth_url,
            anon_key: anon_key.trim().to_string(),
            options,
            storage: options.persist_session.then_some(storage),
            storage_key,
            session: Arc::new(RwLock::new(None)),
            persist_lock: Arc::new(tokio::sync::Mutex::new(())),
            refresh_lock: Arc::new(tokio::sync::Mutex::new(())),
            events: AuthBroadcaster::new(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.base_url
    }

    pub fn options(&self) -> AuthOptions {
        self.options
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// The session held in memory, if any. Never touches the network.
    pub fn get_session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    pub(super) fn auth_endpoint(&self, path: &str) -> AppResult<Url> {
        self.auth_url
            .join(path)
            .map_err(|e| AppError::Internal(format!("Invalid auth endpoint {}: {}", path, e)))
    }

    pub(super) async fn save_session(&self, session: &Session) {
        let _guard = self.persist_lock.lock().await;
        *self.session.write() = Some(session.clone());

        if let Some(storage) = &self.storage {
            let result = match serde_json::to_string(session) {
                Ok(serialized) => storage.set_item(&self.storage_key, &serialized).await,
                Err(e) => Err(e.into()),
            };

            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to persist session; keeping it in memory only");
            }
        }
    }

    pub(super) async fn remove_session(&self) {
        self.remove_session_if(|_| true).await;
    }

    /// Forget the session only if `is_stale` holds for the one current now.
    ///
    /// Returns whether anything was removed.
    pub(super) async fn remove_session_if<F>(&self, is_stale: F) -> bool
    where
        F: FnOnce(Option<&Session>) -> bool,
    {
        let _guard = self.persist_lock.lock().await;

        {
            let mut current = self.session.write();
            if !is_stale(current.as_ref()) {
                return false;
            }
            *current = None;
        }

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.remove_item(&self.storage_key).await {
                tracing::warn!(error = %e, "Failed to remove persisted session");
            }
        }
        true
    }

    /// Store `session` as current and tell subscribers.
    pub(super) async fn commit_session(&self, session: Session, event: AuthChangeEvent) -> Session {
        let session = session.with_expiry_from(Utc::now());
        self.save_session(&session).await;
        self.events.emit(event, Some(session.clone()));
        session
    }

    pub(super) async fn load_persisted_session(&self) -> Option<Session> {
        let storage = self.storage.as_ref()?;

        let raw = match storage.get_item(&self.storage_key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read persisted session");
                return None;
            }
        };

        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable persisted session");
                if let Err(e) = storage.remove_item(&self.storage_key).await {
                    tracing::warn!(error = %e, "Failed to remove persisted session");
                }
                None
            }
        }
    }

    pub(super) async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        access_token: Option<&str>,
    ) -> AppResult<T> {
        let request = self.http_client.get(url);
        let body = self.send(request, access_token).await?;
        Self::parse(&body)
    }

    pub(super) async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        url: Url,
        access_token: Option<&str>,
        body: &B,
    ) -> AppResult<T> {
        let request = self.http_client.post(url).json(body);
        let body = self.send(request, access_token).await?;
        Self::parse(&body)
    }

    pub(super) async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        url: Url,
        access_token: Option<&str>,
        body: &B,
    ) -> AppResult<T> {
        let request = self.http_client.put(url).json(body);
        let body = self.send(request, access_token).await?;
        Self::parse(&body)
    }

    /// POST whose success reply carries no body worth reading.
    pub(super) async fn post_no_content(
        &self,
        url: Url,
        access_token: Option<&str>,
    ) -> AppResult<()> {
        let request = self.http_client.post(url);
        self.send(request, access_token).await.map(|_| ())
    }

    async fn send(&self, request: RequestBuilder, access_token: Option<&str>) -> AppResult<String> {
        let response = request
            .header("apikey", &self.anon_key)
            .header("X-Client-Info", CLIENT_INFO)
            .bearer_auth(access_token.unwrap_or(&self.anon_key))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            Ok(body)
        } else {
            let error = auth_api_error(status.as_u16(), &body);
            tracing::debug!(status = %status, error = %error, "Auth API error");
            Err(error)
        }
    }

    fn parse<T: DeserializeOwned>(body: &str) -> AppResult<T> {
        serde_json::from_str(body).map_err(|e| {
            tracing::error!("Failed to parse auth response: {} ({} bytes)", e, body.len());
            AppError::Serialization(e)
        })
    }
}

/// `sb-<project ref>-auth-token`, the project ref being the first host label.
fn storage_key_for(url: &Url) -> String {
    let project_ref = url
        .host_str()
        .and_then(|host| host.split('.').next())
        .filter(|label| !label.is_empty())
        .unwrap_or("local");

    format!("sb-{}-auth-token", project_ref)
}

#[derive(Debug, Default, Deserialize)]
struct AuthApiErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    error_code: Option<String>,
}

fn auth_api_error(status: u16, body: &str) -> AppError {
    let parsed = serde_json::from_str::<AuthApiErrorBody>(body).unwrap_or_default();

    let code = parsed.error_code.or_else(|| parsed.error.clone());
    let message = parsed
        .msg
        .or(parsed.error_description)
        .or(parsed.message)
        .or(parsed.error)
        .unwrap_or_else(|| {
            reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Auth API error")
                .to_string()
        });

    AppError::Auth {
        status,
        code,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::supabase::MemoryStorage;

    fn client(url: &str, anon_key: &str) -> AppResult<SupabaseClient> {
        SupabaseClient::with_options(
            url,
            anon_key,
            AuthOptions::default(),
            Arc::new(MemoryStorage::new()),
        )
    }

    #[test]
    fn test_missing_config_fails_construction() {
        assert!(matches!(client("", "anon"), Err(AppError::Config(_))));
        assert!(matches!(
            client("https://abcdefgh.supabase.co", "  "),
            Err(AppError::Config(_))
        ));
        assert!(matches!(client("not a url", "anon"), Err(AppError::Config(_))));
        assert!(matches!(
            client("ftp://abcdefgh.supabase.co", "anon"),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_auth_endpoints_and_storage_key() {
        let client = client("https://abcdefgh.supabase.co", "anon").unwrap();
        assert_eq!(client.storage_key(), "sb-abcdefgh-auth-token");
        assert_eq!(
            client.auth_endpoint("token?grant_type=password").unwrap().as_str(),
            "https://abcdefgh.supabase.co/auth/v1/token?grant_type=password"
        );
        assert_eq!(client.options(), AuthOptions::default());
        assert!(client.get_session().is_none());
    }

    #[test]
    fn test_base_path_is_kept() {
        let client = client("http://localhost:54321/project", "anon").unwrap();
        assert_eq!(
            client.auth_endpoint("user").unwrap().as_str(),
            "http://localhost:54321/project/auth/v1/user"
        );
        assert_eq!(client.storage_key(), "sb-localhost-auth-token");
    }

    #[test]
    fn test_auth_api_error_shapes() {
        let err = auth_api_error(
            400,
            r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#,
        );
        match err {
            AppError::Auth { status, code, message } => {
                assert_eq!(status, 400);
                assert_eq!(code.as_deref(), Some("invalid_credentials"));
                assert_eq!(message, "Invalid login credentials");
            }
            other => panic!("unexpected error {:?}", other),
        }

        let err = auth_api_error(
            400,
            r#"{"error":"invalid_grant","error_description":"Refresh Token Not Found"}"#,
        );
        match err {
            AppError::Auth { code, message, .. } => {
                assert_eq!(code.as_deref(), Some("invalid_grant"));
                assert_eq!(message, "Refresh Token Not Found");
            }
            other => panic!("unexpected error {:?}", other),
        }

        let err = auth_api_error(502, "<html>bad gateway</html>");
        match err {
            AppError::Auth { status, code, message } => {
                assert_eq!(status, 502);
                assert!(code.is_none());
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
