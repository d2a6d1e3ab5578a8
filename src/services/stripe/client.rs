use std::sync::OnceLock;

use reqwest::Client;
use serde::Serialize;
use url::Url;

use super::StripeHandle;
use crate::config::StripeConfig;
use crate::error::{AppError, AppResult};

/// Payment client: an optional publishable-key handle plus the backend that mints sessions.
///
/// A missing publishable key does not disable the session calls; they still
/// reach the backend; only `handle()` comes back empty.
pub struct StripeClient {
    http_client: Client,
    api_base_url: Url,
    publishable_key: Option<String>,
    handle: OnceLock<Option<StripeHandle>>,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> AppResult<Self> {
        if config.publishable_key.is_none() {
            tracing::warn!("Stripe publishable key not found. Payment features will be disabled.");
        }

        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        let api_base_url = Url::parse(&config.api_base_url).map_err(|e| {
            AppError::Config(format!(
                "Invalid payment API URL '{}': {}",
                config.api_base_url, e
            ))
        })?;

        Ok(Self {
            http_client,
            api_base_url,
            publishable_key: config.publishable_key.clone(),
            handle: OnceLock::new(),
        })
    }

    /// The payment handle, created on first access.
    pub fn handle(&self) -> Option<&StripeHandle> {
        self.handle
            .get_or_init(|| {
                let key = self.publishable_key.as_deref()?;
                match StripeHandle::new(key) {
                    Ok(handle) => {
                        tracing::debug!(mode = ?handle.mode(), "Stripe handle initialized");
                        Some(handle)
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Stripe publishable key rejected");
                        None
                    }
                }
            })
            .as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.handle().is_some()
    }

    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    /// POST `body` to `endpoint` and hand back the JSON reply untouched.
    ///
    /// Every failure collapses to `AppError::Payment(failure_message)`.
    pub(super) async fn post_json<B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
        failure_message: &str,
    ) -> AppResult<serde_json::Value> {
        let url = self
            .api_base_url
            .join(endpoint)
            .map_err(|e| AppError::Internal(format!("Invalid endpoint {}: {}", endpoint, e)))?;

        let response = match self.http_client.post(url).json(body).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(endpoint = %endpoint, error = %e, "Payment backend unreachable");
                return Err(AppError::Payment(failure_message.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::error!(endpoint = %endpoint, status = %status, "Payment backend rejected request");
            return Err(AppError::Payment(failure_message.to_string()));
        }

        response.json::<serde_json::Value>().await.map_err(|e| {
            tracing::error!(endpoint = %endpoint, error = %e, "Failed to parse payment backend response");
            AppError::Payment(failure_message.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    fn config(key: Option<&str>) -> StripeConfig {
        StripeConfig {
            publishable_key: key.map(str::to_string),
            api_base_url: "http://localhost:3000".to_string(),
        }
    }

    #[test]
    fn test_missing_key_warns_and_disables_handle() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();

        let client =
            tracing::subscriber::with_default(subscriber, || StripeClient::new(&config(None)))
                .unwrap();

        assert!(client.handle().is_none());
        assert!(!client.is_enabled());

        let output = logs.contents();
        assert!(output.contains("WARN"));
        assert!(output.contains("Stripe publishable key not found"));
    }

    #[test]
    fn test_handle_initialized_once() {
        let client = StripeClient::new(&config(Some("pk_test_51HxYzAbCdEfGhIjKl"))).unwrap();

        let first = client.handle().unwrap() as *const StripeHandle;
        let second = client.handle().unwrap() as *const StripeHandle;
        assert_eq!(first, second);
        assert!(client.is_enabled());
    }

    #[test]
    fn test_invalid_key_leaves_handle_absent() {
        let client = StripeClient::new(&config(Some("sk_live_51HxYzAbCdEfGhIjKl"))).unwrap();
        assert!(client.handle().is_none());
    }

    #[test]
    fn test_invalid_api_base_url() {
        let mut config = config(None);
        config.api_base_url = "not a url".to_string();
        assert!(matches!(StripeClient::new(&config), Err(AppError::Config(_))));
    }
}
