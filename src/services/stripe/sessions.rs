use serde::Serialize;

use super::StripeClient;
use crate::error::AppResult;

pub const CHECKOUT_SESSION_ENDPOINT: &str = "/api/create-checkout-session";
pub const PORTAL_SESSION_ENDPOINT: &str = "/api/create-portal-session";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutSessionRequest {
    pub price_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePortalSessionRequest {
    pub customer_id: String,
}

impl StripeClient {
    /// Ask the backend for a checkout session. The reply is returned as-is.
    pub async fn create_checkout_session(
        &self,
        price_id: &str,
        customer_id: Option<&str>,
    ) -> AppResult<serde_json::Value> {
        let request = CreateCheckoutSessionRequest {
            price_id: price_id.to_string(),
            customer_id: customer_id.map(str::to_string),
        };

        self.post_json(
            CHECKOUT_SESSION_ENDPOINT,
            &request,
            "Failed to create checkout session",
        )
        .await
    }

    /// Ask the backend for a customer portal session. The reply is returned as-is.
    pub async fn create_portal_session(&self, customer_id: &str) -> AppResult<serde_json::Value> {
        let request = CreatePortalSessionRequest {
            customer_id: customer_id.to_string(),
        };

        self.post_json(
            PORTAL_SESSION_ENDPOINT,
            &request,
            "Failed to create portal session",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StripeConfig;
    use crate::error::AppError;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, key: Option<&str>) -> StripeClient {
        StripeClient::new(&StripeConfig {
            publishable_key: key.map(str::to_string),
            api_base_url: server.uri(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_checkout_session_returns_body_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHECKOUT_SESSION_ENDPOINT))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"priceId": "price_123", "customerId": "cus_456"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"url": "https://pay.example/abc"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let session = client(&server, Some("pk_test_51HxYzAbCdEfGhIjKl"))
            .create_checkout_session("price_123", Some("cus_456"))
            .await
            .unwrap();

        assert_eq!(session, json!({"url": "https://pay.example/abc"}));
    }

    #[tokio::test]
    async fn test_checkout_session_omits_missing_customer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHECKOUT_SESSION_ENDPOINT))
            .and(body_json(json!({"priceId": "price_123"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "cs_test_1"})))
            .expect(1)
            .mount(&server)
            .await;

        let session = client(&server, Some("pk_test_51HxYzAbCdEfGhIjKl"))
            .create_checkout_session("price_123", None)
            .await
            .unwrap();

        assert_eq!(session["id"], "cs_test_1");
    }

    #[tokio::test]
    async fn test_checkout_session_non_success_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHECKOUT_SESSION_ENDPOINT))
            .respond_with(ResponseTemplate::new(500).set_body_string("stripe down"))
            .mount(&server)
            .await;

        let result = client(&server, Some("pk_test_51HxYzAbCdEfGhIjKl"))
            .create_checkout_session("price_123", None)
            .await;

        match result {
            Err(AppError::Payment(msg)) => assert_eq!(msg, "Failed to create checkout session"),
            other => panic!("expected payment error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_requests_still_sent_without_publishable_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PORTAL_SESSION_ENDPOINT))
            .and(body_json(json!({"customerId": "cus_456"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"url": "https://billing.example/p/session"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, None);
        assert!(client.handle().is_none());

        let session = client.create_portal_session("cus_456").await.unwrap();
        assert_eq!(session["url"], "https://billing.example/p/session");
    }

    #[tokio::test]
    async fn test_portal_session_non_success_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PORTAL_SESSION_ENDPOINT))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server, None)
            .create_portal_session("cus_456")
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Payment error: Failed to create portal session");
    }

    #[tokio::test]
    async fn test_unparsable_body_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PORTAL_SESSION_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = client(&server, None).create_portal_session("cus_456").await;
        assert!(matches!(result, Err(AppError::Payment(_))));
    }

    #[tokio::test]
    async fn test_unreachable_backend_fails() {
        let client = StripeClient::new(&StripeConfig {
            publishable_key: None,
            api_base_url: "http://127.0.0.1:1".to_string(),
        })
        .unwrap();

        let result = client.create_checkout_session("price_123", None).await;
        assert!(matches!(result, Err(AppError::Payment(_))));
    }
}
