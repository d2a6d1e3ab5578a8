use std::collections::HashMap;

use url::Url;

use super::SupabaseClient;
use crate::error::{AppError, AppResult};
use crate::models::{AuthChangeEvent, Session};

impl SupabaseClient {
    /// Pick up a session handed back on an OAuth or magic-link redirect.
    ///
    /// Parameters are read from the URL fragment, or from the query when the
    /// fragment is empty. The session becomes current and is announced as
    /// `SignedIn`, or `PasswordRecovery` for recovery links.
    pub async fn get_session_from_url(&self, redirect_url: &str) -> AppResult<Session> {
        if !self.options().detect_session_in_url {
            return Err(AppError::Validation(
                "Session detection from URL is disabled".to_string(),
            ));
        }

        let url = Url::parse(redirect_url)
            .map_err(|e| AppError::Validation(format!("Invalid redirect URL: {}", e)))?;
        let params = redirect_params(&url);

        if let Some(description) = params.get("error_description") {
            return Err(AppError::Auth {
                status: 400,
                code: params
                    .get("error_code")
                    .or_else(|| params.get("error"))
                    .cloned(),
                message: description.clone(),
            });
        }

        let (Some(access_token), Some(refresh_token), Some(expires_in), Some(token_type)) = (
            params.get("access_token"),
            params.get("refresh_token"),
            params.get("expires_in"),
            params.get("token_type"),
        ) else {
            return Err(AppError::Validation("No session defined in URL".to_string()));
        };

        let expires_in = expires_in
            .parse::<i64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| AppError::Validation(format!("Invalid expires_in: {}", expires_in)))?;
        let expires_at = params.get("expires_at").and_then(|v| v.parse::<i64>().ok());

        let user = self.get_user(access_token).await?;

        let session = Session {
            access_token: access_token.clone(),
            token_type: token_type.clone(),
            expires_in,
            expires_at,
            refresh_token: refresh_token.clone(),
            user,
        };

        let event = match params.get("type").map(String::as_str) {
            Some("recovery") => AuthChangeEvent::PasswordRecovery,
            _ => AuthChangeEvent::SignedIn,
        };

        let session = self.commit_session(session, event).await;
        tracing::info!(user_id = %session.user.id, event = ?event, "Session detected in URL");
        Ok(session)
    }
}

fn redirect_params(url: &Url) -> HashMap<String, String> {
    match url.fragment().filter(|f| !f.is_empty()) {
        Some(fragment) => url::form_urlencoded::parse(fragment.as_bytes())
            .into_owned()
            .collect(),
        None => url.query_pairs().into_owned().collect(),
    }
}
