use serde::Serialize;

use super::events::AuthSubscription;
use super::SupabaseClient;
use crate::error::{AppError, AppResult};
use crate::models::{AuthChangeEvent, AuthResponse, Session, SignUpOptions, User, UserAttributes};

#[derive(Debug, Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct PasswordGrantRequest<'a> {
    email: &'a str,
    password: &'a str,
}

impl SupabaseClient {
    /// Register a new user.
    ///
    /// When the project auto-confirms sign-ups the reply is a full session,
    /// which becomes current and is announced as `SignedIn`. Otherwise only
    /// the pending user comes back.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        options: Option<SignUpOptions>,
    ) -> AppResult<AuthResponse> {
        let options = options.unwrap_or_default();

        let mut url = self.auth_endpoint("signup")?;
        if let Some(redirect_to) = &options.email_redirect_to {
            url.query_pairs_mut().append_pair("redirect_to", redirect_to);
        }

        let request = SignUpRequest {
            email,
            password,
            data: options.data.as_ref(),
        };

        let reply: serde_json::Value = self.post(url, None, &request).await?;

        if reply.get("access_token").is_some() {
            let session: Session = serde_json::from_value(reply)?;
            let session = self.commit_session(session, AuthChangeEvent::SignedIn).await;
            tracing::info!(user_id = %session.user.id, "User signed up");
            Ok(session.into())
        } else {
            let user: User = serde_json::from_value(reply)?;
            tracing::info!(user_id = %user.id, "User signed up, confirmation pending");
            Ok(AuthResponse {
                user: Some(user),
                session: None,
            })
        }
    }

    /// Password sign-in.
    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<AuthResponse> {
        let url = self.auth_endpoint("token?grant_type=password")?;
        let request = PasswordGrantRequest { email, password };

        let session: Session = self.post(url, None, &request).await?;
        let session = self.commit_session(session, AuthChangeEvent::SignedIn).await;

        tracing::info!(user_id = %session.user.id, "User signed in");
        Ok(session.into())
    }

    /// Revoke the current session and forget it locally.
    ///
    /// A server that no longer knows the session (401/403/404) still counts
    /// as signed out. Any other failure leaves the local session in place, as
    /// does a sign-in that lands while the revocation is in flight.
    pub async fn sign_out(&self) -> AppResult<()> {
        let Some(session) = self.get_session() else {
            self.remove_session().await;
            self.events.emit(AuthChangeEvent::SignedOut, None);
            return Ok(());
        };

        let mut url = self.auth_endpoint("logout")?;
        url.query_pairs_mut().append_pair("scope", "global");

        match self.post_no_content(url, Some(&session.access_token)).await {
            Ok(()) => {}
            Err(e) if e.is_session_rejection() => {
                tracing::debug!(error = %e, "Session already gone on the server");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sign-out failed");
                return Err(e);
            }
        }

        let cleared = self
            .remove_session_if(|current| {
                current.is_some_and(|c| c.access_token == session.access_token)
            })
            .await;

        if cleared {
            tracing::info!(user_id = %session.user.id, "User signed out");
            self.events.emit(AuthChangeEvent::SignedOut, None);
        } else {
            tracing::debug!(user_id = %session.user.id, "Session replaced during sign-out; keeping it");
        }
        Ok(())
    }

    /// Change the signed-in user's email, password or metadata.
    ///
    /// The updated user replaces the one held in the current session and is
    /// announced as `UserUpdated`.
    pub async fn update_user(&self, attributes: &UserAttributes) -> AppResult<User> {
        let session = self.get_session().ok_or(AppError::AuthSessionMissing)?;

        let url = self.auth_endpoint("user")?;
        let user: User = self.put(url, Some(&session.access_token), attributes).await?;

        match self.get_session() {
            Some(mut current) if current.access_token == session.access_token => {
                current.user = user.clone();
                self.save_session(&current).await;
                self.events.emit(AuthChangeEvent::UserUpdated, Some(current));
            }
            _ => tracing::debug!(user_id = %user.id, "Session changed during user update"),
        }

        tracing::info!(user_id = %user.id, "User updated");
        Ok(user)
    }

    /// The signed-in user, fetched fresh from the auth API.
    ///
    /// `None` when there is no session or the API no longer accepts it.
    pub async fn get_current_user(&self) -> AppResult<Option<User>> {
        let Some(session) = self.get_session() else {
            return Ok(None);
        };

        match self.get_user(&session.access_token).await {
            Ok(user) => Ok(Some(user)),
            Err(e) if e.is_auth_api_error() => {
                tracing::warn!(error = %e, "Current session rejected by auth API");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Look up the user an access token belongs to.
    pub async fn get_user(&self, access_token: &str) -> AppResult<User> {
        if access_token.is_empty() {
            return Err(AppError::AuthSessionMissing);
        }

        let url = self.auth_endpoint("user")?;
        self.get(url, Some(access_token)).await
    }

    /// Call `callback` with the current user (or `None`) after every auth state change.
    pub fn on_auth_state_change<F>(&self, mut callback: F) -> AuthSubscription
    where
        F: FnMut(Option<User>) + Send + 'static,
    {
        self.on_auth_event(move |_, session| callback(session.map(|s| s.user)))
    }

    /// Call `callback` with every auth event and the session current after it.
    pub fn on_auth_event<F>(&self, callback: F) -> AuthSubscription
    where
        F: FnMut(AuthChangeEvent, Option<Session>) + Send + 'static,
    {
        self.events.subscribe(callback)
    }
}
