use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::SupabaseClient;
use crate::error::{AppError, AppResult};
use crate::models::{AuthChangeEvent, Session};

/// How often the auto-refresh ticker wakes up.
pub const AUTO_REFRESH_TICK: Duration = Duration::from_secs(30);

/// Number of ticks before expiry at which a session is refreshed.
pub const AUTO_REFRESH_TICK_THRESHOLD: u32 = 3;

/// Sessions this close to expiry count as expired when restored.
const EXPIRY_MARGIN_SECS: i64 = AUTO_REFRESH_TICK.as_secs() as i64 * AUTO_REFRESH_TICK_THRESHOLD as i64;

#[derive(Debug, Serialize)]
struct RefreshTokenRequest<'a> {
    refresh_token: &'a str,
}

/// Running auto-refresh ticker. Dropping it stops the ticker.
#[derive(Debug)]
pub struct AutoRefreshHandle {
    task: JoinHandle<()>,
}

impl AutoRefreshHandle {
    pub fn stop(self) {}
}

impl Drop for AutoRefreshHandle {
    fn drop(&mut self) {
        self.task.abort();
        tracing::debug!("Auto refresh stopped");
    }
}

impl SupabaseClient {
    /// Restore the persisted session, if any.
    ///
    /// A session that is expired, or about to be, is refreshed when auto
    /// refresh is on and dropped otherwise. A refresh that fails for
    /// transport reasons keeps the stored session so a later tick can retry.
    pub async fn initialize(&self) -> AppResult<Option<Session>> {
        let Some(stored) = self.load_persisted_session().await else {
            return Ok(self.get_session());
        };

        if !stored.expires_within(EXPIRY_MARGIN_SECS) {
            self.save_session(&stored).await;
            self.events.emit(AuthChangeEvent::SignedIn, Some(stored.clone()));
            tracing::info!(user_id = %stored.user.id, "Session restored");
            return Ok(Some(stored));
        }

        if !self.options().auto_refresh_token {
            tracing::info!("Persisted session expired; discarding");
            self.remove_session().await;
            return Ok(None);
        }

        match self.refresh_with(&stored.refresh_token).await {
            Ok(session) => Ok(Some(session)),
            Err(e) if e.is_auth_api_error() => {
                tracing::info!(error = %e, "Persisted session could not be refreshed");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Refresh failed; keeping persisted session for retry");
                self.save_session(&stored).await;
                Ok(Some(stored))
            }
        }
    }

    /// Exchange the current refresh token for a new session.
    pub async fn refresh_session(&self) -> AppResult<Session> {
        let session = self.get_session().ok_or(AppError::AuthSessionMissing)?;
        self.refresh_with(&session.refresh_token).await
    }

    async fn refresh_with(&self, refresh_token: &str) -> AppResult<Session> {
        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock.
        if let Some(current) = self.get_session() {
            if current.refresh_token != refresh_token && !current.expires_within(EXPIRY_MARGIN_SECS) {
                return Ok(current);
            }
        }

        let url = self.auth_endpoint("token?grant_type=refresh_token")?;
        let request = RefreshTokenRequest { refresh_token };

        match self.post::<Session, _>(url, None, &request).await {
            Ok(session) => {
                let session = self
                    .commit_session(session, AuthChangeEvent::TokenRefreshed)
                    .await;
                tracing::debug!(user_id = %session.user.id, expires_at = ?session.expires_at, "Session refreshed");
                Ok(session)
            }
            Err(e) if e.is_auth_api_error() => {
                tracing::warn!(error = %e, "Refresh token rejected; signing out");
                let cleared = self
                    .remove_session_if(|current| {
                        current.map_or(true, |c| c.refresh_token == refresh_token)
                    })
                    .await;
                if cleared {
                    self.events.emit(AuthChangeEvent::SignedOut, None);
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Keep the session fresh in the background.
    ///
    /// Returns `None` when the client was built without auto refresh. Must be
    /// called from within a tokio runtime.
    pub fn start_auto_refresh(&self) -> Option<AutoRefreshHandle> {
        if !self.options().auto_refresh_token {
            return None;
        }

        let client = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(AUTO_REFRESH_TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                client.auto_refresh_tick().await;
            }
        });

        tracing::debug!(tick_secs = AUTO_REFRESH_TICK.as_secs(), "Auto refresh started");
        Some(AutoRefreshHandle { task })
    }

    pub(super) async fn auto_refresh_tick(&self) {
        let Some(session) = self.get_session() else {
            return;
        };

        if !session.expires_within(EXPIRY_MARGIN_SECS) {
            return;
        }

        if let Err(e) = self.refresh_with(&session.refresh_token).await {
            tracing::warn!(error = %e, "Auto refresh tick failed");
        }
    }
}
