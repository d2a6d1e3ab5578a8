use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    Test,
    Live,
}

/// Client-side payment handle, identified by a publishable key.
///
/// Key formats:
/// - pk_live_xxx: Production publishable key
/// - pk_test_xxx: Test publishable key
///
/// Keys must be 20 to 100 characters long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeHandle {
    publishable_key: String,
    mode: KeyMode,
}

impl StripeHandle {
    pub fn new(publishable_key: &str) -> AppResult<Self> {
        let mode = validate_publishable_key(publishable_key)?;

        Ok(Self {
            publishable_key: publishable_key.to_string(),
            mode,
        })
    }

    pub fn publishable_key(&self) -> &str {
        &self.publishable_key
    }

    pub fn mode(&self) -> KeyMode {
        self.mode
    }

    pub fn is_live(&self) -> bool {
        self.mode == KeyMode::Live
    }
}

fn validate_publishable_key(key: &str) -> AppResult<KeyMode> {
    if key.starts_with("sk_") || key.starts_with("rk_") {
        return Err(AppError::Validation(
            "Secret keys must never be used as a publishable key".to_string(),
        ));
    }

    if key.len() < 20 {
        return Err(AppError::Validation("Publishable key too short".to_string()));
    }

    if key.len() > 100 {
        return Err(AppError::Validation("Publishable key too long".to_string()));
    }

    if key.starts_with("pk_live_") {
        Ok(KeyMode::Live)
    } else if key.starts_with("pk_test_") {
        Ok(KeyMode::Test)
    } else {
        Err(AppError::Validation(
            "Invalid publishable key prefix. Expected: pk_live_ or pk_test_".to_string(),
        ))
    }
}
