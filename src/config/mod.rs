use serde::Deserialize;
use std::path::PathBuf;

use config::ConfigError;

pub const DEFAULT_PAYMENT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_SESSION_DIR: &str = ".supabase";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub stripe: StripeConfig,
    pub supabase: SupabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeConfig {
    /// Absent when payments are not configured.
    pub publishable_key: Option<String>,
    /// Origin of the backend serving `/api/create-*-session`.
    pub api_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
    pub session_dir: PathBuf,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// `STRIPE_PUBLISHABLE_KEY` and `PAYMENT_API_URL` are optional;
    /// `SUPABASE_URL` and `SUPABASE_ANON_KEY` are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .set_default("payment.api.url", DEFAULT_PAYMENT_API_URL)?
            .set_default("supabase.session.dir", DEFAULT_SESSION_DIR)?
            .add_source(config::Environment::default().separator("_").try_parsing(true))
            .build()?;

        Self::from_settings(settings)
    }

    /// Build from already-collected settings, keyed the way the environment source nests them.
    pub fn from_settings(settings: config::Config) -> Result<Self, ConfigError> {
        Ok(Config {
            stripe: StripeConfig {
                publishable_key: settings
                    .get_string("stripe.publishable.key")
                    .ok()
                    .map(|key| key.trim().to_string())
                    .filter(|key| !key.is_empty()),
                api_base_url: settings
                    .get_string("payment.api.url")
                    .unwrap_or_else(|_| DEFAULT_PAYMENT_API_URL.to_string()),
            },
            supabase: SupabaseConfig {
                url: required(&settings, "supabase.url")?,
                anon_key: required(&settings, "supabase.anon.key")?,
                session_dir: settings
                    .get_string("supabase.session.dir")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_SESSION_DIR)),
            },
        })
    }
}

fn required(settings: &config::Config, key: &str) -> Result<String, ConfigError> {
    match settings.get_string(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => {
            tracing::error!(key = %key, "Missing Supabase environment variables");
            Err(ConfigError::Message(format!(
                "Missing Supabase environment variables: {} is not set",
                key
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> config::Config {
        let mut builder = config::Config::builder();
        for (key, value) in pairs {
            builder = builder.set_override(*key, *value).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_settings(settings(&[
            ("stripe.publishable.key", "pk_test_51HxYzAbCdEfGhIjKl"),
            ("payment.api.url", "https://shop.example.com"),
            ("supabase.url", "https://abcdefgh.supabase.co"),
            ("supabase.anon.key", "anon-key"),
            ("supabase.session.dir", "/var/lib/app/session"),
        ]))
        .unwrap();

        assert_eq!(
            config.stripe.publishable_key.as_deref(),
            Some("pk_test_51HxYzAbCdEfGhIjKl")
        );
        assert_eq!(config.stripe.api_base_url, "https://shop.example.com");
        assert_eq!(config.supabase.url, "https://abcdefgh.supabase.co");
        assert_eq!(config.supabase.anon_key, "anon-key");
        assert_eq!(config.supabase.session_dir, PathBuf::from("/var/lib/app/session"));
    }

    #[test]
    fn test_payment_settings_are_optional() {
        let config = Config::from_settings(settings(&[
            ("supabase.url", "https://abcdefgh.supabase.co"),
            ("supabase.anon.key", "anon-key"),
        ]))
        .unwrap();

        assert!(config.stripe.publishable_key.is_none());
        assert_eq!(config.stripe.api_base_url, DEFAULT_PAYMENT_API_URL);
        assert_eq!(config.supabase.session_dir, PathBuf::from(DEFAULT_SESSION_DIR));
    }

    #[test]
    fn test_blank_publishable_key_is_absent() {
        let config = Config::from_settings(settings(&[
            ("stripe.publishable.key", "   "),
            ("supabase.url", "https://abcdefgh.supabase.co"),
            ("supabase.anon.key", "anon-key"),
        ]))
        .unwrap();

        assert!(config.stripe.publishable_key.is_none());
    }

    #[test]
    fn test_missing_supabase_url_fails() {
        let result = Config::from_settings(settings(&[("supabase.anon.key", "anon-key")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_supabase_anon_key_fails() {
        let result = Config::from_settings(settings(&[
            ("supabase.url", "https://abcdefgh.supabase.co"),
            ("supabase.anon.key", ""),
        ]));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("supabase.anon.key"));
    }
}
