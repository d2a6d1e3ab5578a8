pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod telemetry;

use std::sync::Arc;

use crate::config::Config;
use crate::error::AppResult;
use crate::services::{StripeClient, SupabaseClient};

/// Clients owned by the application's composition root.
#[derive(Clone)]
pub struct AppServices {
    pub config: Arc<Config>,
    pub payments: Arc<StripeClient>,
    pub auth: Arc<SupabaseClient>,
}

impl AppServices {
    /// Build both clients. Fails when the backend client cannot be constructed;
    /// a missing payment key only disables the payment handle.
    pub fn new(config: Config) -> AppResult<Self> {
        let payments = StripeClient::new(&config.stripe)?;
        let auth = SupabaseClient::new(&config.supabase)?;

        Ok(Self {
            config: Arc::new(config),
            payments: Arc::new(payments),
            auth: Arc::new(auth),
        })
    }
}
