use app_services::{
    config::Config,
    telemetry::{init_tracing, LogFormat},
    AppServices,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    init_tracing(LogFormat::from_env());

    tracing::info!("Starting app services v{}", env!("CARGO_PKG_VERSION"));

    // Missing backend configuration is fatal
    let config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    tracing::info!("Configuration loaded successfully");

    let services = AppServices::new(config)?;

    tracing::info!(
        payments_enabled = services.payments.is_enabled(),
        payment_api = %services.payments.api_base_url(),
        "Payment client initialized"
    );

    tracing::info!(
        auth_url = %services.auth.url(),
        session_dir = %services.config.supabase.session_dir.display(),
        "Auth client initialized"
    );

    let auth_subscription = services.auth.on_auth_event(|event, session| {
        match session.as_ref().map(|s| &s.user) {
            Some(user) => tracing::info!(event = ?event, user_id = %user.id, "Auth state changed"),
            None => tracing::info!(event = ?event, "Auth state changed"),
        }
    });
    tracing::debug!(subscription = auth_subscription.id(), "Logging auth state changes");

    match services.auth.initialize().await? {
        Some(session) => tracing::info!(user_id = %session.user.id, "Restored persisted session"),
        None => tracing::info!("No persisted session"),
    }

    if let Some(url) = std::env::args().nth(1) {
        let session = services.auth.get_session_from_url(&url).await?;
        tracing::info!(user_id = %session.user.id, "Session taken from redirect URL");
    }

    let _auto_refresh = services.auth.start_auto_refresh();

    tracing::info!("Auth client ready");

    shutdown_signal().await;

    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        },
    }
}
