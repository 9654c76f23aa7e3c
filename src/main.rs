use std::sync::Arc;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use onboarding_flow::config::OnboardingConfig;
use onboarding_flow::error::{Error, SessionError};
use onboarding_flow::onboarding::{
    OnboardingRouteState, OnboardingSession, SessionDeps, SettingsPersistence,
    marketing_onboarding_steps, onboarding_routes,
};
use onboarding_flow::store::{Database, LibSqlBackend};

/// Stderr logging, plus a daily-rolling file when `ONBOARDING_LOG_DIR` is set.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer().with_target(false);

    let (file, guard) = match std::env::var("ONBOARDING_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "onboarding.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _log_guard = init_tracing();

    let config = OnboardingConfig::from_env()?;

    eprintln!("Onboarding flow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   API: http://0.0.0.0:{}/api/onboarding/status", config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
    let persistence = Arc::new(SettingsPersistence::new(db, config.user_id.clone()));

    // ── Session ──────────────────────────────────────────────────────────
    let deps = SessionDeps::new(persistence);
    let resumed = OnboardingSession::resume(marketing_onboarding_steps(), deps, &config).await;
    let session = match resumed {
        Ok(session) => Arc::new(session),
        Err(Error::Session(SessionError::AlreadyCompleted)) => {
            eprintln!("   Onboarding already completed for {}", config.user_id);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = onboarding_routes(OnboardingRouteState {
        session: Arc::clone(&session),
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Onboarding API listening");

    let shutdown_session = Arc::clone(&session);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            shutdown_session.end();
        })
        .await?;

    eprintln!("Shutting down");
    Ok(())
}
