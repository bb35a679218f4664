use std::sync::Arc;

use anyhow::Context;

use lead_assist::channels::{Channel, TelegramChannel};
use lead_assist::chat::{ChatService, run_channel};
use lead_assist::config::AppConfig;
use lead_assist::notify::{LeadNotifier, LogNotifier, SmtpNotifier};
use lead_assist::reply::GuidedResponder;
use lead_assist::session::SessionManager;
use lead_assist::store::{LibSqlBackend, SessionStore};
use lead_assist::web;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    eprintln!("Lead Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Chat API: http://0.0.0.0:{}/api/chat", config.http_port);

    // ── Database ─────────────────────────────────────────────────────────
    let db = LibSqlBackend::new_local(&config.db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;
    eprintln!("   Database: {}", config.db_path.display());

    let manager = Arc::new(SessionManager::new(
        SessionStore::new(Arc::new(db)),
        config.session.clone(),
    ));
    let _sweeper = Arc::clone(&manager).spawn_sweeper();

    // ── Notifications ────────────────────────────────────────────────────
    let notifier: Arc<dyn LeadNotifier> = match config.smtp.clone() {
        Some(smtp) => {
            eprintln!(
                "   Lead emails: {} via {}",
                smtp.recipients.join(", "),
                smtp.host
            );
            Arc::new(SmtpNotifier::new(smtp).context("Invalid SMTP notification settings")?)
        }
        None => {
            eprintln!("   Lead emails: disabled (log only)");
            Arc::new(LogNotifier)
        }
    };

    let chat = Arc::new(ChatService::new(
        Arc::clone(&manager),
        Arc::new(GuidedResponder),
        notifier,
        config.max_concurrent_replies,
    ));

    // ── Telegram ─────────────────────────────────────────────────────────
    if let Some(telegram) = config.telegram.clone() {
        eprintln!(
            "   Telegram: enabled (allowed: {})",
            if telegram.allowed_users.iter().any(|u| u == "*") {
                "everyone".to_string()
            } else {
                telegram.allowed_users.join(", ")
            }
        );
        let channel: Arc<dyn Channel> = Arc::new(TelegramChannel::new(telegram));
        if let Err(e) = channel.health_check().await {
            tracing::warn!(error = %e, "Telegram health check failed");
        }
        tokio::spawn(run_channel(channel, Arc::clone(&chat)));
    } else {
        eprintln!("   Telegram: disabled");
    }

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = web::routes(chat, &config.cors_origins);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.http_port))?;
    tracing::info!(port = config.http_port, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Ctrl+C received, shutting down...");
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}
