use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tracing::{error, info, warn};

use branch_erp as api;

const SESSION_PURGE_EVERY: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);
    api::health::mark_started();

    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to the database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Services publish into the channel; the processor fans out to SSE subscribers
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity.max(1));
    let event_sender = Arc::new(api::events::EventSender::new(event_tx));
    let change_feed = api::events::ChangeFeed::new(cfg.event_channel_capacity.max(1));
    tokio::spawn(api::events::process_events(event_rx, change_feed.clone()));

    let sessions: Arc<dyn api::auth::SessionStore> = Arc::new(api::auth::InMemorySessionStore::new());
    let auth_service = Arc::new(api::auth::AuthService::new(&cfg, db_arc.clone(), sessions.clone()));
    api::auth::spawn_session_purge(sessions.clone(), SESSION_PURGE_EVERY);

    let services = api::handlers::AppServices::new(db_arc.clone(), event_sender, &cfg, sessions)
        .context("failed to build application services")?;

    match services.lead_sync.clear_stale_markers().await {
        Ok(0) => {}
        Ok(cleared) => warn!(cleared, "cleared sync markers left running by a previous process"),
        Err(e) => error!(error = %e, "failed to clear stale sync markers"),
    }
    if cfg.lead_sync.enabled {
        api::services::lead_sync::spawn_scheduler(
            services.lead_sync.clone(),
            Duration::from_secs(cfg.lead_sync.tick_secs.max(1)),
        );
        info!(tick_secs = cfg.lead_sync.tick_secs, "lead sync scheduler started");
    } else {
        info!("lead sync scheduler disabled");
    }

    let app_state = api::AppState {
        db: db_arc,
        config: cfg.clone(),
        services,
        change_feed,
        auth: auth_service,
    };
    let app = api::build_router(app_state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("branch-erp listening on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
