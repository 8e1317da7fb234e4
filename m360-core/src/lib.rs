use axum::routing::{delete, get};
use axum::Router;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routeros;
pub mod scheduler;
pub mod services;

pub struct AppState {
    pub db: services::db::Database,
    pub settings: config::Settings,
    pub vpn: Arc<services::vpn::VpnManager>,
    pub pool: Arc<services::pool::DevicePool>,
    pub fanout: Arc<services::fanout::Fanout>,
    pub scheduler: Arc<scheduler::Scheduler>,
}

pub async fn run() {
    dotenvy::dotenv().ok();

    let settings = config::Settings::new().expect("Failed to load configuration");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("m360_core={},tower_http=info", settings.server.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = services::db::Database::new(&settings.database.url)
        .await
        .expect("Failed to initialize database");

    let runner = services::command::CommandRunner::new();
    let vpn = Arc::new(services::vpn::VpnManager::new(
        runner,
        settings.network.vpn_up_poll_attempts,
        settings.network.vpn_up_poll_interval_ms,
    ));
    let pool = Arc::new(services::pool::DevicePool::new(
        settings.network.routeros_port,
        settings.network.tcp_probe_timeout_ms,
    ));
    let fanout = Arc::new(services::fanout::Fanout::new());
    let notifier = services::notifier::Notifier::new(settings.network.notify_timeout_secs);
    let alerts = Arc::new(services::alert::AlertEvaluator::new(db.clone(), notifier));

    let scheduler = Arc::new(scheduler::Scheduler::new(
        db.clone(),
        Arc::clone(&pool),
        Arc::clone(&vpn),
        Arc::clone(&fanout),
        alerts,
    ));
    scheduler
        .start_all()
        .await
        .expect("failed to start sensor workers");

    let state = Arc::new(AppState {
        db,
        settings: settings.clone(),
        vpn: Arc::clone(&vpn),
        pool,
        fanout,
        scheduler,
    });

    let app = build_router(state);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listener");
    tracing::info!(%addr, "m360-core listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(vpn))
        .await
        .expect("server error");
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/ws", get(handlers::ws::upgrade))
        .route(
            "/api/v1/tenants/:owner/devices",
            get(handlers::devices::list).post(handlers::devices::create),
        )
        .route("/api/v1/tenants/:owner/devices/:id", delete(handlers::devices::delete))
        .route(
            "/api/v1/tenants/:owner/sensors",
            get(handlers::sensors::list).post(handlers::sensors::create),
        )
        .route(
            "/api/v1/tenants/:owner/sensors/:id",
            delete(handlers::sensors::delete).patch(handlers::sensors::restart),
        )
        .route(
            "/api/v1/tenants/:owner/credentials",
            get(handlers::entities::list_credentials).post(handlers::entities::create_credential),
        )
        .route(
            "/api/v1/tenants/:owner/credentials/:id",
            delete(handlers::entities::delete_credential),
        )
        .route(
            "/api/v1/tenants/:owner/vpn-profiles",
            get(handlers::entities::list_vpn_profiles).post(handlers::entities::create_vpn_profile),
        )
        .route(
            "/api/v1/tenants/:owner/vpn-profiles/:id",
            delete(handlers::entities::delete_vpn_profile),
        )
        .route(
            "/api/v1/tenants/:owner/notification-channels",
            get(handlers::entities::list_channels).post(handlers::entities::create_channel),
        )
        .route(
            "/api/v1/tenants/:owner/notification-channels/:id",
            delete(handlers::entities::delete_channel),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(30)))
        .with_state(state)
}

async fn shutdown_signal(vpn: Arc<services::vpn::VpnManager>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down, tearing down vpn tunnels");
    vpn.teardown_all().await;
}
