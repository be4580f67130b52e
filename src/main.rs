use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use std::{sync::Arc, time::Duration};
use subflow_api::{
    api_status, api_v1_routes,
    config::{init_tracing, load_config},
    db::{establish_connection_from_app_config, run_migrations},
    events::{process_events, EventSender},
    health_check, openapi, AppState,
};
use tokio::{net::TcpListener, signal, sync::mpsc};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(load_config()?);
    init_tracing(config.log_level(), config.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "starting subflow-api"
    );

    let db = Arc::new(establish_connection_from_app_config(&config).await?);
    if config.auto_migrate {
        run_migrations(&db).await?;
        info!("database migrations applied");
    }

    let redis = match redis::Client::open(config.redis_url.as_str()) {
        Ok(client) => match redis::aio::ConnectionManager::new(client).await {
            Ok(manager) => {
                info!("redis connected");
                Some(manager)
            }
            Err(e) => {
                warn!(error = %e, "redis unavailable, webhook dedup disabled");
                None
            }
        },
        Err(e) => {
            warn!(error = %e, "invalid redis url, webhook dedup disabled");
            None
        }
    };

    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = EventSender::new(event_tx);
    tokio::spawn(process_events(event_rx));

    let state = AppState::new(db, config.clone(), event_sender, redis);

    let limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(300));
        loop {
            tick.tick().await;
            limiter.prune();
        }
    });

    let cors = build_cors(&config);
    let app = Router::new()
        .route("/", get(api_status))
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(Duration::from_secs(30)))
                .layer(cors),
        )
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown complete");
    Ok(())
}

fn build_cors(config: &subflow_api::config::AppConfig) -> CorsLayer {
    let allowed = config
        .cors_allowed_origins
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                error!(origin = %origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();

    if allowed.is_empty() {
        if config.is_development() {
            return CorsLayer::permissive();
        }
        // No origins configured outside development: browsers get nothing,
        // server-to-server traffic is unaffected.
        return CorsLayer::new();
    }

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
