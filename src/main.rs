use std::{net::SocketAddr, sync::Arc};

use http::HeaderValue;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use multi_grn_api as api;
use api::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    let db = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db).await?;
    }
    let db = Arc::new(db);

    // One breaker guards every SAP call; readiness reports its state
    let sap_breaker = api::circuit_breaker::CircuitBreaker::with_config((&cfg).into());
    let sap_client = api::sap::ServiceLayerClient::new(cfg.sap.clone(), sap_breaker.clone())?;
    let sap: Arc<dyn api::sap::SapGateway> = Arc::new(sap_client);

    let cors = cors_layer(&cfg)?;
    let auth = Arc::new(api::auth::AuthService::new((&cfg).into()));
    let cfg = Arc::new(cfg);
    let factory = api::services::ServiceFactory::new(db.clone(), sap, cfg.clone());

    let state = api::AppState {
        db: db.clone(),
        config: cfg.clone(),
        services: api::services::ServiceContainer::new(&factory),
        auth,
    };
    let health = Arc::new(api::health::HealthState::new(
        db,
        cfg.sap.is_configured(),
        sap_breaker,
    ));

    let app = api::app_router(state, health).layer(cors);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, environment = %cfg.environment, "multi-grn-api listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Explicit origins win; otherwise permissive CORS only where config allows it.
fn cors_layer(cfg: &AppConfig) -> Result<CorsLayer, String> {
    let origins: Vec<HeaderValue> = cfg
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "Ignoring unusable CORS origin");
                None
            }
        })
        .collect();

    if !origins.is_empty() {
        return Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any));
    }
    if cfg.should_allow_permissive_cors() {
        info!("No CORS origins configured, allowing any origin");
        return Ok(CorsLayer::permissive());
    }
    error!("No usable CORS origins configured");
    Err("set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true".to_string())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
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
                error!("failed to install SIGTERM handler: {}", e);
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
    info!("Shutdown signal received");
}
