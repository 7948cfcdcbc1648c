use axum::{
    Router, middleware,
    routing::{get, post},
};
use notifier::{
    auth::operator_auth,
    config::DeliveryConfig,
    handlers::emit::emit_handler,
    handlers::inspector::{
        get_delivery_handler, list_attempts_handler, list_deliveries_handler,
        replay_delivery_handler,
    },
    scheduler::DeliveryService,
    state::AppState,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notifier=info".into()),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:notifier.db".to_string());
    let bind_addr =
        std::env::var("NOTIFIER_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3002".to_string());
    let operator_api_token = std::env::var("NOTIFIER_OPERATOR_API_TOKEN").ok();

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON;").execute(&pool).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let config = DeliveryConfig::from_env();
    let service = DeliveryService::new(pool.clone(), config.clone())?;
    let dispatcher = service.dispatcher();
    let _background = service.start();

    let state = AppState {
        pool,
        config,
        dispatcher,
        operator_api_token,
    };

    let inspector_router = Router::new()
        .route("/deliveries", get(list_deliveries_handler))
        .route("/deliveries/:delivery_id", get(get_delivery_handler))
        .route(
            "/deliveries/:delivery_id/attempts",
            get(list_attempts_handler),
        )
        .route(
            "/deliveries/:delivery_id/replay",
            post(replay_delivery_handler),
        )
        .layer(middleware::from_fn_with_state(state.clone(), operator_auth));

    let app = Router::new()
        .route("/internal/events", post(emit_handler))
        .nest("/api/inspector", inspector_router)
        .with_state(state);

    let addr: SocketAddr = bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "notifier listening");
    axum::serve(listener, app).await?;

    Ok(())
}
