use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use p2h_booking::config::AppConfig;
use p2h_booking::db;
use p2h_booking::handlers;
use p2h_booking::services::email::dispatch::HttpEmailDispatcher;
use p2h_booking::services::gateway::razorpay::RazorpayGateway;
use p2h_booking::services::pricing::PriceCache;
use p2h_booking::services::recovery::RetryPolicy;
use p2h_booking::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    if config.gateway_key_id.is_empty() {
        tracing::warn!("GATEWAY_KEY_ID not set, order creation will fail until configured");
    }
    let gateway = RazorpayGateway::new(
        config.gateway_api_url.clone(),
        config.gateway_key_id.clone(),
        config.gateway_key_secret.clone(),
    );
    let email = HttpEmailDispatcher::new(config.email_api_url.clone(), config.email_api_key.clone());

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        gateway: Box::new(gateway),
        email: Box::new(email),
        price_cache: PriceCache::default(),
        checkouts: Mutex::new(HashMap::new()),
        retry_policy: RetryPolicy::default(),
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/prices/quote", post(handlers::prices::quote))
        .route("/api/checkout/start", post(handlers::checkout::start))
        .route("/api/checkout/callback", post(handlers::checkout::callback))
        .route("/api/payments/confirm", post(handlers::payments::confirm))
        .route(
            "/api/bookings/:reference_id",
            get(handlers::bookings::get_booking),
        )
        .route("/api/admin/login", post(handlers::admin::login))
        .route(
            "/api/admin/prices",
            get(handlers::admin::get_prices).post(handlers::admin::update_price),
        )
        .route("/api/admin/bookings", get(handlers::admin::get_bookings))
        .route("/api/admin/recover", post(handlers::admin::recover))
        .route("/api/admin/sweep", post(handlers::admin::sweep))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
