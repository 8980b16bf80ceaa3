use axum::{Extension, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

mod db;
mod error;
mod handlers;
mod instagram_client;
mod middleware;
mod models;
mod sync;

// AppState holds the database connection pool and the Instagram API client
pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub instagram_client: Option<instagram_client::InstagramClient>,
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging().expect("Failed to initialize logging");

    // Create the database connection pool (runs migrations on startup)
    let db_pool = db::create_pool()
        .await
        .expect("Failed to create database pool.");

    // Initialize the Instagram client if app credentials are provided
    let instagram_client = match (
        std::env::var("INSTAGRAM_APP_ID").ok().filter(|v| !v.is_empty()),
        std::env::var("INSTAGRAM_APP_SECRET").ok().filter(|v| !v.is_empty()),
    ) {
        (Some(app_id), Some(app_secret)) => {
            let redirect_uri = std::env::var("INSTAGRAM_REDIRECT_URI")
                .unwrap_or_else(|_| "http://localhost:8000/api/instagram/callback".to_string());
            tracing::info!("Initializing Instagram messaging client...");
            Some(instagram_client::InstagramClient::new(
                app_id,
                app_secret,
                redirect_uri,
            ))
        }
        _ => {
            tracing::warn!("Instagram credentials not found. Instagram sync will be disabled.");
            tracing::info!("To enable Instagram, set: INSTAGRAM_APP_ID, INSTAGRAM_APP_SECRET");
            None
        }
    };

    let shared_state = Arc::new(AppState {
        db_pool,
        instagram_client,
    });

    // Build our application with all routes and shared state
    let app = Router::new()
        .merge(handlers::auth::auth_routes())
        .merge(handlers::chats::chat_routes())
        .merge(handlers::orders::order_routes())
        .merge(handlers::catalog::catalog_routes())
        .merge(handlers::instagram::instagram_routes())
        .route("/api/status", axum::routing::get(api_status))
        .layer(axum::middleware::from_fn(
            middleware::logging::request_logging_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(Extension(shared_state));

    let port = std::env::var("PORT").unwrap_or_else(|_| "8000".to_string());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .expect("Failed to bind server port");
    tracing::info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app)
        .await
        .expect("Server error");
}

async fn api_status() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "service": "merchant_inbox",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// Production-grade logging configuration
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,merchant_inbox=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,merchant_inbox=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
