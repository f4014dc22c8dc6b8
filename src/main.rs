//! Athenaeum Server - Library Management System
//!
//! A Rust REST API server for library catalog, borrowing and fines.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use athenaeum_server::{api, config::AppConfig, repository::Repository, services::Services, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().expect("Failed to load configuration");

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "athenaeum_server={},tower_http=debug",
            config.logging.level
        )
        .into()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Athenaeum Server v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations completed");

    // Save server address before moving config
    let server_host = config.server.host.clone();
    let server_port = config.server.port;

    // Create repository and services
    let repository = Repository::new(pool);
    let services = Services::new(repository, config.policy.clone());

    // Create application state
    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(
        server_host.parse().expect("Invalid host address"),
        server_port,
    );

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Books (catalog)
        .route("/books", get(api::books::list_books))
        .route("/books", post(api::books::create_book))
        .route("/books/:id", get(api::books::get_book))
        .route("/books/:id", put(api::books::update_book))
        .route("/books/:id", delete(api::books::delete_book))
        .route("/books/:id/copies", get(api::books::list_copies))
        .route("/books/:id/inventory", get(api::books::get_inventory))
        .route("/books/:id/inventory", put(api::books::update_inventory))
        // Inventories
        .route("/inventories", get(api::books::list_inventories))
        // Categories
        .route("/categories", get(api::categories::list_categories))
        .route("/categories", post(api::categories::create_category))
        .route("/categories/:id", put(api::categories::update_category))
        .route("/categories/:id", delete(api::categories::delete_category))
        // Bookshelves
        .route("/bookshelves", get(api::bookshelves::list_bookshelves))
        .route("/bookshelves", post(api::bookshelves::create_bookshelf))
        .route("/bookshelves/:id", put(api::bookshelves::update_bookshelf))
        .route("/bookshelves/:id", delete(api::bookshelves::delete_bookshelf))
        // Borrow lifecycle
        .route("/borrows", post(api::borrows::create_request))
        .route("/borrows/requests", get(api::borrows::list_open_requests))
        .route("/borrows/borrowed", get(api::borrows::list_borrowed))
        .route("/borrows/history", get(api::borrows::list_history))
        .route("/borrows/mine", get(api::borrows::list_my_requests))
        .route("/borrows/:id", get(api::borrows::get_request))
        .route("/borrows/:id/accept", post(api::borrows::accept_request))
        .route("/borrows/:id/decline", post(api::borrows::decline_request))
        .route("/borrows/:id/pickup", post(api::borrows::confirm_pickup))
        .route("/borrows/:id/cancel", post(api::borrows::cancel_request))
        .route("/borrows/:id/return", post(api::borrows::return_books))
        .route("/borrows/:id/extend", post(api::borrows::extend_request))
        // Per-user views
        .route("/users/:id/history", get(api::borrows::list_user_history))
        .route("/users/:id/fines", get(api::fines::list_user_fines))
        // Fines
        .route("/fines", get(api::fines::list_fines))
        .route("/fines", post(api::fines::create_fine))
        .route("/fines/mine", get(api::fines::list_my_fines))
        .route("/fines/:id/pay", post(api::fines::pay_fine))
        .route("/fines/:id", put(api::fines::update_fine))
        .route("/fines/:id", delete(api::fines::delete_fine))
        // Statistics
        .route("/stats/borrows", get(api::stats::borrow_statistics))
        .route("/stats/fines", get(api::stats::fine_statistics))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
