//! services/api/src/bin/api.rs

use api_lib::{
    adapters::db::DbAdapter,
    config::Config,
    error::ApiError,
    web::{books, loans, members, notifications, requests, require_auth, state::AppState, ApiDoc},
};
use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            config.log_level.to_string(),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(db_adapter, config.clone()));

    // The original clients are browser apps on other origins; auth is a
    // bearer token, so no cookie credentials are involved.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // --- 4. Create the Web Router ---
    // Every route requires an authenticated principal.
    let api_router = Router::new()
        .route(
            "/books",
            get(books::list_books_handler).post(books::create_book_handler),
        )
        .route(
            "/books/{id}",
            put(books::update_book_handler).delete(books::delete_book_handler),
        )
        .route(
            "/categories",
            get(books::list_categories_handler).post(books::create_category_handler),
        )
        .route(
            "/plans",
            get(members::list_plans_handler).post(members::create_plan_handler),
        )
        .route("/plans/{id}", put(members::update_plan_handler))
        .route("/members", get(members::list_members_handler))
        .route("/members/{id}", get(members::get_member_handler))
        .route(
            "/loans",
            get(loans::list_loans_handler).post(loans::issue_handler),
        )
        .route("/loans/mine", get(loans::my_loans_handler))
        .route("/loans/{id}/return", post(loans::return_handler))
        .route("/loans/{id}/renew", post(loans::renew_handler))
        .route(
            "/extension-requests",
            get(requests::list_extensions_handler).post(requests::submit_extension_handler),
        )
        .route(
            "/extension-requests/{id}/decision",
            post(requests::decide_extension_handler),
        )
        .route(
            "/renewal-requests",
            get(requests::list_renewals_handler).post(requests::submit_renewal_handler),
        )
        .route(
            "/renewal-requests/{id}/decision",
            post(requests::decide_renewal_handler),
        )
        .route(
            "/notifications",
            get(notifications::list_notifications_handler),
        )
        .route(
            "/notifications/read-all",
            post(notifications::mark_all_read_handler),
        )
        .route(
            "/notifications/{id}/read",
            post(notifications::mark_read_handler),
        )
        .route(
            "/notifications/{id}",
            delete(notifications::delete_notification_handler),
        )
        .route("/sweeps/run", post(notifications::run_sweep_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
