use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use financing_api::config::Config;
use financing_api::db::Database;
use financing_api::bank_handlers;
use financing_api::handlers::{self, AppState};

/// Main entry point for the application.
///
/// Initializes logging, configuration and the database pool, builds the
/// HTTP routes with their middleware (CORS, rate limiting, body limits)
/// and starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "financing_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    let app_state = Arc::new(AppState::new(db.pool.clone(), config.clone()));

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        // Session
        .route("/api/v1/profile", get(handlers::get_profile))
        .route("/api/v1/auth/signout", post(handlers::signout))
        // Application wizard
        .route("/api/v1/wizard/enter", post(handlers::enter_wizard))
        .route(
            "/api/v1/wizard/:id/advance",
            post(handlers::advance_step),
        )
        .route(
            "/api/v1/wizard/:id/vehicle",
            post(handlers::select_vehicle),
        )
        .route(
            "/api/v1/wizard/:id/submit",
            post(handlers::submit_application),
        )
        // Applications
        .route("/api/v1/applications", get(handlers::list_applications))
        .route(
            "/api/v1/applications/latest",
            get(handlers::latest_application),
        )
        .route(
            "/api/v1/applications/:id",
            get(handlers::get_application).delete(handlers::delete_draft),
        )
        .route(
            "/api/v1/applications/:id/documents",
            get(handlers::list_application_documents).post(handlers::record_document),
        )
        .route(
            "/api/v1/documents/download",
            get(handlers::resolve_download),
        )
        // Bank profiling
        .route(
            "/api/v1/bank-profile",
            get(handlers::get_bank_profile).post(handlers::save_bank_profile),
        )
        // Bank portal
        .route("/api/v1/bank/register", post(bank_handlers::register_rep))
        .route("/api/v1/bank/me", get(bank_handlers::rep_me))
        .route(
            "/api/v1/bank/onboarding/complete",
            post(bank_handlers::complete_onboarding),
        )
        .route("/api/v1/bank/dashboard", get(bank_handlers::dashboard))
        .route("/api/v1/bank/leads", get(bank_handlers::list_leads))
        .route(
            "/api/v1/bank/leads/:assignment_id",
            get(bank_handlers::lead_detail),
        )
        .route(
            "/api/v1/bank/leads/:assignment_id/status",
            post(bank_handlers::update_assignment_status),
        )
        .route("/api/v1/bank/feedback", post(bank_handlers::add_feedback))
        .route("/api/v1/bank/pin", post(bank_handlers::set_pin))
        .route("/api/v1/bank/pin/verify", post(bank_handlers::verify_pin))
        // Admin CRM
        .route(
            "/api/v1/admin/bank-reps/pending",
            get(bank_handlers::pending_reps),
        )
        .route("/api/v1/admin/bank-reps", get(bank_handlers::reps_by_bank))
        .route(
            "/api/v1/admin/bank-reps/:rep_id/approve",
            post(bank_handlers::approve_rep),
        )
        .route(
            "/api/v1/admin/assignments",
            post(bank_handlers::assign_lead),
        )
        .route(
            "/api/v1/admin/leads/:lead_id/feedback",
            get(bank_handlers::lead_feedback),
        )
        .route(
            "/api/v1/admin/feedback/unread",
            get(bank_handlers::unread_feedback_count),
        )
        .route(
            "/api/v1/admin/feedback/:feedback_id/read",
            post(bank_handlers::mark_feedback_read),
        )
        .layer(
            ServiceBuilder::new()
                // Request size limit: 5MB max payload (prevents memory exhaustion)
                .layer(RequestBodyLimitLayer::new(5 * 1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check (bypasses rate limiting)
    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
