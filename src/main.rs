use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulse_capture_api::auth;
use pulse_capture_api::config::Config;
use pulse_capture_api::db::Database;
use pulse_capture_api::handlers::{self, AppState};
use pulse_capture_api::settings_handler::{self, RuntimeSettings};
use pulse_capture_api::webhook_handler;
use pulse_capture_api::workflow_client::WorkflowClient;

/// Serves the OpenAPI specification YAML file.
///
/// Reads `openapi.yml` from the filesystem and serves it with the
/// appropriate content type; 404 when the file is missing.
async fn serve_openapi_spec() -> impl IntoResponse {
    match tokio::fs::read_to_string("openapi.yml").await {
        Ok(content) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/yaml")],
            content,
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "OpenAPI spec not found").into_response(),
    }
}

/// Serves the Swagger UI HTML page, configured to load the spec served by
/// `serve_openapi_spec`.
async fn serve_swagger_ui() -> impl IntoResponse {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>PulseCapture API - Swagger UI</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
    <style>
        body { margin: 0; padding: 0; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {
            window.ui = SwaggerUIBundle({
                url: "/api-docs/openapi.yml",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>
"#;
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
}

/// Main entry point for the application.
///
/// Initializes logging, configuration, the database (schema is applied at
/// startup), the runtime settings view, the workflow-engine client, and the
/// HTTP routes with their middleware (CORS, tracing, body limit, rate
/// limiting), then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulse_capture_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool and apply the schema
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");
    db.migrate().await?;

    // Create the bootstrap admin account if configured and absent
    if let Err(e) = auth::ensure_bootstrap_admin(&db.pool, &config).await {
        tracing::error!("Failed to create bootstrap admin: {}", e);
    }

    // Load the runtime settings view from the latest settings row
    let runtime_settings = RuntimeSettings::load(&db.pool).await?;
    tracing::info!("Runtime settings loaded");

    // Initialize the workflow engine client
    let workflow_client = WorkflowClient::new(&config)?;
    tracing::info!("✓ Workflow client initialized: {}", config.n8n_base_url);

    // Build application state
    let app_state = Arc::new(AppState {
        db: db.pool.clone(),
        config: config.clone(),
        workflow_client,
        runtime_settings,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // API routes behind body-limit and rate-limit layers
    let api_routes = Router::new()
        // API Documentation
        .route("/docs", get(serve_swagger_ui))
        .route("/api-docs/openapi.yml", get(serve_openapi_spec))
        // Public lead capture
        .route("/api/leads", post(handlers::submit_lead))
        .route("/api/leads/:id", get(handlers::get_lead))
        // Admin session
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/verify", get(auth::verify))
        // Admin dashboard
        .route("/api/admin/leads", get(handlers::list_leads))
        .route(
            "/api/admin/leads/:id",
            get(handlers::get_lead_details).patch(handlers::update_lead),
        )
        .route(
            "/api/admin/leads/:id/outreach",
            post(handlers::send_outreach).get(handlers::get_outreach),
        )
        .route("/api/admin/stats", get(handlers::get_stats))
        .route(
            "/api/admin/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/api/admin/users/:id",
            put(handlers::update_user).delete(handlers::delete_user),
        )
        // Inbound callbacks from the workflow engine
        .route(
            "/api/webhooks/lead-processing",
            post(webhook_handler::lead_processing_webhook),
        )
        .route(
            "/api/webhooks/send-outreach",
            post(webhook_handler::send_outreach_webhook),
        )
        .route("/api/webhooks/test", get(webhook_handler::webhook_test))
        // Integration settings
        .route(
            "/api/settings",
            get(settings_handler::get_settings).put(settings_handler::update_settings),
        )
        .route("/api/settings/test/slack", post(settings_handler::test_slack))
        .route(
            "/api/settings/test/openai",
            post(settings_handler::test_openai),
        )
        .route("/api/settings/test/email", post(settings_handler::test_email))
        .route("/api/settings/test/n8n", post(settings_handler::test_n8n))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 1MB max payload
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check (bypasses rate limiting)
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(api_routes)
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
