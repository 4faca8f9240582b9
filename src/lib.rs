pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod model;
pub mod reconciler;
pub mod routes;
pub mod schema;
pub mod store;
pub mod types;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use config::Config;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use error::AppResult;
use gateway::{PaymentGateway, StripeGateway};
use std::net::SocketAddr;
use std::sync::Arc;
use store::{DbPool, PooledDbConnection};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use types::{
    ApiResponse, CheckoutData, CheckoutRequest, ConfirmRequest, CourseDetail,
    CourseDetailWithStatus, CourseSummary, CreatorSummary, EmptyData, PurchaseStatus,
    PurchasedCourse, StudentSummary, UserProfile, UserRole,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub gateway: Arc<dyn PaymentGateway>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Get a database connection
    pub async fn get_db_connection(&self) -> AppResult<PooledDbConnection<'_>> {
        Ok(self.pool.get().await?)
    }
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::purchase::create_checkout_session,
        routes::purchase::confirm_purchase,
        routes::purchase::list_purchased_courses,
        routes::purchase::course_detail_with_status,
        routes::webhook::handle_payment_webhook,
        routes::user::get_user_profile,
        routes::user::enroll_course,
        health_check
    ),
    components(
        schemas(
            ApiResponse<EmptyData>, EmptyData, CheckoutRequest, CheckoutData, ConfirmRequest,
            CourseSummary, CreatorSummary, StudentSummary, CourseDetail, CourseDetailWithStatus,
            PurchasedCourse, UserProfile, PurchaseStatus, UserRole
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Purchase", description = "Course checkout, payment notifications and enrollment"),
        (name = "User", description = "Profile and direct enrollment"),
        (name = "Health", description = "Health check endpoints")
    ),
    info(
        title = "Course Billing API",
        version = "1.0.0",
        description = "Purchase and enrollment reconciliation for the course marketplace"
    )
)]
struct ApiDoc;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = serde_json::Value)
    ),
    tag = "Health"
)]
async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(serde_json::json!({"status": "ok"})))
}

async fn openapi_spec() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/purchase",
            get(routes::purchase::list_purchased_courses),
        )
        .route(
            "/purchase/checkout",
            post(routes::purchase::create_checkout_session),
        )
        .route(
            "/purchase/webhook",
            post(routes::webhook::handle_payment_webhook),
        )
        .route("/purchase/confirm", post(routes::purchase::confirm_purchase))
        .route(
            "/purchase/course/{course_id}/detail-with-status",
            get(routes::purchase::course_detail_with_status),
        )
        .route("/user/profile", get(routes::user::get_user_profile))
        .route(
            "/course/{course_id}/enroll",
            post(routes::user::enroll_course),
        )
        .route("/api-doc/openapi.json", get(openapi_spec))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();

    let config = Config::from_env()?;

    let _sentry = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tokio::runtime::Runtime::new()?.block_on(async {
        // Run database migrations on startup
        if let Err(e) = run_migrations(&config.database_url) {
            error!(error = %e, "failed to run migrations");
            return Err(e);
        }

        let pool = store::create_pool(&config.database_url).await?;
        let gateway = StripeGateway::new(config.stripe.clone())?;

        let port = config.port;
        let app_state = AppState {
            pool,
            gateway: Arc::new(gateway),
            config: Arc::new(config),
        };
        let app = build_router(app_state);

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        info!(%addr, "listening");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app.into_make_service()).await?;
        Ok(())
    })
}

pub fn run_migrations(database_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    let mut connection = SqliteConnection::establish(database_url)?;
    connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| format!("Migration error: {}", e))?;

    info!("database migrations completed");
    Ok(())
}
