use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Domain core: authorization policy and the operations built on it.
pub mod accounts;
pub mod courses;
pub mod ledger;
pub mod policy;

// Shared types and infrastructure.
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod seed;

// HTTP adapter.
pub mod handlers;
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::AppError;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document aggregated from the `#[utoipa::path]` handlers and the
/// `ToSchema` models. Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::login, handlers::refresh_token, handlers::logout,
        handlers::get_profile, handlers::update_profile, handlers::get_public_user,
        handlers::list_courses, handlers::get_course, handlers::create_course,
        handlers::update_course, handlers::delete_course, handlers::enroll, handlers::unenroll,
        handlers::my_courses, handlers::list_course_chapters, handlers::list_chapters,
        handlers::get_chapter, handlers::create_course_chapter, handlers::create_chapter,
        handlers::update_chapter, handlers::delete_chapter
    ),
    components(
        schemas(
            models::Role, models::Course, models::Chapter, models::Enrollment,
            models::RegisterUserRequest, models::LoginRequest, models::RefreshRequest,
            models::CreateCourseRequest, models::UpdateCourseRequest,
            models::CreateChapterRequest, models::NewChapterRequest, models::UpdateChapterRequest,
            models::UpdateProfileRequest, models::ProfileInfo, models::UserResponse,
            models::PublicUser, models::SessionTokens, models::UserRef, models::CourseSummary,
            models::CourseDetail, models::ChapterSummary, models::ChapterDetail,
            models::EnrollmentResponse, models::MessageResponse,
            error::ErrorBody, error::ErrorCode, error::FieldError,
        )
    ),
    tags(
        (name = "course-portal", description = "Courses, chapters and enrollment API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// Shared, cheaply clonable state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Persistence port: Postgres in production, in-memory in tests.
    pub repo: RepositoryState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Let extractors (`AuthUser`, `CurrentActor`) pull single components out of AppState.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Guards `authenticated_routes`. Extracting `AuthUser` is the whole check: a
/// failed extraction rejects the request with the extractor's 401 before the
/// handler runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles public and authenticated routes, Swagger UI, and the
/// observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                // Outermost: every request gets an id before the trace span opens.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one HTTP request, tagged with the `x-request-id` set above so every
/// log line of the request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
