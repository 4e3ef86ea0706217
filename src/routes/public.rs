use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without credentials: the auth gateway plus read-only
/// course and chapter access. Chapter reads go through the visibility policy,
/// so a private chapter still needs an owner or enrolled caller.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for monitoring and load balancers.
        .route("/health", get(|| async { "ok" }))
        // --- Auth gateway ---
        .route("/auth/register", post(handlers::register_user))
        .route("/auth/login", post(handlers::login))
        .route("/auth/token/refresh", post(handlers::refresh_token))
        // GET /users/{id}
        // Public profile: no email, no bio.
        .route("/users/{id}", get(handlers::get_public_user))
        // GET /courses?instructor=...
        .route("/courses", get(handlers::list_courses))
        .route("/courses/{id}", get(handlers::get_course))
        // Chapter listings are filtered once per course: owner and enrolled
        // students see everything, everyone else only public chapters.
        .route("/courses/{id}/chapters", get(handlers::list_course_chapters))
        .route("/chapters", get(handlers::list_chapters))
        .route("/chapters/{id}", get(handlers::get_chapter))
}
