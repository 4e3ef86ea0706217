use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Authenticated Router Module
///
/// Every handler here receives a validated `AuthUser`. Role requirements are
/// enforced by the capability the handler asks for (`instructor()` /
/// `student()`), ownership by the authorization gate.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /auth/logout
        // Blacklists the refresh token in the body.
        .route("/auth/logout", post(handlers::logout))
        .route(
            "/profile",
            get(handlers::get_profile).patch(handlers::update_profile),
        )
        // GET /my-courses
        // Students only, most recent enrollment first.
        .route("/my-courses", get(handlers::my_courses))
        // --- Courses ---
        .route("/courses", post(handlers::create_course))
        .route(
            "/courses/{id}",
            put(handlers::update_course)
                .patch(handlers::update_course)
                .delete(handlers::delete_course),
        )
        .route("/courses/{id}/enroll", post(handlers::enroll))
        .route("/courses/{id}/unenroll", delete(handlers::unenroll))
        // --- Chapters ---
        // Creation is owner-only in both forms; POST /chapters names the course
        // in the payload.
        .route("/courses/{id}/chapters", post(handlers::create_course_chapter))
        .route("/chapters", post(handlers::create_chapter))
        .route(
            "/chapters/{id}",
            put(handlers::update_chapter)
                .patch(handlers::update_chapter)
                .delete(handlers::delete_chapter),
        )
}
