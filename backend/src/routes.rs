// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post, put},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{admin, attempt, auth, course, enrollment, quiz},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, courses, lessons, quizzes, attempts, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (Database Pool + Config).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let require_auth = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let course_routes = Router::new()
        .route("/", get(course::list_courses))
        .route("/{id}", get(course::get_course))
        .merge(
            Router::new()
                .route(
                    "/{id}/enroll",
                    post(enrollment::enroll).delete(enrollment::unenroll),
                )
                .layer(require_auth.clone()),
        );

    let me_routes = Router::new()
        .route("/enrollments", get(enrollment::my_enrollments))
        .layer(require_auth.clone());

    let lesson_routes = Router::new()
        .route("/{id}", get(course::get_lesson))
        .route("/{id}/complete", post(course::complete_lesson))
        .layer(require_auth.clone());

    let quiz_routes = Router::new()
        .route("/{id}/leaderboard", get(quiz::get_leaderboard))
        // Protected quiz routes
        .merge(
            Router::new()
                .route("/{id}", get(quiz::get_quiz))
                .route(
                    "/{id}/attempts",
                    post(quiz::start_attempt).get(quiz::list_attempts),
                )
                .layer(require_auth.clone()),
        );

    let attempt_routes = Router::new()
        .route("/{id}", get(attempt::get_attempt))
        .route("/{id}/answers", post(attempt::submit_answer))
        .route("/{id}/answers/bulk", post(attempt::submit_answers_bulk))
        .route("/{id}/finish", post(attempt::finish_attempt))
        .layer(require_auth.clone());

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users))
        .route(
            "/courses",
            get(admin::list_all_courses).post(admin::create_course),
        )
        .route(
            "/courses/{id}",
            put(admin::update_course).delete(admin::delete_course),
        )
        .route("/courses/{id}/lessons", post(admin::create_lesson))
        .route("/courses/{id}/quizzes", post(admin::create_quiz))
        .route(
            "/lessons/{id}",
            put(admin::update_lesson).delete(admin::delete_lesson),
        )
        .route(
            "/quizzes/{id}",
            get(admin::get_quiz_full)
                .put(admin::update_quiz)
                .delete(admin::delete_quiz),
        )
        .route("/quizzes/{id}/questions", post(admin::add_question))
        .route("/questions/{id}", delete(admin::delete_question))
        // Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(require_auth);

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/courses", course_routes)
        .nest("/api/me", me_routes)
        .nest("/api/lessons", lesson_routes)
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/attempts", attempt_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
