use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod storage;

pub use config::Config;
pub use error::QuizError;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1/words", word_routes())
        .nest("/api/v1/quiz-sessions", quiz_session_routes(app_state.clone()))
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Serves `app` with the peer address attached to every request, so the
/// answer rate limit can tell direct clients apart.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

fn word_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(handlers::words::list_words).post(handlers::words::create_word),
        )
        .route("/random", get(handlers::words::random_word))
        .route("/bulk-delete", post(handlers::words::bulk_delete_words))
        .route("/import", post(handlers::words::import_words))
        .route(
            "/{id}",
            get(handlers::words::get_word)
                .patch(handlers::words::update_word)
                .delete(handlers::words::delete_word),
        )
        .route("/{id}/usage", post(handlers::words::record_word_usage))
}

fn quiz_session_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let answer_route = Router::new()
        .route("/{id}/answers", post(handlers::quiz_sessions::submit_answer))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::rate_limit::answer_rate_limit_middleware,
        ));

    Router::new()
        .route(
            "/",
            get(handlers::quiz_sessions::list_sessions)
                .post(handlers::quiz_sessions::create_session),
        )
        .route("/{id}", get(handlers::quiz_sessions::get_session))
        .route("/{id}/start", post(handlers::quiz_sessions::start_session))
        .route("/{id}/end", post(handlers::quiz_sessions::end_session))
        .route("/{id}/cancel", post(handlers::quiz_sessions::cancel_session))
        .route(
            "/{id}/current-word",
            get(handlers::quiz_sessions::get_current_word)
                .put(handlers::quiz_sessions::update_current_word),
        )
        .route(
            "/{id}/current-word/operator",
            get(handlers::quiz_sessions::get_operator_word),
        )
        .route("/{id}/attempts", get(handlers::quiz_sessions::list_attempts))
        .route("/{id}/stats", get(handlers::quiz_sessions::get_stats))
        .merge(answer_route)
}
