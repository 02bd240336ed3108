use axum::http::{header, HeaderValue, Method};
use axum::{middleware, Router};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::CorsLayer;

use crate::auth::accounts;
use crate::auth::middleware::JwtSecret;
use crate::projects::crud as project_crud;
use crate::state::AppState;
use crate::tasks::crud as task_crud;
use crate::ws::handler as ws_handler;

/// Copy the signing secret into request extensions, where the Claims
/// extractor expects it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Assemble the full router: REST surface, socket upgrade, middleware.
pub fn build_router(state: AppState) -> Router {
    // Credential endpoints are limited to bursts of 5 per IP, refilling
    // one slot every 12 seconds. Keyed off ConnectInfo<SocketAddr>.
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(12)
            .burst_size(5)
            .finish()
            .expect("Failed to build governor config"),
    );

    // The limiter accumulates per-IP state; prune it periodically
    let limiter = governor_config.limiter().clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            limiter.retain_recent();
        }
    });

    // /api/auth/me is JWT-guarded and stays outside the limiter
    let auth_routes = Router::new()
        .route("/api/auth/register", axum::routing::post(accounts::register))
        .route("/api/auth/login", axum::routing::post(accounts::login))
        .layer(GovernorLayer {
            config: governor_config,
        });

    let session_routes = Router::new().route("/api/auth/me", axum::routing::get(accounts::me));

    let project_routes = Router::new()
        .route("/api/projects", axum::routing::post(project_crud::create_project))
        .route("/api/projects", axum::routing::get(project_crud::list_projects))
        .route("/api/projects/{id}", axum::routing::get(project_crud::get_project))
        .route("/api/projects/{id}", axum::routing::patch(project_crud::update_project))
        .route("/api/projects/{id}", axum::routing::delete(project_crud::delete_project))
        .route(
            "/api/projects/{id}/members",
            axum::routing::post(project_crud::add_member),
        );

    let task_routes = Router::new()
        .route("/api/tasks", axum::routing::post(task_crud::create_task))
        .route(
            "/api/tasks/project/{project_id}",
            axum::routing::get(task_crud::list_project_tasks),
        )
        .route("/api/tasks/{id}", axum::routing::patch(task_crud::update_task))
        .route("/api/tasks/{id}", axum::routing::delete(task_crud::delete_task));

    // Socket auth rides the query string, not the Authorization header
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", axum::routing::get(health_check));

    // The frontend is served from a separate origin
    let cors = CorsLayer::new()
        .allow_origin(
            state
                .cors_origin
                .parse::<HeaderValue>()
                .expect("Invalid CORS origin"),
        )
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .merge(auth_routes)
        .merge(session_routes)
        .merge(project_routes)
        .merge(task_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(cors)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}
