use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{AppConfig, SecurityConfig};
use crate::database::repository::{EdgeStore, UserStore};
use crate::handlers::{protected, public};
use crate::middleware::{jwt_auth_middleware, validate_user_middleware};
use crate::services::{NetworkService, UserService};

/// Shared handler state: configuration, services and the store behind them
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub networks: NetworkService,
    pub users: UserService,
    pub edges: Arc<dyn EdgeStore>,
}

impl AppState {
    pub fn new<S>(config: AppConfig, store: Arc<S>) -> Self
    where
        S: EdgeStore + UserStore + 'static,
    {
        let edges: Arc<dyn EdgeStore> = store.clone();
        let user_store: Arc<dyn UserStore> = store;

        Self {
            networks: NetworkService::new(Arc::clone(&edges), config.network.clone()),
            users: UserService::new(user_store, config.security.clone()),
            edges,
            config: Arc::new(config),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let api = &state.config.api;
    let mut router = Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(public_routes())
        // Bearer token required
        .merge(protected_routes(state.clone()))
        .layer(DefaultBodyLimit::max(api.max_request_size_bytes))
        .with_state(state.clone());

    if state.config.security.enable_cors {
        router = router.layer(cors_layer(&state.config.security));
    }
    if api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    router
}

fn public_routes() -> Router<AppState> {
    use public::{auth, users};

    Router::new()
        .route("/auth/login", post(auth::login_post))
        .route("/users", post(users::register_post))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    use protected::{networks, session, users};

    Router::new()
        .route("/auth/whoami", get(session::whoami_get))
        .route("/users/:id", get(users::user_get).delete(users::user_delete))
        .route("/users/:id/networks", get(users::user_networks_get))
        .route("/networks/upload", post(networks::network_upload_post))
        .route("/networks/:id", axum::routing::delete(networks::network_delete))
        .route("/networks/:id/update", post(networks::network_update_post))
        .route("/networks/:id/edges", get(networks::network_edges_get))
        .route("/networks/:id/generations", get(networks::network_generations_get))
        // Layers run bottom-up: token first, then the user lookup
        .route_layer(from_fn_with_state(state.clone(), validate_user_middleware))
        .route_layer(from_fn_with_state(state, jwt_auth_middleware))
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if security.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Road Network API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Versioned road network storage with point-in-time reconstruction",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "auth": "/auth/login (public), /auth/whoami (protected)",
                "users": "/users (public registration), /users/:id[/networks] (protected)",
                "networks": "/networks/upload, /networks/:id[/update|/edges|/generations] (protected)",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.edges.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": true,
                    "message": "database unavailable",
                    "code": "SERVICE_UNAVAILABLE",
                    "data": {
                        "status": "degraded",
                        "timestamp": now
                    }
                })),
            )
        }
    }
}
