use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod certificate;
pub mod config;
pub mod db;
pub mod enrollment;
pub mod error;
pub mod models;
pub mod progress;
pub mod reviews;
pub mod routes;
pub mod state;
pub mod store;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(routes::router(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}
