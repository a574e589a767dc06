use axum::{
    Router,
    routing::{get, post},
};

use crate::{
    AppState,
    handlers::{crawl, leaderboard, subjects},
};

/// Create all v1 API routes
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .merge(create_crawl_routes())
        .route(
            "/leaderboards/{scope}/{stat}",
            get(leaderboard::get_leaderboard_handler),
        )
        .route(
            "/subjects/{id}/textures/{slot}",
            get(subjects::texture_history_handler),
        )
}

fn create_crawl_routes() -> Router<AppState> {
    Router::new()
        .route("/crawl/{job}/run", post(crawl::run_crawl_handler))
        .route("/crawl/{job}/stream", get(crawl::stream_crawl_handler))
        .route("/crawl/{job}/queue", get(crawl::queue_size_handler))
        .route("/crawl/{job}/runs", get(crawl::recent_runs_handler))
}
