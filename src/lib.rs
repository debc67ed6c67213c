pub mod catalog;
pub mod config;
pub mod db;
pub mod engine;
pub mod marketdata;
pub mod models;
pub mod store;
pub mod strategies;
pub mod handlers {
    pub mod candidates;
    pub mod refresh;
    pub mod signals;
    pub mod stats;
    pub mod strategies;
}

use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Settings;
pub use db::Db;

use engine::refresh::{RefreshContext, RefreshCoordinator};
use marketdata::MarketDataProvider;
use strategies::StrategyRegistry;

/// Application state shared across handlers
pub struct AppState {
    pub db: Db,
    pub settings: Settings,
    pub coordinator: Arc<RefreshCoordinator>,
    pub refresh_ctx: Arc<RefreshContext>,
}

impl AppState {
    pub fn new(db: Db, settings: Settings, provider: Arc<dyn MarketDataProvider>) -> Self {
        let refresh_ctx = Arc::new(RefreshContext {
            db: db.clone(),
            provider,
            registry: StrategyRegistry::builtin(),
            engine: settings.engine.clone(),
        });
        let coordinator = Arc::new(RefreshCoordinator::new(
            settings.engine.refresh.wait_poll_interval_ms,
            settings.engine.refresh.wait_max_attempts,
        ));
        Self {
            db,
            settings,
            coordinator,
            refresh_ctx,
        }
    }
}

/// Build the API router
pub async fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes = Router::new()
        .route("/candidates", get(handlers::candidates::list_candidates))
        .route("/candidates/feedback", post(handlers::candidates::submit_feedback))
        .route("/candidates/feedback/stats", get(handlers::candidates::feedback_stats))
        .route("/signals", get(handlers::signals::list_signals))
        .route("/signals/{signal_id}/factors", get(handlers::signals::get_factor_breakdown))
        .route("/regimes", get(handlers::signals::list_regimes))
        .route("/risk", get(handlers::signals::list_risk_snapshots))
        .route("/strategies", get(handlers::strategies::list_strategies))
        .route("/strategies/{code}", patch(handlers::strategies::update_strategy))
        .route("/strategies/weight-history", get(handlers::strategies::list_weight_history))
        .route("/refresh", post(handlers::refresh::trigger_refresh))
        .route("/refresh/status", get(handlers::refresh::refresh_status))
        .route("/outcomes/evaluate", post(handlers::refresh::evaluate_outcomes))
        .route("/weights/rebalance", post(handlers::refresh::rebalance_weights))
        .route("/stats", get(handlers::stats::get_stats))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(handlers::refresh::health))
        .with_state(state)
        .nest("/v1", routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
