// 🌐 Household API Server - axum routes, websocket fan-out, status mapping
//
// Every household-scoped route runs the role guard with a fixed minimum role
// before touching the store. Websocket clients join household groups
// separately via `join-household` frames.

mod handlers;
mod principal;
mod response;
mod ws;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::channel::ChannelManager;
use crate::config::ServerConfig;
use crate::error::ChannelError;
use crate::guard::RoleGuard;
use crate::notifier::BudgetNotifier;
use crate::store::{HouseholdStore, SqliteHouseholdStore};

pub use principal::{OptionalPrincipal, USER_EMAIL_HEADER, USER_ID_HEADER, USER_NAME_HEADER};
pub use response::ApiResponse;

// ============================================================================
// SHARED STATE
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn HouseholdStore>,
    pub guard: RoleGuard,
    pub channels: Arc<ChannelManager>,
    pub notifier: BudgetNotifier,
    pub allowed_origins: Arc<Vec<String>>,
    pub require_join_auth: bool,
    pub allow_missing_origin: bool,
}

impl AppState {
    pub fn builder(store: Arc<dyn HouseholdStore>) -> AppStateBuilder {
        AppStateBuilder {
            store,
            channels: None,
            allowed_origins: Vec::new(),
            require_join_auth: true,
            allow_missing_origin: false,
        }
    }

    pub fn origin_allowed(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/');
        self.allowed_origins.iter().any(|allowed| allowed == origin)
    }
}

/// Wires the channel manager into every component that needs it.
pub struct AppStateBuilder {
    store: Arc<dyn HouseholdStore>,
    channels: Option<Arc<ChannelManager>>,
    allowed_origins: Vec<String>,
    require_join_auth: bool,
    allow_missing_origin: bool,
}

impl AppStateBuilder {
    pub fn channels(mut self, channels: Arc<ChannelManager>) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    pub fn require_join_auth(mut self, required: bool) -> Self {
        self.require_join_auth = required;
        self
    }

    pub fn allow_missing_origin(mut self, allowed: bool) -> Self {
        self.allow_missing_origin = allowed;
        self
    }

    /// Fails with `NotInitialized` if no channel manager was supplied.
    pub fn build(self) -> Result<AppState, ChannelError> {
        let channels = self.channels.ok_or(ChannelError::NotInitialized)?;

        Ok(AppState {
            guard: RoleGuard::new(self.store.clone()),
            notifier: BudgetNotifier::new(channels.clone()),
            store: self.store,
            channels,
            allowed_origins: Arc::new(self.allowed_origins),
            require_join_auth: self.require_join_auth,
            allow_missing_origin: self.allow_missing_origin,
        })
    }
}

// ============================================================================
// ROUTER
// ============================================================================

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/households", get(handlers::list_households))
        .route("/households/create", post(handlers::create_household))
        .route("/households/join", post(handlers::join_household))
        .route("/households/:household_id", get(handlers::get_household))
        .route("/budget/status/:household_id", get(handlers::get_budget_status))
        .route("/budget/limit/:household_id", put(handlers::update_budget_limit))
        .route("/budget/expenses/:household_id", post(handlers::record_expense))
        .route("/alerts", get(handlers::list_alerts))
        .route("/alerts/:alert_id/read", put(handlers::mark_alert_read))
        .route("/alerts/check/:household_id", post(handlers::check_budget));

    let cors = cors_layer(&state.allowed_origins);

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// MAIN SERVER
// ============================================================================

pub async fn run(config: ServerConfig) -> Result<()> {
    config.validate()?;
    let addr = config.listen_addr()?;

    let store = SqliteHouseholdStore::open(&config.db_path)?;
    info!(db_path = ?config.db_path, "Household store opened");

    let channels = Arc::new(ChannelManager::with_buffer(config.channel_buffer));
    let state = AppState::builder(Arc::new(store))
        .channels(channels)
        .allowed_origins(config.origins())
        .require_join_auth(config.require_join_auth)
        .allow_missing_origin(config.allow_missing_origin)
        .build()
        .context("Realtime channels must exist before serving household traffic")?;

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!(%addr, "Server listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
