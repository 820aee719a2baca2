//! Realtime gateway for Mukstagram clients.
//!
//! Serves the `/api/ws/connect` websocket plus two small HTTP endpoints: the
//! online-user snapshot and a notification push hook for the REST backend.

pub mod auth;
mod handler;
pub mod hub;
pub mod limits;
mod session;

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mukstagram_models::notification::NotificationKind;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{validate_token, ACCESS_TOKEN_TYPE, SERVICE_TOKEN_TYPE};
use crate::hub::{AllConnected, FollowerDirectory, Hub};
use crate::limits::{GatewayLimits, UserRateLimits};

#[derive(Clone)]
pub struct GatewayState {
    pub hub: Arc<Hub>,
    pub rate_limits: Arc<UserRateLimits>,
    jwt_secret: Arc<str>,
}

impl GatewayState {
    pub fn new(jwt_secret: &str, limits: GatewayLimits) -> Self {
        Self::with_followers(jwt_secret, limits, Arc::new(AllConnected))
    }

    pub fn with_followers(
        jwt_secret: &str,
        limits: GatewayLimits,
        followers: Arc<dyn FollowerDirectory>,
    ) -> Self {
        Self {
            hub: Arc::new(Hub::new(followers)),
            rate_limits: Arc::new(UserRateLimits::new(limits)),
            jwt_secret: Arc::from(jwt_secret),
        }
    }

    /// Periodically prune idle rate limiter entries.
    pub fn spawn_maintenance(&self, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let limits = Arc::clone(&self.rate_limits);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                limits.prune();
                tracing::trace!("rate limiter cleanup: pruned stale entries");
            }
        })
    }
}

pub fn gateway_router() -> Router<GatewayState> {
    Router::new()
        .route("/api/ws/connect", get(ws_upgrade))
        .route("/api/ws/online-users", get(online_users))
        .route("/api/ws/notify/{user_id}", post(notify_user))
}

/// The gateway routes with state and request tracing applied.
pub fn app(state: GatewayState) -> Router {
    gateway_router()
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    token: Option<String>,
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<GatewayState>,
) -> Response {
    let Some(token) = params.token.filter(|t| !t.is_empty()) else {
        return (StatusCode::UNAUTHORIZED, "Authentication failed").into_response();
    };
    let claims = match validate_token(&token, &state.jwt_secret, ACCESS_TOKEN_TYPE) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting gateway connection");
            return (StatusCode::UNAUTHORIZED, "Authentication failed").into_response();
        }
    };
    ws.on_upgrade(move |socket| handler::handle_connection(socket, state, claims.sub))
}

async fn online_users(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({ "online_users": state.hub.online_users() }))
}

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    pub notification_type: NotificationKind,
    #[serde(default)]
    pub data: Value,
}

async fn notify_user(
    State(state): State<GatewayState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<NotifyRequest>,
) -> Response {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let Some(token) = bearer else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    if let Err(e) = validate_token(token, &state.jwt_secret, SERVICE_TOKEN_TYPE) {
        tracing::warn!(error = %e, "rejecting notification push");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let delivered = state
        .hub
        .send_notification(&user_id, body.notification_type, body.data);
    Json(json!({ "delivered": delivered })).into_response()
}
