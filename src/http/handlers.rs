use super::state::AppState;
use crate::directory::Role;
use crate::error::RelayError;
use crate::session::{BroadcastSession, SessionStats};
use crate::venue::VenueId;
use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use futures::{future, StreamExt};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTokenRequest {
    /// Push token of the device
    #[serde(default, deserialize_with = "string_or_number")]
    pub token: Option<String>,

    /// `listener` or `broadcaster`
    #[serde(default, deserialize_with = "string_or_number")]
    pub role: Option<String>,

    #[serde(default, alias = "masjidId", deserialize_with = "string_or_number")]
    pub venue_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LiveParams {
    #[serde(rename = "venueId", alias = "broadcastId", alias = "masjidId")]
    pub venue_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Mobile clients send venue ids both as JSON strings and numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn relay_error_response(err: &RelayError) -> Response {
    let status = match err {
        RelayError::InvalidVenue(_) => StatusCode::BAD_REQUEST,
        RelayError::VenueBusy(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /register-token
/// Register a device token for a venue under one role
pub async fn register_token(
    State(state): State<AppState>,
    payload: Result<Json<RegisterTokenRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            warn!("Invalid registration body: {}", rejection);
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let token = req.token.as_deref().map(str::trim).unwrap_or_default();
    if token.is_empty() {
        warn!("Invalid registration: missing token");
        return error_response(StatusCode::BAD_REQUEST, "Token, role, or venueId missing/invalid");
    }

    let role = match req.role.as_deref().map(str::parse::<Role>) {
        Some(Ok(role)) => role,
        _ => {
            warn!("Invalid registration: role {:?}", req.role);
            return error_response(StatusCode::BAD_REQUEST, "Token, role, or venueId missing/invalid");
        }
    };

    let venue = match VenueId::from_optional(req.venue_id.as_deref()) {
        Ok(venue) => venue,
        Err(e) => {
            warn!("Invalid registration: {}", e);
            return error_response(StatusCode::BAD_REQUEST, "Token, role, or venueId missing/invalid");
        }
    };

    match state.directory.register(token, role, &venue).await {
        Ok(()) => {
            info!(venue = %venue, "Registered {:?}", role);
            (StatusCode::OK, "OK").into_response()
        }
        Err(e) => {
            error!("Failed to register token: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to register token")
        }
    }
}

/// GET /live?venueId=..
/// Upgrade a broadcaster connection; rejected before the upgrade if the session can't start
pub async fn live_socket(
    State(state): State<AppState>,
    Query(params): Query<LiveParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let session = match state.manager.accept(params.venue_id.as_deref()).await {
        Ok(session) => session,
        Err(e) => return relay_error_response(&e),
    };

    ws.on_upgrade(move |socket| relay_socket(session, socket))
}

/// Binary messages are PCM frames; close or a transport error ends the stream
async fn relay_socket(session: BroadcastSession, socket: WebSocket) {
    let venue = session.venue().clone();

    let frames = socket
        .take_while(|msg| {
            let open = match msg {
                Ok(Message::Close(_)) => false,
                Ok(_) => true,
                Err(e) => {
                    debug!("WebSocket transport error: {}", e);
                    false
                }
            };
            future::ready(open)
        })
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Binary(bytes)) => Some(bytes),
                _ => None,
            })
        });

    let stats = session.relay(frames).await;
    debug!(venue = %venue, "Socket finished after {} frames", stats.frames_relayed);
}

/// GET /broadcasts
/// List live sessions
pub async fn list_broadcasts(State(state): State<AppState>) -> Json<Vec<SessionStats>> {
    Json(state.manager.sessions())
}

/// GET /broadcasts/:venue_id
/// Status of the venue's live session
pub async fn get_broadcast(
    State(state): State<AppState>,
    Path(venue_id): Path<String>,
) -> Response {
    let venue = match VenueId::parse(&venue_id) {
        Ok(venue) => venue,
        Err(e) => return relay_error_response(&e),
    };

    match state.manager.session(&venue) {
        Some(stats) => (StatusCode::OK, Json(stats)).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("No live broadcast for venue {}", venue),
        ),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
