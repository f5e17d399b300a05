//! HTTP API gateway for Kokua.
//!
//! Exposes the REST surface the chat frontends speak:
//!
//! - `GET  /`                         — welcome message
//! - `GET  /health`                   — service + model status
//! - `POST /ask`                      — send a message, get a reply
//! - `POST /register`                 — create an account
//! - `POST /token`                    — password login (form-encoded)
//! - `GET  /users/me`                 — current user
//! - `GET  /sessions`                 — list the caller's chat sessions
//! - `GET/PATCH/DELETE /sessions/{id}`— read / retitle / delete one session
//! - `GET/DELETE /sessions/{id}/messages` — read / clear the message log
//!
//! Built on Axum. The conversational core (`ChatService`) and the durable
//! history log are injected by the process entry point; the gateway owns
//! only HTTP framing, auth, and persistence wiring.

pub mod auth;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    routing::{delete, get, patch, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

use kokua_core::error::HistoryError;
use kokua_core::history::{HistoryStore, MessageRecord, SessionRecord, UserRecord};
use kokua_service::ChatService;

use auth::{AuthUser, OptionalAuthUser};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub service: Arc<ChatService>,
    pub history: Arc<dyn HistoryStore>,
    pub auth: kokua_config::AuthConfig,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState, config: &kokua_config::GatewayConfig) -> Router {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ask", post(ask_handler))
        .route("/register", post(auth::register_handler))
        .route("/token", post(auth::token_handler))
        .route("/users/me", get(auth::me_handler))
        .route("/sessions", get(list_sessions_handler))
        .route("/sessions/{id}", get(get_session_handler))
        .route("/sessions/{id}", patch(update_session_handler))
        .route("/sessions/{id}", delete(delete_session_handler))
        .route("/sessions/{id}/messages", get(list_messages_handler))
        .route("/sessions/{id}/messages", delete(clear_messages_handler))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
///
/// Builds the provider, conversational core, and history backend once and
/// shares them via `Arc` — no process-wide singletons.
pub async fn start(config: kokua_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let provider = match kokua_providers::build_from_config(&config) {
        Ok(provider) => Some(provider),
        Err(e) => {
            warn!(error = %e, "Remote model unavailable, the service will run degraded");
            None
        }
    };

    let service = Arc::new(ChatService::new(
        provider,
        config.generation.clone(),
        Duration::from_secs(config.vertex.request_timeout_secs),
    ));
    service.initialize().await;

    let history: Arc<dyn HistoryStore> =
        Arc::new(kokua_history::SqliteHistory::new(&config.database.url).await?);

    let state = Arc::new(GatewayState {
        service,
        history,
        auth: config.auth.clone(),
    });

    let app = build_router(state, &config.gateway);

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Request / Response types ---

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
struct WelcomeResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    ai_ready: bool,
    degraded: bool,
}

#[derive(Deserialize)]
struct AskRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct AskResponse {
    reply: String,
    session_id: String,
}

#[derive(Deserialize)]
struct UpdateSessionRequest {
    title: String,
}

#[derive(Serialize)]
struct SessionListResponse {
    sessions: Vec<SessionRecord>,
}

#[derive(Serialize)]
struct SessionDetailResponse {
    #[serde(flatten)]
    session: SessionRecord,
    messages: Vec<MessageRecord>,
}

#[derive(Serialize)]
struct MessageListResponse {
    messages: Vec<MessageRecord>,
}

// --- Handlers ---

async fn root_handler() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: "Welcome to KiloK\u{14d}kua \u{2013} The Hawai\u{2bb}i Climate AI Concierge API",
    })
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        ai_ready: state.service.is_ready(),
        degraded: state.service.is_degraded(),
    })
}

async fn ask_handler(
    State(state): State<SharedState>,
    OptionalAuthUser(user): OptionalAuthUser,
    Json(payload): Json<AskRequest>,
) -> Json<AskResponse> {
    info!(message_len = payload.message.len(), "Received chat message");

    let result = state
        .service
        .get_response(&payload.message, payload.session_id.as_deref())
        .await;

    // Persist the exchange keyed by the returned id. An empty id signals a
    // broken exchange; a whitespace-only message never touched a session.
    if !result.session_id.is_empty() && !payload.message.trim().is_empty() {
        if let Err(e) = persist_exchange(
            &state,
            &result.session_id,
            &payload.message,
            &result.reply,
            user.map(|u| u.id),
        )
        .await
        {
            warn!(session_id = %result.session_id, error = %e, "Failed to persist exchange");
        }
    }

    Json(AskResponse {
        reply: result.reply,
        session_id: result.session_id,
    })
}

/// Write one completed exchange to the history log, creating the session
/// row on first use.
async fn persist_exchange(
    state: &SharedState,
    session_id: &str,
    message: &str,
    reply: &str,
    user_id: Option<i64>,
) -> Result<(), HistoryError> {
    if state.history.session(session_id).await?.is_none() {
        state.history.create_session(session_id, user_id).await?;
    }
    state.history.add_message(session_id, message, true).await?;
    state.history.add_message(session_id, reply, false).await?;
    Ok(())
}

async fn list_sessions_handler(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> Result<Json<SessionListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let sessions = state
        .history
        .sessions_for_user(user.id)
        .await
        .map_err(history_error)?;
    Ok(Json(SessionListResponse { sessions }))
}

async fn get_session_handler(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<SessionDetailResponse>, (StatusCode, Json<ErrorResponse>)> {
    let session = owned_session(&state, &user, &id).await?;
    let messages = state.history.messages(&id).await.map_err(history_error)?;
    Ok(Json(SessionDetailResponse { session, messages }))
}

async fn update_session_handler(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateSessionRequest>,
) -> Result<Json<SessionRecord>, (StatusCode, Json<ErrorResponse>)> {
    owned_session(&state, &user, &id).await?;
    let session = state
        .history
        .update_title(&id, &payload.title)
        .await
        .map_err(history_error)?;
    Ok(Json(session))
}

async fn delete_session_handler(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    owned_session(&state, &user, &id).await?;
    state
        .history
        .delete_session(&id)
        .await
        .map_err(history_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_messages_handler(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageListResponse>, (StatusCode, Json<ErrorResponse>)> {
    owned_session(&state, &user, &id).await?;
    let messages = state.history.messages(&id).await.map_err(history_error)?;
    Ok(Json(MessageListResponse { messages }))
}

async fn clear_messages_handler(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    owned_session(&state, &user, &id).await?;
    state
        .history
        .clear_messages(&id)
        .await
        .map_err(history_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Fetch a session and check it belongs to the caller. Sessions owned by
/// someone else (or by nobody) come back as 404 rather than 403.
async fn owned_session(
    state: &SharedState,
    user: &UserRecord,
    id: &str,
) -> Result<SessionRecord, (StatusCode, Json<ErrorResponse>)> {
    state
        .history
        .session(id)
        .await
        .map_err(history_error)?
        .filter(|s| s.user_id == Some(user.id))
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("Chat session {id} not found"),
                }),
            )
        })
}

/// Map a history error to an HTTP status.
pub(crate) fn history_error(e: HistoryError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        HistoryError::Conflict(_) => StatusCode::BAD_REQUEST,
        HistoryError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %e, "History backend failure");
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

pub(crate) fn internal_error(message: String) -> (StatusCode, Json<ErrorResponse>) {
    error!(error = %message, "Internal gateway error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: message }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use kokua_core::{GenerateRequest, GenerationConfig, ModelError, ModelProvider};
    use kokua_history::InMemoryHistory;
    use tower::ServiceExt;

    /// A provider that always answers with a fixed reply.
    struct CannedProvider {
        reply: String,
    }

    #[async_trait]
    impl ModelProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, _request: GenerateRequest) -> Result<String, ModelError> {
            Ok(self.reply.clone())
        }

        async fn smoke_test(&self) -> Result<(), ModelError> {
            Ok(())
        }
    }

    fn test_state() -> SharedState {
        let provider = Arc::new(CannedProvider {
            reply: "Sea levels around Hawai\u{2bb}i are rising...".into(),
        });
        let service = Arc::new(ChatService::new(
            Some(provider),
            GenerationConfig::default(),
            Duration::from_secs(5),
        ));
        Arc::new(GatewayState {
            service,
            history: Arc::new(InMemoryHistory::new()),
            auth: kokua_config::AuthConfig::default(),
        })
    }

    fn test_app(state: SharedState) -> Router {
        build_router(state, &kokua_config::GatewayConfig::default())
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// Register a user and return a bearer token for them.
    async fn registered_token(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/register",
                serde_json::json!({
                    "username": "leilani",
                    "email": "leilani@example.com",
                    "password": "hunter2hunter2"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/token")
                    .header("Content-Type", "application/x-www-form-urlencoded")
                    .body(Body::from("username=leilani&password=hunter2hunter2"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        json["access_token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_endpoint_reports_model_state() {
        let state = test_state();
        state.service.initialize().await;
        let app = test_app(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["ai_ready"], true);
        assert_eq!(json["degraded"], false);
    }

    #[tokio::test]
    async fn root_returns_welcome() {
        let app = test_app(test_state());

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert!(json["message"].as_str().unwrap().contains("Concierge"));
    }

    #[tokio::test]
    async fn ask_returns_reply_and_persists_exchange() {
        let state = test_state();
        let app = test_app(state.clone());

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/ask",
                serde_json::json!({ "message": "Tell me about sea level rise" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let session_id = json["session_id"].as_str().unwrap().to_string();
        assert!(!session_id.is_empty());
        assert_eq!(
            json["reply"],
            "Sea levels around Hawai\u{2bb}i are rising..."
        );

        let messages = state.history.messages(&session_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_user);
        assert_eq!(messages[0].content, "Tell me about sea level rise");
        assert!(!messages[1].is_user);

        // Second turn reuses the session and appends to the log.
        let response = app
            .oneshot(json_request(
                "POST",
                "/ask",
                serde_json::json!({ "message": "And rainfall?", "session_id": session_id }),
            ))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["session_id"], session_id);
        assert_eq!(state.history.messages(&session_id).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn ask_with_sentinel_id_creates_fresh_session() {
        let app = test_app(test_state());

        let response = app
            .oneshot(json_request(
                "POST",
                "/ask",
                serde_json::json!({ "message": "hello", "session_id": "undefined" }),
            ))
            .await
            .unwrap();

        let json = body_json(response).await;
        let session_id = json["session_id"].as_str().unwrap();
        assert!(!session_id.is_empty());
        assert_ne!(session_id, "undefined");
    }

    #[tokio::test]
    async fn empty_message_is_not_persisted() {
        let state = test_state();
        let app = test_app(state.clone());

        let response = app
            .oneshot(json_request(
                "POST",
                "/ask",
                serde_json::json!({ "message": "   ", "session_id": "keep-me" }),
            ))
            .await
            .unwrap();

        let json = body_json(response).await;
        assert_eq!(json["session_id"], "keep-me");
        assert_eq!(json["reply"], kokua_service::EMPTY_PROMPT_REPLY);
        assert!(state.history.session("keep-me").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn register_token_me_flow() {
        let app = test_app(test_state());
        let token = registered_token(&app).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/users/me")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["username"], "leilani");
        assert!(json.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn me_without_token_is_unauthorized() {
        let app = test_app(test_state());

        let response = app
            .oneshot(Request::builder().uri("/users/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let app = test_app(test_state());
        registered_token(&app).await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/token")
                    .header("Content-Type", "application/x-www-form-urlencoded")
                    .body(Body::from("username=leilani&password=wrong-password"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let app = test_app(test_state());
        registered_token(&app).await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/register",
                serde_json::json!({
                    "username": "leilani",
                    "email": "leilani@example.com",
                    "password": "hunter2hunter2"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let app = test_app(test_state());

        let response = app
            .oneshot(json_request(
                "POST",
                "/register",
                serde_json::json!({
                    "username": "kai",
                    "email": "kai@example.com",
                    "password": "short"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn authed_ask_owns_the_session() {
        let state = test_state();
        let app = test_app(state.clone());
        let token = registered_token(&app).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ask")
                    .header("Content-Type", "application/json")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::from(
                        serde_json::json!({ "message": "hello" }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        let session_id = json["session_id"].as_str().unwrap().to_string();

        // The session shows up in the caller's listing.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/sessions")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["sessions"][0]["id"], session_id);

        // Retitle, read back, then delete.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri(format!("/sessions/{session_id}"))
                    .header("Content-Type", "application/json")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::from(
                        serde_json::json!({ "title": "Sea level chat" }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["title"], "Sea level chat");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{session_id}"))
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["messages"].as_array().unwrap().len(), 2);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/sessions/{session_id}"))
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.history.session(&session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn anonymous_session_is_not_visible_to_users() {
        let state = test_state();
        let app = test_app(state.clone());

        // Anonymous ask creates an unowned session.
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/ask",
                serde_json::json!({ "message": "hello" }),
            ))
            .await
            .unwrap();
        let json = body_json(response).await;
        let session_id = json["session_id"].as_str().unwrap().to_string();

        let token = registered_token(&app).await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{session_id}"))
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
