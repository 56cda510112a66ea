use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auction::{time_left, AuctionHouse};
use crate::database::ShapiroDatabase;
use crate::memory::AnswerStore;
use crate::responder::Responder;
use crate::runtime::BackendRuntime;

pub const LIVENESS_MESSAGE: &str = "🤡 Шапиро ИИ API работает!";

#[derive(Clone)]
pub struct ServerState {
    pub db: Arc<ShapiroDatabase>,
    pub answers: AnswerStore,
    pub auction: AuctionHouse,
    pub responder: Arc<Responder>,
}

impl ServerState {
    pub fn from_runtime(runtime: &BackendRuntime) -> Self {
        Self {
            db: runtime.db.clone(),
            answers: runtime.answers.clone(),
            auction: runtime.auction.clone(),
            responder: runtime.responder.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RootResponse {
    message: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(alias = "user_id")]
    user_id: i64,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    answer: String,
    lord_appeal: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuctionResponse {
    lord_id: Option<i64>,
    lord_username: Option<String>,
    price: i64,
    time_left: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuyQuery {
    #[serde(alias = "user_id")]
    user_id: i64,
    username: String,
}

#[derive(Debug, Serialize)]
struct BuyResponse {
    success: bool,
    message: String,
}

#[derive(Debug, Serialize)]
struct ProfileResponse {
    memories: usize,
    messages: usize,
}

pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/chat", post(chat))
        .route("/api/auction", get(auction))
        .route("/api/buy", post(buy_lordship))
        .route("/api/profile/:user_id", get(profile))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve_backend(runtime: BackendRuntime) -> Result<()> {
    let bind_addr = runtime
        .config
        .bind_addr
        .parse::<SocketAddr>()
        .context("Invalid bind_addr (expected host:port)")?;

    let state = Arc::new(ServerState::from_runtime(&runtime));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind server to {}", bind_addr))?;
    tracing::info!("Shapiro backend listening on http://{}", bind_addr);
    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: LIVENESS_MESSAGE,
    })
}

async fn chat(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    if body.message.trim().is_empty() {
        return Err(bad_request("message cannot be empty"));
    }

    let now = Utc::now();
    let reply = state
        .responder
        .respond(body.user_id, &body.message, now)
        .await
        .map_err(internal_error)?;

    state
        .db
        .add_chat_exchange(body.user_id, &body.message, &reply.answer, now, Utc::now())
        .map_err(internal_error)?;

    Ok(Json(ChatResponse {
        answer: reply.answer,
        lord_appeal: reply.lord_appeal,
    }))
}

async fn auction(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<AuctionResponse>, (StatusCode, String)> {
    let record = state.auction.read().map_err(internal_error)?;
    let time_left = time_left(&record, Utc::now()).to_string();
    Ok(Json(AuctionResponse {
        lord_id: record.lord_id,
        lord_username: record.lord_username,
        price: record.price,
        time_left,
    }))
}

async fn buy_lordship(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<BuyQuery>,
) -> Result<Json<BuyResponse>, (StatusCode, String)> {
    let username = query.username.trim();
    if username.is_empty() {
        return Err(bad_request("username cannot be empty"));
    }

    state
        .auction
        .bid(query.user_id, username, Utc::now())
        .map_err(internal_error)?;

    Ok(Json(BuyResponse {
        success: true,
        message: format!("👑 @{} — новый ПОВЕЛИТЕЛЬ!", username),
    }))
}

async fn profile(
    State(state): State<Arc<ServerState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<ProfileResponse>, (StatusCode, String)> {
    let memories = state.answers.count_for_user(user_id).map_err(internal_error)?;
    let messages = state.db.count_messages(user_id).map_err(internal_error)?;
    Ok(Json(ProfileResponse { memories, messages }))
}

fn bad_request(message: &str) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, message.to_string())
}

fn internal_error(error: anyhow::Error) -> (StatusCode, String) {
    tracing::error!("Request failed: {:#}", error);
    (StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
}
