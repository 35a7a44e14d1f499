// HTTP API: accounts, login sessions, profile counters, game history and
// the leaderboard.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};

use tictactoe_core::Profile;

use crate::db::{Database, GameSummary, LeaderboardEntry};

/// Name of the cookie carrying the login session token.
pub const SESSION_COOKIE: &str = "session";

/// How many players `/api/leaderboard` lists.
pub const LEADERBOARD_SIZE: u32 = 100;

const MAX_PAGE_SIZE: u32 = 100;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct HttpState {
    pub db: Arc<Database>,
    pub session_lifetime: Duration,
    pub default_page_size: u32,
}

/// Build the API router.
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/user/profile", get(profile))
        .route("/api/user/games", get(list_games))
        .route("/api/leaderboard", get(leaderboard))
        .with_state(state)
}

/// Serve the API on `listener` until the task is cancelled.
pub async fn serve(listener: TcpListener, state: HttpState) -> anyhow::Result<()> {
    info!("HTTP API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An error reply rendered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!("Request failed: {e:#}");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Extract the session token from a `Cookie` header value.
pub fn session_token_from_cookie(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn session_cookie(token: &str, lifetime: Duration) -> String {
    format!(
        "{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        lifetime.as_secs()
    )
}

/// Username behind the request's session cookie, or 401.
fn current_user(state: &HttpState, headers: &HeaderMap) -> Result<String, ApiError> {
    let token = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(session_token_from_cookie);
    let Some(token) = token else {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Please log in."));
    };
    state
        .db
        .session_user(&token)?
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Please log in."))
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

async fn register(
    State(state): State<HttpState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Username and password are required",
        ));
    }
    if !req.email.contains('@') {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Invalid email address"));
    }

    if !state.db.create_user(username, req.email.trim(), &req.password)? {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "Username or email already exists",
        ));
    }
    info!("Registered user {username}");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User registered".into(),
        }),
    ))
}

async fn login(
    State(state): State<HttpState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    if !state.db.verify_login(&req.username, &req.password)? {
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "Invalid username or password",
        ));
    }
    let token = state.db.create_session(&req.username, state.session_lifetime)?;
    info!("{} logged in", req.username);
    Ok((
        [(
            header::SET_COOKIE,
            session_cookie(&token, state.session_lifetime),
        )],
        Json(MessageResponse {
            message: "Logged in".into(),
        }),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// User data
// ---------------------------------------------------------------------------

async fn profile(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> Result<Json<Profile>, ApiError> {
    let username = current_user(&state, &headers)?;
    state
        .db
        .profile(&username)?
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "User not found"))
}

#[derive(Debug, Deserialize)]
pub struct GamesQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct GamesPage {
    pub games: Vec<GameSummary>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub next: Option<String>,
    pub back: Option<String>,
}

/// Links to the neighbouring pages, when they exist.
pub fn page_links(page: u32, per_page: u32, total: u64) -> (Option<String>, Option<String>) {
    let link = |p: u32| format!("/api/user/games?page={p}&per_page={per_page}");
    let next = (u64::from(page) * u64::from(per_page) < total).then(|| link(page + 1));
    let back = (page > 1).then(|| link(page - 1));
    (next, back)
}

async fn list_games(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Query(query): Query<GamesQuery>,
) -> Result<Json<GamesPage>, ApiError> {
    current_user(&state, &headers)?;

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query
        .per_page
        .unwrap_or(state.default_page_size)
        .clamp(1, MAX_PAGE_SIZE);

    let (games, total) = state.db.list_games(page, per_page)?;
    let (next, back) = page_links(page, per_page, total);
    Ok(Json(GamesPage {
        games,
        total,
        page,
        per_page,
        next,
        back,
    }))
}

// ---------------------------------------------------------------------------
// Leaderboard
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RankedEntry {
    #[serde(flatten)]
    pub entry: LeaderboardEntry,
    pub rank: u64,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub top_players: Vec<LeaderboardEntry>,
    pub current_player: RankedEntry,
}

async fn leaderboard(
    State(state): State<HttpState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let Some(username) = query.username.filter(|u| !u.is_empty()) else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Username is required",
        ));
    };

    let top_players = state.db.leaderboard(LEADERBOARD_SIZE)?;
    let entry = state.db.leaderboard_entry(&username)?;
    let rank = state.db.user_rank(&username)?;
    let (Some(entry), Some(rank)) = (entry, rank) else {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "User not found"));
    };

    Ok(Json(LeaderboardResponse {
        top_players,
        current_player: RankedEntry { entry, rank },
    }))
}
