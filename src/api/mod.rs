// HTTP API routes (leaderboards, build detail, player profiles, profile sync)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Json, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::catalog::CatalogProvider;
use crate::db::{Database, NewBuild, NewPlayer};
use crate::decode::{decode_build, decode_builds};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::model::{Game, PlayerSummary, ARTIFACT_SLOTS};
use crate::rank::{self, RankQuery, DEFAULT_PAGE_SIZE};
use crate::rate_limit::RateLimiter;

/// Upper bound on characters accepted in one profile sync.
const MAX_SYNC_BUILDS: usize = 64;
const MAX_NICKNAME_LEN: usize = 64;

// ── Request types ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LocaleParams {
    pub locale: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardParams {
    /// Comma-separated avatar ids.
    pub characters: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
    pub locale: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SyncProfileRequest {
    #[serde(flatten)]
    pub player: NewPlayer,
    #[serde(default)]
    pub builds: Vec<NewBuild>,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub catalogs: Arc<CatalogProvider>,
    pub rate_limiter: RateLimiter,
    pub default_locale: String,
}

impl AppState {
    fn locale<'a>(&'a self, requested: &'a Option<String>) -> &'a str {
        requested.as_deref().unwrap_or(&self.default_locale)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────

fn parse_game(raw: &str) -> AppResult<Game> {
    Game::parse(raw).ok_or_else(|| AppError::BadRequest(format!("unknown game: {raw}")))
}

/// Parse `"10000002, 10000089"` into ids. Empty segments are skipped.
pub fn parse_character_ids(raw: &str) -> AppResult<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| AppError::BadRequest(format!("invalid character id: {s}")))
        })
        .collect()
}

fn validate_sync(uid: &str, req: &SyncProfileRequest) -> AppResult<()> {
    if uid.is_empty() || !uid.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::BadRequest("uid must be numeric".into()));
    }
    let nickname = req.player.nickname.trim();
    if nickname.is_empty() || nickname.chars().count() > MAX_NICKNAME_LEN {
        return Err(AppError::BadRequest("nickname is required".into()));
    }
    if req.builds.len() > MAX_SYNC_BUILDS {
        return Err(AppError::BadRequest(format!(
            "at most {MAX_SYNC_BUILDS} builds per sync"
        )));
    }
    if let Some(b) = req.builds.iter().find(|b| b.artifacts.len() > ARTIFACT_SLOTS) {
        return Err(AppError::BadRequest(format!(
            "build for avatar {} has more than {ARTIFACT_SLOTS} artifacts",
            b.avatar_id
        )));
    }
    Ok(())
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    metrics::register_metrics();

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .route("/api/{game}/leaderboards/builds", get(leaderboard_builds))
        .route("/api/{game}/builds/{id}", get(get_build))
        .route(
            "/api/{game}/players/{uid}",
            get(get_player).put(sync_profile),
        )
        .route("/api/{game}/players/{uid}/builds", get(get_player_builds))
        .with_state(state)
        .layer(middleware::from_fn(track_metrics))
        .layer(CorsLayer::permissive())
}

async fn track_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let endpoint = metrics::normalize_path(req.uri().path());
    let start = Instant::now();

    let response = next.run(req).await;

    metrics::API_REQUESTS_TOTAL
        .with_label_values(&[&method, &endpoint, response.status().as_str()])
        .inc();
    metrics::API_REQUEST_DURATION_SECONDS
        .with_label_values(&[&endpoint])
        .observe(start.elapsed().as_secs_f64());
    response
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "buildboard-backend" }))
}

async fn get_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

// ── Leaderboard handlers ─────────────────────────────────────────────

async fn leaderboard_builds(
    State(state): State<AppState>,
    Path(game): Path<String>,
    Query(params): Query<LeaderboardParams>,
) -> AppResult<impl IntoResponse> {
    let game = parse_game(&game)?;
    let character_ids = match &params.characters {
        Some(raw) => parse_character_ids(raw)?,
        None => Vec::new(),
    };
    let query = RankQuery {
        game,
        character_ids,
        cursor: params.cursor,
        page_size: params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    };
    let locale = state.locale(&params.locale);

    let page = rank::leaderboard_page(&state.db, &state.catalogs, query, locale).await?;
    Ok((StatusCode::OK, Json(page)))
}

// ── Build handlers ───────────────────────────────────────────────────

async fn get_build(
    State(state): State<AppState>,
    Path((game, id)): Path<(String, i64)>,
    Query(params): Query<LocaleParams>,
) -> AppResult<impl IntoResponse> {
    let game = parse_game(&game)?;
    let locale = state.locale(&params.locale);

    let (record, catalog) = tokio::try_join!(
        async { Ok::<_, AppError>(state.db.find_build(game, id).await?) },
        async { Ok::<_, AppError>(state.catalogs.get(game, locale).await?) },
    )?;
    let record = record.ok_or(AppError::NotFound("Build"))?;

    let player = state
        .db
        .find_players(&[record.player_id])
        .await?
        .into_iter()
        .next();
    let build = decode_build(&record, &catalog, player.as_ref());
    metrics::BUILDS_DECODED_TOTAL.inc();
    Ok((StatusCode::OK, Json(build)))
}

// ── Player handlers ──────────────────────────────────────────────────

async fn find_player(state: &AppState, game: Game, uid: &str) -> AppResult<PlayerSummary> {
    state
        .db
        .get_player(game, uid)
        .await?
        .ok_or(AppError::NotFound("Player"))
}

async fn get_player(
    State(state): State<AppState>,
    Path((game, uid)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let game = parse_game(&game)?;
    let player = find_player(&state, game, &uid).await?;
    Ok((StatusCode::OK, Json(player)))
}

async fn get_player_builds(
    State(state): State<AppState>,
    Path((game, uid)): Path<(String, String)>,
    Query(params): Query<LocaleParams>,
) -> AppResult<impl IntoResponse> {
    let game = parse_game(&game)?;
    let locale = state.locale(&params.locale);
    let player = find_player(&state, game, &uid).await?;

    let (records, catalog) = tokio::try_join!(
        async { Ok::<_, AppError>(state.db.list_player_builds(game, player.id).await?) },
        async { Ok::<_, AppError>(state.catalogs.get(game, locale).await?) },
    )?;

    let players = HashMap::from([(player.id, player.clone())]);
    let mut builds = decode_builds(&records, &catalog, &players);
    rank::sort_ranked(&mut builds);

    Ok((
        StatusCode::OK,
        Json(json!({ "player": player, "builds": builds })),
    ))
}

/// Profile re-sync: overwrite the player's row and the submitted builds.
async fn sync_profile(
    State(state): State<AppState>,
    Path((game, uid)): Path<(String, String)>,
    Json(req): Json<SyncProfileRequest>,
) -> AppResult<impl IntoResponse> {
    let game = parse_game(&game)?;
    validate_sync(&uid, &req)?;
    state.rate_limiter.check_limit(game, &uid)?;

    let (player, build_ids) = match state
        .db
        .sync_profile(game, &uid, &req.player, &req.builds)
        .await
    {
        Ok(written) => written,
        Err(e) => {
            state.rate_limiter.release(game, &uid);
            return Err(e.into());
        }
    };

    metrics::PROFILE_SYNCS_TOTAL
        .with_label_values(&[game.as_str()])
        .inc();
    tracing::info!(%game, uid, builds = build_ids.len(), "profile synced");

    Ok((
        StatusCode::OK,
        Json(json!({ "player": player, "build_ids": build_ids })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_request(builds: usize, artifacts: usize) -> SyncProfileRequest {
        let build = json!({
            "avatar_id": 10000002,
            "artifacts": (0..artifacts)
                .map(|_| json!({ "main_stat": { "key": "FIGHT_PROP_HP", "value": 4780 } }))
                .collect::<Vec<_>>(),
        });
        serde_json::from_value(json!({
            "nickname": "Traveler",
            "level": 60,
            "builds": (0..builds).map(|_| build.clone()).collect::<Vec<_>>(),
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_character_ids() {
        assert_eq!(parse_character_ids("1,2, 3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_character_ids("").unwrap(), Vec::<i64>::new());
        assert_eq!(parse_character_ids("7,,").unwrap(), vec![7]);
        assert!(parse_character_ids("1,abc").is_err());
    }

    #[test]
    fn test_parse_game() {
        assert_eq!(parse_game("genshin").unwrap(), Game::Genshin);
        assert!(matches!(parse_game("wuwa"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_validate_sync() {
        assert!(validate_sync("800000001", &sync_request(2, 5)).is_ok());
        assert!(validate_sync("abc", &sync_request(1, 1)).is_err());
        assert!(validate_sync("", &sync_request(1, 1)).is_err());
        assert!(validate_sync("1", &sync_request(MAX_SYNC_BUILDS + 1, 0)).is_err());
        assert!(validate_sync("1", &sync_request(1, ARTIFACT_SLOTS + 1)).is_err());

        let mut blank = sync_request(0, 0);
        blank.player.nickname = "   ".into();
        assert!(validate_sync("1", &blank).is_err());
    }
}
