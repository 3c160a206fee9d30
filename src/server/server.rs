use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::http_layers::log_requests;
use super::metrics::metrics_handler;
use super::state::ServerState;
use super::websocket::ws_handler;
use crate::server_store::{TrendingEntityType, TrendingSnapshot};
use crate::votes::{positive_ratio, VoteChangeEvent, VoteEventError};

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 50;

/// How many snapshots to pull before timeframe filtering trims them.
const SNAPSHOT_FETCH_LIMIT: usize = 500;

pub fn make_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/events/votes", post(vote_event_handler))
        .route("/v1/trending", get(trending_handler))
        .route("/v1/songs/{song_id}/tally", get(tally_handler))
        .route("/v1/alerts", get(alerts_handler))
        .route("/v1/ws", get(ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API and, on a separate port, the Prometheus endpoint.
pub async fn run_server(
    state: ServerState,
    port: u16,
    metrics_port: u16,
    shutdown: CancellationToken,
) -> Result<()> {
    let metrics_router = Router::new().route("/metrics", get(metrics_handler));
    let metrics_listener = tokio::net::TcpListener::bind(("0.0.0.0", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;
    info!("Metrics listening on port {}", metrics_port);
    let metrics_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let serve = axum::serve(metrics_listener, metrics_router)
            .with_graceful_shutdown(async move { metrics_shutdown.cancelled().await });
        if let Err(e) = serve.await {
            warn!("Metrics server error: {}", e);
        }
    });

    let app = make_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Server listening on port {}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Server error")?;

    Ok(())
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn vote_event_handler(
    State(state): State<ServerState>,
    Json(event): Json<VoteChangeEvent>,
) -> Response {
    match state.vote_handler.process(&event).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(VoteEventError::Malformed(msg)) => {
            (StatusCode::BAD_REQUEST, Json(json!({"error": msg}))).into_response()
        }
        Err(VoteEventError::UnknownSong(id)) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("unknown setlist song {}", id)})),
        )
            .into_response(),
        Err(e) => {
            warn!("Vote event processing failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "failed to process vote event"})),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct TrendingQuery {
    #[serde(rename = "type")]
    entity_type: Option<String>,
    timeframe: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct TrendingResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    shows: Option<Vec<TrendingShowEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artists: Option<Vec<TrendingArtistEntry>>,
}

#[derive(Debug, Serialize)]
struct TrendingShowEntry {
    show_id: String,
    artist_id: String,
    artist_name: Option<String>,
    venue: String,
    city: Option<String>,
    starts_at: i64,
    score: f64,
    total_votes: i64,
}

#[derive(Debug, Serialize)]
struct TrendingArtistEntry {
    artist_id: String,
    name: String,
    followers: i64,
    score: f64,
    total_votes: i64,
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

fn timeframe_days(timeframe: Option<&str>) -> Option<i64> {
    match timeframe.unwrap_or("week") {
        "day" => Some(1),
        "week" => Some(7),
        "month" => Some(30),
        _ => None,
    }
}

async fn trending_handler(
    State(state): State<ServerState>,
    Query(query): Query<TrendingQuery>,
) -> Response {
    let entity_type = query.entity_type.as_deref().unwrap_or("all");
    if !matches!(entity_type, "shows" | "artists" | "all") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("invalid type '{}'", entity_type)})),
        )
            .into_response();
    }
    let Some(horizon_days) = timeframe_days(query.timeframe.as_deref()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": format!("invalid timeframe '{}'", query.timeframe.as_deref().unwrap_or(""))
            })),
        )
            .into_response();
    };
    let limit = clamp_limit(query.limit);
    let now = Utc::now().timestamp();

    let shows = if entity_type == "shows" || entity_type == "all" {
        match trending_shows(&state, now, horizon_days, limit) {
            Ok(shows) => Some(shows),
            Err(e) => {
                warn!("Failed to build trending shows: {:#}", e);
                return internal_error();
            }
        }
    } else {
        None
    };

    let artists = if entity_type == "artists" || entity_type == "all" {
        match trending_artists(&state, limit) {
            Ok(artists) => Some(artists),
            Err(e) => {
                warn!("Failed to build trending artists: {:#}", e);
                return internal_error();
            }
        }
    } else {
        None
    };

    (StatusCode::OK, Json(TrendingResponse { shows, artists })).into_response()
}

fn trending_shows(
    state: &ServerState,
    now: i64,
    horizon_days: i64,
    limit: usize,
) -> Result<Vec<TrendingShowEntry>> {
    let snapshots = state
        .server_store
        .get_trending_snapshots(TrendingEntityType::Show, SNAPSHOT_FETCH_LIMIT)?;
    let horizon = now + horizon_days * 86_400;

    let mut entries = Vec::new();
    for snapshot in snapshots {
        let Some(show) = state.catalog_store.get_show(&snapshot.entity_id)? else {
            continue;
        };
        if show.starts_at <= now || show.starts_at > horizon {
            continue;
        }
        let artist_name = state
            .catalog_store
            .get_artist(&show.artist_id)?
            .map(|a| a.name);
        entries.push((snapshot, show, artist_name));
    }

    entries.sort_by(|(a, show_a, _), (b, show_b, _)| {
        score_order(a, b).then_with(|| show_a.starts_at.cmp(&show_b.starts_at))
    });
    entries.truncate(limit);

    Ok(entries
        .into_iter()
        .map(|(snapshot, show, artist_name)| TrendingShowEntry {
            show_id: show.id,
            artist_id: show.artist_id,
            artist_name,
            venue: show.venue,
            city: show.city,
            starts_at: show.starts_at,
            score: snapshot.score,
            total_votes: snapshot.total_votes,
        })
        .collect())
}

fn trending_artists(state: &ServerState, limit: usize) -> Result<Vec<TrendingArtistEntry>> {
    let snapshots = state
        .server_store
        .get_trending_snapshots(TrendingEntityType::Artist, SNAPSHOT_FETCH_LIMIT)?;

    let mut entries = Vec::new();
    for snapshot in snapshots {
        let Some(artist) = state.catalog_store.get_artist(&snapshot.entity_id)? else {
            continue;
        };
        entries.push((snapshot, artist));
    }

    entries.sort_by(|(a, artist_a), (b, artist_b)| {
        score_order(a, b).then_with(|| artist_b.followers.cmp(&artist_a.followers))
    });
    entries.truncate(limit);

    Ok(entries
        .into_iter()
        .map(|(snapshot, artist)| TrendingArtistEntry {
            artist_id: artist.id,
            name: artist.name,
            followers: artist.followers,
            score: snapshot.score,
            total_votes: snapshot.total_votes,
        })
        .collect())
}

/// Score descending, then total votes descending.
fn score_order(a: &TrendingSnapshot, b: &TrendingSnapshot) -> std::cmp::Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.total_votes.cmp(&a.total_votes))
}

#[derive(Debug, Serialize)]
struct TallyResponse {
    setlist_song_id: String,
    upvotes: i64,
    downvotes: i64,
    total_votes: i64,
    positive_ratio: f64,
    updated_at: i64,
}

async fn tally_handler(
    State(state): State<ServerState>,
    Path(song_id): Path<String>,
) -> Response {
    match state.vote_store.get_tally(&song_id) {
        Ok(Some(tally)) => (
            StatusCode::OK,
            Json(TallyResponse {
                positive_ratio: positive_ratio(tally.upvotes, tally.downvotes),
                total_votes: tally.total_votes(),
                setlist_song_id: tally.setlist_song_id,
                upvotes: tally.upvotes,
                downvotes: tally.downvotes,
                updated_at: tally.updated_at,
            }),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("no tally for setlist song {}", song_id)})),
        )
            .into_response(),
        Err(e) => {
            warn!("Failed to read tally for {}: {:#}", song_id, e);
            internal_error()
        }
    }
}

#[derive(Debug, Deserialize)]
struct AlertsQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn alerts_handler(
    State(state): State<ServerState>,
    Query(query): Query<AlertsQuery>,
) -> Response {
    let limit = clamp_limit(query.limit);
    let offset = query.offset.unwrap_or(0);

    match state.server_store.list_alerts(limit, offset) {
        Ok(alerts) => (StatusCode::OK, Json(json!({"alerts": alerts}))).into_response(),
        Err(e) => {
            warn!("Failed to list alerts: {:#}", e);
            internal_error()
        }
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal error"})),
    )
        .into_response()
}
