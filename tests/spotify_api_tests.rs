//! Tests for the Spotify client against a local stub of the Web API.
//!
//! The stub serves the token endpoint, paginated liked-tracks and playlist
//! listings, the batch artists endpoint and artist search. Variants can
//! throttle the second tracks page with a 429 + Retry-After, hand out
//! already-stale tokens, or break the second playlists page for good.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cratekeeper::catalog::{CatalogClient, SpotifyClient, SpotifySettings};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

const TOTAL_TRACKS: usize = 120;
const TOTAL_PLAYLISTS: usize = 60;
const PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, Default)]
struct StubBehavior {
    throttle_second_page: bool,
    short_lived_tokens: bool,
    break_second_playlists_page: bool,
}

#[derive(Clone)]
struct StubState {
    behavior: StubBehavior,
    token_requests: Arc<AtomicUsize>,
    track_page_requests: Arc<AtomicUsize>,
    throttled_once: Arc<AtomicUsize>,
}

async fn token(State(state): State<StubState>) -> Json<Value> {
    state.token_requests.fetch_add(1, Ordering::SeqCst);
    // A 60s lifetime is eaten whole by the client's expiry margin, so a
    // short-lived token is stale the moment it is issued.
    let expires_in = if state.behavior.short_lived_tokens {
        60
    } else {
        3600
    };
    Json(json!({
        "access_token": "stub-access-token",
        "token_type": "Bearer",
        "expires_in": expires_in
    }))
}

fn track_json(i: usize) -> Value {
    json!({
        "track": {
            "id": format!("track-{}", i),
            "name": format!("Track {}", i),
            "artists": [{ "id": format!("artist-{}", i % 7), "name": format!("Artist {}", i % 7) }]
        }
    })
}

fn offset_of(params: &HashMap<String, String>) -> usize {
    params
        .get("offset")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

async fn liked_tracks(
    State(state): State<StubState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.track_page_requests.fetch_add(1, Ordering::SeqCst);
    let offset = offset_of(&params);

    // Throttle the second page exactly once.
    if state.behavior.throttle_second_page
        && offset == PAGE_SIZE
        && state.throttled_once.fetch_add(1, Ordering::SeqCst) == 0
    {
        return (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, "2")]).into_response();
    }

    let items: Vec<Value> = (offset..TOTAL_TRACKS.min(offset + PAGE_SIZE))
        .map(track_json)
        .collect();
    let next = if offset + PAGE_SIZE < TOTAL_TRACKS {
        Value::String(format!("/v1/me/tracks?offset={}", offset + PAGE_SIZE))
    } else {
        Value::Null
    };
    Json(json!({ "items": items, "next": next, "total": TOTAL_TRACKS })).into_response()
}

async fn playlists(
    State(state): State<StubState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let offset = offset_of(&params);

    // A 200 with garbage in it is a hard page failure: the client gives up
    // on the page without burning through the retry budget.
    if state.behavior.break_second_playlists_page && offset == PAGE_SIZE {
        return (StatusCode::OK, "not json").into_response();
    }

    let items: Vec<Value> = (offset..TOTAL_PLAYLISTS.min(offset + PAGE_SIZE))
        .map(|i| {
            json!({
                "id": format!("pl-{}", i),
                "name": format!("Playlist {}", i),
                "tracks": { "total": 1 }
            })
        })
        .collect();
    let next = if offset + PAGE_SIZE < TOTAL_PLAYLISTS {
        Value::String(format!("/v1/me/playlists?offset={}", offset + PAGE_SIZE))
    } else {
        Value::Null
    };
    Json(json!({ "items": items, "next": next, "total": TOTAL_PLAYLISTS })).into_response()
}

async fn artists(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let ids = params.get("ids").cloned().unwrap_or_default();
    let artists: Vec<Value> = ids
        .split(',')
        .filter(|id| !id.is_empty())
        .map(|id| json!({ "id": id, "name": id, "genres": ["techno"] }))
        .collect();
    Json(json!({ "artists": artists }))
}

async fn search(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let q = params.get("q").cloned().unwrap_or_default();
    Json(json!({
        "artists": {
            "items": [{ "id": "found", "name": q, "genres": ["hard techno", "techno"] }]
        }
    }))
}

async fn spawn_stub(behavior: StubBehavior) -> (SocketAddr, StubState) {
    let state = StubState {
        behavior,
        token_requests: Arc::new(AtomicUsize::new(0)),
        track_page_requests: Arc::new(AtomicUsize::new(0)),
        throttled_once: Arc::new(AtomicUsize::new(0)),
    };
    let app = Router::new()
        .route("/api/token", post(token))
        .route("/v1/me/tracks", get(liked_tracks))
        .route("/v1/me/playlists", get(playlists))
        .route("/v1/artists", get(artists))
        .route("/v1/search", get(search))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn client_for(addr: SocketAddr) -> SpotifyClient {
    let base = format!("http://{}", addr);
    SpotifyClient::new(SpotifySettings {
        client_id: "test-client".to_string(),
        client_secret: "test-secret".to_string(),
        refresh_token: "test-refresh".to_string(),
        api_base: base.clone(),
        accounts_base: base,
    })
}

#[tokio::test]
async fn test_liked_tracks_pagination() {
    let (addr, state) = spawn_stub(StubBehavior::default()).await;
    let client = client_for(addr);

    let tracks = client.liked_tracks().await.unwrap();
    assert_eq!(tracks.len(), TOTAL_TRACKS);
    assert_eq!(tracks[0].external_id, "track-0");
    assert_eq!(tracks[119].external_id, "track-119");
    // Every track got its artist's genres.
    assert!(tracks.iter().all(|t| t.genre_tags == vec!["techno"]));
    // 120 items at page size 50 take exactly 3 page requests.
    assert_eq!(state.track_page_requests.load(Ordering::SeqCst), 3);
    // The token was fetched once and cached.
    assert_eq!(state.token_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rate_limit_waits_and_loses_nothing() {
    let (addr, state) = spawn_stub(StubBehavior {
        throttle_second_page: true,
        ..Default::default()
    })
    .await;
    let client = client_for(addr);

    let started = Instant::now();
    let tracks = client.liked_tracks().await.unwrap();
    let elapsed = started.elapsed();

    assert!(state.throttled_once.load(Ordering::SeqCst) >= 1);
    // Honored the Retry-After: 2 header.
    assert!(elapsed.as_secs_f64() >= 2.0, "finished in {:?}", elapsed);
    // The throttled page was retried, not dropped.
    assert_eq!(tracks.len(), TOTAL_TRACKS);
}

#[tokio::test]
async fn test_stale_token_refreshed_between_attempts() {
    let (addr, state) = spawn_stub(StubBehavior {
        throttle_second_page: true,
        short_lived_tokens: true,
        ..Default::default()
    })
    .await;
    let client = client_for(addr);

    let tracks = client.liked_tracks().await.unwrap();
    assert_eq!(tracks.len(), TOTAL_TRACKS);
    // Three track pages, the 429 retry of the second page and one artists
    // batch: five attempts, each resolving the always-stale token anew.
    assert_eq!(state.token_requests.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_playlists_pagination() {
    let (addr, _state) = spawn_stub(StubBehavior::default()).await;
    let client = client_for(addr);

    let playlists = client.playlists().await.unwrap();
    assert_eq!(playlists.len(), TOTAL_PLAYLISTS);
    assert_eq!(playlists[0].id, "pl-0");
    assert_eq!(playlists[59].name, "Playlist 59");
    assert_eq!(playlists[0].track_count, 1);
}

#[tokio::test]
async fn test_playlists_keep_fetched_pages_on_failure() {
    let (addr, _state) = spawn_stub(StubBehavior {
        break_second_playlists_page: true,
        ..Default::default()
    })
    .await;
    let client = client_for(addr);

    // The second page is permanently broken; the first page still comes back.
    let playlists = client.playlists().await.unwrap();
    assert_eq!(playlists.len(), PAGE_SIZE);
    assert_eq!(playlists[0].id, "pl-0");
    assert_eq!(playlists[PAGE_SIZE - 1].id, "pl-49");
}

#[tokio::test]
async fn test_artist_genre_search() {
    let (addr, _state) = spawn_stub(StubBehavior::default()).await;
    let client = client_for(addr);

    let genres = client.artist_genres("Charlotte").await.unwrap();
    assert_eq!(genres, vec!["hard techno".to_string(), "techno".to_string()]);
}
