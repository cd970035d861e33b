//! Spotify Web API client.
//!
//! Authenticates with the refresh-token grant and caches the access token
//! until shortly before it expires. All track listings are paginated 50 at a
//! time and enriched with artist genres through the batch artists endpoint.
//! Requests are paced and retried with exponential backoff; a 429 honors the
//! Retry-After header without consuming a retry attempt.

use super::{CatalogClient, DesiredTrack, PlaylistSummary, SourceService};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const PAGE_SIZE: usize = 50;
const ARTIST_BATCH_SIZE: usize = 50;
const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const REQUEST_SPACING: Duration = Duration::from_millis(500);
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Credentials and endpoints for the Spotify client. The endpoint bases are
/// overridable so tests can point the client at a local stub server.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SpotifySettings {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_accounts_base")]
    pub accounts_base: String,
}

fn default_api_base() -> String {
    "https://api.spotify.com".to_string()
}

fn default_accounts_base() -> String {
    "https://accounts.spotify.com".to_string()
}

impl Default for SpotifySettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            api_base: default_api_base(),
            accounts_base: default_accounts_base(),
        }
    }
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct SpotifyClient {
    settings: SpotifySettings,
    http: reqwest::Client,
    token: tokio::sync::Mutex<Option<CachedToken>>,
    // Instant of the last request sent, for pacing.
    last_request: tokio::sync::Mutex<Option<Instant>>,
    genre_cache: std::sync::Mutex<HashMap<String, Vec<String>>>,
}

impl SpotifyClient {
    pub fn new(settings: SpotifySettings) -> Self {
        Self {
            settings,
            http: reqwest::Client::new(),
            token: tokio::sync::Mutex::new(None),
            last_request: tokio::sync::Mutex::new(None),
            genre_cache: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Sleep long enough to keep at least [`REQUEST_SPACING`] between calls.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < REQUEST_SPACING {
                tokio::time::sleep(REQUEST_SPACING - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Current access token, refreshing through the token endpoint when the
    /// cached one is within a minute of expiry.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Refreshing Spotify access token");
        let response = self
            .http
            .post(format!("{}/api/token", self.settings.accounts_base))
            .basic_auth(&self.settings.client_id, Some(&self.settings.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.settings.refresh_token.as_str()),
            ])
            .send()
            .await
            .context("Spotify token request failed")?;

        if !response.status().is_success() {
            bail!("Spotify token endpoint returned {}", response.status());
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Malformed Spotify token response")?;
        let expires_in = Duration::from_secs(token.expires_in);
        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN),
        });
        Ok(access_token)
    }

    /// GET a JSON endpoint with pacing, 429 handling and backoff.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 1;
        loop {
            self.pace().await;
            // Resolved per attempt: a long backoff or 429 wait can outlive
            // the cached token.
            let token = self.access_token().await?;
            let result = self
                .http
                .get(url)
                .bearer_auth(&token)
                .send()
                .await
                .context("Spotify API request failed");

            match result {
                Ok(response) if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    // A throttle is not a failure, it does not consume an attempt.
                    let wait = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(1);
                    warn!("Spotify rate limit hit, waiting {}s", wait);
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                Ok(response) if response.status().is_success() => {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("Malformed Spotify response from {}", url));
                }
                Ok(response) => {
                    if attempt >= MAX_ATTEMPTS {
                        bail!(
                            "Spotify request to {} failed with {} after {} attempts",
                            url,
                            response.status(),
                            attempt
                        );
                    }
                    warn!(
                        "Spotify request failed with {} (attempt {}/{}), retrying in {:?}",
                        response.status(),
                        attempt,
                        MAX_ATTEMPTS,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    attempt += 1;
                }
                Err(e) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(e);
                    }
                    warn!(
                        "Spotify request error (attempt {}/{}): {:#}, retrying in {:?}",
                        attempt, MAX_ATTEMPTS, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    attempt += 1;
                }
            }
        }
    }

    /// Walk a paginated track listing. A page that still fails after the
    /// retry budget is logged and the pages collected so far are returned,
    /// a partial sync beats no sync.
    async fn collect_track_pages(&self, base_url: &str) -> Vec<ApiTrack> {
        let mut tracks = Vec::new();
        let mut offset = 0;
        loop {
            let url = format!("{}?limit={}&offset={}", base_url, PAGE_SIZE, offset);
            let page: Page<SavedTrackItem> = match self.get_json(&url).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        "Giving up on page at offset {}: {:#}. Returning {} tracks collected so far",
                        offset,
                        e,
                        tracks.len()
                    );
                    break;
                }
            };
            let page_len = page.items.len();
            tracks.extend(page.items.into_iter().filter_map(|item| item.track));
            if page.next.is_none() || page_len < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }
        tracks
    }

    /// Genres for a set of artist ids, fetched in batches of at most 50 and
    /// cached for the lifetime of the client.
    async fn genres_for_artists(&self, artist_ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        let missing: Vec<String> = {
            let cache = self.genre_cache.lock().unwrap();
            artist_ids
                .iter()
                .filter(|id| !cache.contains_key(*id))
                .cloned()
                .collect()
        };

        for batch in missing.chunks(ARTIST_BATCH_SIZE) {
            let url = format!(
                "{}/v1/artists?ids={}",
                self.settings.api_base,
                batch.join(",")
            );
            let response: ArtistsResponse = self.get_json(&url).await?;
            let mut cache = self.genre_cache.lock().unwrap();
            for artist in response.artists.into_iter().flatten() {
                cache.insert(artist.id, artist.genres);
            }
        }

        let cache = self.genre_cache.lock().unwrap();
        Ok(artist_ids
            .iter()
            .filter_map(|id| cache.get(id).map(|g| (id.clone(), g.clone())))
            .collect())
    }

    /// Turn raw API tracks into enriched, deduplicated desired tracks.
    async fn enrich(&self, raw: Vec<ApiTrack>) -> Result<Vec<DesiredTrack>> {
        let mut artist_ids: Vec<String> = Vec::new();
        let mut seen_artists = HashSet::new();
        for track in &raw {
            for artist in &track.artists {
                if let Some(id) = &artist.id {
                    if seen_artists.insert(id.clone()) {
                        artist_ids.push(id.clone());
                    }
                }
            }
        }
        let genres = self.genres_for_artists(&artist_ids).await?;

        let mut seen_tracks = HashSet::new();
        let mut out = Vec::with_capacity(raw.len());
        for track in raw {
            let Some(id) = track.id else {
                // Local files and episodes have no track id.
                continue;
            };
            if !seen_tracks.insert(id.clone()) {
                continue;
            }
            let mut tags = Vec::new();
            for artist in &track.artists {
                if let Some(artist_id) = &artist.id {
                    if let Some(artist_genres) = genres.get(artist_id) {
                        for g in artist_genres {
                            if !tags.contains(g) {
                                tags.push(g.clone());
                            }
                        }
                    }
                }
            }
            out.push(DesiredTrack {
                external_id: id,
                title: track.name,
                artists: track.artists.into_iter().map(|a| a.name).collect(),
                genre_tags: tags,
                source: SourceService::Spotify,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl CatalogClient for SpotifyClient {
    fn service(&self) -> SourceService {
        SourceService::Spotify
    }

    fn is_configured(&self) -> bool {
        !self.settings.client_id.is_empty()
            && !self.settings.client_secret.is_empty()
            && !self.settings.refresh_token.is_empty()
    }

    async fn liked_tracks(&self) -> Result<Vec<DesiredTrack>> {
        let url = format!("{}/v1/me/tracks", self.settings.api_base);
        let raw = self.collect_track_pages(&url).await;
        info!("Fetched {} liked tracks from Spotify", raw.len());
        self.enrich(raw).await
    }

    async fn playlists(&self) -> Result<Vec<PlaylistSummary>> {
        let mut playlists = Vec::new();
        let mut offset = 0;
        loop {
            let url = format!(
                "{}/v1/me/playlists?limit={}&offset={}",
                self.settings.api_base, PAGE_SIZE, offset
            );
            let page: Page<ApiPlaylist> = match self.get_json(&url).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        "Giving up on playlists page at offset {}: {:#}. Returning {} playlists collected so far",
                        offset,
                        e,
                        playlists.len()
                    );
                    break;
                }
            };
            let page_len = page.items.len();
            playlists.extend(page.items.into_iter().map(|p| PlaylistSummary {
                id: p.id,
                name: p.name,
                track_count: p.tracks.total,
            }));
            if page.next.is_none() || page_len < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }
        Ok(playlists)
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<DesiredTrack>> {
        let url = format!(
            "{}/v1/playlists/{}/tracks",
            self.settings.api_base,
            urlencoding::encode(playlist_id)
        );
        let raw = self.collect_track_pages(&url).await;
        info!(
            "Fetched {} tracks from Spotify playlist {}",
            raw.len(),
            playlist_id
        );
        self.enrich(raw).await
    }

    async fn artist_genres(&self, artist: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/v1/search?q={}&type=artist&limit=1",
            self.settings.api_base,
            urlencoding::encode(artist)
        );
        let response: SearchResponse = self.get_json(&url).await?;
        Ok(response
            .artists
            .items
            .into_iter()
            .next()
            .map(|a| a.genres)
            .unwrap_or_default())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct SavedTrackItem {
    track: Option<ApiTrack>,
}

#[derive(Deserialize)]
struct ApiTrack {
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<ApiTrackArtist>,
}

#[derive(Deserialize)]
struct ApiTrackArtist {
    id: Option<String>,
    name: String,
}

#[derive(Deserialize)]
struct ApiPlaylist {
    id: String,
    name: String,
    tracks: ApiPlaylistTracks,
}

#[derive(Deserialize)]
struct ApiPlaylistTracks {
    total: usize,
}

#[derive(Deserialize)]
struct ArtistsResponse {
    artists: Vec<Option<ApiArtist>>,
}

#[derive(Deserialize)]
struct ApiArtist {
    id: String,
    #[serde(default)]
    genres: Vec<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    artists: SearchArtists,
}

#[derive(Deserialize)]
struct SearchArtists {
    items: Vec<ApiArtist>,
}
