//! Streaming-catalog clients. A catalog client knows how to list the tracks
//! the user wants (liked tracks, playlists) and to look up artist genres for
//! classification. Clients are read-only: acquisition happens elsewhere.

mod spotify;

pub use spotify::{SpotifyClient, SpotifySettings};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which streaming service a track identity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceService {
    Spotify,
    Tidal,
}

impl SourceService {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceService::Spotify => "spotify",
            SourceService::Tidal => "tidal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spotify" => Some(SourceService::Spotify),
            "tidal" => Some(SourceService::Tidal),
            _ => None,
        }
    }
}

/// A track the user wants acquired, as described by its source catalog.
#[derive(Debug, Clone, Serialize)]
pub struct DesiredTrack {
    /// Stable id within the source service.
    pub external_id: String,
    pub title: String,
    pub artists: Vec<String>,
    /// Genre tags gathered from the track's artists. May be empty when the
    /// catalog has no genre data for any of them.
    pub genre_tags: Vec<String>,
    pub source: SourceService,
}

impl DesiredTrack {
    /// All artists joined the way they are displayed and searched for.
    pub fn artist_label(&self) -> String {
        self.artists.join(", ")
    }

    /// Primary artist, used for single-artist search queries.
    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or_default()
    }
}

/// A playlist the user owns or follows.
#[derive(Debug, Clone, Serialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub track_count: usize,
}

/// A streaming service the orchestrator can pull desired tracks from.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    fn service(&self) -> SourceService;

    /// Whether credentials for this client were provided. Unconfigured
    /// clients are skipped with a log line rather than treated as errors.
    fn is_configured(&self) -> bool;

    /// All liked/favorite tracks, genre-enriched, deduplicated by id.
    async fn liked_tracks(&self) -> Result<Vec<DesiredTrack>>;

    /// All playlists on the account.
    async fn playlists(&self) -> Result<Vec<PlaylistSummary>>;

    /// All tracks of one playlist, genre-enriched, deduplicated by id.
    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<DesiredTrack>>;

    /// Genre tags for a single artist, by name search. Used by the
    /// reclassification pass for tracks that were filed without genre data.
    async fn artist_genres(&self, artist: &str) -> Result<Vec<String>>;
}
