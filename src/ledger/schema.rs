//! Ledger database schema.

pub const LEDGER_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tracks (
    id TEXT PRIMARY KEY,
    source_service TEXT NOT NULL,
    external_id TEXT NOT NULL,
    download_platform TEXT NOT NULL,
    title TEXT NOT NULL,
    artist TEXT NOT NULL,
    mix_type TEXT,
    genre_tags TEXT,
    file_path TEXT,
    status TEXT NOT NULL,
    downloaded_at INTEGER,
    synced_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE(source_service, external_id)
);

CREATE INDEX IF NOT EXISTS idx_tracks_status ON tracks(status);
CREATE INDEX IF NOT EXISTS idx_tracks_source_service ON tracks(source_service);
CREATE INDEX IF NOT EXISTS idx_tracks_downloaded_at ON tracks(downloaded_at);
";
