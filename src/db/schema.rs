//! Schema of the persistent story store.

/// Bump whenever a table's shape changes, and add the upgrade step to `MIGRATIONS`.
pub const SCHEMA_VERSION: i32 = 1;

/// Upgrade steps; `MIGRATIONS[n]` takes a database from version `n` to `n + 1`.
pub const MIGRATIONS: &[&str] = &[V1];

const V1: &str = r#"
-- Stories saved by the user, keyed by the server's story id
CREATE TABLE IF NOT EXISTS favorites (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    photo_url TEXT NOT NULL,
    created_at TEXT NOT NULL,
    lat REAL,
    lon REAL,
    saved_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_favorites_created_at ON favorites(created_at);
CREATE INDEX IF NOT EXISTS idx_favorites_saved_at ON favorites(saved_at);

-- Submissions waiting for connectivity; AUTOINCREMENT keeps ids monotonic across deletes
CREATE TABLE IF NOT EXISTS pending_uploads (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    description TEXT NOT NULL,
    photo BLOB NOT NULL,
    photo_name TEXT NOT NULL,
    photo_mime TEXT NOT NULL,
    lat REAL,
    lon REAL,
    auth_token TEXT,
    timestamp TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_pending_uploads_timestamp ON pending_uploads(timestamp);

-- Read-through copies of stories for offline browsing
CREATE TABLE IF NOT EXISTS cached_stories (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    photo_url TEXT NOT NULL,
    created_at TEXT NOT NULL,
    lat REAL,
    lon REAL,
    cached_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cached_stories_cached_at ON cached_stories(cached_at);

-- Small key/value flags (session, push preference)
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
