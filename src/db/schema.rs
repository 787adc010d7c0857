pub const SCHEMA: &str = r#"
-- Images table: one row per ingested image
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,

    -- Fingerprints
    content_fingerprint TEXT NOT NULL,      -- SHA-256 hex of the raw bytes
    perceptual_fingerprint TEXT NOT NULL,   -- 64-bit perceptual hash, base64
    md5 TEXT NOT NULL,

    -- Where the file lives now (active directory or archive folder)
    asset_path TEXT NOT NULL,

    -- Originating message reference, write-once
    external_ref TEXT,

    -- Recognition state
    text TEXT,
    status TEXT NOT NULL DEFAULT 'pending',  -- pending/recognized/failed/manual
    failure_count INTEGER NOT NULL DEFAULT 0,
    last_attempt_at TEXT,

    created_at TEXT NOT NULL,
    archived_at TEXT,

    -- Forced re-ingestions are exempt from fingerprint uniqueness
    reingested INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_images_content_unique
    ON images(content_fingerprint) WHERE reingested = 0;
CREATE INDEX IF NOT EXISTS idx_images_content ON images(content_fingerprint);
CREATE INDEX IF NOT EXISTS idx_images_status ON images(status);
CREATE INDEX IF NOT EXISTS idx_images_created_at ON images(created_at);
"#;

