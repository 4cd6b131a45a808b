//! SQL schema for the gatekeeper database.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS enrollments (
    id_number     TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    role          TEXT NOT NULL,   -- 'student' | 'lecturer' | 'staff'
    status        TEXT NOT NULL,   -- 'active' | 'graduate' | 'suspended' | 'discontinued' | 'visitor'
    descriptor    TEXT NOT NULL,   -- JSON array of floats
    visit_purpose TEXT,
    valid_until   TEXT,            -- RFC 3339 UTC or NULL
    email         TEXT,
    registered_at TEXT NOT NULL    -- RFC 3339 UTC
);

-- Append-only. No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS access_logs (
    entry_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    TEXT NOT NULL,
    name       TEXT NOT NULL,
    role       TEXT,
    action     TEXT NOT NULL,      -- 'registered' | 'access_granted' | 'access_denied'
    confidence REAL,
    timestamp  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS access_logs_timestamp_idx ON access_logs(timestamp);

PRAGMA user_version = 1;
";
