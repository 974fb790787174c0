//! SQL schema for the KalasKoll SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// Every table below `parties` references its parent with
/// `ON DELETE CASCADE`; deleting a party removes the whole aggregate.
/// `audit_log` has no foreign keys so entries outlive what they
/// describe.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS parties (
    party_id    TEXT PRIMARY KEY,
    owner_id    TEXT NOT NULL,
    child_name  TEXT NOT NULL,
    party_date  TEXT NOT NULL,   -- YYYY-MM-DD
    created_at  TEXT NOT NULL,
    deleted_at  TEXT             -- soft delete; NULL while live
);

CREATE TABLE IF NOT EXISTS invitations (
    invitation_id TEXT PRIMARY KEY,
    party_id      TEXT NOT NULL REFERENCES parties(party_id) ON DELETE CASCADE,
    token         TEXT NOT NULL UNIQUE,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS invited_guests (
    guest_id   TEXT PRIMARY KEY,
    party_id   TEXT NOT NULL REFERENCES parties(party_id) ON DELETE CASCADE,
    name       TEXT NOT NULL,
    phone      TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS party_images (
    image_id     TEXT PRIMARY KEY,
    party_id     TEXT NOT NULL REFERENCES parties(party_id) ON DELETE CASCADE,
    storage_path TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rsvp_responses (
    rsvp_id       TEXT PRIMARY KEY,
    invitation_id TEXT NOT NULL REFERENCES invitations(invitation_id) ON DELETE CASCADE,
    child_name    TEXT NOT NULL,
    attending     INTEGER NOT NULL,
    responded_at  TEXT NOT NULL
);

-- One row per RSVP that disclosed allergies with consent.
CREATE TABLE IF NOT EXISTS allergy_data (
    rsvp_id          TEXT PRIMARY KEY REFERENCES rsvp_responses(rsvp_id) ON DELETE CASCADE,
    allergy_format   TEXT,            -- 'aes256gcm' | 'plaintext' | NULL (pre-marker rows)
    allergies        TEXT NOT NULL,   -- JSON value: array, blob string, or JSON-in-string
    other_dietary    TEXT,
    consent_given_at TEXT NOT NULL,
    -- Sub-microsecond precision is dropped on write, so a deadline within the
    -- same microsecond as the sweep's `now` is not yet expired.
    auto_delete_at   TEXT NOT NULL,   -- fixed-width RFC 3339 UTC, comparable as text
    created_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    audit_id    TEXT PRIMARY KEY,
    action      TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id   TEXT NOT NULL,
    details     TEXT NOT NULL DEFAULT '{}',
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS parties_date_idx        ON parties(party_date);
CREATE INDEX IF NOT EXISTS invitations_party_idx   ON invitations(party_id);
CREATE INDEX IF NOT EXISTS guests_party_idx        ON invited_guests(party_id);
CREATE INDEX IF NOT EXISTS images_party_idx        ON party_images(party_id);
CREATE INDEX IF NOT EXISTS rsvps_invitation_idx    ON rsvp_responses(invitation_id);
CREATE INDEX IF NOT EXISTS allergy_auto_delete_idx ON allergy_data(auto_delete_at);
CREATE INDEX IF NOT EXISTS audit_entity_idx        ON audit_log(entity_id);

PRAGMA user_version = 1;
";
