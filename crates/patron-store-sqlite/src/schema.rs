//! SQL schema for the Patron SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

-- Store-wide settings, e.g. the identity scope pinned at first open.
CREATE TABLE IF NOT EXISTS store_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Every customer ever created, active or soft-deleted.
CREATE TABLE IF NOT EXISTS customers (
    customer_id     TEXT PRIMARY KEY,
    phone           TEXT NOT NULL,
    email           TEXT NOT NULL,
    national_id     TEXT NOT NULL,
    identity_digest TEXT NOT NULL,   -- IdentityKey::digest under the pinned scope
    first_name      TEXT,
    last_name       TEXT,
    attributes      TEXT NOT NULL DEFAULT '{}',
    is_active       INTEGER NOT NULL CHECK (is_active IN (0, 1)),
    created_by      TEXT NOT NULL,
    updated_by      TEXT NOT NULL,
    created_at      TEXT NOT NULL,   -- ISO 8601 UTC; server-assigned
    updated_at      TEXT NOT NULL
);

-- Identity is unique among active rows only.
CREATE UNIQUE INDEX IF NOT EXISTS customers_active_identity
    ON customers(identity_digest) WHERE is_active = 1;

CREATE INDEX IF NOT EXISTS customers_created_idx ON customers(created_at);

-- The active-identity index: one row per identity currently held by an
-- active customer. The foreign key is deferred so a reservation can precede
-- the insert of its owner inside one transaction.
CREATE TABLE IF NOT EXISTS active_identities (
    identity_digest TEXT PRIMARY KEY,
    customer_id     TEXT NOT NULL UNIQUE
                    REFERENCES customers(customer_id)
                    DEFERRABLE INITIALLY DEFERRED
);

-- Append-only lifecycle history.
CREATE TABLE IF NOT EXISTS customer_events (
    event_id    TEXT PRIMARY KEY,
    customer_id TEXT NOT NULL REFERENCES customers(customer_id) ON DELETE CASCADE,
    kind        TEXT NOT NULL,   -- 'created' | 'soft_deleted' | 'restored'
    actor       TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS customer_events_customer_idx
    ON customer_events(customer_id);

PRAGMA user_version = 1;
";

pub const SCOPE_KEY: &str = "identity_scope";
