//! Everloom database schema.
//!
//! Executed statement-group by statement-group from [`crate::Store::migrate`].
//! Written as SQLite DDL; every constraint here is load-bearing for the
//! engine's concurrency model, so the groups keep their indexes next to the
//! table they protect.

/// Actors: human or NPC identities. Identity is immutable; only the display
/// name changes.
pub const CREATE_ACTORS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS actors (
    id            TEXT PRIMARY KEY,
    display_name  TEXT,
    kind          TEXT NOT NULL DEFAULT 'human',
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at    TIMESTAMP NOT NULL,
    updated_at    TIMESTAMP NOT NULL
);
";

/// Campaigns: the game worlds. `row_version` is the optimistic-concurrency
/// fence; every successful commit bumps it by exactly one.
pub const CREATE_CAMPAIGNS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS campaigns (
    id                         TEXT PRIMARY KEY,
    namespace                  TEXT NOT NULL DEFAULT 'default',
    name                       TEXT NOT NULL,
    name_normalized            TEXT NOT NULL,
    created_by_actor_id        TEXT REFERENCES actors (id),
    summary                    TEXT NOT NULL DEFAULT '',
    state_json                 TEXT NOT NULL DEFAULT '{}',
    characters_json            TEXT NOT NULL DEFAULT '{}',
    last_narration             TEXT,
    memory_visible_max_turn_id BIGINT,
    row_version                BIGINT NOT NULL DEFAULT 1,
    created_at                 TIMESTAMP NOT NULL,
    updated_at                 TIMESTAMP NOT NULL,
    UNIQUE (namespace, name_normalized)
);
";

/// Sessions: surface bindings (a channel, a thread). Never mutated by the
/// turn engine; they scope outbox idempotency.
pub const CREATE_SESSIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    id                 TEXT PRIMARY KEY,
    campaign_id        TEXT NOT NULL REFERENCES campaigns (id) ON DELETE CASCADE,
    surface            TEXT NOT NULL,
    surface_key        TEXT NOT NULL UNIQUE,
    surface_channel_id TEXT,
    surface_thread_id  TEXT,
    enabled            BOOLEAN NOT NULL DEFAULT 1,
    metadata_json      TEXT NOT NULL DEFAULT '{}',
    created_at         TIMESTAMP NOT NULL,
    updated_at         TIMESTAMP NOT NULL
);
";

pub const CREATE_PLAYERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS players (
    id              TEXT PRIMARY KEY,
    campaign_id     TEXT NOT NULL REFERENCES campaigns (id) ON DELETE CASCADE,
    actor_id        TEXT NOT NULL REFERENCES actors (id),
    level           BIGINT NOT NULL DEFAULT 1,
    xp              BIGINT NOT NULL DEFAULT 0,
    attributes_json TEXT NOT NULL DEFAULT '{}',
    state_json      TEXT NOT NULL DEFAULT '{}',
    last_active_at  TIMESTAMP,
    created_at      TIMESTAMP NOT NULL,
    updated_at      TIMESTAMP NOT NULL,
    UNIQUE (campaign_id, actor_id)
);
";

/// Turns: append-only history. The rowid order is the causal order within a
/// campaign.
pub const CREATE_TURNS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS turns (
    id                       INTEGER PRIMARY KEY AUTOINCREMENT,
    campaign_id              TEXT NOT NULL REFERENCES campaigns (id) ON DELETE CASCADE,
    session_id               TEXT REFERENCES sessions (id),
    actor_id                 TEXT REFERENCES actors (id),
    kind                     TEXT NOT NULL,
    content                  TEXT NOT NULL,
    meta_json                TEXT NOT NULL DEFAULT '{}',
    external_message_id      TEXT,
    external_user_message_id TEXT,
    created_at               TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS ix_turns_campaign_id_desc
    ON turns (campaign_id, id DESC);

CREATE INDEX IF NOT EXISTS ix_turns_campaign_external_msg
    ON turns (campaign_id, external_message_id);
";

/// Snapshots: one per narration turn, the restore target for rewind.
pub const CREATE_SNAPSHOTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS snapshots (
    id                       TEXT PRIMARY KEY,
    turn_id                  INTEGER NOT NULL UNIQUE REFERENCES turns (id) ON DELETE CASCADE,
    campaign_id              TEXT NOT NULL REFERENCES campaigns (id) ON DELETE CASCADE,
    campaign_state_json      TEXT NOT NULL,
    campaign_characters_json TEXT NOT NULL,
    campaign_summary         TEXT NOT NULL DEFAULT '',
    campaign_last_narration  TEXT,
    players_json             TEXT NOT NULL,
    created_at               TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS ix_snapshots_campaign_turn
    ON snapshots (campaign_id, turn_id DESC);
";

/// Timers. The partial unique index enforces at most one active timer per
/// campaign at the storage layer.
pub const CREATE_TIMERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS timers (
    id                  TEXT PRIMARY KEY,
    campaign_id         TEXT NOT NULL REFERENCES campaigns (id) ON DELETE CASCADE,
    session_id          TEXT REFERENCES sessions (id),
    status              TEXT NOT NULL DEFAULT 'scheduled_unbound'
        CHECK (status IN ('scheduled_unbound', 'scheduled_bound', 'cancelled', 'expired', 'consumed')),
    event_text          TEXT NOT NULL,
    interruptible       BOOLEAN NOT NULL DEFAULT 1,
    interrupt_action    TEXT,
    due_at              TIMESTAMP NOT NULL,
    fired_at            TIMESTAMP,
    cancelled_at        TIMESTAMP,
    external_message_id TEXT,
    external_channel_id TEXT,
    external_thread_id  TEXT,
    created_at          TIMESTAMP NOT NULL,
    updated_at          TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS ix_timers_campaign_status_due
    ON timers (campaign_id, status, due_at);

CREATE UNIQUE INDEX IF NOT EXISTS uq_timers_one_active_per_campaign
    ON timers (campaign_id)
    WHERE status IN ('scheduled_unbound', 'scheduled_bound');
";

/// Inflight turns: the per-(campaign, actor) lease rows.
pub const CREATE_INFLIGHT_TURNS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS inflight_turns (
    id           TEXT PRIMARY KEY,
    campaign_id  TEXT NOT NULL REFERENCES campaigns (id) ON DELETE CASCADE,
    actor_id     TEXT NOT NULL REFERENCES actors (id),
    claim_token  TEXT NOT NULL,
    claimed_at   TIMESTAMP NOT NULL,
    heartbeat_at TIMESTAMP NOT NULL,
    expires_at   TIMESTAMP NOT NULL,
    UNIQUE (campaign_id, actor_id)
);

CREATE INDEX IF NOT EXISTS ix_inflight_expiry
    ON inflight_turns (expires_at);
";

pub const CREATE_EMBEDDINGS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS embeddings (
    turn_id     INTEGER PRIMARY KEY REFERENCES turns (id) ON DELETE CASCADE,
    campaign_id TEXT NOT NULL REFERENCES campaigns (id) ON DELETE CASCADE,
    kind        TEXT NOT NULL,
    content     TEXT NOT NULL,
    embedding   BLOB NOT NULL,
    created_at  TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS ix_embeddings_campaign
    ON embeddings (campaign_id);
";

pub const CREATE_MEDIA_REFS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS media_refs (
    id            TEXT PRIMARY KEY,
    campaign_id   TEXT NOT NULL REFERENCES campaigns (id) ON DELETE CASCADE,
    player_id     TEXT REFERENCES players (id),
    ref_type      TEXT NOT NULL,
    room_key      TEXT,
    url           TEXT NOT NULL,
    prompt        TEXT,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at    TIMESTAMP NOT NULL,
    updated_at    TIMESTAMP NOT NULL
);
";

/// Outbox events: externally-visible effects written in the same
/// transaction as the state change that caused them. The four-column unique
/// key makes Phase C re-runs idempotent.
pub const CREATE_OUTBOX_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS outbox_events (
    id              TEXT PRIMARY KEY,
    campaign_id     TEXT NOT NULL REFERENCES campaigns (id) ON DELETE CASCADE,
    session_id      TEXT REFERENCES sessions (id),
    session_scope   TEXT NOT NULL DEFAULT '__none__',
    event_type      TEXT NOT NULL,
    idempotency_key TEXT NOT NULL,
    payload_json    TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'sent', 'failed')),
    attempts        BIGINT NOT NULL DEFAULT 0,
    next_attempt_at TIMESTAMP,
    created_at      TIMESTAMP NOT NULL,
    updated_at      TIMESTAMP NOT NULL,
    UNIQUE (campaign_id, session_scope, event_type, idempotency_key)
);

CREATE INDEX IF NOT EXISTS ix_outbox_status_next_created
    ON outbox_events (status, next_attempt_at, created_at);
";

/// All statement groups in dependency order.
pub const STATEMENTS: &[&str] = &[
    CREATE_ACTORS_TABLE,
    CREATE_CAMPAIGNS_TABLE,
    CREATE_SESSIONS_TABLE,
    CREATE_PLAYERS_TABLE,
    CREATE_TURNS_TABLE,
    CREATE_SNAPSHOTS_TABLE,
    CREATE_TIMERS_TABLE,
    CREATE_INFLIGHT_TURNS_TABLE,
    CREATE_EMBEDDINGS_TABLE,
    CREATE_MEDIA_REFS_TABLE,
    CREATE_OUTBOX_EVENTS_TABLE,
];
