//! Schema DDL for the single relational database per Manager (spec §4.7,
//! SPEC_FULL.md §3). Applied as idempotent `CREATE TABLE IF NOT EXISTS`
//! statements at startup rather than a migrations directory — there is
//! exactly one schema version for this spec and no upgrade path to model.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS leagues (
    league_id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    signing_secret TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS agents (
    league_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    status TEXT NOT NULL,
    endpoint TEXT NOT NULL,
    registered_at TEXT NOT NULL,
    consecutive_auth_failures INTEGER NOT NULL DEFAULT 0,
    errored_at TEXT,
    PRIMARY KEY (league_id, kind, agent_id)
);

CREATE TABLE IF NOT EXISTS tokens (
    token TEXT PRIMARY KEY,
    league_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    issued_at TEXT NOT NULL,
    revoked_at TEXT,
    registration_conversation_id TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tokens_agent ON tokens (league_id, kind, agent_id);

CREATE TABLE IF NOT EXISTS rounds (
    league_id TEXT NOT NULL,
    round_id INTEGER NOT NULL,
    status TEXT NOT NULL,
    PRIMARY KEY (league_id, round_id)
);

CREATE TABLE IF NOT EXISTS matches (
    match_id TEXT PRIMARY KEY,
    league_id TEXT NOT NULL,
    round_id INTEGER NOT NULL,
    player_a TEXT NOT NULL,
    player_b TEXT NOT NULL,
    game_type TEXT NOT NULL,
    referee_id TEXT,
    status TEXT NOT NULL,
    UNIQUE (league_id, round_id, match_id)
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_matches_pair
    ON matches (league_id, player_a, player_b);

CREATE TABLE IF NOT EXISTS results (
    match_id TEXT PRIMARY KEY REFERENCES matches (match_id),
    outcome_a TEXT NOT NULL,
    outcome_b TEXT NOT NULL,
    points_a INTEGER NOT NULL,
    points_b INTEGER NOT NULL,
    game_metadata TEXT NOT NULL,
    accepted_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS standings_snapshots (
    league_id TEXT NOT NULL,
    round_id INTEGER NOT NULL,
    rows_json TEXT NOT NULL,
    published_at TEXT NOT NULL,
    PRIMARY KEY (league_id, round_id)
);
"#;
