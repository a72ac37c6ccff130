//! Row types mirroring the entities in spec §3, one struct per table,
//! each a plain `#[derive(FromRow)]` struct.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum LeagueStatus {
    Init,
    Registration,
    Scheduling,
    Active,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum AgentKindDb {
    Referee,
    Player,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum AgentStatus {
    Init,
    Registered,
    Active,
    Suspended,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum RoundStatus {
    Pending,
    Announced,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Forfeited,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum OutcomeDb {
    Win,
    Loss,
    Draw,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LeagueRow {
    pub league_id: String,
    pub status: LeagueStatus,
    pub created_at: DateTime<Utc>,
    pub signing_secret: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AgentRow {
    pub league_id: String,
    pub kind: AgentKindDb,
    pub agent_id: String,
    pub status: AgentStatus,
    pub endpoint: String,
    pub registered_at: DateTime<Utc>,
    pub consecutive_auth_failures: i64,
    /// Set when this agent (always a referee in practice) last caused a
    /// match to end `ERRORED`; gates reassignment for the configured
    /// cool-down (spec §9 Open Question 3).
    pub errored_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TokenRow {
    pub token: String,
    pub league_id: String,
    pub kind: AgentKindDb,
    pub agent_id: String,
    pub issued_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub registration_conversation_id: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RoundRow {
    pub league_id: String,
    pub round_id: i64,
    pub status: RoundStatus,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MatchRow {
    pub match_id: String,
    pub league_id: String,
    pub round_id: i64,
    pub player_a: String,
    pub player_b: String,
    pub game_type: String,
    pub referee_id: Option<String>,
    pub status: MatchStatus,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ResultRow {
    pub match_id: String,
    pub outcome_a: OutcomeDb,
    pub outcome_b: OutcomeDb,
    pub points_a: i64,
    pub points_b: i64,
    pub game_metadata: Json<Value>,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StandingsSnapshotRow {
    pub league_id: String,
    pub round_id: i64,
    pub rows_json: Json<Value>,
    pub published_at: DateTime<Utc>,
}
