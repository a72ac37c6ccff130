//! Payload bodies for every `envelope.message_type` (spec §6). These ride
//! inside the JSON-RPC `params.payload` field alongside the envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single player's outcome in a completed match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Win,
    Loss,
    Draw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRefereePayload {
    pub agent_id: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPlayerPayload {
    pub agent_id: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponsePayload {
    pub auth_token: String,
    pub league_id: String,
    /// The league's signing secret, handed to the newly registered agent so
    /// it can verify `auth_token`s on inbound messages locally (stateless
    /// HS256 check) instead of round-tripping every request to the Manager's
    /// token store. See DESIGN.md for the trust-model rationale.
    pub signing_secret: String,
}

/// Administrative advance-the-league message (see DESIGN.md Open Question 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueAdvancePayload {
    pub league_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchEntry {
    pub match_id: String,
    pub players: (String, String),
    pub referee: Option<String>,
    pub game_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundAnnouncePayload {
    pub round_id: u64,
    pub matches: Vec<MatchEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchAssignPayload {
    pub match_id: String,
    pub round_id: u64,
    pub game_type: String,
    pub player_a: String,
    pub player_b: String,
    /// Endpoints the referee dials directly to invite each player (spec
    /// Non-goals: no direct player-to-player channel, but the referee
    /// still needs a way to reach both without a live lookup back to the
    /// Manager on the hot path of match execution).
    pub player_a_endpoint: String,
    pub player_b_endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameInvitePayload {
    pub match_id: String,
    pub game_type: String,
    pub opponent: String,
    pub your_mark: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteAcceptPayload {
    pub match_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteDeclinePayload {
    pub match_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRequestPayload {
    pub match_id: String,
    /// Opaque per-adapter game snapshot (spec §4.6 `snapshot`).
    pub snapshot: Value,
    pub deadline: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveResponsePayload {
    pub match_id: String,
    /// Opaque per-adapter move payload.
    pub mv: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameOverPayload {
    pub match_id: String,
    pub outcome: Outcome,
    pub final_snapshot: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerResult {
    pub player_id: String,
    pub outcome: Outcome,
    pub points: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultReportPayload {
    pub match_id: String,
    pub results: (PlayerResult, PlayerResult),
    pub game_metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultAckPayload {
    pub match_id: String,
}

/// Sent by a referee to the Manager when a match ends in `ERRORED`
/// rather than `COMPLETED`/`FORFEITED` (spec §4.5, §9 Open Question 3):
/// a protocol violation or internal error the referee cannot recover
/// from on its own. Unlike `RESULT_REPORT`, this carries no outcome —
/// the match is left terminal pending manual resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchErrorPayload {
    pub match_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryStandingsPayload {
    pub league_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingsRow {
    pub rank: u32,
    pub player_id: String,
    pub points: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub point_diff: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingsResponsePayload {
    pub league_id: String,
    pub round_id: u64,
    pub rows: Vec<StandingsRow>,
}
