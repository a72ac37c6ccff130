//! The persistence layer (spec §4.7): a single SQLite database per Manager
//! process, with transactional multi-row writes and crash-consistent
//! replay. One struct wraps the pool, `thiserror`-typed errors, async
//! methods per operation.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::error::StorageError;
use crate::models::{
    AgentKindDb, AgentRow, AgentStatus, LeagueRow, LeagueStatus, MatchRow, MatchStatus,
    OutcomeDb, ResultRow, RoundRow, RoundStatus, StandingsSnapshotRow, TokenRow,
};
use crate::schema::SCHEMA;

/// One match to persist as part of a freshly generated round-robin
/// schedule (spec §4.3). Plain data, not a row type, because it is
/// produced by the pure scheduler function before anything touches the
/// database.
#[derive(Debug, Clone)]
pub struct MatchPlan {
    pub match_id: String,
    pub round_id: i64,
    pub player_a: String,
    pub player_b: String,
    pub game_type: String,
}

#[derive(Debug, Clone)]
pub struct RoundPlan {
    pub round_id: i64,
    pub matches: Vec<MatchPlan>,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if absent) the SQLite database at `database_path`
    /// and applies the schema. `database_path` is the `database_path`
    /// config option from SPEC_FULL.md §6.
    pub async fn connect(database_path: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{database_path}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(8).connect_with(options).await?;
        Self::apply_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn apply_schema(pool: &SqlitePool) -> Result<(), StorageError> {
        for statement in SCHEMA.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(pool).await?;
        }
        Ok(())
    }

    /// For tests and health checks: an in-memory database.
    pub async fn connect_in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::apply_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Leagues
    // ---------------------------------------------------------------

    pub async fn create_league(&self, league_id: &str, signing_secret: &str) -> Result<LeagueRow, StorageError> {
        let row = LeagueRow {
            league_id: league_id.to_string(),
            status: LeagueStatus::Init,
            created_at: Utc::now(),
            signing_secret: signing_secret.to_string(),
        };
        sqlx::query("INSERT INTO leagues (league_id, status, created_at, signing_secret) VALUES (?, ?, ?, ?)")
            .bind(&row.league_id)
            .bind(status_str(row.status))
            .bind(row.created_at.to_rfc3339())
            .bind(&row.signing_secret)
            .execute(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_league(&self, league_id: &str) -> Result<LeagueRow, StorageError> {
        let row = sqlx::query("SELECT league_id, status, created_at, signing_secret FROM leagues WHERE league_id = ?")
            .bind(league_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::LeagueNotFound(league_id.to_string()))?;
        Ok(LeagueRow {
            league_id: row.try_get("league_id")?,
            status: parse_league_status(row.try_get("status")?)?,
            created_at: parse_ts(row.try_get("created_at")?)?,
            signing_secret: row.try_get("signing_secret")?,
        })
    }

    /// Status only moves forward (spec §3: "backward transitions forbidden").
    pub async fn advance_league_status(&self, league_id: &str, to: LeagueStatus) -> Result<(), StorageError> {
        let current = self.get_league(league_id).await?.status;
        if status_rank(to) < status_rank(current) && to != LeagueStatus::Aborted {
            return Err(StorageError::PreconditionFailed(format!(
                "cannot move league {league_id} backward from {current:?} to {to:?}"
            )));
        }
        sqlx::query("UPDATE leagues SET status = ? WHERE league_id = ?")
            .bind(status_str(to))
            .bind(league_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Agents
    // ---------------------------------------------------------------

    /// Registers an agent, transactionally. Unique-constraint violation on
    /// `(league_id, kind, agent_id)` maps to `StorageError::DuplicateId`.
    pub async fn register_agent(
        &self,
        league_id: &str,
        kind: AgentKindDb,
        agent_id: &str,
        endpoint: &str,
    ) -> Result<AgentRow, StorageError> {
        let row = AgentRow {
            league_id: league_id.to_string(),
            kind,
            agent_id: agent_id.to_string(),
            status: AgentStatus::Registered,
            endpoint: endpoint.to_string(),
            registered_at: Utc::now(),
            consecutive_auth_failures: 0,
            errored_at: None,
        };
        let result = sqlx::query(
            "INSERT INTO agents (league_id, kind, agent_id, status, endpoint, registered_at, consecutive_auth_failures, errored_at) \
             VALUES (?, ?, ?, ?, ?, ?, 0, NULL)",
        )
        .bind(&row.league_id)
        .bind(kind_str(kind))
        .bind(&row.agent_id)
        .bind(agent_status_str(row.status))
        .bind(&row.endpoint)
        .bind(row.registered_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(row),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StorageError::DuplicateId(agent_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn count_agents(&self, league_id: &str, kind: AgentKindDb) -> Result<i64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) as c FROM agents WHERE league_id = ? AND kind = ?")
            .bind(league_id)
            .bind(kind_str(kind))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("c")?)
    }

    /// All agent ids of `kind` registered in the league, used by the
    /// scheduler (players) and round announcement (referees). Ordered
    /// lexicographically for determinism.
    pub async fn list_agent_ids(&self, league_id: &str, kind: AgentKindDb) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query("SELECT agent_id FROM agents WHERE league_id = ? AND kind = ? ORDER BY agent_id ASC")
            .bind(league_id)
            .bind(kind_str(kind))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| Ok(r.try_get::<String, _>("agent_id")?)).collect()
    }

    pub async fn get_agent(&self, league_id: &str, kind: AgentKindDb, agent_id: &str) -> Result<Option<AgentRow>, StorageError> {
        let row = sqlx::query(
            "SELECT league_id, kind, agent_id, status, endpoint, registered_at, consecutive_auth_failures, errored_at \
             FROM agents WHERE league_id = ? AND kind = ? AND agent_id = ?",
        )
        .bind(league_id)
        .bind(kind_str(kind))
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_agent).transpose()
    }

    /// Referees with no in-progress match and, if they last `ERRORED`
    /// out of a match, past their cool-down (spec §9 Open Question 3),
    /// ordered lowest-id-first (spec §4.3 "referee whose referee_id
    /// sorts lowest among idles").
    pub async fn list_idle_referees(&self, league_id: &str, errored_cutoff: DateTime<Utc>) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query(
            "SELECT a.agent_id as agent_id FROM agents a \
             WHERE a.league_id = ? AND a.kind = 'referee' AND a.status != 'suspended' AND a.status != 'shutdown' \
             AND (a.errored_at IS NULL OR a.errored_at <= ?) \
             AND a.agent_id NOT IN ( \
                 SELECT referee_id FROM matches \
                 WHERE league_id = ? AND referee_id IS NOT NULL AND status IN ('assigned', 'in_progress') \
             ) ORDER BY a.agent_id ASC",
        )
        .bind(league_id)
        .bind(errored_cutoff.to_rfc3339())
        .bind(league_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|r| Ok(r.try_get::<String, _>("agent_id")?)).collect()
    }

    /// Records that `agent_id` (a referee) just caused a match to end
    /// `ERRORED`, starting its reassignment cool-down.
    pub async fn mark_agent_errored(&self, league_id: &str, kind: AgentKindDb, agent_id: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE agents SET errored_at = ? WHERE league_id = ? AND kind = ? AND agent_id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(league_id)
            .bind(kind_str(kind))
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_agent_status(&self, league_id: &str, kind: AgentKindDb, agent_id: &str, status: AgentStatus) -> Result<(), StorageError> {
        sqlx::query("UPDATE agents SET status = ? WHERE league_id = ? AND kind = ? AND agent_id = ?")
            .bind(agent_status_str(status))
            .bind(league_id)
            .bind(kind_str(kind))
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_auth_failure(&self, league_id: &str, kind: AgentKindDb, agent_id: &str) -> Result<i64, StorageError> {
        sqlx::query("UPDATE agents SET consecutive_auth_failures = consecutive_auth_failures + 1 WHERE league_id = ? AND kind = ? AND agent_id = ?")
            .bind(league_id)
            .bind(kind_str(kind))
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        let agent = self.get_agent(league_id, kind, agent_id).await?;
        Ok(agent.map(|a| a.consecutive_auth_failures).unwrap_or(0))
    }

    pub async fn reset_auth_failures(&self, league_id: &str, kind: AgentKindDb, agent_id: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE agents SET consecutive_auth_failures = 0 WHERE league_id = ? AND kind = ? AND agent_id = ?")
            .bind(league_id)
            .bind(kind_str(kind))
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Tokens
    // ---------------------------------------------------------------

    /// Issues a token, transactionally revoking any prior live token for
    /// the same agent first (spec §3: "at most one live token per agent").
    /// Idempotent on `(league_id, kind, agent_id, conversation_id)`: a
    /// retried registration in the same conversation returns the
    /// already-issued token rather than minting a new one (spec §8).
    pub async fn issue_token(
        &self,
        league_id: &str,
        kind: AgentKindDb,
        agent_id: &str,
        conversation_id: &str,
        token: &str,
    ) -> Result<String, StorageError> {
        let mut tx = self.pool.begin().await?;

        if let Some(existing) = sqlx::query(
            "SELECT token FROM tokens WHERE league_id = ? AND kind = ? AND agent_id = ? \
             AND registration_conversation_id = ? AND revoked_at IS NULL",
        )
        .bind(league_id)
        .bind(kind_str(kind))
        .bind(agent_id)
        .bind(conversation_id)
        .fetch_optional(&mut *tx)
        .await?
        {
            let token: String = existing.try_get("token")?;
            tx.commit().await?;
            return Ok(token);
        }

        sqlx::query(
            "UPDATE tokens SET revoked_at = ? WHERE league_id = ? AND kind = ? AND agent_id = ? AND revoked_at IS NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(league_id)
        .bind(kind_str(kind))
        .bind(agent_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO tokens (token, league_id, kind, agent_id, issued_at, revoked_at, registration_conversation_id) \
             VALUES (?, ?, ?, ?, ?, NULL, ?)",
        )
        .bind(token)
        .bind(league_id)
        .bind(kind_str(kind))
        .bind(agent_id)
        .bind(Utc::now().to_rfc3339())
        .bind(conversation_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(token.to_string())
    }

    pub async fn lookup_live_token(&self, token: &str) -> Result<Option<TokenRow>, StorageError> {
        let row = sqlx::query(
            "SELECT token, league_id, kind, agent_id, issued_at, revoked_at, registration_conversation_id \
             FROM tokens WHERE token = ? AND revoked_at IS NULL",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_token).transpose()
    }

    pub async fn revoke_all_tokens_for_league(&self, league_id: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE tokens SET revoked_at = ? WHERE league_id = ? AND revoked_at IS NULL")
            .bind(Utc::now().to_rfc3339())
            .bind(league_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Schedule: rounds + matches
    // ---------------------------------------------------------------

    /// Persists a freshly generated schedule in one transaction (spec
    /// §4.7). Unordered-pair uniqueness is enforced by the
    /// `idx_matches_pair` unique index, which relies on the scheduler
    /// always inserting `(player_a, player_b)` in canonical order.
    pub async fn persist_schedule(&self, league_id: &str, rounds: &[RoundPlan]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for round in rounds {
            sqlx::query("INSERT INTO rounds (league_id, round_id, status) VALUES (?, ?, ?)")
                .bind(league_id)
                .bind(round.round_id)
                .bind(round_status_str(RoundStatus::Pending))
                .execute(&mut *tx)
                .await?;
            for m in &round.matches {
                let insert = sqlx::query(
                    "INSERT INTO matches (match_id, league_id, round_id, player_a, player_b, game_type, referee_id, status) \
                     VALUES (?, ?, ?, ?, ?, ?, NULL, ?)",
                )
                .bind(&m.match_id)
                .bind(league_id)
                .bind(m.round_id)
                .bind(&m.player_a)
                .bind(&m.player_b)
                .bind(&m.game_type)
                .bind(match_status_str(MatchStatus::Pending))
                .execute(&mut *tx)
                .await;
                match insert {
                    Ok(_) => {}
                    Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                        return Err(StorageError::PreconditionFailed(format!(
                            "pair ({}, {}) scheduled more than once",
                            m.player_a, m.player_b
                        )));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn set_round_status(&self, league_id: &str, round_id: i64, status: RoundStatus) -> Result<(), StorageError> {
        sqlx::query("UPDATE rounds SET status = ? WHERE league_id = ? AND round_id = ?")
            .bind(round_status_str(status))
            .bind(league_id)
            .bind(round_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_round(&self, league_id: &str, round_id: i64) -> Result<Option<RoundRow>, StorageError> {
        let row = sqlx::query("SELECT league_id, round_id, status FROM rounds WHERE league_id = ? AND round_id = ?")
            .bind(league_id)
            .bind(round_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_round).transpose()
    }

    pub async fn list_matches_for_round(&self, league_id: &str, round_id: i64) -> Result<Vec<MatchRow>, StorageError> {
        let rows = sqlx::query(
            "SELECT match_id, league_id, round_id, player_a, player_b, game_type, referee_id, status \
             FROM matches WHERE league_id = ? AND round_id = ? ORDER BY match_id ASC",
        )
        .bind(league_id)
        .bind(round_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_match).collect()
    }

    /// FIFO queue of unassigned matches, oldest round first, stable
    /// `match_id` order within a round (spec §4.3).
    pub async fn list_pending_matches(&self, league_id: &str) -> Result<Vec<MatchRow>, StorageError> {
        let rows = sqlx::query(
            "SELECT match_id, league_id, round_id, player_a, player_b, game_type, referee_id, status \
             FROM matches WHERE league_id = ? AND status = 'pending' ORDER BY round_id ASC, match_id ASC",
        )
        .bind(league_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_match).collect()
    }

    /// Matches still assigned to or being played by a referee, across the
    /// whole league. Used to decide league completion independent of the
    /// idle-referee cool-down, which can leave a referee "not idle"
    /// without it holding any match.
    pub async fn count_in_flight_matches(&self, league_id: &str) -> Result<i64, StorageError> {
        let row = sqlx::query(
            "SELECT COUNT(*) as c FROM matches WHERE league_id = ? AND status IN ('assigned', 'in_progress')",
        )
        .bind(league_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("c")?)
    }

    pub async fn get_match(&self, match_id: &str) -> Result<Option<MatchRow>, StorageError> {
        let row = sqlx::query(
            "SELECT match_id, league_id, round_id, player_a, player_b, game_type, referee_id, status FROM matches WHERE match_id = ?",
        )
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_match).transpose()
    }

    pub async fn assign_match(&self, match_id: &str, referee_id: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE matches SET referee_id = ?, status = ? WHERE match_id = ? AND status = 'pending'")
            .bind(referee_id)
            .bind(match_status_str(MatchStatus::Assigned))
            .bind(match_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_match_status(&self, match_id: &str, status: MatchStatus) -> Result<(), StorageError> {
        sqlx::query("UPDATE matches SET status = ? WHERE match_id = ?")
            .bind(match_status_str(status))
            .bind(match_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Results + standings
    // ---------------------------------------------------------------

    /// Accepts a result, transactionally, with the idempotency semantics
    /// of spec §4.2/§8: identical re-submission returns `Ok(false)`
    /// ("already accepted, no-op"); a differing payload is a
    /// `ResultConflict`; a fresh acceptance transitions the match to
    /// `Completed` (or `Forfeited` if either outcome is a forfeit,
    /// decided by the caller via `match_status`) and returns `Ok(true)`.
    pub async fn accept_result(&self, match_id: &str, result: &ResultRow, match_status: MatchStatus) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await?;

        if let Some(existing) = sqlx::query(
            "SELECT outcome_a, outcome_b, points_a, points_b, game_metadata FROM results WHERE match_id = ?",
        )
        .bind(match_id)
        .fetch_optional(&mut *tx)
        .await?
        {
            let existing_metadata: String = existing.try_get("game_metadata")?;
            let same = existing.try_get::<String, _>("outcome_a")? == outcome_str(result.outcome_a)
                && existing.try_get::<String, _>("outcome_b")? == outcome_str(result.outcome_b)
                && existing.try_get::<i64, _>("points_a")? == result.points_a
                && existing.try_get::<i64, _>("points_b")? == result.points_b
                && existing_metadata == serde_json::to_string(&result.game_metadata.0)?;
            tx.commit().await?;
            return if same { Ok(false) } else { Err(StorageError::ResultConflict) };
        }

        sqlx::query(
            "INSERT INTO results (match_id, outcome_a, outcome_b, points_a, points_b, game_metadata, accepted_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(match_id)
        .bind(outcome_str(result.outcome_a))
        .bind(outcome_str(result.outcome_b))
        .bind(result.points_a)
        .bind(result.points_b)
        .bind(serde_json::to_string(&result.game_metadata.0)?)
        .bind(result.accepted_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE matches SET status = ? WHERE match_id = ?")
            .bind(match_status_str(match_status))
            .bind(match_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn list_results(&self, league_id: &str) -> Result<Vec<ResultRow>, StorageError> {
        let rows = sqlx::query(
            "SELECT r.match_id, r.outcome_a, r.outcome_b, r.points_a, r.points_b, r.game_metadata, r.accepted_at \
             FROM results r JOIN matches m ON m.match_id = r.match_id WHERE m.league_id = ?",
        )
        .bind(league_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_result).collect()
    }

    /// Publishes a standings snapshot for `round_id`, recomputed from the
    /// authoritative result rows (spec §4.4 "recomputed... after every
    /// accepted result"). Results only ever land in a round while it has
    /// matches still in flight, so the snapshot stops changing — and is
    /// immutable in practice, per spec §3 — the moment the round's last
    /// match completes; there is no separate "seal" step.
    pub async fn publish_standings(&self, league_id: &str, round_id: i64, rows: &Value) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO standings_snapshots (league_id, round_id, rows_json, published_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT (league_id, round_id) DO UPDATE SET rows_json = excluded.rows_json, published_at = excluded.published_at",
        )
            .bind(league_id)
            .bind(round_id)
            .bind(serde_json::to_string(rows)?)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns the most recently written snapshot. Standings are always
    /// recomputed over the full result set, so the most recent write is
    /// the authoritative "latest" regardless of which round_id it is
    /// keyed under (rounds can complete out of strict order when more
    /// than one referee is active).
    pub async fn latest_standings(&self, league_id: &str) -> Result<Option<StandingsSnapshotRow>, StorageError> {
        let row = sqlx::query(
            "SELECT league_id, round_id, rows_json, published_at FROM standings_snapshots \
             WHERE league_id = ? ORDER BY published_at DESC LIMIT 1",
        )
        .bind(league_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_snapshot).transpose()
    }
}

fn status_str(s: LeagueStatus) -> &'static str {
    match s {
        LeagueStatus::Init => "init",
        LeagueStatus::Registration => "registration",
        LeagueStatus::Scheduling => "scheduling",
        LeagueStatus::Active => "active",
        LeagueStatus::Completed => "completed",
        LeagueStatus::Aborted => "aborted",
    }
}

fn status_rank(s: LeagueStatus) -> u8 {
    match s {
        LeagueStatus::Init => 0,
        LeagueStatus::Registration => 1,
        LeagueStatus::Scheduling => 2,
        LeagueStatus::Active => 3,
        LeagueStatus::Completed => 4,
        LeagueStatus::Aborted => 5,
    }
}

fn parse_league_status(s: String) -> Result<LeagueStatus, StorageError> {
    Ok(match s.as_str() {
        "init" => LeagueStatus::Init,
        "registration" => LeagueStatus::Registration,
        "scheduling" => LeagueStatus::Scheduling,
        "active" => LeagueStatus::Active,
        "completed" => LeagueStatus::Completed,
        "aborted" => LeagueStatus::Aborted,
        other => return Err(StorageError::Database(sqlx::Error::Protocol(format!("bad league status: {other}")))),
    })
}

fn kind_str(k: AgentKindDb) -> &'static str {
    match k {
        AgentKindDb::Referee => "referee",
        AgentKindDb::Player => "player",
    }
}

fn parse_kind(s: &str) -> Result<AgentKindDb, StorageError> {
    match s {
        "referee" => Ok(AgentKindDb::Referee),
        "player" => Ok(AgentKindDb::Player),
        other => Err(StorageError::Database(sqlx::Error::Protocol(format!("bad agent kind: {other}")))),
    }
}

fn agent_status_str(s: AgentStatus) -> &'static str {
    match s {
        AgentStatus::Init => "init",
        AgentStatus::Registered => "registered",
        AgentStatus::Active => "active",
        AgentStatus::Suspended => "suspended",
        AgentStatus::Shutdown => "shutdown",
    }
}

fn parse_agent_status(s: &str) -> Result<AgentStatus, StorageError> {
    match s {
        "init" => Ok(AgentStatus::Init),
        "registered" => Ok(AgentStatus::Registered),
        "active" => Ok(AgentStatus::Active),
        "suspended" => Ok(AgentStatus::Suspended),
        "shutdown" => Ok(AgentStatus::Shutdown),
        other => Err(StorageError::Database(sqlx::Error::Protocol(format!("bad agent status: {other}")))),
    }
}

fn round_status_str(s: RoundStatus) -> &'static str {
    match s {
        RoundStatus::Pending => "pending",
        RoundStatus::Announced => "announced",
        RoundStatus::Completed => "completed",
    }
}

fn parse_round_status(s: &str) -> Result<RoundStatus, StorageError> {
    match s {
        "pending" => Ok(RoundStatus::Pending),
        "announced" => Ok(RoundStatus::Announced),
        "completed" => Ok(RoundStatus::Completed),
        other => Err(StorageError::Database(sqlx::Error::Protocol(format!("bad round status: {other}")))),
    }
}

fn match_status_str(s: MatchStatus) -> &'static str {
    match s {
        MatchStatus::Pending => "pending",
        MatchStatus::Assigned => "assigned",
        MatchStatus::InProgress => "in_progress",
        MatchStatus::Completed => "completed",
        MatchStatus::Forfeited => "forfeited",
        MatchStatus::Errored => "errored",
    }
}

fn parse_match_status(s: &str) -> Result<MatchStatus, StorageError> {
    match s {
        "pending" => Ok(MatchStatus::Pending),
        "assigned" => Ok(MatchStatus::Assigned),
        "in_progress" => Ok(MatchStatus::InProgress),
        "completed" => Ok(MatchStatus::Completed),
        "forfeited" => Ok(MatchStatus::Forfeited),
        "errored" => Ok(MatchStatus::Errored),
        other => Err(StorageError::Database(sqlx::Error::Protocol(format!("bad match status: {other}")))),
    }
}

fn outcome_str(o: OutcomeDb) -> &'static str {
    match o {
        OutcomeDb::Win => "win",
        OutcomeDb::Loss => "loss",
        OutcomeDb::Draw => "draw",
    }
}

fn parse_outcome(s: &str) -> Result<OutcomeDb, StorageError> {
    match s {
        "win" => Ok(OutcomeDb::Win),
        "loss" => Ok(OutcomeDb::Loss),
        "draw" => Ok(OutcomeDb::Draw),
        other => Err(StorageError::Database(sqlx::Error::Protocol(format!("bad outcome: {other}")))),
    }
}

fn parse_ts(s: String) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Database(sqlx::Error::Protocol(format!("bad timestamp {s}: {e}"))))
}

fn row_to_agent(row: sqlx::sqlite::SqliteRow) -> Result<AgentRow, StorageError> {
    Ok(AgentRow {
        league_id: row.try_get("league_id")?,
        kind: parse_kind(&row.try_get::<String, _>("kind")?)?,
        agent_id: row.try_get("agent_id")?,
        status: parse_agent_status(&row.try_get::<String, _>("status")?)?,
        endpoint: row.try_get("endpoint")?,
        registered_at: parse_ts(row.try_get("registered_at")?)?,
        consecutive_auth_failures: row.try_get("consecutive_auth_failures")?,
        errored_at: row.try_get::<Option<String>, _>("errored_at")?.map(parse_ts).transpose()?,
    })
}

fn row_to_token(row: sqlx::sqlite::SqliteRow) -> Result<TokenRow, StorageError> {
    Ok(TokenRow {
        token: row.try_get("token")?,
        league_id: row.try_get("league_id")?,
        kind: parse_kind(&row.try_get::<String, _>("kind")?)?,
        agent_id: row.try_get("agent_id")?,
        issued_at: parse_ts(row.try_get("issued_at")?)?,
        revoked_at: row.try_get::<Option<String>, _>("revoked_at")?.map(parse_ts).transpose()?,
        registration_conversation_id: row.try_get("registration_conversation_id")?,
    })
}

fn row_to_round(row: sqlx::sqlite::SqliteRow) -> Result<RoundRow, StorageError> {
    Ok(RoundRow {
        league_id: row.try_get("league_id")?,
        round_id: row.try_get("round_id")?,
        status: parse_round_status(&row.try_get::<String, _>("status")?)?,
    })
}

fn row_to_match(row: sqlx::sqlite::SqliteRow) -> Result<MatchRow, StorageError> {
    Ok(MatchRow {
        match_id: row.try_get("match_id")?,
        league_id: row.try_get("league_id")?,
        round_id: row.try_get("round_id")?,
        player_a: row.try_get("player_a")?,
        player_b: row.try_get("player_b")?,
        game_type: row.try_get("game_type")?,
        referee_id: row.try_get("referee_id")?,
        status: parse_match_status(&row.try_get::<String, _>("status")?)?,
    })
}

fn row_to_result(row: sqlx::sqlite::SqliteRow) -> Result<ResultRow, StorageError> {
    let metadata_raw: String = row.try_get("game_metadata")?;
    Ok(ResultRow {
        match_id: row.try_get("match_id")?,
        outcome_a: parse_outcome(&row.try_get::<String, _>("outcome_a")?)?,
        outcome_b: parse_outcome(&row.try_get::<String, _>("outcome_b")?)?,
        points_a: row.try_get("points_a")?,
        points_b: row.try_get("points_b")?,
        game_metadata: Json(serde_json::from_str(&metadata_raw)?),
        accepted_at: parse_ts(row.try_get("accepted_at")?)?,
    })
}

fn row_to_snapshot(row: sqlx::sqlite::SqliteRow) -> Result<StandingsSnapshotRow, StorageError> {
    let rows_raw: String = row.try_get("rows_json")?;
    Ok(StandingsSnapshotRow {
        league_id: row.try_get("league_id")?,
        round_id: row.try_get("round_id")?,
        rows_json: Json(serde_json::from_str(&rows_raw)?),
        published_at: parse_ts(row.try_get("published_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(match_id: &str, points_a: i64, points_b: i64) -> ResultRow {
        ResultRow {
            match_id: match_id.to_string(),
            outcome_a: OutcomeDb::Win,
            outcome_b: OutcomeDb::Loss,
            points_a,
            points_b,
            game_metadata: Json(serde_json::json!({"moves": 5})),
            accepted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn league_created_in_init_and_advances_forward_only() {
        let store = Store::connect_in_memory().await.unwrap();
        store.create_league("L1", "secret").await.unwrap();

        let league = store.get_league("L1").await.unwrap();
        assert_eq!(league.status, LeagueStatus::Init);

        store.advance_league_status("L1", LeagueStatus::Registration).await.unwrap();
        store.advance_league_status("L1", LeagueStatus::Active).await.unwrap();
        assert_eq!(store.get_league("L1").await.unwrap().status, LeagueStatus::Active);

        let err = store.advance_league_status("L1", LeagueStatus::Registration).await.unwrap_err();
        assert!(matches!(err, StorageError::PreconditionFailed(_)));

        // Aborted is the one exception to forward-only.
        store.advance_league_status("L1", LeagueStatus::Aborted).await.unwrap();
        assert_eq!(store.get_league("L1").await.unwrap().status, LeagueStatus::Aborted);
    }

    #[tokio::test]
    async fn get_league_rejects_unknown_id() {
        let store = Store::connect_in_memory().await.unwrap();
        let err = store.get_league("nope").await.unwrap_err();
        assert!(matches!(err, StorageError::LeagueNotFound(_)));
    }

    #[tokio::test]
    async fn register_agent_rejects_duplicate_id() {
        let store = Store::connect_in_memory().await.unwrap();
        store.create_league("L1", "secret").await.unwrap();
        store.register_agent("L1", AgentKindDb::Player, "p1", "http://p1").await.unwrap();

        let err = store
            .register_agent("L1", AgentKindDb::Player, "p1", "http://other")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateId(_)));

        // Same agent_id under a different kind is a distinct row (composite key).
        store.register_agent("L1", AgentKindDb::Referee, "p1", "http://ref").await.unwrap();
        assert_eq!(store.count_agents("L1", AgentKindDb::Player).await.unwrap(), 1);
        assert_eq!(store.count_agents("L1", AgentKindDb::Referee).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_agent_ids_is_lexicographic() {
        let store = Store::connect_in_memory().await.unwrap();
        store.create_league("L1", "secret").await.unwrap();
        for id in ["p3", "p1", "p2"] {
            store.register_agent("L1", AgentKindDb::Player, id, "http://x").await.unwrap();
        }
        let ids = store.list_agent_ids("L1", AgentKindDb::Player).await.unwrap();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn idle_referees_exclude_suspended_and_busy() {
        let store = Store::connect_in_memory().await.unwrap();
        store.create_league("L1", "secret").await.unwrap();
        store.register_agent("L1", AgentKindDb::Referee, "r1", "http://r1").await.unwrap();
        store.register_agent("L1", AgentKindDb::Referee, "r2", "http://r2").await.unwrap();
        store.register_agent("L1", AgentKindDb::Referee, "r3", "http://r3").await.unwrap();
        store.set_agent_status("L1", AgentKindDb::Referee, "r2", AgentStatus::Suspended).await.unwrap();

        store.persist_schedule(
            "L1",
            &[RoundPlan {
                round_id: 1,
                matches: vec![MatchPlan {
                    match_id: "m1".to_string(),
                    round_id: 1,
                    player_a: "a".to_string(),
                    player_b: "b".to_string(),
                    game_type: "tic_tac_toe".to_string(),
                }],
            }],
        )
        .await
        .unwrap();
        store.assign_match("m1", "r3").await.unwrap();

        let idle = store.list_idle_referees("L1", Utc::now()).await.unwrap();
        assert_eq!(idle, vec!["r1"]);
    }

    #[tokio::test]
    async fn idle_referees_exclude_errored_until_cooldown_elapses() {
        let store = Store::connect_in_memory().await.unwrap();
        store.create_league("L1", "secret").await.unwrap();
        store.register_agent("L1", AgentKindDb::Referee, "r1", "http://r1").await.unwrap();
        store.mark_agent_errored("L1", AgentKindDb::Referee, "r1").await.unwrap();

        // Cutoff in the past: the referee errored after it, still cooling down.
        let still_cooling = store.list_idle_referees("L1", Utc::now() - chrono::Duration::seconds(30)).await.unwrap();
        assert!(still_cooling.is_empty());

        // Cutoff in the future: the errored_at timestamp is now <= cutoff, cool-down served.
        let recovered = store.list_idle_referees("L1", Utc::now() + chrono::Duration::seconds(30)).await.unwrap();
        assert_eq!(recovered, vec!["r1"]);
    }

    #[tokio::test]
    async fn auth_failure_counter_increments_and_resets() {
        let store = Store::connect_in_memory().await.unwrap();
        store.create_league("L1", "secret").await.unwrap();
        store.register_agent("L1", AgentKindDb::Referee, "r1", "http://r1").await.unwrap();

        assert_eq!(store.record_auth_failure("L1", AgentKindDb::Referee, "r1").await.unwrap(), 1);
        assert_eq!(store.record_auth_failure("L1", AgentKindDb::Referee, "r1").await.unwrap(), 2);

        store.reset_auth_failures("L1", AgentKindDb::Referee, "r1").await.unwrap();
        let agent = store.get_agent("L1", AgentKindDb::Referee, "r1").await.unwrap().unwrap();
        assert_eq!(agent.consecutive_auth_failures, 0);
    }

    #[tokio::test]
    async fn issue_token_is_idempotent_per_conversation_and_revokes_prior_on_reissue() {
        let store = Store::connect_in_memory().await.unwrap();
        store.create_league("L1", "secret").await.unwrap();
        store.register_agent("L1", AgentKindDb::Player, "p1", "http://p1").await.unwrap();

        let t1 = store.issue_token("L1", AgentKindDb::Player, "p1", "conv-1", "token-a").await.unwrap();
        assert_eq!(t1, "token-a");

        // Same conversation_id: returns the already-issued token, does not mint a new one.
        let t1_again = store.issue_token("L1", AgentKindDb::Player, "p1", "conv-1", "token-b").await.unwrap();
        assert_eq!(t1_again, "token-a");
        assert!(store.lookup_live_token("token-a").await.unwrap().is_some());

        // A new conversation mints a fresh token and revokes the prior live one.
        let t2 = store.issue_token("L1", AgentKindDb::Player, "p1", "conv-2", "token-c").await.unwrap();
        assert_eq!(t2, "token-c");
        assert!(store.lookup_live_token("token-a").await.unwrap().is_none());
        assert!(store.lookup_live_token("token-c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn revoke_all_tokens_for_league_clears_live_tokens() {
        let store = Store::connect_in_memory().await.unwrap();
        store.create_league("L1", "secret").await.unwrap();
        store.register_agent("L1", AgentKindDb::Player, "p1", "http://p1").await.unwrap();
        store.issue_token("L1", AgentKindDb::Player, "p1", "conv-1", "token-a").await.unwrap();

        store.revoke_all_tokens_for_league("L1").await.unwrap();
        assert!(store.lookup_live_token("token-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persist_schedule_rejects_duplicate_unordered_pair() {
        let store = Store::connect_in_memory().await.unwrap();
        store.create_league("L1", "secret").await.unwrap();

        let rounds = vec![
            RoundPlan {
                round_id: 1,
                matches: vec![MatchPlan {
                    match_id: "m1".to_string(),
                    round_id: 1,
                    player_a: "a".to_string(),
                    player_b: "b".to_string(),
                    game_type: "tic_tac_toe".to_string(),
                }],
            },
            RoundPlan {
                round_id: 2,
                matches: vec![MatchPlan {
                    match_id: "m2".to_string(),
                    round_id: 2,
                    player_a: "a".to_string(),
                    player_b: "b".to_string(),
                    game_type: "tic_tac_toe".to_string(),
                }],
            },
        ];

        let err = store.persist_schedule("L1", &rounds).await.unwrap_err();
        assert!(matches!(err, StorageError::PreconditionFailed(_)));

        // Nothing from the failing transaction was committed.
        assert!(store.get_round("L1", 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persist_schedule_then_pending_matches_is_fifo() {
        let store = Store::connect_in_memory().await.unwrap();
        store.create_league("L1", "secret").await.unwrap();

        let rounds = vec![
            RoundPlan {
                round_id: 1,
                matches: vec![
                    MatchPlan { match_id: "m2".to_string(), round_id: 1, player_a: "a".to_string(), player_b: "c".to_string(), game_type: "tic_tac_toe".to_string() },
                    MatchPlan { match_id: "m1".to_string(), round_id: 1, player_a: "a".to_string(), player_b: "b".to_string(), game_type: "tic_tac_toe".to_string() },
                ],
            },
            RoundPlan {
                round_id: 2,
                matches: vec![MatchPlan { match_id: "m3".to_string(), round_id: 2, player_a: "b".to_string(), player_b: "c".to_string(), game_type: "tic_tac_toe".to_string() }],
            },
        ];
        store.persist_schedule("L1", &rounds).await.unwrap();

        let pending = store.list_pending_matches("L1").await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|m| m.match_id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);

        store.assign_match("m1", "r1").await.unwrap();
        let pending = store.list_pending_matches("L1").await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|m| m.match_id.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m3"]);

        let assigned = store.get_match("m1").await.unwrap().unwrap();
        assert_eq!(assigned.status, MatchStatus::Assigned);
        assert_eq!(assigned.referee_id.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn accept_result_is_idempotent_on_identical_resubmission() {
        let store = Store::connect_in_memory().await.unwrap();
        store.create_league("L1", "secret").await.unwrap();
        store.persist_schedule(
            "L1",
            &[RoundPlan {
                round_id: 1,
                matches: vec![MatchPlan { match_id: "m1".to_string(), round_id: 1, player_a: "a".to_string(), player_b: "b".to_string(), game_type: "tic_tac_toe".to_string() }],
            }],
        )
        .await
        .unwrap();

        let result = sample_result("m1", 3, 0);
        let first = store.accept_result("m1", &result, MatchStatus::Completed).await.unwrap();
        assert!(first);
        assert_eq!(store.get_match("m1").await.unwrap().unwrap().status, MatchStatus::Completed);

        let second = store.accept_result("m1", &result, MatchStatus::Completed).await.unwrap();
        assert!(!second, "identical resubmission must be a no-op");
    }

    #[tokio::test]
    async fn accept_result_conflicts_on_divergent_resubmission() {
        let store = Store::connect_in_memory().await.unwrap();
        store.create_league("L1", "secret").await.unwrap();
        store.persist_schedule(
            "L1",
            &[RoundPlan {
                round_id: 1,
                matches: vec![MatchPlan { match_id: "m1".to_string(), round_id: 1, player_a: "a".to_string(), player_b: "b".to_string(), game_type: "tic_tac_toe".to_string() }],
            }],
        )
        .await
        .unwrap();

        store.accept_result("m1", &sample_result("m1", 3, 0), MatchStatus::Completed).await.unwrap();

        let err = store
            .accept_result("m1", &sample_result("m1", 0, 3), MatchStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ResultConflict));
    }

    #[tokio::test]
    async fn publish_standings_upserts_and_latest_returns_most_recent() {
        let store = Store::connect_in_memory().await.unwrap();
        store.create_league("L1", "secret").await.unwrap();

        store.publish_standings("L1", 1, &serde_json::json!([{"player_id": "a", "points": 3}])).await.unwrap();
        let first = store.latest_standings("L1").await.unwrap().unwrap();
        assert_eq!(first.round_id, 1);

        // Re-publishing the same round overwrites rather than duplicating.
        store.publish_standings("L1", 1, &serde_json::json!([{"player_id": "a", "points": 6}])).await.unwrap();
        let updated = store.latest_standings("L1").await.unwrap().unwrap();
        assert_eq!(updated.rows_json.0, serde_json::json!([{"player_id": "a", "points": 6}]));

        // A later round becomes the latest snapshot even though round ids aren't monotonic with time in general.
        store.publish_standings("L1", 2, &serde_json::json!([{"player_id": "a", "points": 9}])).await.unwrap();
        let latest = store.latest_standings("L1").await.unwrap().unwrap();
        assert_eq!(latest.round_id, 2);
    }

    #[tokio::test]
    async fn list_results_joins_only_this_leagues_matches() {
        let store = Store::connect_in_memory().await.unwrap();
        store.create_league("L1", "secret").await.unwrap();
        store.create_league("L2", "secret2").await.unwrap();
        store.persist_schedule(
            "L1",
            &[RoundPlan {
                round_id: 1,
                matches: vec![MatchPlan { match_id: "m1".to_string(), round_id: 1, player_a: "a".to_string(), player_b: "b".to_string(), game_type: "tic_tac_toe".to_string() }],
            }],
        )
        .await
        .unwrap();
        store.persist_schedule(
            "L2",
            &[RoundPlan {
                round_id: 1,
                matches: vec![MatchPlan { match_id: "m2".to_string(), round_id: 1, player_a: "a".to_string(), player_b: "b".to_string(), game_type: "tic_tac_toe".to_string() }],
            }],
        )
        .await
        .unwrap();
        store.accept_result("m1", &sample_result("m1", 3, 0), MatchStatus::Completed).await.unwrap();
        store.accept_result("m2", &sample_result("m2", 3, 0), MatchStatus::Completed).await.unwrap();

        let results = store.list_results("L1").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_id, "m1");
    }

    #[tokio::test]
    async fn state_survives_reconnecting_to_the_same_file_backed_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("league.sqlite3");
        let path_str = path.to_str().unwrap().to_string();

        {
            let store = Store::connect(&path_str).await.unwrap();
            store.create_league("L1", "secret").await.unwrap();
            store.register_agent("L1", AgentKindDb::Player, "p1", "http://p1").await.unwrap();
            store.advance_league_status("L1", LeagueStatus::Registration).await.unwrap();
        }

        // Reopening the same path must see everything the first handle committed.
        let reopened = Store::connect(&path_str).await.unwrap();
        let league = reopened.get_league("L1").await.unwrap();
        assert_eq!(league.status, LeagueStatus::Registration);
        let ids = reopened.list_agent_ids("L1", AgentKindDb::Player).await.unwrap();
        assert_eq!(ids, vec!["p1"]);
    }

    #[tokio::test]
    async fn health_check_succeeds_on_a_fresh_store() {
        let store = Store::connect_in_memory().await.unwrap();
        store.health_check().await.unwrap();
    }
}
