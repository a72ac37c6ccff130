//! The League Manager's single coordinator task (spec §5): owns every
//! piece of mutable business state and drains a bounded command queue.
//! HTTP handlers only translate requests into [`Command`]s and await a
//! oneshot reply; this keeps business-state transitions strictly
//! serialized while the handlers themselves run in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use league_game::GameRegistry;
use league_protocol::audit::{AuditLog, AuditRecord, Direction, Outcome as AuditOutcome};
use league_protocol::envelope::AgentKind;
use league_protocol::error::LeagueError;
use league_protocol::messages::{
    MatchEntry, Outcome, PlayerResult, RegistrationResponsePayload, ResultReportPayload,
    RoundAnnouncePayload, StandingsResponsePayload,
};
use league_protocol::validate::TokenBinding;
use league_storage::{AgentKindDb, AgentStatus, LeagueStatus, MatchRow, MatchStatus, OutcomeDb, ResultRow, RoundStatus, Store};
use serde_json::Value;
use sqlx::types::Json;
use tokio::sync::{mpsc, oneshot};

use crate::auth;
use crate::config::Config;
use crate::scheduler::generate_schedule;
use crate::standings::{compute_standings, PlayerMatchOutcome};
use crate::transport;

pub enum Command {
    RegisterReferee {
        agent_id: String,
        endpoint: String,
        conversation_id: String,
        reply: oneshot::Sender<Result<RegistrationResponsePayload, LeagueError>>,
    },
    RegisterPlayer {
        agent_id: String,
        endpoint: String,
        conversation_id: String,
        reply: oneshot::Sender<Result<RegistrationResponsePayload, LeagueError>>,
    },
    LeagueAdvance {
        reply: oneshot::Sender<Result<(), LeagueError>>,
    },
    ReportResult {
        sender_kind: AgentKind,
        sender_id: String,
        payload: ResultReportPayload,
        reply: oneshot::Sender<Result<(), LeagueError>>,
    },
    MatchError {
        sender_kind: AgentKind,
        sender_id: String,
        payload: league_protocol::messages::MatchErrorPayload,
        reply: oneshot::Sender<Result<(), LeagueError>>,
    },
    QueryStandings {
        reply: oneshot::Sender<Result<StandingsResponsePayload, LeagueError>>,
    },
    VerifyToken {
        token: String,
        reply: oneshot::Sender<Option<TokenBinding>>,
    },
    RecordAuthFailure {
        kind: AgentKind,
        agent_id: String,
        reply: oneshot::Sender<()>,
    },
}

/// Handle used by HTTP handlers to enqueue commands onto the coordinator.
#[derive(Clone)]
pub struct CommandSender(mpsc::Sender<Command>);

impl CommandSender {
    pub async fn send(&self, cmd: Command) {
        // The queue is only full if the coordinator has stalled; callers
        // are expected to treat a send failure the same as a dropped
        // reply channel (maps to a timeout at the HTTP layer).
        let _ = self.0.send(cmd).await;
    }
}

pub fn spawn(store: Store, audit: Arc<AuditLog>, games: GameRegistry, config: Config, league_id: String, signing_secret: String) -> CommandSender {
    let (tx, rx) = mpsc::channel(256);
    let coordinator = Coordinator {
        store,
        audit,
        games,
        config,
        client: reqwest::Client::new(),
        league_id,
        signing_secret,
    };
    tokio::spawn(coordinator.run(rx));
    CommandSender(tx)
}

struct Coordinator {
    store: Store,
    audit: Arc<AuditLog>,
    games: GameRegistry,
    config: Config,
    client: reqwest::Client,
    league_id: String,
    signing_secret: String,
}

impl Coordinator {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::RegisterReferee { agent_id, endpoint, conversation_id, reply } => {
                    let result = self.register(AgentKind::Referee, agent_id, endpoint, conversation_id).await;
                    let _ = reply.send(result);
                }
                Command::RegisterPlayer { agent_id, endpoint, conversation_id, reply } => {
                    let result = self.register(AgentKind::Player, agent_id, endpoint, conversation_id).await;
                    let _ = reply.send(result);
                }
                Command::LeagueAdvance { reply } => {
                    let result = self.league_advance().await;
                    let _ = reply.send(result);
                }
                Command::ReportResult { sender_kind, sender_id, payload, reply } => {
                    let result = self.report_result(sender_kind, sender_id, payload).await;
                    let _ = reply.send(result);
                }
                Command::MatchError { sender_kind, sender_id, payload, reply } => {
                    let result = self.match_error(sender_kind, sender_id, payload).await;
                    let _ = reply.send(result);
                }
                Command::QueryStandings { reply } => {
                    let result = self.query_standings().await;
                    let _ = reply.send(result);
                }
                Command::VerifyToken { token, reply } => {
                    let binding = match self.store.lookup_live_token(&token).await {
                        Ok(Some(row)) => {
                            let kind = match row.kind {
                                AgentKindDb::Referee => AgentKind::Referee,
                                AgentKindDb::Player => AgentKind::Player,
                            };
                            Some(TokenBinding { kind, agent_id: row.agent_id })
                        }
                        _ => None,
                    };
                    let _ = reply.send(binding);
                }
                Command::RecordAuthFailure { kind, agent_id, reply } => {
                    self.record_auth_failure(kind, &agent_id).await;
                    let _ = reply.send(());
                }
            }
        }
    }

    fn kind_db(kind: AgentKind) -> AgentKindDb {
        match kind {
            AgentKind::Referee => AgentKindDb::Referee,
            AgentKind::Player => AgentKindDb::Player,
            AgentKind::LeagueManager => unreachable!("the Manager never registers itself as an agent"),
        }
    }

    async fn register(
        &mut self,
        kind: AgentKind,
        agent_id: String,
        endpoint: String,
        conversation_id: String,
    ) -> Result<RegistrationResponsePayload, LeagueError> {
        let league = self.store.get_league(&self.league_id).await.map_err(LeagueError::from)?;
        if league.status != LeagueStatus::Registration {
            return Err(LeagueError::RegistrationClosed);
        }

        if kind == AgentKind::Player {
            let referees = self.store.count_agents(&self.league_id, AgentKindDb::Referee).await.map_err(LeagueError::from)?;
            if referees < 1 {
                return Err(LeagueError::PreconditionFailed(
                    "at least one referee must register before any player".to_string(),
                ));
            }
        }

        let kind_db = Self::kind_db(kind);
        self.store
            .register_agent(&self.league_id, kind_db, &agent_id, &endpoint)
            .await
            .map_err(LeagueError::from)?;

        let token = auth::issue(&self.signing_secret, &self.league_id, kind, &agent_id);
        let token = self
            .store
            .issue_token(&self.league_id, kind_db, &agent_id, &conversation_id, &token)
            .await
            .map_err(LeagueError::from)?;

        Ok(RegistrationResponsePayload {
            auth_token: token,
            league_id: self.league_id.clone(),
            signing_secret: self.signing_secret.clone(),
        })
    }

    /// Administrative advance from REGISTRATION to ACTIVE (DESIGN.md Open
    /// Question 1/2): checks the `min_referees`/`min_players` gate,
    /// generates the schedule, and dispatches round 1.
    async fn league_advance(&mut self) -> Result<(), LeagueError> {
        let league = self.store.get_league(&self.league_id).await.map_err(LeagueError::from)?;
        if league.status != LeagueStatus::Registration {
            return Err(LeagueError::PreconditionFailed("league is not in REGISTRATION".to_string()));
        }

        let referees = self.store.count_agents(&self.league_id, AgentKindDb::Referee).await.map_err(LeagueError::from)?;
        let players = self.store.count_agents(&self.league_id, AgentKindDb::Player).await.map_err(LeagueError::from)?;
        if (referees as usize) < self.config.min_referees || (players as usize) < self.config.min_players {
            return Err(LeagueError::PreconditionFailed(format!(
                "need at least {} referees and {} players, have {} and {}",
                self.config.min_referees, self.config.min_players, referees, players
            )));
        }

        self.store.advance_league_status(&self.league_id, LeagueStatus::Scheduling).await.map_err(LeagueError::from)?;

        let player_ids = self.registered_ids(AgentKindDb::Player).await?;
        let game_type = self.games.default_game_type();
        let rounds = generate_schedule(&player_ids, game_type);
        self.store.persist_schedule(&self.league_id, &rounds).await.map_err(LeagueError::from)?;

        self.store.advance_league_status(&self.league_id, LeagueStatus::Active).await.map_err(LeagueError::from)?;

        self.pump_assignments().await?;
        Ok(())
    }

    async fn registered_ids(&self, kind: AgentKindDb) -> Result<Vec<String>, LeagueError> {
        // There is no bulk agent listing in the store beyond count; query
        // idle referees doubles as "all referees" only for that kind, so
        // players are listed via a dedicated query kept deliberately
        // narrow to what the scheduler needs.
        self.store.list_agent_ids(&self.league_id, kind).await.map_err(LeagueError::from)
    }

    /// Assigns idle referees to pending matches in global FIFO order
    /// (spec §4.3), announcing a round the first time any of its matches
    /// is touched.
    async fn pump_assignments(&mut self) -> Result<(), LeagueError> {
        loop {
            let idle = self.store.list_idle_referees(&self.league_id, self.errored_cutoff()).await.map_err(LeagueError::from)?;
            let Some(referee_id) = idle.into_iter().next() else { break };
            let pending = self.store.list_pending_matches(&self.league_id).await.map_err(LeagueError::from)?;
            let Some(m) = pending.into_iter().next() else { break };

            self.ensure_round_announced(m.round_id).await?;
            self.store.assign_match(&m.match_id, &referee_id).await.map_err(LeagueError::from)?;
            self.dispatch_match_assign(&m, &referee_id).await;
        }
        Ok(())
    }

    async fn ensure_round_announced(&mut self, round_id: i64) -> Result<(), LeagueError> {
        let round = self.store.get_round(&self.league_id, round_id).await.map_err(LeagueError::from)?;
        let Some(round) = round else {
            return Err(LeagueError::Internal(format!("round {round_id} missing")));
        };
        if round.status != RoundStatus::Pending {
            return Ok(());
        }

        let matches = self.store.list_matches_for_round(&self.league_id, round_id).await.map_err(LeagueError::from)?;
        let entries: Vec<MatchEntry> = matches
            .iter()
            .map(|m| MatchEntry {
                match_id: m.match_id.clone(),
                players: (m.player_a.clone(), m.player_b.clone()),
                referee: m.referee_id.clone(),
                game_type: m.game_type.clone(),
            })
            .collect();
        let payload = RoundAnnouncePayload { round_id: round_id as u64, matches: entries };

        let mut recipients: HashMap<String, String> = HashMap::new();
        for m in &matches {
            if let Ok(Some(agent)) = self.store.get_agent(&self.league_id, AgentKindDb::Player, &m.player_a).await {
                recipients.insert(m.player_a.clone(), agent.endpoint);
            }
            if let Ok(Some(agent)) = self.store.get_agent(&self.league_id, AgentKindDb::Player, &m.player_b).await {
                recipients.insert(m.player_b.clone(), agent.endpoint);
            }
        }
        for referee_id in self.store.list_agent_ids(&self.league_id, AgentKindDb::Referee).await.map_err(LeagueError::from)? {
            if let Ok(Some(agent)) = self.store.get_agent(&self.league_id, AgentKindDb::Referee, &referee_id).await {
                recipients.insert(referee_id, agent.endpoint);
            }
        }

        for (agent_id, endpoint) in &recipients {
            self.dispatch(endpoint, agent_id, league_protocol::envelope::MessageType::RoundAnnounce, serde_json::to_value(&payload).unwrap()).await;
        }

        self.store.set_round_status(&self.league_id, round_id, RoundStatus::Announced).await.map_err(LeagueError::from)?;
        Ok(())
    }

    async fn dispatch_match_assign(&mut self, m: &MatchRow, referee_id: &str) {
        let player_a_endpoint = self
            .store
            .get_agent(&self.league_id, AgentKindDb::Player, &m.player_a)
            .await
            .ok()
            .flatten()
            .map(|a| a.endpoint)
            .unwrap_or_default();
        let player_b_endpoint = self
            .store
            .get_agent(&self.league_id, AgentKindDb::Player, &m.player_b)
            .await
            .ok()
            .flatten()
            .map(|a| a.endpoint)
            .unwrap_or_default();

        let payload = league_protocol::messages::MatchAssignPayload {
            match_id: m.match_id.clone(),
            round_id: m.round_id as u64,
            game_type: m.game_type.clone(),
            player_a: m.player_a.clone(),
            player_b: m.player_b.clone(),
            player_a_endpoint,
            player_b_endpoint,
        };
        if let Ok(Some(agent)) = self.store.get_agent(&self.league_id, AgentKindDb::Referee, referee_id).await {
            self.dispatch(&agent.endpoint, referee_id, league_protocol::envelope::MessageType::MatchAssign, serde_json::to_value(&payload).unwrap()).await;
        }
    }

    /// Best-effort outbound delivery: retried per `retry_max`/
    /// `retry_backoff_ms`, but a persistent failure only gets logged —
    /// the receiving agent is expected to poll/resume on its own restart
    /// path rather than the Manager blocking its command loop on it.
    /// `to` is the recipient agent id used for the outbound audit record.
    async fn dispatch(&self, endpoint: &str, to: &str, message_type: league_protocol::envelope::MessageType, payload: Value) {
        let result = transport::send(
            &self.client,
            endpoint,
            message_type,
            &self.league_id,
            None,
            payload,
            self.config.retry_max,
            Duration::from_millis(self.config.retry_backoff_ms),
            &self.audit,
            to,
        )
        .await;
        if let Err(e) = result {
            tracing::warn!(endpoint, error = %e, "outbound dispatch exhausted retries");
        }
    }

    async fn report_result(
        &mut self,
        sender_kind: AgentKind,
        sender_id: String,
        payload: ResultReportPayload,
    ) -> Result<(), LeagueError> {
        if sender_kind != AgentKind::Referee {
            return Err(LeagueError::NotAssigned);
        }
        let m = self
            .store
            .get_match(&payload.match_id)
            .await
            .map_err(LeagueError::from)?
            .ok_or_else(|| LeagueError::PreconditionFailed("no such match".to_string()))?;

        if m.referee_id.as_deref() != Some(sender_id.as_str()) {
            return Err(LeagueError::NotAssigned);
        }
        if !matches!(m.status, MatchStatus::InProgress | MatchStatus::Assigned | MatchStatus::Completed | MatchStatus::Forfeited) {
            return Err(LeagueError::PreconditionFailed(format!("match is {:?}", m.status)));
        }

        let (result_a, result_b) = &payload.results;
        let (a_res, b_res) = if result_a.player_id == m.player_a {
            (result_a, result_b)
        } else {
            (result_b, result_a)
        };

        let row = ResultRow {
            match_id: m.match_id.clone(),
            outcome_a: to_outcome_db(a_res.outcome),
            outcome_b: to_outcome_db(b_res.outcome),
            points_a: a_res.points as i64,
            points_b: b_res.points as i64,
            game_metadata: Json(payload.game_metadata.clone()),
            accepted_at: chrono::Utc::now(),
        };

        // The referee's `game_metadata.reason` is "completed" for a
        // played-out game and anything else (e.g. "move_timeout",
        // "invite_declined") for a forfeit (see executor.rs).
        let final_status = match payload.game_metadata.get("reason").and_then(Value::as_str) {
            Some("completed") | None => MatchStatus::Completed,
            Some(_) => MatchStatus::Forfeited,
        };

        let is_new = self.store.accept_result(&m.match_id, &row, final_status).await.map_err(LeagueError::from)?;
        if !is_new {
            return Ok(());
        }

        self.publish_current_standings(m.round_id).await?;
        self.maybe_complete_round(m.round_id).await?;
        self.pump_assignments().await?;
        self.maybe_complete_league().await?;
        Ok(())
    }

    /// A referee could not drive its match to a clean terminal state
    /// (spec §4.5 `-> ERRORED`). The match is left `ERRORED` — it needs
    /// manual resolution, same as a checkpoint recovered mid-step (see
    /// `league-referee/src/checkpoint.rs`) — and the referee starts its
    /// reassignment cool-down (spec §9 Open Question 3) rather than being
    /// excluded forever.
    async fn match_error(
        &mut self,
        sender_kind: AgentKind,
        sender_id: String,
        payload: league_protocol::messages::MatchErrorPayload,
    ) -> Result<(), LeagueError> {
        if sender_kind != AgentKind::Referee {
            return Err(LeagueError::NotAssigned);
        }
        let m = self
            .store
            .get_match(&payload.match_id)
            .await
            .map_err(LeagueError::from)?
            .ok_or_else(|| LeagueError::PreconditionFailed("no such match".to_string()))?;
        if m.referee_id.as_deref() != Some(sender_id.as_str()) {
            return Err(LeagueError::NotAssigned);
        }

        tracing::error!(match_id = %payload.match_id, referee_id = %sender_id, reason = %payload.reason, "match reported ERRORED");
        self.store.set_match_status(&payload.match_id, MatchStatus::Errored).await.map_err(LeagueError::from)?;
        self.store
            .mark_agent_errored(&self.league_id, AgentKindDb::Referee, &sender_id)
            .await
            .map_err(LeagueError::from)?;

        self.pump_assignments().await?;
        Ok(())
    }

    async fn publish_current_standings(&mut self, round_id: i64) -> Result<(), LeagueError> {
        let results = self.store.list_results(&self.league_id).await.map_err(LeagueError::from)?;
        let matches: HashMap<String, MatchRow> = {
            let mut map = HashMap::new();
            for r in &results {
                if let Ok(Some(m)) = self.store.get_match(&r.match_id).await {
                    map.insert(r.match_id.clone(), m);
                }
            }
            map
        };

        let mut outcomes = Vec::new();
        for r in &results {
            let Some(m) = matches.get(&r.match_id) else { continue };
            outcomes.push(PlayerMatchOutcome {
                player_id: m.player_a.clone(),
                outcome: from_outcome_db(r.outcome_a),
                points_for: r.points_a as u32,
                points_against: r.points_b as u32,
            });
            outcomes.push(PlayerMatchOutcome {
                player_id: m.player_b.clone(),
                outcome: from_outcome_db(r.outcome_b),
                points_for: r.points_b as u32,
                points_against: r.points_a as u32,
            });
        }

        let rows = compute_standings(&outcomes);
        let rows_json = serde_json::to_value(&rows).map_err(|e| LeagueError::Internal(e.to_string()))?;
        self.store.publish_standings(&self.league_id, round_id, &rows_json).await.map_err(LeagueError::from)?;
        Ok(())
    }

    async fn maybe_complete_round(&mut self, round_id: i64) -> Result<(), LeagueError> {
        let matches = self.store.list_matches_for_round(&self.league_id, round_id).await.map_err(LeagueError::from)?;
        let all_done = matches.iter().all(|m| matches!(m.status, MatchStatus::Completed | MatchStatus::Forfeited));
        if all_done {
            self.store.set_round_status(&self.league_id, round_id, RoundStatus::Completed).await.map_err(LeagueError::from)?;
        }
        Ok(())
    }

    async fn maybe_complete_league(&mut self) -> Result<(), LeagueError> {
        let pending = self.store.list_pending_matches(&self.league_id).await.map_err(LeagueError::from)?;
        if !pending.is_empty() {
            return Ok(());
        }
        let in_flight = self.store.count_in_flight_matches(&self.league_id).await.map_err(LeagueError::from)?;
        if in_flight > 0 {
            return Ok(());
        }
        self.store.advance_league_status(&self.league_id, LeagueStatus::Completed).await.map_err(LeagueError::from)?;
        Ok(())
    }

    /// Referees that errored at or before this instant have served their
    /// cool-down and are eligible for reassignment (spec §9 Open Question 3).
    fn errored_cutoff(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now() - chrono::Duration::from_std(self.config.referee_cooldown()).unwrap_or(chrono::Duration::zero())
    }

    async fn query_standings(&mut self) -> Result<StandingsResponsePayload, LeagueError> {
        let league = self.store.get_league(&self.league_id).await.map_err(LeagueError::from)?;
        if !matches!(league.status, LeagueStatus::Active | LeagueStatus::Completed) {
            return Err(LeagueError::PreconditionFailed("league is not ACTIVE or COMPLETED".to_string()));
        }
        let snapshot = self
            .store
            .latest_standings(&self.league_id)
            .await
            .map_err(LeagueError::from)?
            .ok_or_else(|| LeagueError::PreconditionFailed("no standings published yet".to_string()))?;
        let rows = serde_json::from_value(snapshot.rows_json.0).map_err(|e| LeagueError::Internal(e.to_string()))?;
        Ok(StandingsResponsePayload {
            league_id: self.league_id.clone(),
            round_id: snapshot.round_id as u64,
            rows,
        })
    }

    async fn record_auth_failure(&mut self, kind: AgentKind, agent_id: &str) {
        let kind_db = Self::kind_db(kind);
        if let Ok(count) = self.store.record_auth_failure(&self.league_id, kind_db, agent_id).await {
            if count as u32 >= self.config.auth_failure_suspend_threshold {
                let _ = self.store.set_agent_status(&self.league_id, kind_db, agent_id, AgentStatus::Suspended).await;
                tracing::warn!(agent_id, "agent suspended after repeated auth failures");
            }
        }
    }
}

fn to_outcome_db(o: Outcome) -> OutcomeDb {
    match o {
        Outcome::Win => OutcomeDb::Win,
        Outcome::Loss => OutcomeDb::Loss,
        Outcome::Draw => OutcomeDb::Draw,
    }
}

fn from_outcome_db(o: OutcomeDb) -> Outcome {
    match o {
        OutcomeDb::Win => Outcome::Win,
        OutcomeDb::Loss => Outcome::Loss,
        OutcomeDb::Draw => Outcome::Draw,
    }
}

/// Writes one audit record, never failing the originating request on
/// logging trouble (spec §4.8).
pub fn audit(audit: &AuditLog, direction: Direction, from: &str, to: &str, envelope: Value, payload: Value, outcome: AuditOutcome) {
    audit.record(&AuditRecord {
        timestamp: chrono::Utc::now(),
        direction,
        from: from.to_string(),
        to: to.to_string(),
        envelope,
        payload,
        outcome,
    });
}
