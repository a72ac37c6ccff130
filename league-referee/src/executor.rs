//! The per-match state machine (spec §4.5): `ASSIGNED -> INVITING ->
//! IN_PROGRESS -> REPORTING -> COMPLETED`, with failure branches
//! `-> FORFEITED` (timeout, invalid move, decline) and `-> ERRORED`
//! (protocol violation, internal error). Runs as a single background
//! task per assignment — the coordinator only ever spawns one at a time,
//! which is the structural enforcement of "no concurrent matches per
//! referee" (spec §1 Non-goals) — so the match's own mutable state
//! (board, whose turn) is plain local variables, not shared/locked.
//!
//! Every exchange with a player is one JSON-RPC request/reply: the
//! referee POSTs `GAME_INVITE`/`MOVE_REQUEST` to the player's `/mcp` and
//! the player's HTTP response carries the `INVITE_ACCEPT`/
//! `INVITE_DECLINE`/`MOVE_RESPONSE` envelope directly as its result,
//! same as every other paired message type in this protocol (compare
//! `league-manager/src/http.rs`'s `success_envelope` replies to
//! `REGISTER_REFEREE`/`REPORT_RESULT`/`QUERY_STANDINGS`). There is
//! nothing to rendezvous on: `call_player` drives the whole round trip
//! inline and a deadline is just a `tokio::time::timeout` around it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use league_game::{GameRegistry, Player, Terminal};
use league_protocol::audit::AuditLog;
use league_protocol::envelope::MessageType;
use league_protocol::jsonrpc::RpcResponse;
use league_protocol::messages::{
    GameInvitePayload, GameOverPayload, InviteAcceptPayload, MatchAssignPayload, MoveRequestPayload,
    MoveResponsePayload, Outcome, PlayerResult, ResultReportPayload,
};
use serde_json::Value;

use crate::checkpoint::{self, Checkpoint};
use crate::config::Config;
use crate::state::{Identity, RefereeState};
use crate::transport;

/// Why a match ended without reaching a clean terminal board state.
enum Forfeit {
    /// `Player` is the offender; the opponent wins.
    Single(Player, &'static str),
    /// Neither player is credited a win (spec §4.5 "simultaneous or
    /// mutual forfeit").
    Mutual(&'static str),
}

pub async fn run_match(
    state: Arc<RefereeState>,
    config: Config,
    games: Arc<GameRegistry>,
    client: reqwest::Client,
    audit: Arc<AuditLog>,
    identity: Identity,
    assign: MatchAssignPayload,
) {
    let match_id = assign.match_id.clone();
    let result = run_match_inner(&config, &games, &client, &audit, &identity, &assign).await;

    match result {
        Ok(()) => {
            tracing::info!(match_id = %match_id, "match reported successfully");
        }
        Err(e) => {
            tracing::error!(match_id = %match_id, error = %e, "match ended in an unrecoverable error");
            checkpoint::save(&config.checkpoint_path, &checkpoint_at(&assign, "errored"));
            report_match_error(&config, &client, &audit, &identity, &assign, &e.to_string()).await;
        }
    }

    state.set_busy(false);
}

/// Tells the Manager this match ended `ERRORED` (spec §4.5) so it can
/// mark the match terminal and start this referee's reassignment
/// cool-down rather than leaving it excluded from the idle pool forever.
async fn report_match_error(
    config: &Config,
    client: &reqwest::Client,
    audit: &AuditLog,
    identity: &Identity,
    assign: &MatchAssignPayload,
    reason: &str,
) {
    let payload = league_protocol::messages::MatchErrorPayload {
        match_id: assign.match_id.clone(),
        reason: reason.to_string(),
    };
    let result = transport::send(
        client,
        &config.manager_endpoint,
        MessageType::MatchError,
        &config.agent_id,
        &identity.league_id,
        Some(&identity.auth_token),
        Some((assign.round_id, &assign.match_id)),
        None,
        serde_json::to_value(&payload).expect("MatchErrorPayload always serializes"),
        config.retry_max,
        Duration::from_millis(config.retry_backoff_ms),
        audit,
        "league_manager",
    )
    .await;
    if let Err(e) = result {
        tracing::error!(match_id = %assign.match_id, error = %e, "failed to report MATCH_ERROR to the manager");
    }
}

#[derive(Debug, thiserror::Error)]
enum ExecutorError {
    #[error("unknown game_type: {0}")]
    UnknownGameType(String),
    #[error("result report was never acknowledged: {0}")]
    ReportFailed(String),
}

/// A player's reply to an outbound call, or why one never arrived.
enum PlayerCallError {
    Timeout,
    Transport(String),
    Malformed(String),
}

async fn run_match_inner(
    config: &Config,
    games: &Arc<GameRegistry>,
    client: &reqwest::Client,
    audit: &AuditLog,
    identity: &Identity,
    assign: &MatchAssignPayload,
) -> Result<(), ExecutorError> {
    let adapter = games
        .get(&assign.game_type)
        .ok_or_else(|| ExecutorError::UnknownGameType(assign.game_type.clone()))?;

    checkpoint::save(&config.checkpoint_path, &checkpoint_at(assign, "assigned"));

    // INVITING
    checkpoint::save(&config.checkpoint_path, &checkpoint_at(assign, "inviting"));
    let invite_outcome = invite_players(config, client, audit, identity, assign).await;

    let mut forfeit: Option<Forfeit> = None;
    if let Err(f) = invite_outcome {
        forfeit = Some(f);
    }

    let mut final_state = adapter.initial_state();
    let match_deadline = Instant::now() + config.match_timeout();

    if forfeit.is_none() {
        checkpoint::save(&config.checkpoint_path, &checkpoint_at(assign, "in_progress"));
        let mut on_turn = adapter.first_mover();
        loop {
            if Instant::now() >= match_deadline {
                forfeit = Some(Forfeit::Mutual("match_timeout"));
                break;
            }

            let endpoint = endpoint_for(assign, on_turn);
            let snapshot = adapter.snapshot(&final_state, on_turn);
            let deadline = chrono::Utc::now() + chrono::Duration::from_std(config.move_timeout()).unwrap();

            let payload = MoveRequestPayload {
                match_id: assign.match_id.clone(),
                snapshot,
                deadline,
            };
            let reply = call_player(
                client,
                audit,
                identity,
                assign,
                endpoint,
                agent_for(assign, on_turn),
                MessageType::MoveRequest,
                &payload,
                config.move_timeout(),
            )
            .await;

            let mv = match reply {
                Ok((MessageType::MoveResponse, raw)) => match serde_json::from_value::<MoveResponsePayload>(raw) {
                    Ok(mv) => mv,
                    Err(_) => {
                        forfeit = Some(Forfeit::Single(on_turn, "malformed_move"));
                        break;
                    }
                },
                Ok((_, _)) => {
                    forfeit = Some(Forfeit::Single(on_turn, "malformed_move"));
                    break;
                }
                Err(PlayerCallError::Timeout) => {
                    forfeit = Some(Forfeit::Single(on_turn, "move_timeout"));
                    break;
                }
                Err(_) => {
                    forfeit = Some(Forfeit::Single(on_turn, "move_unreachable"));
                    break;
                }
            };

            match adapter.apply(&final_state, on_turn, &mv.mv) {
                Ok(next) => final_state = next,
                Err(_) => {
                    forfeit = Some(Forfeit::Single(on_turn, "illegal_move"));
                    break;
                }
            }

            match adapter.terminal(&final_state) {
                Terminal::Ongoing => on_turn = on_turn.other(),
                _ => break,
            }
        }
    }

    checkpoint::save(&config.checkpoint_path, &checkpoint_at(assign, "reporting"));

    let (outcome_a, outcome_b, points_a, points_b, reason) = match &forfeit {
        Some(Forfeit::Single(offender, reason)) => {
            let points = adapter.scoring(Terminal::Win(offender.other()));
            match offender {
                Player::A => (Outcome::Loss, Outcome::Win, points.a, points.b, *reason),
                Player::B => (Outcome::Win, Outcome::Loss, points.a, points.b, *reason),
            }
        }
        Some(Forfeit::Mutual(reason)) => (Outcome::Loss, Outcome::Loss, 0, 0, *reason),
        None => {
            let terminal = adapter.terminal(&final_state);
            let points = adapter.scoring(terminal);
            let (oa, ob) = match terminal {
                Terminal::Win(Player::A) => (Outcome::Win, Outcome::Loss),
                Terminal::Win(Player::B) => (Outcome::Loss, Outcome::Win),
                Terminal::Draw => (Outcome::Draw, Outcome::Draw),
                Terminal::Ongoing => (Outcome::Draw, Outcome::Draw),
            };
            (oa, ob, points.a, points.b, "completed")
        }
    };

    let game_metadata = serde_json::json!({
        "reason": reason,
        "final_state": final_state,
    });

    let payload = ResultReportPayload {
        match_id: assign.match_id.clone(),
        results: (
            PlayerResult { player_id: assign.player_a.clone(), outcome: outcome_a, points: points_a },
            PlayerResult { player_id: assign.player_b.clone(), outcome: outcome_b, points: points_b },
        ),
        game_metadata,
    };

    let send_result = transport::send(
        client,
        &config.manager_endpoint,
        MessageType::ResultReport,
        &config.agent_id,
        &identity.league_id,
        Some(&identity.auth_token),
        Some((assign.round_id, &assign.match_id)),
        Some(&assign.game_type),
        serde_json::to_value(&payload).expect("ResultReportPayload always serializes"),
        config.retry_max,
        Duration::from_millis(config.retry_backoff_ms),
        audit,
        "league_manager",
    )
    .await;

    match send_result {
        Ok(_) => {
            checkpoint::save(
                &config.checkpoint_path,
                &checkpoint_at(assign, if forfeit.is_some() { "forfeited" } else { "completed" }),
            );
            checkpoint::clear(&config.checkpoint_path);
            notify_game_over(client, audit, identity, assign, outcome_a, outcome_b, &final_state).await;
            Ok(())
        }
        Err(e) => Err(ExecutorError::ReportFailed(e.to_string())),
    }
}

fn checkpoint_at(assign: &MatchAssignPayload, phase: &str) -> Checkpoint {
    Checkpoint {
        match_id: assign.match_id.clone(),
        round_id: assign.round_id,
        game_type: assign.game_type.clone(),
        player_a: assign.player_a.clone(),
        player_b: assign.player_b.clone(),
        phase: phase.to_string(),
    }
}

fn endpoint_for(assign: &MatchAssignPayload, player: Player) -> &str {
    match player {
        Player::A => &assign.player_a_endpoint,
        Player::B => &assign.player_b_endpoint,
    }
}

fn agent_for(assign: &MatchAssignPayload, player: Player) -> &str {
    match player {
        Player::A => &assign.player_a,
        Player::B => &assign.player_b,
    }
}

fn mark_label(player: Player) -> String {
    serde_json::to_value(player)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

async fn invite_players(
    config: &Config,
    client: &reqwest::Client,
    audit: &AuditLog,
    identity: &Identity,
    assign: &MatchAssignPayload,
) -> Result<(), Forfeit> {
    for (player, opponent) in [(Player::A, Player::B), (Player::B, Player::A)] {
        let endpoint = endpoint_for(assign, player);
        let payload = GameInvitePayload {
            match_id: assign.match_id.clone(),
            game_type: assign.game_type.clone(),
            opponent: agent_for(assign, opponent).to_string(),
            your_mark: mark_label(player),
        };
        let reply = call_player(
            client,
            audit,
            identity,
            assign,
            endpoint,
            agent_for(assign, player),
            MessageType::GameInvite,
            &payload,
            config.invite_timeout(),
        )
        .await;

        match reply {
            Ok((MessageType::InviteAccept, raw)) => {
                if serde_json::from_value::<InviteAcceptPayload>(raw).is_err() {
                    return Err(Forfeit::Single(player, "invite_malformed_reply"));
                }
            }
            Ok((MessageType::InviteDecline, _)) => return Err(Forfeit::Single(player, "invite_declined")),
            Ok((_, _)) => return Err(Forfeit::Single(player, "invite_malformed_reply")),
            Err(PlayerCallError::Timeout) => return Err(Forfeit::Single(player, "invite_timeout")),
            Err(_) => return Err(Forfeit::Single(player, "invite_unreachable")),
        }
    }
    Ok(())
}

/// Sends one envelope to a player and waits `timeout` for its reply,
/// returning the reply's own `(message_type, payload)`. Not retried: a
/// late reply after the deadline forfeits the player regardless, so
/// retrying would only delay a forfeit that is already decided.
#[allow(clippy::too_many_arguments)]
async fn call_player<T: serde::Serialize>(
    client: &reqwest::Client,
    audit: &AuditLog,
    identity: &Identity,
    assign: &MatchAssignPayload,
    endpoint: &str,
    to: &str,
    message_type: MessageType,
    payload: &T,
    timeout: Duration,
) -> Result<(MessageType, Value), PlayerCallError> {
    let send_fut = transport::send(
        client,
        endpoint,
        message_type,
        "referee",
        &identity.league_id,
        Some(&identity.auth_token),
        Some((assign.round_id, &assign.match_id)),
        Some(&assign.game_type),
        serde_json::to_value(payload).expect("payload always serializes"),
        1,
        Duration::from_millis(0),
        audit,
        to,
    );

    let response = tokio::time::timeout(timeout, send_fut)
        .await
        .map_err(|_| PlayerCallError::Timeout)?
        .map_err(|e| PlayerCallError::Transport(e.to_string()))?;

    let rpc: RpcResponse =
        serde_json::from_value(response).map_err(|e| PlayerCallError::Malformed(e.to_string()))?;
    let result = match rpc {
        RpcResponse::Success { result, .. } => result,
        RpcResponse::Error { error, .. } => return Err(PlayerCallError::Malformed(error.message)),
    };

    let reply_type = result
        .get("envelope")
        .and_then(|e| e.get("message_type"))
        .and_then(|v| v.as_str())
        .and_then(MessageType::parse)
        .ok_or_else(|| PlayerCallError::Malformed("reply carried no recognizable message_type".to_string()))?;
    let reply_payload = result.get("payload").cloned().unwrap_or(Value::Null);

    Ok((reply_type, reply_payload))
}

async fn notify_game_over(
    client: &reqwest::Client,
    audit: &AuditLog,
    identity: &Identity,
    assign: &MatchAssignPayload,
    outcome_a: Outcome,
    outcome_b: Outcome,
    final_state: &Value,
) {
    for (outcome, endpoint, to) in [
        (outcome_a, assign.player_a_endpoint.as_str(), assign.player_a.as_str()),
        (outcome_b, assign.player_b_endpoint.as_str(), assign.player_b.as_str()),
    ] {
        let payload = GameOverPayload {
            match_id: assign.match_id.clone(),
            outcome,
            final_snapshot: final_state.clone(),
        };
        // Best-effort: the outcome is already decided and reported to the
        // Manager; a player missing this notification learns nothing it
        // couldn't also learn from a future QUERY_STANDINGS.
        let _ = transport::send(
            client,
            endpoint,
            MessageType::GameOver,
            "referee",
            &identity.league_id,
            Some(&identity.auth_token),
            Some((assign.round_id, &assign.match_id)),
            Some(&assign.game_type),
            serde_json::to_value(&payload).expect("GameOverPayload always serializes"),
            1,
            Duration::from_millis(0),
            audit,
            to,
        )
        .await;
    }
}
