//! HTTP surface (spec §6): `POST /mcp` for every protocol message, `GET
//! /health` for liveness probes. `MATCH_ASSIGN` is the only message a
//! referee acts on by enqueueing a coordinator [`Command`] — every
//! player reply (`INVITE_ACCEPT`/`INVITE_DECLINE`/`MOVE_RESPONSE`) is
//! returned synchronously from the player's own `/mcp` call
//! (`executor::call_player`) and never arrives here as an inbound
//! request, matching `league-manager/src/http.rs`'s shape.

use std::sync::Arc;
use std::time::Instant;

use actix_web::{web, HttpResponse};
use league_protocol::audit::{AuditLog, Direction, Outcome as AuditOutcome};
use league_protocol::envelope::{AgentKind, Envelope, MessageType, Sender};
use league_protocol::error::{ErrorPayload, LeagueError};
use league_protocol::jsonrpc::{rpc_error_code, RpcRequest, RpcResponse};
use league_protocol::messages::MatchAssignPayload;
use league_protocol::validate::{validate_auth, validate_context, validate_envelope, TokenBinding};
use serde_json::Value;
use uuid::Uuid;

use crate::config::Config;
use crate::coordinator::{Command, CommandSender};
use crate::state::RefereeState;

pub struct AppState {
    pub commands: CommandSender,
    pub referee: Arc<RefereeState>,
    pub audit: Arc<AuditLog>,
    pub config: Config,
    pub started_at: Instant,
}

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "league-referee",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "busy": state.referee.is_busy(),
    }))
}

pub async fn handle(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return HttpResponse::Ok().json(RpcResponse::transport_error(
                Value::Null,
                rpc_error_code::INVALID_REQUEST,
                format!("malformed request body: {e}"),
            ));
        }
    };

    if let Err(reason) = request.validate_shape() {
        return HttpResponse::Ok().json(RpcResponse::transport_error(request.id.clone(), rpc_error_code::INVALID_REQUEST, reason));
    }

    let raw = request.params.envelope.clone();
    let payload = request.params.payload.clone();

    let envelope = match validate_envelope(&raw, chrono::Utc::now(), state.config.clock_skew()) {
        Ok(env) => env,
        Err(err) => {
            log_rejected(&state, &raw, &payload, &err);
            return HttpResponse::Ok().json(RpcResponse::success(request.id, error_result(&state, &err, Uuid::new_v4())));
        }
    };

    // The Manager is not a registered agent and carries no auth_token of
    // its own, so Manager-sent messages (ROUND_ANNOUNCE, MATCH_ASSIGN)
    // bypass the token check; every player-sent message is still verified
    // against the signing secret handed to this referee at registration.
    let auth_enabled = state.config.auth_enabled && envelope.sender.kind != AgentKind::LeagueManager;
    let identity = state.referee.identity();
    let secret = identity.as_ref().map(|i| i.signing_secret.clone());
    let lookup = |token: &str| -> Option<TokenBinding> {
        let secret = secret.as_ref()?;
        let (kind, agent_id) = league_protocol::token::verify(secret, token)?;
        Some(TokenBinding { kind, agent_id })
    };
    if let Err(err) = validate_auth(&envelope, auth_enabled, lookup) {
        log_rejected(&state, &raw, &payload, &err);
        return HttpResponse::Ok().json(RpcResponse::success(request.id, error_result(&state, &err, envelope.conversation_id)));
    }

    let result = dispatch(&state, &envelope, payload.clone()).await;

    match result {
        Ok(value) => {
            audit_record(&state.audit, Direction::In, &raw.sender, &format!("referee:{}", state.config.agent_id), serde_json::to_value(&raw).unwrap_or(Value::Null), payload, AuditOutcome::Accepted);
            HttpResponse::Ok().json(RpcResponse::success(request.id, value))
        }
        Err(err) => {
            log_rejected(&state, &raw, &payload, &err);
            HttpResponse::Ok().json(RpcResponse::success(request.id, error_result(&state, &err, envelope.conversation_id)))
        }
    }
}

fn log_rejected(state: &AppState, raw: &league_protocol::RawEnvelope, payload: &Value, err: &LeagueError) {
    audit_record(
        &state.audit,
        Direction::In,
        &raw.sender,
        &format!("referee:{}", state.config.agent_id),
        serde_json::to_value(raw).unwrap_or(Value::Null),
        payload.clone(),
        AuditOutcome::Rejected { reason: err.code().as_str().to_string() },
    );
}

fn error_result(state: &AppState, err: &LeagueError, conversation_id: Uuid) -> Value {
    let envelope = Envelope::new(MessageType::Error, Sender::referee(&state.config.agent_id), conversation_id);
    let payload: ErrorPayload = err.into();
    serde_json::json!({
        "envelope": to_raw(&envelope),
        "payload": payload,
    })
}

fn to_raw(envelope: &Envelope) -> league_protocol::RawEnvelope {
    league_protocol::RawEnvelope {
        protocol: envelope.protocol.clone(),
        message_type: envelope.message_type.as_wire().to_string(),
        sender: String::from(envelope.sender.clone()),
        timestamp: envelope.timestamp.to_rfc3339(),
        conversation_id: envelope.conversation_id.to_string(),
        message_seq: envelope.message_seq,
        auth_token: envelope.auth_token.clone(),
        league_id: envelope.league_id.clone(),
        round_id: envelope.round_id,
        match_id: envelope.match_id.clone(),
        game_type: envelope.game_type.clone(),
    }
}

async fn dispatch(state: &AppState, envelope: &Envelope, payload: Value) -> Result<Value, LeagueError> {
    match envelope.message_type {
        MessageType::RoundAnnounce => {
            // Informational broadcast; a referee has no action to take
            // until it is individually assigned a match.
            Ok(serde_json::json!({"status": "ack"}))
        }
        MessageType::MatchAssign => {
            let req: MatchAssignPayload =
                serde_json::from_value(payload).map_err(|e| LeagueError::EnvelopeInvalid(e.to_string()))?;
            validate_context(
                Some(req.match_id.as_str()) == envelope.match_id.as_deref(),
                "payload match_id does not match envelope match_id",
            )?;
            let (tx, rx) = tokio::sync::oneshot::channel();
            state.commands.send(Command::MatchAssign { payload: req, reply: tx }).await;
            rx.await.map_err(|_| LeagueError::Internal("coordinator did not reply".to_string()))??;
            Ok(serde_json::json!({"status": "accepted"}))
        }
        other => Err(LeagueError::PreconditionFailed(format!(
            "league-referee does not accept {}",
            other.as_wire()
        ))),
    }
}

fn audit_record(audit: &AuditLog, direction: Direction, from: &str, to: &str, envelope: Value, payload: Value, outcome: AuditOutcome) {
    audit.record(&league_protocol::audit::AuditRecord {
        timestamp: chrono::Utc::now(),
        direction,
        from: from.to_string(),
        to: to.to_string(),
        envelope,
        payload,
        outcome,
    });
}
