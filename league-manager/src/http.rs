//! HTTP surface (spec §6): `POST /mcp` for every protocol message, `GET
//! /health` for liveness probes. Handlers only translate requests into
//! coordinator [`Command`]s and await the reply — no business logic
//! lives here: thin handlers, `web::Data`-injected dependencies, JSON
//! response.

use std::sync::Arc;
use std::time::Instant;

use actix_web::{web, HttpResponse};
use league_protocol::audit::{AuditLog, Direction, Outcome as AuditOutcome};
use league_protocol::envelope::{Envelope, MessageType, Sender};
use league_protocol::error::{ErrorPayload, LeagueError};
use league_protocol::jsonrpc::{rpc_error_code, RpcRequest, RpcResponse};
use league_protocol::messages::{
    MatchErrorPayload, RegisterPlayerPayload, RegisterRefereePayload, ResultReportPayload,
};
use league_protocol::validate::{validate_auth, validate_context, validate_envelope};
use serde_json::Value;
use uuid::Uuid;

use crate::config::Config;
use crate::coordinator::{audit as audit_record, Command, CommandSender};
use league_storage::Store;

pub struct AppState {
    pub commands: CommandSender,
    pub audit: Arc<AuditLog>,
    pub config: Config,
    pub league_id: String,
    pub store: Store,
    pub started_at: Instant,
}

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let database = match state.store.health_check().await {
        Ok(()) => "connected",
        Err(_) => "unreachable",
    };
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "league-manager",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "database": database,
    }))
}

pub async fn handle(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            let reason = format!("malformed request body: {e}");
            audit_record(
                &state.audit,
                Direction::In,
                "unknown",
                "league_manager",
                Value::Null,
                serde_json::from_slice(&body).unwrap_or(Value::Null),
                AuditOutcome::Rejected { reason: reason.clone() },
            );
            return HttpResponse::Ok().json(RpcResponse::transport_error(Value::Null, rpc_error_code::INVALID_REQUEST, reason));
        }
    };

    if let Err(reason) = request.validate_shape() {
        audit_record(
            &state.audit,
            Direction::In,
            &request.params.envelope.sender,
            "league_manager",
            serde_json::to_value(&request.params.envelope).unwrap_or(Value::Null),
            request.params.payload.clone(),
            AuditOutcome::Rejected { reason: reason.clone() },
        );
        return HttpResponse::Ok().json(RpcResponse::transport_error(request.id.clone(), rpc_error_code::INVALID_REQUEST, reason));
    }

    let raw = request.params.envelope.clone();
    let payload = request.params.payload.clone();

    let envelope = match validate_envelope(&raw, chrono::Utc::now(), state.config.clock_skew()) {
        Ok(env) => env,
        Err(err) => {
            log_rejected(&state, &raw, &payload, &err);
            return HttpResponse::Ok().json(RpcResponse::success(request.id, error_result(&err, Uuid::new_v4())));
        }
    };

    let binding = if state.config.auth_enabled && envelope.message_type.requires_auth_token() {
        match &envelope.auth_token {
            Some(token) => {
                let (tx, rx) = tokio::sync::oneshot::channel();
                state.commands.send(Command::VerifyToken { token: token.clone(), reply: tx }).await;
                rx.await.ok().flatten()
            }
            None => None,
        }
    } else {
        None
    };

    if let Err(err) = validate_auth(&envelope, state.config.auth_enabled, |_| binding.clone()) {
        if matches!(err, LeagueError::AuthInvalid) {
            let (tx, rx) = tokio::sync::oneshot::channel();
            state.commands.send(Command::RecordAuthFailure { kind: envelope.sender.kind, agent_id: envelope.sender.agent_id().unwrap_or("").to_string(), reply: tx }).await;
            let _ = rx.await;
        }
        log_rejected(&state, &raw, &payload, &err);
        return HttpResponse::Ok().json(RpcResponse::success(request.id, error_result(&err, envelope.conversation_id)));
    }

    let result = dispatch(&state, &envelope, payload.clone()).await;

    match result {
        Ok(value) => {
            audit_record(
                &state.audit,
                Direction::In,
                &raw.sender,
                "league_manager",
                serde_json::to_value(&raw).unwrap_or(Value::Null),
                payload,
                AuditOutcome::Accepted,
            );
            HttpResponse::Ok().json(RpcResponse::success(request.id, value))
        }
        Err(err) => {
            log_rejected(&state, &raw, &payload, &err);
            HttpResponse::Ok().json(RpcResponse::success(request.id, error_result(&err, envelope.conversation_id)))
        }
    }
}

fn log_rejected(state: &AppState, raw: &league_protocol::RawEnvelope, payload: &Value, err: &LeagueError) {
    audit_record(
        &state.audit,
        Direction::In,
        &raw.sender,
        "league_manager",
        serde_json::to_value(raw).unwrap_or(Value::Null),
        payload.clone(),
        AuditOutcome::Rejected { reason: err.code().as_str().to_string() },
    );
}

fn error_result(err: &LeagueError, conversation_id: Uuid) -> Value {
    let envelope = Envelope::new(MessageType::Error, Sender::manager(), conversation_id);
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
        MessageType::RegisterReferee => {
            let req: RegisterRefereePayload =
                serde_json::from_value(payload).map_err(|e| LeagueError::EnvelopeInvalid(e.to_string()))?;
            let (tx, rx) = tokio::sync::oneshot::channel();
            state
                .commands
                .send(Command::RegisterReferee {
                    agent_id: req.agent_id,
                    endpoint: req.endpoint,
                    conversation_id: envelope.conversation_id.to_string(),
                    reply: tx,
                })
                .await;
            let resp = rx.await.map_err(|_| LeagueError::Internal("coordinator did not reply".to_string()))??;
            Ok(success_envelope(MessageType::RegistrationResponse, envelope, &resp))
        }
        MessageType::RegisterPlayer => {
            let req: RegisterPlayerPayload =
                serde_json::from_value(payload).map_err(|e| LeagueError::EnvelopeInvalid(e.to_string()))?;
            let (tx, rx) = tokio::sync::oneshot::channel();
            state
                .commands
                .send(Command::RegisterPlayer {
                    agent_id: req.agent_id,
                    endpoint: req.endpoint,
                    conversation_id: envelope.conversation_id.to_string(),
                    reply: tx,
                })
                .await;
            let resp = rx.await.map_err(|_| LeagueError::Internal("coordinator did not reply".to_string()))??;
            Ok(success_envelope(MessageType::RegistrationResponse, envelope, &resp))
        }
        MessageType::ResultReport => {
            let req: ResultReportPayload =
                serde_json::from_value(payload).map_err(|e| LeagueError::EnvelopeInvalid(e.to_string()))?;
            validate_context(
                Some(req.match_id.as_str()) == envelope.match_id.as_deref(),
                "payload match_id does not match envelope match_id",
            )?;
            let sender_id = envelope.sender.agent_id().unwrap_or_default().to_string();
            let (tx, rx) = tokio::sync::oneshot::channel();
            state
                .commands
                .send(Command::ReportResult { sender_kind: envelope.sender.kind, sender_id, payload: req.clone(), reply: tx })
                .await;
            rx.await.map_err(|_| LeagueError::Internal("coordinator did not reply".to_string()))??;
            let ack = league_protocol::messages::ResultAckPayload { match_id: req.match_id };
            Ok(success_envelope(MessageType::ResultAck, envelope, &ack))
        }
        MessageType::MatchError => {
            let req: MatchErrorPayload =
                serde_json::from_value(payload).map_err(|e| LeagueError::EnvelopeInvalid(e.to_string()))?;
            validate_context(
                Some(req.match_id.as_str()) == envelope.match_id.as_deref(),
                "payload match_id does not match envelope match_id",
            )?;
            let sender_id = envelope.sender.agent_id().unwrap_or_default().to_string();
            let (tx, rx) = tokio::sync::oneshot::channel();
            state
                .commands
                .send(Command::MatchError { sender_kind: envelope.sender.kind, sender_id, payload: req, reply: tx })
                .await;
            rx.await.map_err(|_| LeagueError::Internal("coordinator did not reply".to_string()))??;
            Ok(serde_json::json!({"status": "ack"}))
        }
        MessageType::QueryStandings => {
            let (tx, rx) = tokio::sync::oneshot::channel();
            state.commands.send(Command::QueryStandings { reply: tx }).await;
            let resp = rx.await.map_err(|_| LeagueError::Internal("coordinator did not reply".to_string()))??;
            Ok(success_envelope(MessageType::StandingsResponse, envelope, &resp))
        }
        MessageType::LeagueAdvance => {
            validate_context(envelope.sender.kind == league_protocol::AgentKind::LeagueManager, "LEAGUE_ADVANCE requires an administrative sender")?;
            let (tx, rx) = tokio::sync::oneshot::channel();
            state.commands.send(Command::LeagueAdvance { reply: tx }).await;
            rx.await.map_err(|_| LeagueError::Internal("coordinator did not reply".to_string()))??;
            Ok(serde_json::json!({"status": "advanced"}))
        }
        other => Err(LeagueError::PreconditionFailed(format!("league-manager does not accept {}", other.as_wire()))),
    }
}

fn success_envelope<T: serde::Serialize>(message_type: MessageType, request_envelope: &Envelope, payload: &T) -> Value {
    let envelope = Envelope::new(message_type, Sender::manager(), request_envelope.conversation_id)
        .with_league_id(request_envelope.league_id.clone().unwrap_or_default());
    serde_json::json!({
        "envelope": to_raw(&envelope),
        "payload": payload,
    })
}
