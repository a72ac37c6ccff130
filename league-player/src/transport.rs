//! The single outbound call a player ever makes on its own initiative:
//! `REGISTER_PLAYER` to the League Manager at startup. Every other
//! exchange (`GAME_INVITE`, `MOVE_REQUEST`, `GAME_OVER`) arrives as an
//! inbound `/mcp` request that `http.rs` answers synchronously, so there
//! is no match-lifecycle traffic to initiate here — unlike
//! `league-referee`'s `transport.rs`, which also dials out to players.

use std::time::Duration;

use league_protocol::audit::{AuditLog, AuditRecord, Direction, Outcome as AuditOutcome};
use league_protocol::envelope::{Envelope, MessageType, Sender};
use league_protocol::jsonrpc::{RpcParams, RpcRequest, LEAGUE_HANDLE_METHOD};
use league_protocol::retry::with_retry;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[allow(clippy::too_many_arguments)]
pub async fn send(
    client: &reqwest::Client,
    endpoint: &str,
    message_type: MessageType,
    agent_id: &str,
    league_id: &str,
    auth_token: Option<&str>,
    payload: Value,
    retry_max: u32,
    retry_backoff: Duration,
    audit: &AuditLog,
    to: &str,
) -> Result<Value, TransportError> {
    let mut envelope = Envelope::new(message_type, Sender::player(agent_id), Uuid::new_v4());
    if !league_id.is_empty() {
        envelope = envelope.with_league_id(league_id);
    }
    if let Some(token) = auth_token {
        envelope = envelope.with_auth_token(token);
    }
    let raw_envelope = to_raw(&envelope);

    let request = RpcRequest {
        jsonrpc: "2.0".to_string(),
        method: LEAGUE_HANDLE_METHOD.to_string(),
        id: Value::from(Uuid::new_v4().to_string()),
        params: RpcParams {
            envelope: raw_envelope.clone(),
            payload: payload.clone(),
        },
    };

    let url = format!("{}/mcp", endpoint.trim_end_matches('/'));
    let result = with_retry(retry_max, retry_backoff, || {
        let client = client.clone();
        let url = url.clone();
        let request = request.clone();
        async move {
            let resp = client.post(&url).json(&request).send().await?;
            resp.json::<Value>().await.map_err(TransportError::from)
        }
    })
    .await;

    audit.record(&AuditRecord {
        timestamp: chrono::Utc::now(),
        direction: Direction::Out,
        from: String::from(envelope.sender.clone()),
        to: to.to_string(),
        envelope: serde_json::to_value(&raw_envelope).unwrap_or(Value::Null),
        payload,
        outcome: match &result {
            Ok(_) => AuditOutcome::Accepted,
            Err(e) => AuditOutcome::Rejected { reason: e.to_string() },
        },
    });

    result
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
