//! Envelope validation pipeline (spec §4.1). Steps 1 (JSON-RPC shape) are
//! handled by [`crate::jsonrpc::RpcRequest::validate_shape`] before this
//! module is reached. This module covers steps 2-6, always failing fast on
//! the first violation and never mutating state.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::envelope::{AgentKind, Envelope, MessageType, RawEnvelope, Sender, PROTOCOL_VERSION};
use crate::error::LeagueError;

/// The live binding a token resolves to, as looked up by the caller's
/// token store (spec §4.1 step 5). Kept crate-agnostic of persistence so
/// `league-protocol` has no `sqlx` dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBinding {
    pub kind: AgentKind,
    pub agent_id: String,
}

/// Steps 2-4: envelope shape, enumerated values, timestamp skew, and
/// sender format. Does not touch auth or business state.
pub fn validate_envelope(
    raw: &RawEnvelope,
    now: DateTime<Utc>,
    clock_skew: Duration,
) -> Result<Envelope, LeagueError> {
    if raw.protocol != PROTOCOL_VERSION {
        return Err(LeagueError::EnvelopeInvalid(format!(
            "unsupported protocol: {}",
            raw.protocol
        )));
    }

    let message_type = MessageType::parse(&raw.message_type)
        .ok_or_else(|| LeagueError::EnvelopeInvalid(format!("unknown message_type: {}", raw.message_type)))?;

    let conversation_id = uuid::Uuid::parse_str(&raw.conversation_id)
        .map_err(|_| LeagueError::EnvelopeInvalid("conversation_id is not a UUID".to_string()))?;

    // Step 3: timestamp parseable, UTC, within configured skew.
    let timestamp = DateTime::parse_from_rfc3339(&raw.timestamp)
        .map_err(|_| LeagueError::EnvelopeInvalid("timestamp is not valid ISO-8601 UTC".to_string()))?
        .with_timezone(&Utc);
    let delta = (now - timestamp).num_milliseconds().unsigned_abs();
    if delta > clock_skew.as_millis() as u64 {
        return Err(LeagueError::EnvelopeInvalid(format!(
            "timestamp skew {}ms exceeds allowed {}ms",
            delta,
            clock_skew.as_millis()
        )));
    }

    // Step 4: sender format.
    let sender = Sender::try_from(raw.sender.clone())
        .map_err(|e| LeagueError::EnvelopeInvalid(e.to_string()))?;

    // Contextual field requirements (spec §4.1).
    if message_type.requires_league_id() && raw.league_id.is_none() {
        return Err(LeagueError::EnvelopeInvalid(
            "league_id is required for this message_type".to_string(),
        ));
    }
    if message_type.requires_match_context() && (raw.round_id.is_none() || raw.match_id.is_none()) {
        return Err(LeagueError::EnvelopeInvalid(
            "round_id and match_id are required for this message_type".to_string(),
        ));
    }
    if message_type.requires_game_type() && raw.game_type.is_none() {
        return Err(LeagueError::EnvelopeInvalid(
            "game_type is required for this message_type".to_string(),
        ));
    }

    Ok(Envelope {
        protocol: raw.protocol.clone(),
        message_type,
        sender,
        timestamp,
        conversation_id,
        message_seq: raw.message_seq,
        auth_token: raw.auth_token.clone(),
        league_id: raw.league_id.clone(),
        round_id: raw.round_id,
        match_id: raw.match_id.clone(),
        game_type: raw.game_type.clone(),
    })
}

/// Step 5: for every post-registration message type, the auth token must
/// be live and bound to the same `(kind, agent_id)` as `sender`.
pub fn validate_auth(
    envelope: &Envelope,
    auth_enabled: bool,
    lookup: impl FnOnce(&str) -> Option<TokenBinding>,
) -> Result<(), LeagueError> {
    if !auth_enabled || !envelope.message_type.requires_auth_token() {
        return Ok(());
    }
    let token = envelope.auth_token.as_deref().ok_or(LeagueError::AuthRequired)?;
    let binding = lookup(token).ok_or(LeagueError::AuthInvalid)?;

    let sender_matches = binding.kind == envelope.sender.kind
        && Some(binding.agent_id.as_str()) == envelope.sender.agent_id();
    if !sender_matches {
        return Err(LeagueError::AuthInvalid);
    }
    Ok(())
}

/// Step 6: caller-supplied contextual identifier consistency, e.g. "this
/// match_id belongs to the sender's assigned match". Business-specific, so
/// expressed as a predicate the caller provides.
pub fn validate_context(consistent: bool, detail: impl Into<String>) -> Result<(), LeagueError> {
    if consistent {
        Ok(())
    } else {
        Err(LeagueError::PreconditionFailed(detail.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn raw(message_type: &str, sender: &str) -> RawEnvelope {
        RawEnvelope {
            protocol: PROTOCOL_VERSION.to_string(),
            message_type: message_type.to_string(),
            sender: sender.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            conversation_id: Uuid::new_v4().to_string(),
            message_seq: 0,
            auth_token: Some("tok".to_string()),
            league_id: Some("league-1".to_string()),
            round_id: None,
            match_id: None,
            game_type: None,
        }
    }

    #[test]
    fn rejects_wrong_protocol() {
        let mut r = raw("QUERY_STANDINGS", "player:p1");
        r.protocol = "league.v1".to_string();
        let err = validate_envelope(&r, Utc::now(), Duration::from_secs(120)).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::EnvelopeInvalid);
    }

    #[test]
    fn rejects_unknown_message_type() {
        let r = raw("NOT_A_TYPE", "player:p1");
        assert!(validate_envelope(&r, Utc::now(), Duration::from_secs(120)).is_err());
    }

    #[test]
    fn rejects_stale_timestamp() {
        let mut r = raw("QUERY_STANDINGS", "player:p1");
        r.timestamp = (Utc::now() - chrono::Duration::seconds(300)).to_rfc3339();
        let err = validate_envelope(&r, Utc::now(), Duration::from_secs(120)).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::EnvelopeInvalid);
    }

    #[test]
    fn rejects_malformed_sender() {
        let r = raw("QUERY_STANDINGS", "not-a-sender");
        assert!(validate_envelope(&r, Utc::now(), Duration::from_secs(120)).is_err());
    }

    #[test]
    fn requires_league_id_for_scoped_ops() {
        let mut r = raw("QUERY_STANDINGS", "player:p1");
        r.league_id = None;
        assert!(validate_envelope(&r, Utc::now(), Duration::from_secs(120)).is_err());
    }

    #[test]
    fn requires_match_context_for_lifecycle_ops() {
        let r = raw("MOVE_REQUEST", "referee:r1");
        // league_id present, game_type present, but round_id/match_id missing
        let mut r = r;
        r.game_type = Some("tic_tac_toe".to_string());
        assert!(validate_envelope(&r, Utc::now(), Duration::from_secs(120)).is_err());
    }

    #[test]
    fn accepts_well_formed_envelope() {
        let mut r = raw("MATCH_ASSIGN", "league_manager");
        r.round_id = Some(1);
        r.match_id = Some("m1".to_string());
        r.game_type = Some("tic_tac_toe".to_string());
        assert!(validate_envelope(&r, Utc::now(), Duration::from_secs(120)).is_ok());
    }

    #[test]
    fn auth_required_when_missing() {
        let mut r = raw("QUERY_STANDINGS", "player:p1");
        r.auth_token = None;
        let env = validate_envelope(&r, Utc::now(), Duration::from_secs(120)).unwrap();
        let err = validate_auth(&env, true, |_| None).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::AuthRequired);
    }

    #[test]
    fn auth_invalid_when_token_unknown() {
        let r = raw("QUERY_STANDINGS", "player:p1");
        let env = validate_envelope(&r, Utc::now(), Duration::from_secs(120)).unwrap();
        let err = validate_auth(&env, true, |_| None).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::AuthInvalid);
    }

    #[test]
    fn auth_invalid_when_token_bound_to_different_agent() {
        let r = raw("QUERY_STANDINGS", "player:p1");
        let env = validate_envelope(&r, Utc::now(), Duration::from_secs(120)).unwrap();
        let err = validate_auth(&env, true, |_| {
            Some(TokenBinding {
                kind: AgentKind::Player,
                agent_id: "p2".to_string(),
            })
        })
        .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::AuthInvalid);
    }

    #[test]
    fn auth_ok_when_disabled() {
        let mut r = raw("QUERY_STANDINGS", "player:p1");
        r.auth_token = None;
        let env = validate_envelope(&r, Utc::now(), Duration::from_secs(120)).unwrap();
        assert!(validate_auth(&env, false, |_| None).is_ok());
    }

    #[test]
    fn auth_not_required_for_registration() {
        let mut r = raw("REGISTER_PLAYER", "player:p1");
        r.auth_token = None;
        r.league_id = None;
        let env = validate_envelope(&r, Utc::now(), Duration::from_secs(120)).unwrap();
        assert!(validate_auth(&env, true, |_| None).is_ok());
    }
}
