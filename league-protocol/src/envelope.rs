//! The `league.v2` envelope: the wrapper every protocol message carries
//! inside a JSON-RPC `params.envelope` field.

use std::convert::TryFrom;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Protocol version string every envelope must carry.
pub const PROTOCOL_VERSION: &str = "league.v2";

/// The kind of agent a `Sender` identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    LeagueManager,
    Referee,
    Player,
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::LeagueManager => write!(f, "league_manager"),
            AgentKind::Referee => write!(f, "referee"),
            AgentKind::Player => write!(f, "player"),
        }
    }
}

/// Parsed `envelope.sender` field: `league_manager`, `referee:<id>`, or
/// `player:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sender {
    pub kind: AgentKind,
    pub agent_id: Option<String>,
}

impl Sender {
    pub fn manager() -> Self {
        Self {
            kind: AgentKind::LeagueManager,
            agent_id: None,
        }
    }

    pub fn referee(agent_id: impl Into<String>) -> Self {
        Self {
            kind: AgentKind::Referee,
            agent_id: Some(agent_id.into()),
        }
    }

    pub fn player(agent_id: impl Into<String>) -> Self {
        Self {
            kind: AgentKind::Player,
            agent_id: Some(agent_id.into()),
        }
    }

    /// Returns the agent id for referee/player senders; `None` for the manager.
    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("sender format invalid: {0}")]
pub struct SenderParseError(pub String);

impl TryFrom<String> for Sender {
    type Error = SenderParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "league_manager" {
            return Ok(Sender::manager());
        }
        if let Some(id) = value.strip_prefix("referee:") {
            if id.is_empty() {
                return Err(SenderParseError(value));
            }
            return Ok(Sender::referee(id));
        }
        if let Some(id) = value.strip_prefix("player:") {
            if id.is_empty() {
                return Err(SenderParseError(value));
            }
            return Ok(Sender::player(id));
        }
        Err(SenderParseError(value))
    }
}

impl From<Sender> for String {
    fn from(sender: Sender) -> Self {
        match (sender.kind, sender.agent_id) {
            (AgentKind::LeagueManager, _) => "league_manager".to_string(),
            (AgentKind::Referee, Some(id)) => format!("referee:{id}"),
            (AgentKind::Player, Some(id)) => format!("player:{id}"),
            (AgentKind::Referee, None) | (AgentKind::Player, None) => {
                unreachable!("referee/player Sender always carries an agent_id")
            }
        }
    }
}

impl Serialize for Sender {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        String::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Sender {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Sender::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// Every value `envelope.message_type` may take. `LEAGUE_ADVANCE` and
/// `MATCH_ERROR` are extensions over the wire enumeration in spec §6,
/// added per the Open Questions resolution in DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "REGISTER_REFEREE")]
    RegisterReferee,
    #[serde(rename = "REGISTER_PLAYER")]
    RegisterPlayer,
    #[serde(rename = "REGISTRATION_RESPONSE")]
    RegistrationResponse,
    #[serde(rename = "LEAGUE_ADVANCE")]
    LeagueAdvance,
    #[serde(rename = "ROUND_ANNOUNCE")]
    RoundAnnounce,
    #[serde(rename = "MATCH_ASSIGN")]
    MatchAssign,
    #[serde(rename = "GAME_INVITE")]
    GameInvite,
    #[serde(rename = "INVITE_ACCEPT")]
    InviteAccept,
    #[serde(rename = "INVITE_DECLINE")]
    InviteDecline,
    #[serde(rename = "MOVE_REQUEST")]
    MoveRequest,
    #[serde(rename = "MOVE_RESPONSE")]
    MoveResponse,
    #[serde(rename = "GAME_OVER")]
    GameOver,
    #[serde(rename = "RESULT_REPORT")]
    ResultReport,
    #[serde(rename = "RESULT_ACK")]
    ResultAck,
    #[serde(rename = "MATCH_ERROR")]
    MatchError,
    #[serde(rename = "QUERY_STANDINGS")]
    QueryStandings,
    #[serde(rename = "STANDINGS_RESPONSE")]
    StandingsResponse,
    #[serde(rename = "ERROR")]
    Error,
}

impl MessageType {
    /// The exact wire string for this variant (the `#[serde(rename)]` value).
    pub fn as_wire(self) -> &'static str {
        match self {
            MessageType::RegisterReferee => "REGISTER_REFEREE",
            MessageType::RegisterPlayer => "REGISTER_PLAYER",
            MessageType::RegistrationResponse => "REGISTRATION_RESPONSE",
            MessageType::LeagueAdvance => "LEAGUE_ADVANCE",
            MessageType::RoundAnnounce => "ROUND_ANNOUNCE",
            MessageType::MatchAssign => "MATCH_ASSIGN",
            MessageType::GameInvite => "GAME_INVITE",
            MessageType::InviteAccept => "INVITE_ACCEPT",
            MessageType::InviteDecline => "INVITE_DECLINE",
            MessageType::MoveRequest => "MOVE_REQUEST",
            MessageType::MoveResponse => "MOVE_RESPONSE",
            MessageType::GameOver => "GAME_OVER",
            MessageType::ResultReport => "RESULT_REPORT",
            MessageType::ResultAck => "RESULT_ACK",
            MessageType::MatchError => "MATCH_ERROR",
            MessageType::QueryStandings => "QUERY_STANDINGS",
            MessageType::StandingsResponse => "STANDINGS_RESPONSE",
            MessageType::Error => "ERROR",
        }
    }

    /// Parses a wire string into a `MessageType`, used by the envelope
    /// validator (spec §4.1 step 2) to distinguish "unknown enumerated
    /// value" from a JSON-RPC transport-shape failure.
    pub fn parse(s: &str) -> Option<Self> {
        use MessageType::*;
        let all = [
            RegisterReferee,
            RegisterPlayer,
            RegistrationResponse,
            LeagueAdvance,
            RoundAnnounce,
            MatchAssign,
            GameInvite,
            InviteAccept,
            InviteDecline,
            MoveRequest,
            MoveResponse,
            GameOver,
            ResultReport,
            ResultAck,
            QueryStandings,
            StandingsResponse,
            MatchError,
            Error,
        ];
        all.into_iter().find(|m| m.as_wire() == s)
    }

    /// `auth_token` is required on every message type except the two that
    /// bootstrap a token in the first place (spec §4.1, item 5) and the
    /// administrative `LEAGUE_ADVANCE` extension, which has no registered
    /// agent identity to bind a token to.
    pub fn requires_auth_token(self) -> bool {
        !matches!(
            self,
            MessageType::RegisterReferee | MessageType::RegisterPlayer | MessageType::LeagueAdvance
        )
    }

    /// `league_id` is required on league-scoped operations (spec §4.1).
    pub fn requires_league_id(self) -> bool {
        !matches!(self, MessageType::RegisterReferee | MessageType::RegisterPlayer)
    }

    /// `round_id` and `match_id` are required for match lifecycle messages.
    pub fn requires_match_context(self) -> bool {
        matches!(
            self,
            MessageType::MatchAssign
                | MessageType::GameInvite
                | MessageType::InviteAccept
                | MessageType::InviteDecline
                | MessageType::MoveRequest
                | MessageType::MoveResponse
                | MessageType::GameOver
                | MessageType::ResultReport
                | MessageType::ResultAck
                | MessageType::MatchError
        )
    }

    /// `game_type` is required for assignment and execution messages.
    pub fn requires_game_type(self) -> bool {
        matches!(
            self,
            MessageType::MatchAssign | MessageType::GameInvite | MessageType::MoveRequest
        )
    }
}

/// The envelope wrapper carried inside every JSON-RPC `params`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub protocol: String,
    pub message_type: MessageType,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    pub conversation_id: Uuid,
    /// Monotonic per-conversation sequence number (spec §5).
    #[serde(default)]
    pub message_seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub league_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_type: Option<String>,
}

impl Envelope {
    pub fn new(message_type: MessageType, sender: Sender, conversation_id: Uuid) -> Self {
        Self {
            protocol: PROTOCOL_VERSION.to_string(),
            message_type,
            sender,
            timestamp: Utc::now(),
            conversation_id,
            message_seq: 0,
            auth_token: None,
            league_id: None,
            round_id: None,
            match_id: None,
            game_type: None,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_league_id(mut self, league_id: impl Into<String>) -> Self {
        self.league_id = Some(league_id.into());
        self
    }

    pub fn with_match_context(mut self, round_id: u64, match_id: impl Into<String>) -> Self {
        self.round_id = Some(round_id);
        self.match_id = Some(match_id.into());
        self
    }

    pub fn with_game_type(mut self, game_type: impl Into<String>) -> Self {
        self.game_type = Some(game_type.into());
        self
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.message_seq = seq;
        self
    }
}

/// The envelope as it arrives over the wire, before validation: every field
/// is loosely typed so that a malformed value surfaces as a league-level
/// `ENVELOPE_INVALID` error (spec §4.1 step 2) rather than a JSON-RPC
/// transport failure. [`crate::validate::validate_envelope`] turns this
/// into a fully typed [`Envelope`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEnvelope {
    pub protocol: String,
    pub message_type: String,
    pub sender: String,
    pub timestamp: String,
    pub conversation_id: String,
    #[serde(default)]
    pub message_seq: u64,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub league_id: Option<String>,
    #[serde(default)]
    pub round_id: Option<u64>,
    #[serde(default)]
    pub match_id: Option<String>,
    #[serde(default)]
    pub game_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_round_trips_through_string() {
        for sender in [
            Sender::manager(),
            Sender::referee("r1"),
            Sender::player("p42"),
        ] {
            let s = String::from(sender.clone());
            let parsed = Sender::try_from(s).unwrap();
            assert_eq!(parsed, sender);
        }
    }

    #[test]
    fn sender_rejects_malformed_strings() {
        for bad in ["referee:", "player:", "referee", "random", ""] {
            assert!(Sender::try_from(bad.to_string()).is_err());
        }
    }

    #[test]
    fn envelope_serialize_deserialize_is_identity() {
        let env = Envelope::new(
            MessageType::MatchAssign,
            Sender::manager(),
            Uuid::new_v4(),
        )
        .with_auth_token("tok")
        .with_league_id("league-1")
        .with_match_context(1, "m1")
        .with_game_type("tic_tac_toe");

        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();

        assert_eq!(back.protocol, env.protocol);
        assert_eq!(back.message_type, env.message_type);
        assert_eq!(back.sender, env.sender);
        assert_eq!(back.conversation_id, env.conversation_id);
        assert_eq!(back.auth_token, env.auth_token);
        assert_eq!(back.league_id, env.league_id);
        assert_eq!(back.round_id, env.round_id);
        assert_eq!(back.match_id, env.match_id);
        assert_eq!(back.game_type, env.game_type);
    }

    #[test]
    fn message_type_wire_strings_round_trip() {
        for mt in [
            MessageType::RegisterReferee,
            MessageType::MatchAssign,
            MessageType::ResultReport,
            MessageType::StandingsResponse,
            MessageType::Error,
        ] {
            assert_eq!(MessageType::parse(mt.as_wire()), Some(mt));
        }
        assert_eq!(MessageType::parse("NOT_A_REAL_TYPE"), None);
    }

    #[test]
    fn message_type_contextual_requirements_match_spec() {
        assert!(!MessageType::RegisterReferee.requires_auth_token());
        assert!(MessageType::QueryStandings.requires_auth_token());
        assert!(MessageType::MatchAssign.requires_match_context());
        assert!(!MessageType::RegisterPlayer.requires_match_context());
        assert!(MessageType::MoveRequest.requires_game_type());
        assert!(!MessageType::ResultAck.requires_game_type());
    }
}
