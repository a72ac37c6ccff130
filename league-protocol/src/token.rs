//! Opaque auth token issuance and stateless verification (spec §3 "Auth
//! token"). Tokens are HS256 JWTs binding `(league_id, kind, agent_id)`,
//! signed with a per-league signing secret generated at league creation.
//!
//! Sign a small claims struct, verify on every request. Kept stateless
//! (no token-store round trip) so any service that holds the league's
//! signing secret — the Manager that issues tokens, and every
//! Referee/Player it hands the secret to at registration — can
//! validate a token locally (see DESIGN.md).

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::envelope::AgentKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    league_id: String,
    kind: String,
    agent_id: String,
}

fn kind_str(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::LeagueManager => "league_manager",
        AgentKind::Referee => "referee",
        AgentKind::Player => "player",
    }
}

fn parse_kind(s: &str) -> Option<AgentKind> {
    match s {
        "referee" => Some(AgentKind::Referee),
        "player" => Some(AgentKind::Player),
        "league_manager" => Some(AgentKind::LeagueManager),
        _ => None,
    }
}

/// Generates a fresh per-league signing secret.
pub fn generate_signing_secret() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn issue(signing_secret: &str, league_id: &str, kind: AgentKind, agent_id: &str) -> String {
    let claims = Claims {
        league_id: league_id.to_string(),
        kind: kind_str(kind).to_string(),
        agent_id: agent_id.to_string(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(signing_secret.as_bytes()))
        .expect("HS256 encoding of a small claims struct cannot fail")
}

/// Verifies a token's signature and returns the `(kind, agent_id)` it is
/// bound to, or `None` if the signature is invalid or the token was
/// issued under a different signing secret.
pub fn verify(signing_secret: &str, token: &str) -> Option<(AgentKind, String)> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(signing_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;
    let kind = parse_kind(&data.claims.kind)?;
    Some((kind, data.claims.agent_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_back_to_same_binding() {
        let secret = generate_signing_secret();
        let token = issue(&secret, "league-1", AgentKind::Referee, "r1");
        let (kind, agent_id) = verify(&secret, &token).unwrap();
        assert_eq!(kind, AgentKind::Referee);
        assert_eq!(agent_id, "r1");
    }

    #[test]
    fn token_signed_with_different_secret_is_rejected() {
        let token = issue(&generate_signing_secret(), "league-1", AgentKind::Player, "p1");
        assert!(verify(&generate_signing_secret(), &token).is_none());
    }

    #[test]
    fn signing_secrets_are_unique() {
        assert_ne!(generate_signing_secret(), generate_signing_secret());
    }
}
