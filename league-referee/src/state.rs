//! Shared mutable state for the referee process: the identity this
//! referee registered under, and whether it currently holds a match.
//! Every exchange with a player is a synchronous request/reply over
//! `/mcp` (the executor calls out and reads the reply inline — see
//! `executor::call_player`), so there is nothing here to rendezvous on;
//! this is just the two pieces of state the HTTP layer and the
//! coordinator both need to see.

use std::sync::Mutex;

/// What this referee learned about itself at `REGISTER_REFEREE` time.
/// `None` until registration completes.
#[derive(Debug, Clone)]
pub struct Identity {
    pub league_id: String,
    pub auth_token: String,
    pub signing_secret: String,
}

#[derive(Default)]
pub struct RefereeState {
    identity: Mutex<Option<Identity>>,
    /// Non-empty exactly while a match is assigned/running; this is the
    /// structural enforcement of "no concurrent matches per referee"
    /// (spec §1 Non-goals).
    busy: Mutex<bool>,
}

impl RefereeState {
    pub fn identity(&self) -> Option<Identity> {
        self.identity.lock().unwrap().clone()
    }

    pub fn set_identity(&self, identity: Identity) {
        *self.identity.lock().unwrap() = Some(identity);
    }

    pub fn is_busy(&self) -> bool {
        *self.busy.lock().unwrap()
    }

    pub fn set_busy(&self, busy: bool) {
        *self.busy.lock().unwrap() = busy;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_flag_defaults_to_false() {
        let state = RefereeState::default();
        assert!(!state.is_busy());
        state.set_busy(true);
        assert!(state.is_busy());
    }

    #[test]
    fn identity_is_none_until_set() {
        let state = RefereeState::default();
        assert!(state.identity().is_none());
        state.set_identity(Identity {
            league_id: "league-1".to_string(),
            auth_token: "tok".to_string(),
            signing_secret: "secret".to_string(),
        });
        assert_eq!(state.identity().unwrap().league_id, "league-1");
    }
}
