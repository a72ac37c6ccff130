//! Shared mutable state for the player process: just the identity it
//! learned at `REGISTER_PLAYER` time. A player holds no per-match state
//! of its own (spec §4.6): every `GAME_INVITE`/`MOVE_REQUEST` is a
//! self-contained request the HTTP handler answers from the snapshot it
//! was just given, so there is nothing to track across requests, even
//! when a player is mid-match in more than one round at once.

use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct Identity {
    pub league_id: String,
    pub auth_token: String,
    pub signing_secret: String,
}

#[derive(Default)]
pub struct PlayerState {
    identity: Mutex<Option<Identity>>,
}

impl PlayerState {
    pub fn identity(&self) -> Option<Identity> {
        self.identity.lock().unwrap().clone()
    }

    pub fn set_identity(&self, identity: Identity) {
        *self.identity.lock().unwrap() = Some(identity);
    }
}
