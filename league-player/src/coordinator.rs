//! The player's coordinator task (spec §5): same shape as
//! `league-referee`'s and `league-manager`'s coordinators — a single task
//! owns the player's (trivial) mutable business state and answers
//! commands from a bounded queue, keeping every decision serialized even
//! though a player's two decisions (accept an invite, pick a move) never
//! actually contend with each other in this Non-goals scope (spec §1: no
//! concurrent matches per referee, and a referee only ever holds one
//! match, so a given player is never asked for two moves at once).

use std::sync::Arc;

use league_protocol::error::LeagueError;
use league_protocol::messages::{GameInvitePayload, GameOverPayload, MoveRequestPayload};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::state::PlayerState;
use crate::strategy;

pub enum Command {
    GameInvite {
        payload: GameInvitePayload,
        reply: oneshot::Sender<Result<(), LeagueError>>,
    },
    MoveRequest {
        payload: MoveRequestPayload,
        reply: oneshot::Sender<Result<Value, LeagueError>>,
    },
    GameOver {
        payload: GameOverPayload,
        reply: oneshot::Sender<Result<(), LeagueError>>,
    },
}

#[derive(Clone)]
pub struct CommandSender(mpsc::Sender<Command>);

impl CommandSender {
    pub async fn send(&self, cmd: Command) {
        let _ = self.0.send(cmd).await;
    }
}

pub fn spawn(state: Arc<PlayerState>) -> CommandSender {
    let (tx, rx) = mpsc::channel(32);
    let coordinator = Coordinator { state };
    tokio::spawn(coordinator.run(rx));
    CommandSender(tx)
}

struct Coordinator {
    #[allow(dead_code)]
    state: Arc<PlayerState>,
}

impl Coordinator {
    async fn run(self, mut rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::GameInvite { reply, .. } => {
                    let _ = reply.send(self.accept_invite());
                }
                Command::MoveRequest { payload, reply } => {
                    let _ = reply.send(self.choose_move(&payload));
                }
                Command::GameOver { reply, .. } => {
                    let _ = reply.send(Ok(()));
                }
            }
        }
    }

    /// Always accepts: the reference player collaborator has no basis on
    /// which to decline a match (spec §1 Non-goals keeps strategy out of
    /// core, and acceptance is not part of the strategy seam).
    fn accept_invite(&self) -> Result<(), LeagueError> {
        Ok(())
    }

    fn choose_move(&self, payload: &MoveRequestPayload) -> Result<Value, LeagueError> {
        strategy::first_legal_move(&payload.snapshot)
            .ok_or_else(|| LeagueError::Internal("no legal move available in snapshot".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> Coordinator {
        Coordinator { state: Arc::new(PlayerState::default()) }
    }

    #[test]
    fn always_accepts_invites() {
        assert!(coordinator().accept_invite().is_ok());
    }

    #[test]
    fn chooses_first_legal_move_from_snapshot() {
        let c = coordinator();
        let payload = MoveRequestPayload {
            match_id: "m1".to_string(),
            snapshot: serde_json::json!({"board": [null, "X", null, null, null, null, null, null, null]}),
            deadline: chrono::Utc::now(),
        };
        let mv = c.choose_move(&payload).unwrap();
        assert_eq!(mv, serde_json::json!({"cell": 0}));
    }

    #[test]
    fn errors_when_snapshot_has_no_legal_move() {
        let c = coordinator();
        let payload = MoveRequestPayload {
            match_id: "m1".to_string(),
            snapshot: serde_json::json!({"nonsense": true}),
            deadline: chrono::Utc::now(),
        };
        assert!(c.choose_move(&payload).is_err());
    }
}
