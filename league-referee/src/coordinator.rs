//! The referee's coordinator task (spec §5): serializes the one
//! business decision a referee makes on its own initiative — whether to
//! accept a new match assignment — the same way the Manager's
//! coordinator serializes its commands (`league-manager/src/
//! coordinator.rs`). A referee only ever holds one match at a time
//! (spec §1 Non-goals), so the decision is a single busy-flag check;
//! once accepted, the whole INVITING/IN_PROGRESS/REPORTING run is
//! handed off to [`executor::run_match`] as a detached task so the
//! coordinator's queue is never blocked on a match in progress.

use std::sync::Arc;

use league_game::GameRegistry;
use league_protocol::audit::AuditLog;
use league_protocol::error::LeagueError;
use league_protocol::messages::MatchAssignPayload;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;
use crate::executor;
use crate::state::RefereeState;

pub enum Command {
    MatchAssign {
        payload: MatchAssignPayload,
        reply: oneshot::Sender<Result<(), LeagueError>>,
    },
}

/// Handle used by the HTTP layer to enqueue commands onto the coordinator.
#[derive(Clone)]
pub struct CommandSender(mpsc::Sender<Command>);

impl CommandSender {
    pub async fn send(&self, cmd: Command) {
        let _ = self.0.send(cmd).await;
    }
}

pub fn spawn(state: Arc<RefereeState>, config: Config, games: Arc<GameRegistry>, audit: Arc<AuditLog>) -> CommandSender {
    let (tx, rx) = mpsc::channel(32);
    let coordinator = Coordinator {
        state,
        config,
        games,
        client: reqwest::Client::new(),
        audit,
    };
    tokio::spawn(coordinator.run(rx));
    CommandSender(tx)
}

struct Coordinator {
    state: Arc<RefereeState>,
    config: Config,
    games: Arc<GameRegistry>,
    client: reqwest::Client,
    audit: Arc<AuditLog>,
}

impl Coordinator {
    async fn run(self, mut rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::MatchAssign { payload, reply } => {
                    let result = self.accept_assignment(payload);
                    let _ = reply.send(result);
                }
            }
        }
    }

    fn accept_assignment(&self, payload: MatchAssignPayload) -> Result<(), LeagueError> {
        if self.state.is_busy() {
            return Err(LeagueError::PreconditionFailed(
                "referee is already holding a match".to_string(),
            ));
        }
        let Some(identity) = self.state.identity() else {
            return Err(LeagueError::PreconditionFailed(
                "referee has not completed registration".to_string(),
            ));
        };

        self.state.set_busy(true);
        tokio::spawn(executor::run_match(
            self.state.clone(),
            self.config.clone(),
            self.games.clone(),
            self.client.clone(),
            self.audit.clone(),
            identity,
            payload,
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Identity;

    fn sample_assign() -> MatchAssignPayload {
        MatchAssignPayload {
            match_id: "m1".to_string(),
            round_id: 1,
            game_type: "tic_tac_toe".to_string(),
            player_a: "p1".to_string(),
            player_b: "p2".to_string(),
            player_a_endpoint: "http://127.0.0.1:9001".to_string(),
            player_b_endpoint: "http://127.0.0.1:9002".to_string(),
        }
    }

    fn coordinator() -> Coordinator {
        let dir = tempfile::tempdir().unwrap();
        Coordinator {
            state: Arc::new(RefereeState::default()),
            config: Config::default(),
            games: Arc::new(GameRegistry::with_reference_games()),
            client: reqwest::Client::new(),
            audit: Arc::new(AuditLog::open(dir.path().join("audit.ndjson")).expect("audit log opens")),
        }
    }

    #[test]
    fn rejects_assignment_before_registration_completes() {
        let c = coordinator();
        let err = c.accept_assignment(sample_assign()).unwrap_err();
        assert!(matches!(err, LeagueError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn rejects_assignment_while_already_busy() {
        let c = coordinator();
        c.state.set_identity(Identity {
            league_id: "league-1".to_string(),
            auth_token: "tok".to_string(),
            signing_secret: "secret".to_string(),
        });
        c.state.set_busy(true);
        let err = c.accept_assignment(sample_assign()).unwrap_err();
        assert!(matches!(err, LeagueError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn accepts_assignment_and_marks_busy() {
        let c = coordinator();
        c.state.set_identity(Identity {
            league_id: "league-1".to_string(),
            auth_token: "tok".to_string(),
            signing_secret: "secret".to_string(),
        });
        assert!(c.accept_assignment(sample_assign()).is_ok());
        assert!(c.state.is_busy());
    }
}
