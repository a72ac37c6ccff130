//! The `GameAdapter` contract (spec §4.6): the only component in the
//! system with game-specific knowledge. Object-safe so a registry can hold
//! `Box<dyn GameAdapter>` per `game_type`, which means state and moves are
//! carried as opaque `serde_json::Value` rather than associated types.

use serde_json::Value;

/// One of the two players in a match, position-stable for the life of the
/// match (spec §4.3 "lower player_id is always player A").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Player {
    A,
    B,
}

impl Player {
    pub fn other(self) -> Player {
        match self {
            Player::A => Player::B,
            Player::B => Player::A,
        }
    }
}

/// The adapter's judgment of whether a state is terminal (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Ongoing,
    Win(Player),
    Draw,
}

/// Points awarded to each player for a terminal outcome (spec §4.4 scoring
/// table: WIN=3, DRAW=1, LOSS=0, configurable per game).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointsMap {
    pub a: u32,
    pub b: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("move is not legal in the current state")]
    IllegalMove,
    #[error("it is not this player's turn")]
    NotYourTurn,
    #[error("malformed state or move payload: {0}")]
    Malformed(String),
}

/// A pluggable set of game rules. One instance is held per known
/// `game_type` in a referee's game registry (spec §2: "Referee... holds
/// one GameAdapter per known game type").
pub trait GameAdapter: Send + Sync {
    /// The wire identifier this adapter answers to, e.g. `"tic_tac_toe"`.
    fn game_type(&self) -> &str;

    /// Which player moves first. Tic-Tac-Toe: player A, with mark X.
    fn first_mover(&self) -> Player;

    fn initial_state(&self) -> Value;

    /// The set of legal moves for `player` in `state`.
    fn legal_moves(&self, state: &Value, player: Player) -> Vec<Value>;

    /// Validates and applies `mv` for `player`, returning the resulting
    /// state. Errors if the move is illegal or out of turn.
    fn apply(&self, state: &Value, player: Player, mv: &Value) -> Result<Value, GameError>;

    fn terminal(&self, state: &Value) -> Terminal;

    fn scoring(&self, outcome: Terminal) -> PointsMap;

    /// An opaque view of `state` for `viewer` to base a move decision on
    /// (spec glossary: "Snapshot").
    fn snapshot(&self, state: &Value, viewer: Player) -> Value;
}
