//! The `GameAdapter` contract (spec §4.6), the Tic-Tac-Toe reference
//! implementation, and a small per-process adapter registry.

pub mod adapter;
pub mod registry;
pub mod tic_tac_toe;

pub use adapter::{GameAdapter, GameError, Player, PointsMap, Terminal};
pub use registry::GameRegistry;
pub use tic_tac_toe::TicTacToeAdapter;
