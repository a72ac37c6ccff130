//! Relational persistence layer for the Agent League System: one SQLite
//! database per Manager process (spec §4.7). Repositories are exposed
//! through a single [`Store`] handle so the Manager's coordinator task
//! can own one clone of it without threading pool references around.

mod error;
mod models;
mod schema;
mod store;

pub use error::StorageError;
pub use models::{
    AgentKindDb, AgentRow, AgentStatus, LeagueRow, LeagueStatus, MatchRow, MatchStatus, OutcomeDb,
    ResultRow, RoundRow, RoundStatus, StandingsSnapshotRow, TokenRow,
};
pub use store::{MatchPlan, RoundPlan, Store};
