//! Crash-consistent state reconstruction for the one match this referee
//! may hold (spec §4.7): "a referee reconstructs the status of its one
//! assigned match and either resumes or marks ERRORED if the match was
//! mid-step." Since a referee owns at most one live match (spec §1
//! Non-goals: "no support for concurrent matches per referee"), the
//! checkpoint is a single small JSON file rewritten atomically (write to
//! a temp path, then rename) on every phase transition rather than a
//! full relational store — that machinery lives in `league-storage` for
//! the Manager's many-entity state, which this process doesn't need.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub match_id: String,
    pub round_id: u64,
    pub game_type: String,
    pub player_a: String,
    pub player_b: String,
    pub phase: String,
}

impl Checkpoint {
    /// Whether this checkpoint's phase is one `run_match` only ever
    /// writes right before clearing the file (see `executor.rs`). A
    /// checkpoint surviving to process restart in any other phase means
    /// the referee died mid-match.
    pub fn is_terminal(&self) -> bool {
        matches!(self.phase.as_str(), "completed" | "forfeited" | "errored")
    }
}

/// Overwrites the checkpoint file with `checkpoint`'s current phase.
/// Logged, never fatal: a failed checkpoint write degrades crash
/// recovery but must not abort an in-progress match.
pub fn save(path: &str, checkpoint: &Checkpoint) {
    let tmp = format!("{path}.tmp");
    let body = match serde_json::to_vec_pretty(checkpoint) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize referee checkpoint");
            return;
        }
    };
    if let Err(e) = write_atomic(&tmp, path, &body) {
        tracing::error!(error = %e, "failed to persist referee checkpoint");
    }
}

/// Removes the checkpoint file once a match reaches a terminal phase.
pub fn clear(path: &str) {
    let _ = std::fs::remove_file(path);
}

fn write_atomic(tmp: &str, dest: &str, body: &[u8]) -> std::io::Result<()> {
    {
        let mut file = std::fs::File::create(tmp)?;
        file.write_all(body)?;
        file.flush()?;
    }
    std::fs::rename(tmp, dest)
}

/// Loads a leftover checkpoint at startup, if any. Per spec §4.7, a
/// checkpoint found in a non-terminal phase means the referee crashed
/// mid-match; there is no safe way to resume a step loop whose last
/// request may or may not have reached the player, so the match is
/// logged as requiring manual resolution and the checkpoint is cleared,
/// leaving the referee idle for its next assignment (DESIGN.md).
pub fn recover(path: &str) -> Option<Checkpoint> {
    if !Path::new(path).exists() {
        return None;
    }
    let body = std::fs::read(path).ok()?;
    let checkpoint: Checkpoint = serde_json::from_slice(&body).ok()?;
    if !checkpoint.is_terminal() {
        tracing::error!(
            match_id = %checkpoint.match_id,
            phase = %checkpoint.phase,
            "referee restarted mid-match; match requires manual resolution"
        );
    }
    clear(path);
    Some(checkpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_recover_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.json");
        let path = path.to_str().unwrap();

        let cp = Checkpoint {
            match_id: "m1".to_string(),
            round_id: 1,
            game_type: "tic_tac_toe".to_string(),
            player_a: "a".to_string(),
            player_b: "b".to_string(),
            phase: "in_progress".to_string(),
        };
        save(path, &cp);
        let recovered = recover(path).unwrap();
        assert_eq!(recovered.match_id, "m1");
        assert!(!Path::new(path).exists(), "checkpoint cleared after recovery");
    }

    #[test]
    fn recover_returns_none_when_no_checkpoint_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(recover(path.to_str().unwrap()).is_none());
    }

    #[test]
    fn is_terminal_covers_all_final_phases() {
        let cp = |phase: &str| Checkpoint {
            match_id: "m1".to_string(),
            round_id: 1,
            game_type: "tic_tac_toe".to_string(),
            player_a: "a".to_string(),
            player_b: "b".to_string(),
            phase: phase.to_string(),
        };
        assert!(cp("completed").is_terminal());
        assert!(cp("forfeited").is_terminal());
        assert!(cp("errored").is_terminal());
        assert!(!cp("in_progress").is_terminal());
        assert!(!cp("inviting").is_terminal());
        assert!(!cp("assigned").is_terminal());
        assert!(!cp("reporting").is_terminal());
    }
}
