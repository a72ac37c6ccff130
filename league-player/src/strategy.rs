//! The player's move-selection policy: first legal move. Spec §1
//! Non-goals keeps real strategy logic out of the League Manager/Referee
//! core and behind a pluggable seam instead — this is the trivial
//! implementation of that seam for the reference `tic_tac_toe` game.
//!
//! Deliberately does not depend on `league-game`: a player only ever
//! sees the opaque `snapshot` a `GameAdapter` hands back over the wire
//! (spec §4.6), so this module reads that same JSON shape a real
//! third-party player would, instead of reaching into the referee's own
//! adapter types.

use serde_json::Value;

/// Picks the lowest-indexed empty cell in a `tic_tac_toe` snapshot's
/// `board` array. Returns `None` if the snapshot doesn't look like a
/// `tic_tac_toe` board or has no empty cell — a referee never asks for a
/// move once the board is full, so this is only reachable on a
/// malformed/foreign snapshot.
pub fn first_legal_move(snapshot: &Value) -> Option<Value> {
    let board = snapshot.get("board")?.as_array()?;
    let cell = board.iter().position(|c| c.is_null())?;
    Some(serde_json::json!({ "cell": cell }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_first_empty_cell() {
        let snapshot = serde_json::json!({
            "board": ["X", null, null, null, null, null, null, null, null],
            "next": "B",
            "your_mark": "O",
        });
        assert_eq!(first_legal_move(&snapshot), Some(serde_json::json!({"cell": 1})));
    }

    #[test]
    fn empty_board_picks_cell_zero() {
        let snapshot = serde_json::json!({
            "board": [null, null, null, null, null, null, null, null, null],
            "next": "A",
            "your_mark": "X",
        });
        assert_eq!(first_legal_move(&snapshot), Some(serde_json::json!({"cell": 0})));
    }

    #[test]
    fn full_board_yields_no_move() {
        let snapshot = serde_json::json!({
            "board": ["X", "O", "X", "O", "X", "O", "O", "X", "O"],
            "next": "A",
            "your_mark": "X",
        });
        assert_eq!(first_legal_move(&snapshot), None);
    }

    #[test]
    fn malformed_snapshot_yields_no_move() {
        assert_eq!(first_legal_move(&serde_json::json!({"nonsense": true})), None);
    }
}
