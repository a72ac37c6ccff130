//! Reference `GameAdapter`: 3x3 Tic-Tac-Toe (spec §4.6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::{GameAdapter, GameError, Player, PointsMap, Terminal};

const WIN_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BoardState {
    /// Nine cells, `None` empty, `Some('X')`/`Some('O')` occupied.
    board: [Option<char>; 9],
    next: Player,
}

impl Serialize for Player {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Player::A => "A".serialize(serializer),
            Player::B => "B".serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Player {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "A" => Ok(Player::A),
            "B" => Ok(Player::B),
            other => Err(serde::de::Error::custom(format!("unknown player: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CellMove {
    cell: usize,
}

fn mark_for(player: Player) -> char {
    match player {
        Player::A => 'X',
        Player::B => 'O',
    }
}

fn parse_state(state: &Value) -> Result<BoardState, GameError> {
    serde_json::from_value(state.clone())
        .map_err(|e| GameError::Malformed(format!("bad tic_tac_toe state: {e}")))
}

fn parse_move(mv: &Value) -> Result<CellMove, GameError> {
    serde_json::from_value(mv.clone()).map_err(|e| GameError::Malformed(format!("bad tic_tac_toe move: {e}")))
}

/// The reference Tic-Tac-Toe adapter.
pub struct TicTacToeAdapter;

impl GameAdapter for TicTacToeAdapter {
    fn game_type(&self) -> &str {
        "tic_tac_toe"
    }

    fn first_mover(&self) -> Player {
        Player::A
    }

    fn initial_state(&self) -> Value {
        serde_json::to_value(BoardState {
            board: [None; 9],
            next: Player::A,
        })
        .expect("BoardState always serializes")
    }

    fn legal_moves(&self, state: &Value, player: Player) -> Vec<Value> {
        let board = match parse_state(state) {
            Ok(b) => b,
            Err(_) => return Vec::new(),
        };
        if board.next != player {
            return Vec::new();
        }
        board
            .board
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_none())
            .map(|(i, _)| serde_json::to_value(CellMove { cell: i }).unwrap())
            .collect()
    }

    fn apply(&self, state: &Value, player: Player, mv: &Value) -> Result<Value, GameError> {
        let mut board = parse_state(state)?;
        if board.next != player {
            return Err(GameError::NotYourTurn);
        }
        let cell_move = parse_move(mv)?;
        if cell_move.cell >= 9 {
            return Err(GameError::IllegalMove);
        }
        if board.board[cell_move.cell].is_some() {
            return Err(GameError::IllegalMove);
        }
        board.board[cell_move.cell] = Some(mark_for(player));
        board.next = player.other();
        Ok(serde_json::to_value(board).expect("BoardState always serializes"))
    }

    fn terminal(&self, state: &Value) -> Terminal {
        let board = match parse_state(state) {
            Ok(b) => b,
            Err(_) => return Terminal::Ongoing,
        };
        for line in WIN_LINES {
            let marks: Vec<_> = line.iter().map(|&i| board.board[i]).collect();
            if let (Some(a), Some(b), Some(c)) = (marks[0], marks[1], marks[2]) {
                if a == b && b == c {
                    let winner = if a == mark_for(Player::A) { Player::A } else { Player::B };
                    return Terminal::Win(winner);
                }
            }
        }
        if board.board.iter().all(|c| c.is_some()) {
            return Terminal::Draw;
        }
        Terminal::Ongoing
    }

    fn scoring(&self, outcome: Terminal) -> PointsMap {
        match outcome {
            Terminal::Win(Player::A) => PointsMap { a: 3, b: 0 },
            Terminal::Win(Player::B) => PointsMap { a: 0, b: 3 },
            Terminal::Draw => PointsMap { a: 1, b: 1 },
            Terminal::Ongoing => PointsMap { a: 0, b: 0 },
        }
    }

    fn snapshot(&self, state: &Value, viewer: Player) -> Value {
        let board = parse_state(state).unwrap_or(BoardState {
            board: [None; 9],
            next: viewer,
        });
        serde_json::json!({
            "board": board.board,
            "next": board.next,
            "your_mark": mark_for(viewer).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_mover_is_player_a_with_mark_x() {
        let adapter = TicTacToeAdapter;
        assert_eq!(adapter.first_mover(), Player::A);
        assert_eq!(mark_for(adapter.first_mover()), 'X');
    }

    #[test]
    fn legal_moves_start_as_all_nine_cells_for_player_a() {
        let adapter = TicTacToeAdapter;
        let state = adapter.initial_state();
        assert_eq!(adapter.legal_moves(&state, Player::A).len(), 9);
        assert_eq!(adapter.legal_moves(&state, Player::B).len(), 0);
    }

    #[test]
    fn apply_rejects_out_of_turn_move() {
        let adapter = TicTacToeAdapter;
        let state = adapter.initial_state();
        let mv = serde_json::to_value(CellMove { cell: 0 }).unwrap();
        let err = adapter.apply(&state, Player::B, &mv).unwrap_err();
        assert!(matches!(err, GameError::NotYourTurn));
    }

    #[test]
    fn apply_rejects_occupied_cell() {
        let adapter = TicTacToeAdapter;
        let state = adapter.initial_state();
        let mv = serde_json::to_value(CellMove { cell: 4 }).unwrap();
        let state = adapter.apply(&state, Player::A, &mv).unwrap();
        let err = adapter.apply(&state, Player::B, &mv).unwrap_err();
        assert!(matches!(err, GameError::IllegalMove));
    }

    #[test]
    fn row_win_is_detected() {
        let adapter = TicTacToeAdapter;
        let mut state = adapter.initial_state();
        // X: 0,1,2 / O: 3,4
        for (player, cell) in [
            (Player::A, 0),
            (Player::B, 3),
            (Player::A, 1),
            (Player::B, 4),
            (Player::A, 2),
        ] {
            let mv = serde_json::to_value(CellMove { cell }).unwrap();
            state = adapter.apply(&state, player, &mv).unwrap();
        }
        assert_eq!(adapter.terminal(&state), Terminal::Win(Player::A));
        assert_eq!(adapter.scoring(Terminal::Win(Player::A)), PointsMap { a: 3, b: 0 });
    }

    #[test]
    fn full_board_with_no_winner_is_a_draw() {
        let adapter = TicTacToeAdapter;
        let mut state = adapter.initial_state();
        // A classic forced draw sequence.
        let moves = [
            (Player::A, 0),
            (Player::B, 1),
            (Player::A, 2),
            (Player::B, 4),
            (Player::A, 3),
            (Player::B, 5),
            (Player::A, 7),
            (Player::B, 6),
            (Player::A, 8),
        ];
        for (player, cell) in moves {
            let mv = serde_json::to_value(CellMove { cell }).unwrap();
            state = adapter.apply(&state, player, &mv).unwrap();
        }
        assert_eq!(adapter.terminal(&state), Terminal::Draw);
        assert_eq!(adapter.scoring(Terminal::Draw), PointsMap { a: 1, b: 1 });
    }

    #[test]
    fn snapshot_is_opaque_and_carries_viewer_mark() {
        let adapter = TicTacToeAdapter;
        let state = adapter.initial_state();
        let snap = adapter.snapshot(&state, Player::B);
        assert_eq!(snap["your_mark"], "O");
    }
}
