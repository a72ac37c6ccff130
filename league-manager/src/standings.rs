//! Standings engine (spec §4.4): a pure function over accepted results,
//! independent of persistence or HTTP, so it is directly unit-testable
//! against synthetic result streams (spec §8).

use std::collections::HashMap;

use league_protocol::messages::{Outcome, StandingsRow};

pub const POINTS_WIN: u32 = 3;
pub const POINTS_DRAW: u32 = 1;
pub const POINTS_LOSS: u32 = 0;

/// One player's accumulated outcome from a single match, as recorded by
/// an accepted result (spec §4.2 `report_result`).
#[derive(Debug, Clone)]
pub struct PlayerMatchOutcome {
    pub player_id: String,
    pub outcome: Outcome,
    pub points_for: u32,
    pub points_against: u32,
}

fn points_for_outcome(outcome: Outcome) -> u32 {
    match outcome {
        Outcome::Win => POINTS_WIN,
        Outcome::Draw => POINTS_DRAW,
        Outcome::Loss => POINTS_LOSS,
    }
}

#[derive(Default, Clone, Copy)]
struct Accumulator {
    points: u32,
    wins: u32,
    losses: u32,
    draws: u32,
    point_diff: i64,
}

/// Recomputes standings from the full set of per-player match outcomes
/// accepted so far. Sort keys, in order: `points DESC`, `wins DESC`,
/// `draws DESC`, `point_differential DESC`, `player_id ASC`. Ranks are
/// dense; because the last key is `player_id`, no true ties remain.
pub fn compute_standings(outcomes: &[PlayerMatchOutcome]) -> Vec<StandingsRow> {
    let mut acc: HashMap<String, Accumulator> = HashMap::new();

    for o in outcomes {
        let entry = acc.entry(o.player_id.clone()).or_default();
        entry.points += points_for_outcome(o.outcome);
        match o.outcome {
            Outcome::Win => entry.wins += 1,
            Outcome::Loss => entry.losses += 1,
            Outcome::Draw => entry.draws += 1,
        }
        entry.point_diff += o.points_for as i64 - o.points_against as i64;
    }

    let mut rows: Vec<(String, Accumulator)> = acc.into_iter().collect();
    rows.sort_by(|(id_a, a), (id_b, b)| {
        b.points
            .cmp(&a.points)
            .then(b.wins.cmp(&a.wins))
            .then(b.draws.cmp(&a.draws))
            .then(b.point_diff.cmp(&a.point_diff))
            .then(id_a.cmp(id_b))
    });

    rows.into_iter()
        .enumerate()
        .map(|(i, (player_id, a))| StandingsRow {
            rank: (i + 1) as u32,
            player_id,
            points: a.points,
            wins: a.wins,
            losses: a.losses,
            draws: a.draws,
            point_diff: a.point_diff,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(player: &str, result: Outcome, pf: u32, pa: u32) -> PlayerMatchOutcome {
        PlayerMatchOutcome {
            player_id: player.to_string(),
            outcome: result,
            points_for: pf,
            points_against: pa,
        }
    }

    #[test]
    fn two_player_lifecycle_scenario() {
        // spec §8 scenario 1
        let rows = compute_standings(&[
            outcome("A", Outcome::Win, 1, 0),
            outcome("B", Outcome::Loss, 0, 1),
        ]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].player_id, "A");
        assert_eq!(rows[0].points, 3);
        assert_eq!(rows[0].wins, 1);
        assert_eq!(rows[1].player_id, "B");
        assert_eq!(rows[1].points, 0);
        assert_eq!(rows[1].losses, 1);
    }

    #[test]
    fn all_draws_rank_alphabetically() {
        // spec §8 scenario 2: after every match is a draw, final ranking alphabetical
        let rows = compute_standings(&[
            outcome("D", Outcome::Draw, 0, 0),
            outcome("A", Outcome::Draw, 0, 0),
            outcome("D", Outcome::Draw, 0, 0),
            outcome("A", Outcome::Draw, 0, 0),
            outcome("B", Outcome::Draw, 0, 0),
            outcome("C", Outcome::Draw, 0, 0),
            outcome("B", Outcome::Draw, 0, 0),
            outcome("C", Outcome::Draw, 0, 0),
            outcome("A", Outcome::Draw, 0, 0),
            outcome("C", Outcome::Draw, 0, 0),
            outcome("B", Outcome::Draw, 0, 0),
            outcome("D", Outcome::Draw, 0, 0),
        ]);
        let ids: Vec<&str> = rows.iter().map(|r| r.player_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C", "D"]);
        for row in &rows {
            assert_eq!(row.points, 9);
            assert_eq!(row.draws, 3);
        }
    }

    #[test]
    fn points_sum_matches_win_draw_formula() {
        let outcomes = vec![
            outcome("A", Outcome::Win, 1, 0),
            outcome("B", Outcome::Loss, 0, 1),
            outcome("A", Outcome::Draw, 0, 0),
            outcome("C", Outcome::Draw, 0, 0),
        ];
        let rows = compute_standings(&outcomes);
        let total: u32 = rows.iter().map(|r| r.points).sum();
        let expected: u32 = outcomes.iter().map(|o| points_for_outcome(o.outcome)).sum();
        assert_eq!(total, expected);
    }

    #[test]
    fn ranks_are_dense_and_unique() {
        let rows = compute_standings(&[
            outcome("A", Outcome::Win, 1, 0),
            outcome("B", Outcome::Win, 1, 0),
            outcome("C", Outcome::Loss, 0, 1),
        ]);
        let ranks: Vec<u32> = rows.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn point_differential_breaks_ties_before_player_id() {
        let rows = compute_standings(&[
            outcome("Z", Outcome::Win, 5, 1),
            outcome("A", Outcome::Win, 3, 2),
        ]);
        assert_eq!(rows[0].player_id, "Z");
        assert_eq!(rows[1].player_id, "A");
    }
}
