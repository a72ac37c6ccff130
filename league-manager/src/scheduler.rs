//! Round-robin schedule generation (spec §4.3). A pure function with no
//! I/O: given the same sorted player tuple it always produces the same
//! schedule, which is what makes the determinism property in spec §8
//! directly unit-testable without a database or HTTP layer.

use league_storage::{MatchPlan, RoundPlan};

const BYE: &str = "\0bye";

/// Generates a round-robin schedule for `player_ids` using the circle
/// method: fix index 0, rotate the remaining N-1 indices, pair position
/// `i` with position `N-1-i`. Odd N gets a synthetic bye slot.
///
/// `player_ids` need not be pre-sorted; this function sorts a local
/// copy, so `generate_schedule(players, ..) == generate_schedule(shuffle(players), ..)`.
pub fn generate_schedule(player_ids: &[String], game_type: &str) -> Vec<RoundPlan> {
    let mut players: Vec<String> = player_ids.to_vec();
    players.sort();

    if players.len() < 2 {
        return Vec::new();
    }

    let mut seats = players.clone();
    if seats.len() % 2 != 0 {
        seats.push(BYE.to_string());
    }
    let n = seats.len();
    let rounds_count = n - 1;

    let mut rounds = Vec::with_capacity(rounds_count);
    let mut match_seq: u64 = 0;

    for round_index in 0..rounds_count {
        let mut matches = Vec::new();
        for i in 0..n / 2 {
            let left = &seats[i];
            let right = &seats[n - 1 - i];
            if left == BYE || right == BYE {
                continue;
            }
            // Fixed home/away rule: lower player_id is always player A,
            // independent of circle-method seat position.
            let (player_a, player_b) = if left <= right {
                (left.clone(), right.clone())
            } else {
                (right.clone(), left.clone())
            };
            match_seq += 1;
            matches.push(MatchPlan {
                match_id: format!("m{match_seq}"),
                round_id: (round_index + 1) as i64,
                player_a,
                player_b,
                game_type: game_type.to_string(),
            });
        }
        // Deterministic intra-round ordering: by player_a then player_b,
        // independent of circle-method seat iteration order.
        matches.sort_by(|a, b| (&a.player_a, &a.player_b).cmp(&(&b.player_a, &b.player_b)));
        rounds.push(RoundPlan {
            round_id: (round_index + 1) as i64,
            matches,
        });

        // Rotate: keep seats[0] fixed, rotate the rest one position.
        let fixed = seats[0].clone();
        let mut rest = seats[1..].to_vec();
        rest.rotate_right(1);
        seats = std::iter::once(fixed).chain(rest).collect();
    }

    rounds
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("p{i}")).collect()
    }

    fn total_matches(rounds: &[RoundPlan]) -> usize {
        rounds.iter().map(|r| r.matches.len()).sum()
    }

    #[test]
    fn produces_n_choose_2_matches_for_even_n() {
        for n in [2usize, 4, 6, 8] {
            let rounds = generate_schedule(&ids(n), "tic_tac_toe");
            assert_eq!(total_matches(&rounds), n * (n - 1) / 2);
        }
    }

    #[test]
    fn produces_n_choose_2_matches_for_odd_n() {
        for n in [3usize, 5, 7] {
            let rounds = generate_schedule(&ids(n), "tic_tac_toe");
            assert_eq!(total_matches(&rounds), n * (n - 1) / 2);
        }
    }

    #[test]
    fn every_unordered_pair_appears_exactly_once() {
        let players = ids(5);
        let rounds = generate_schedule(&players, "tic_tac_toe");
        let mut seen = std::collections::HashSet::new();
        for round in &rounds {
            for m in &round.matches {
                let pair = (m.player_a.clone(), m.player_b.clone());
                assert!(seen.insert(pair), "pair appeared twice");
            }
        }
        assert_eq!(seen.len(), 5 * 4 / 2);
    }

    #[test]
    fn no_player_appears_twice_in_a_round() {
        let rounds = generate_schedule(&ids(6), "tic_tac_toe");
        for round in &rounds {
            let mut seen = std::collections::HashSet::new();
            for m in &round.matches {
                assert!(seen.insert(m.player_a.clone()));
                assert!(seen.insert(m.player_b.clone()));
            }
        }
    }

    #[test]
    fn schedule_is_independent_of_input_order() {
        let sorted = ids(4);
        let mut shuffled = sorted.clone();
        shuffled.reverse();

        let a = generate_schedule(&sorted, "tic_tac_toe");
        let b = generate_schedule(&shuffled, "tic_tac_toe");

        let flat_a: Vec<_> = a.iter().flat_map(|r| r.matches.iter().map(|m| (m.round_id, m.player_a.clone(), m.player_b.clone()))).collect();
        let flat_b: Vec<_> = b.iter().flat_map(|r| r.matches.iter().map(|m| (m.round_id, m.player_a.clone(), m.player_b.clone()))).collect();
        assert_eq!(flat_a, flat_b);
    }

    #[test]
    fn lower_player_id_is_always_player_a() {
        let rounds = generate_schedule(&ids(4), "tic_tac_toe");
        for round in &rounds {
            for m in &round.matches {
                assert!(m.player_a < m.player_b);
            }
        }
    }

    #[test]
    fn two_player_schedule_is_one_round_one_match() {
        let rounds = generate_schedule(&["b".to_string(), "a".to_string()], "tic_tac_toe");
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].matches.len(), 1);
        assert_eq!(rounds[0].matches[0].player_a, "a");
        assert_eq!(rounds[0].matches[0].player_b, "b");
    }

    #[test]
    fn four_player_round_one_matches_scenario() {
        // spec §8 scenario 2: round 1 = [(A,D), (B,C)]
        let rounds = generate_schedule(
            &["A".to_string(), "B".to_string(), "C".to_string(), "D".to_string()],
            "tic_tac_toe",
        );
        assert_eq!(rounds.len(), 3);
        let round1_pairs: Vec<(String, String)> =
            rounds[0].matches.iter().map(|m| (m.player_a.clone(), m.player_b.clone())).collect();
        assert!(round1_pairs.contains(&("A".to_string(), "D".to_string())));
        assert!(round1_pairs.contains(&("B".to_string(), "C".to_string())));
    }
}
