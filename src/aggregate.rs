use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::types::{AggregatedPlayer, RawWagerRecord};

/// Merge raw records from any number of sources into per-username totals.
///
/// Usernames are trimmed and compared exactly (case-sensitive). Output keeps
/// first-seen order across `sources`, which the ranking step relies on as its
/// tie-break. Records whose trimmed username is empty are skipped. Totals
/// saturate at `Decimal::MAX`/`Decimal::MIN` instead of overflowing.
pub fn aggregate(sources: &[Vec<RawWagerRecord>]) -> Vec<AggregatedPlayer> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut players: Vec<AggregatedPlayer> = Vec::new();

    for record in sources.iter().flatten() {
        let username = record.username.trim();
        if username.is_empty() {
            continue;
        }
        match index.get(username) {
            Some(&i) => {
                let total = &mut players[i].total_wager;
                *total = total.saturating_add(record.wager_amount);
            }
            None => {
                index.insert(username.to_string(), players.len());
                players.push(AggregatedPlayer {
                    username: username.to_string(),
                    total_wager: record.wager_amount,
                });
            }
        }
    }

    players
}

/// Sum of every player's total, used for logging cycle volume.
pub fn total_volume(players: &[AggregatedPlayer]) -> Decimal {
    players
        .iter()
        .fold(Decimal::ZERO, |acc, p| acc.saturating_add(p.total_wager))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rec(name: &str, amount: Decimal) -> RawWagerRecord {
        RawWagerRecord::new(name, amount)
    }

    fn totals(players: &[AggregatedPlayer]) -> HashMap<String, Decimal> {
        players
            .iter()
            .map(|p| (p.username.clone(), p.total_wager))
            .collect()
    }

    #[test]
    fn empty_input() {
        assert!(aggregate(&[]).is_empty());
        assert!(aggregate(&[Vec::new(), Vec::new()]).is_empty());
    }

    #[test]
    fn single_source_sums_duplicates() {
        let players = aggregate(&[vec![
            rec("alice", dec!(10)),
            rec("bob", dec!(5)),
            rec("alice", dec!(2.5)),
        ]]);
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].username, "alice");
        assert_eq!(players[0].total_wager, dec!(12.5));
        assert_eq!(players[1].total_wager, dec!(5));
    }

    #[test]
    fn two_sources_combined() {
        let com = vec![rec("A", dec!(100)), rec("B", dec!(50))];
        let us = vec![rec("A", dec!(30)), rec("C", dec!(20))];
        let players = aggregate(&[com, us]);
        let t = totals(&players);
        assert_eq!(t.len(), 3);
        assert_eq!(t["A"], dec!(130));
        assert_eq!(t["B"], dec!(50));
        assert_eq!(t["C"], dec!(20));
    }

    #[test]
    fn order_independent_totals() {
        let l1 = vec![
            rec("x", dec!(1.25)),
            rec("y", dec!(7)),
            rec("x", dec!(3)),
            rec("z", dec!(0)),
        ];
        let l2 = vec![rec("y", dec!(2.75)), rec("w", dec!(9)), rec("x", dec!(0.5))];

        let forward = aggregate(&[l1.clone(), l2.clone()]);
        let backward = aggregate(&[l2.clone(), l1.clone()]);
        assert_eq!(totals(&forward), totals(&backward));

        // Matches a direct per-username sum over both lists
        let mut expected: HashMap<String, Decimal> = HashMap::new();
        for r in l1.iter().chain(l2.iter()) {
            *expected.entry(r.username.clone()).or_default() += r.wager_amount;
        }
        assert_eq!(totals(&forward), expected);
    }

    #[test]
    fn trims_but_keeps_case() {
        let players = aggregate(&[
            vec![rec("  Alice ", dec!(1))],
            vec![rec("Alice", dec!(2)), rec("alice", dec!(4))],
        ]);
        let t = totals(&players);
        assert_eq!(t["Alice"], dec!(3));
        assert_eq!(t["alice"], dec!(4));
    }

    #[test]
    fn skips_blank_usernames() {
        let players = aggregate(&[vec![rec("   ", dec!(100)), rec("bob", dec!(1))]]);
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].username, "bob");
    }

    #[test]
    fn first_seen_order() {
        let players = aggregate(&[
            vec![rec("b", dec!(1)), rec("a", dec!(1))],
            vec![rec("c", dec!(1)), rec("a", dec!(1))],
        ]);
        let names: Vec<&str> = players.iter().map(|p| p.username.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn huge_wagers_saturate() {
        let players = aggregate(&[
            vec![rec("whale", Decimal::MAX)],
            vec![rec("whale", Decimal::MAX), rec("minnow", dec!(1))],
        ]);
        assert_eq!(players[0].total_wager, Decimal::MAX);
        assert_eq!(players[1].total_wager, dec!(1));
        assert_eq!(total_volume(&players), Decimal::MAX);
    }

    #[test]
    fn volume_sums_totals() {
        let players = aggregate(&[vec![rec("a", dec!(1.5)), rec("b", dec!(2))]]);
        assert_eq!(total_volume(&players), dec!(3.5));
    }
}
