use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::{AggregatedPlayer, RankedPlayer};

/// Placement prizes in USD, indexed by `rank - 1`.
pub const PRIZE_TABLE: [Decimal; 10] = [
    dec!(1500),
    dec!(750),
    dec!(300),
    dec!(150),
    dec!(50),
    dec!(50),
    dec!(50),
    dec!(50),
    dec!(50),
    dec!(50),
];

const MASK_CHAR: char = '*';
const MASK_KEEP: usize = 3;
const MASK_MIN: usize = 3;

/// Prize for a 1-based rank; zero past the end of the table.
pub fn prize_for_rank(rank: u32) -> Decimal {
    (rank as usize)
        .checked_sub(1)
        .and_then(|i| PRIZE_TABLE.get(i))
        .copied()
        .unwrap_or(Decimal::ZERO)
}

/// Sum of every placement prize.
pub fn prize_table_total() -> Decimal {
    PRIZE_TABLE.iter().sum()
}

/// Keep the first three characters and mask the rest.
///
/// At least three mask characters are always appended, so `"Jo"` becomes
/// `"Jo***"` and `"Alice123"` becomes `"Ali*****"`.
pub fn mask_username(username: &str) -> String {
    let len = username.chars().count();
    let kept: String = username.chars().take(MASK_KEEP).collect();
    let masked = len.saturating_sub(MASK_KEEP).max(MASK_MIN);
    let mut out = kept;
    out.extend(std::iter::repeat_n(MASK_CHAR, masked));
    out
}

/// Players ordered by descending total wager.
///
/// The sort is stable, so equal totals keep their aggregate (first-seen) order.
pub fn sort_by_wager(players: &[AggregatedPlayer]) -> Vec<&AggregatedPlayer> {
    let mut sorted: Vec<&AggregatedPlayer> = players.iter().collect();
    sorted.sort_by(|a, b| b.total_wager.cmp(&a.total_wager));
    sorted
}

/// Rank, prize, truncate to `limit` and mask. Never mutates `players`.
pub fn rank_players(players: &[AggregatedPlayer], limit: usize) -> Vec<RankedPlayer> {
    sort_by_wager(players)
        .into_iter()
        .take(limit)
        .zip(1u32..)
        .map(|(player, rank)| RankedPlayer {
            username: mask_username(&player.username),
            total_wager: player.total_wager,
            rank,
            prize: prize_for_rank(rank),
        })
        .collect()
}

/// Re-apply the prize table to already-ranked rows.
pub fn reprize(players: &[RankedPlayer]) -> Vec<RankedPlayer> {
    players
        .iter()
        .map(|p| RankedPlayer {
            prize: prize_for_rank(p.rank),
            ..p.clone()
        })
        .collect()
}

/// Static demo rows shown when no real data is available.
pub fn placeholder_players() -> Vec<RankedPlayer> {
    const DEMO: [(&str, Decimal); 10] = [
        ("User***", dec!(250000)),
        ("Player***", dec!(198500)),
        ("Anon***", dec!(157200)),
        ("High***", dec!(126800)),
        ("Wager***", dec!(105400)),
        ("Spin***", dec!(94300)),
        ("Bet***", dec!(83200)),
        ("Roll***", dec!(72100)),
        ("Jackpot***", dec!(61000)),
        ("Winner***", dec!(50000)),
    ];
    DEMO.iter()
        .zip(1u32..)
        .map(|((name, wager), rank)| RankedPlayer {
            username: name.to_string(),
            total_wager: *wager,
            rank,
            prize: prize_for_rank(rank),
        })
        .collect()
}
