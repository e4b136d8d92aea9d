use crate::types::{LeaderboardResponse, RefreshReport};

/// Emit a refresh cycle report as a single JSON line to stdout.
pub fn report_cycle(report: &RefreshReport) {
    if let Ok(json) = serde_json::to_string(report) {
        println!("{json}");
    }
}

/// Emit a leaderboard response as pretty-printed JSON to stdout.
pub fn report_leaderboard(response: &LeaderboardResponse) {
    if let Ok(json) = serde_json::to_string_pretty(response) {
        println!("{json}");
    }
}
