pub mod aggregate;
pub mod cache;
pub mod competition;
pub mod config;
pub mod error;
pub mod leaderboard;
pub mod ranking;
pub mod refresh;
pub mod reporter;
pub mod server;
pub mod sources;
pub mod types;

/// Sheet-to-JSON export service base URL (public, no auth required)
pub const SHEETTOJSON_BASE: &str = "https://sheettojson.replit.app";

/// Default sheet backing the `com` leaderboard.
pub const DEFAULT_SHEET_COM_ID: &str = "1KLiTUs90DQYfGBE8UCoW5qhqSeC21_MDzh1_cjkISVU";

/// Default sheet backing the `us` leaderboard.
pub const DEFAULT_SHEET_US_ID: &str = "1wi1i6mecmKHJ2J3G_k3p02KXYWIX_H3X9WVe-ADVbFo";
