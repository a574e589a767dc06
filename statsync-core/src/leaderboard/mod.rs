mod cache;
mod settings;

pub use cache::{LEADERBOARD_LOCK_NAMESPACE, LeaderboardCache};
pub use settings::LeaderboardSettings;
