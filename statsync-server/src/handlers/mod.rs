pub mod crawl;
pub mod leaderboard;
pub mod subjects;
