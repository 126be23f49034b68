mod handler;
mod model;

pub use handler::{get_me, leaderboard, update_me};
pub use model::LEADERBOARD_SIZE;
