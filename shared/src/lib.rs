mod contribution;
mod error;
mod leaderboard;
mod normalize;
mod repo;
mod scoring;
mod source;
mod upsert;

#[cfg(feature = "client")]
pub mod github;

pub use contribution::*;
pub use error::*;
pub use leaderboard::*;
pub use normalize::*;
pub use repo::*;
pub use scoring::*;
pub use source::*;
pub use upsert::*;

pub type GithubHandle = String;
