pub mod message;
pub mod refresh;

pub use message::{FeedUpdate, UpdateKind};
pub use refresh::{RefreshScheduler, RefreshSettings};
