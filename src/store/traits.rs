//! Store capability traits
//!
//! The engine only talks to storage through these traits, so the Postgres/Redis driver and
//! the in-memory driver are interchangeable.

mod interaction;
mod interest;
mod post;
mod score_cache;

pub use interaction::InteractionStore;
pub use interest::InterestStore;
pub use post::PostRepository;
pub use score_cache::ScoreCache;
