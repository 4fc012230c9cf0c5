//! Feed ranking pipeline: score candidates, blend the personalized and discovery streams,
//! hydrate the result.

pub mod blender;
pub mod error;
pub mod merge;
pub mod scorer;

pub use blender::{Feed, FeedEngine, TOP_TAG_WINDOW};
pub use error::FeedError;
pub use merge::{CandidateBudget, merge_candidates};
pub use scorer::{AffinityScore, INTERACTION_BOOST, Scorer};
