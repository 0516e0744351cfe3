//! Rumor Intel Runtime
//!
//! Ties the store, the article fetcher and the credibility analyzer together:
//! - **Reassessor**: fetch, analyze, persist, link; tolerant of partial failure
//! - **TrendingService**: momentum-ranked players and dense timelines
//! - **RumorEngine**: public feed and moderator command surface

pub mod config;
pub mod engine;
pub mod reassess;
pub mod trending;

pub use config::*;
pub use engine::*;
pub use reassess::*;
pub use trending::*;
