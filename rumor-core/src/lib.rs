//! Rumor Intel Core - Domain model and scoring for transfer-rumor intelligence
//!
//! This crate provides the foundational primitives:
//! - Rumors, players and their junction links
//! - Player-name normalization (case, diacritics, whitespace)
//! - Timeline densification for trailing daily windows
//! - Momentum scoring with exponential half-life decay
//! - The error taxonomy shared by every other crate

pub mod config;
pub mod error;
pub mod model;
pub mod momentum;
pub mod normalize;
pub mod timeline;

pub use config::*;
pub use error::*;
pub use model::*;
pub use momentum::*;
pub use normalize::*;
pub use timeline::*;

/// Default half-life for mention decay, in days
pub const DEFAULT_HALF_LIFE_DAYS: f64 = 3.0;

/// Default length of the velocity comparison windows, in days
pub const DEFAULT_VELOCITY_WINDOW_DAYS: u32 = 7;

/// Default trend score needed for the `hot` phase
pub const DEFAULT_HOT_THRESHOLD: f64 = 5.0;

/// Days without a mention before a player is `dormant`
pub const DEFAULT_DORMANT_AFTER_DAYS: i64 = 30;

/// Default trailing window rendered by the timeline densifier
pub const DEFAULT_TIMELINE_DAYS: i64 = 14;

/// Default ceiling on a requested timeline window
pub const DEFAULT_MAX_TIMELINE_DAYS: i64 = 366;

/// Hard ceiling on any densified window, ten years of days
pub const MAX_TIMELINE_DAYS: i64 = 3660;

/// Maximum credibility score
pub const MAX_PROBABILITY: u8 = 100;
