//! Rumor Intel Agents
//!
//! LLM-backed analysis for transfer rumors:
//! - **Backends**: OpenAI-compatible APIs and Anthropic Claude
//! - **Credibility analyzer**: scores a rumor 0-100, explains why, and
//!   extracts the players involved with their roles

pub mod backend;
pub mod credibility;
pub mod traits;

pub use backend::*;
pub use credibility::*;
pub use traits::*;
