//! Rumor Intel Fetch Layer
//!
//! Best-effort retrieval of full article text for reassessment:
//! - HTTP client with bounded timeout and rotating user agents
//! - Readable-text extraction from article HTML
//! - The `ContentFetcher` seam the reassessment orchestrator depends on

pub mod article;
pub mod client;

pub use article::*;
pub use client::*;
