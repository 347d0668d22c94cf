//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlPhase`: The lifecycle phase of a crawl run (init, discovering, seeding, draining, done)

mod phase;

// Re-export main types
pub use phase::CrawlPhase;
