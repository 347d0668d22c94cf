//! Crawl lifecycle phases
//!
//! A crawl moves strictly forward through these phases; no phase is revisited.

use crate::HarvestError;
use std::fmt;

/// Represents the current phase of one crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CrawlPhase {
    /// Root URL validated, site policy and fetch strategy being set up
    Init,

    /// Looking for a sitemap and resolving it into candidate URLs
    Discovering,

    /// Building the initial queue from the root and sitemap candidates
    Seeding,

    /// Workers are fetching pages and feeding extracted links back
    Draining,

    /// Workers finished; the last-resort root fetch may still run
    Done,
}

impl CrawlPhase {
    /// Returns true if `next` directly follows this phase
    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::Discovering)
                | (Self::Discovering, Self::Seeding)
                | (Self::Seeding, Self::Draining)
                | (Self::Draining, Self::Done)
        )
    }

    /// Moves to `next`, rejecting anything but the immediate successor
    pub fn transition(self, next: CrawlPhase) -> Result<CrawlPhase, HarvestError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(HarvestError::InvalidTransition { from: self, to: next })
        }
    }

    /// Returns true once the crawl has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Discovering => "discovering",
            Self::Seeding => "seeding",
            Self::Draining => "draining",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
