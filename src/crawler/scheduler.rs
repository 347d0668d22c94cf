//! Crawl frontier
//!
//! This module handles:
//! - The priority queue of targets waiting to be fetched
//! - The visited set of every canonical URL admitted during the crawl
//! - In-flight accounting used by workers to detect the end of a crawl
//! - Defensive bounding of the queue
//!
//! Root and sitemap targets always pop before link-extracted ones; within a
//! source, discovery order is kept.

use crate::url::CanonicalUrl;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Where a target was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoverySource {
    Root,
    Sitemap,
    HtmlLink,
}

impl DiscoverySource {
    /// Queue rank (lower pops first)
    fn rank(&self) -> u8 {
        match self {
            DiscoverySource::Root | DiscoverySource::Sitemap => 0,
            DiscoverySource::HtmlLink => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoverySource::Root => "root",
            DiscoverySource::Sitemap => "sitemap",
            DiscoverySource::HtmlLink => "html-link",
        }
    }
}

impl std::fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical URL plus how it was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    pub url: CanonicalUrl,
    pub source: DiscoverySource,
}

impl CrawlTarget {
    pub fn new(url: CanonicalUrl, source: DiscoverySource) -> Self {
        Self { url, source }
    }
}

/// Outcome of offering a target to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Newly visited and queued
    Admitted,
    /// Already in the visited set
    Duplicate,
    /// Queue bound reached; the target was discarded without being marked visited
    Discarded,
}

/// A queued target with its ordering key
#[derive(Debug, Clone)]
struct QueuedTarget {
    target: CrawlTarget,
    sequence: u64,
}

// BinaryHeap is a max-heap, so compare in reverse: lower rank first, then
// earlier discovery first
impl Ord for QueuedTarget {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .target
            .source
            .rank()
            .cmp(&self.target.source.rank())
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueuedTarget {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedTarget {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for QueuedTarget {}

/// Frontier of the crawl
///
/// Admission is a single check-and-insert on the visited set, so the owner
/// only needs to hold one lock around [`Frontier::admit`] for the
/// "never fetched twice" guarantee.
#[derive(Debug)]
pub struct Frontier {
    queue: BinaryHeap<QueuedTarget>,
    visited: HashSet<CanonicalUrl>,
    in_flight: usize,
    next_sequence: u64,
    max_queued: usize,
    discarded: usize,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `max_queued` - Upper bound on queued plus in-flight targets
    pub fn new(max_queued: usize) -> Self {
        Self {
            queue: BinaryHeap::new(),
            visited: HashSet::new(),
            in_flight: 0,
            next_sequence: 0,
            max_queued: max_queued.max(1),
            discarded: 0,
        }
    }

    /// Offers a target for scheduling
    ///
    /// A target already in the visited set is a duplicate. When the queue is
    /// at its bound the target is discarded and stays unvisited, so a later
    /// sighting can still be admitted.
    pub fn admit(&mut self, target: CrawlTarget) -> Admission {
        if self.visited.contains(&target.url) {
            return Admission::Duplicate;
        }

        if self.queue.len() + self.in_flight >= self.max_queued {
            self.discarded += 1;
            return Admission::Discarded;
        }

        self.visited.insert(target.url.clone());
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(QueuedTarget { target, sequence });
        Admission::Admitted
    }

    /// Marks a URL visited without queueing it
    ///
    /// Used for post-redirect destinations. Returns false if it was already
    /// visited.
    pub fn mark_visited(&mut self, url: CanonicalUrl) -> bool {
        self.visited.insert(url)
    }

    pub fn is_visited(&self, url: &CanonicalUrl) -> bool {
        self.visited.contains(url)
    }

    /// Pops the next target and counts it as in flight
    pub fn next_target(&mut self) -> Option<CrawlTarget> {
        let queued = self.queue.pop()?;
        self.in_flight += 1;
        Some(queued.target)
    }

    /// Records that an in-flight target finished (successfully or not)
    pub fn complete(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Drops every queued target (used on cancellation and when the page cap is hit)
    pub fn clear_queue(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    /// True when nothing is queued and nothing is in flight
    pub fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.in_flight == 0
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Targets discarded at the queue bound
    pub fn discarded(&self) -> usize {
        self.discarded
    }
}
