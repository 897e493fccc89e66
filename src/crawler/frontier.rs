//! The URL work queue
//!
//! Entries are served lowest priority value first; within a priority class
//! they come out in insertion order. Every URL that has ever been queued in
//! this run stays in the seen-set, so a page is fetched at most once even if
//! it is linked from hundreds of other pages.

use crate::config::LinkConfig;
use crate::crawler::parser::DiscoveredLink;
use crate::state::RunState;
use crate::url::{extract_origin, normalize_url, LinkRules, LinkVerdict};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use url::Url;

/// Priority class for configured entry points
pub const SEED_PRIORITY: u32 = 0;

/// Priority class for links whose text or path names a domain keyword
pub const KEYWORD_PRIORITY: u32 = 1;

/// Priority class for every other discovered link
pub const DEFAULT_PRIORITY: u32 = 2;

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontierEntry {
    /// Normalized URL
    pub url: String,

    /// Page the link was discovered on; `None` for seeds
    pub source_url: Option<String>,

    /// Anchor text of the discovering link
    #[serde(default)]
    pub discovery_text: String,

    /// Lower values are served first
    pub priority: u32,
}

impl FrontierEntry {
    /// Creates a seed entry for a configured entry point
    pub fn seed(url: &str) -> Self {
        Self {
            url: url.to_string(),
            source_url: None,
            discovery_text: String::new(),
            priority: SEED_PRIORITY,
        }
    }
}

/// Heap slot; `seq` preserves insertion order within a priority class
#[derive(Debug)]
struct Queued {
    entry: FrontierEntry,
    /// Host of `entry.url`, resolved once at enqueue time
    origin: String,
    seq: u64,
}

// BinaryHeap is a max-heap, so both keys compare reversed
impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .entry
            .priority
            .cmp(&self.entry.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.entry.priority == other.entry.priority && self.seq == other.seq
    }
}

impl Eq for Queued {}

/// Tally of one `discover` call, for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub admitted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

/// Deduplicating priority queue of URLs
#[derive(Debug)]
pub struct Frontier {
    heap: BinaryHeap<Queued>,
    seen: HashSet<String>,
    next_seq: u64,
    rules: LinkRules,
    priority_keywords: Vec<String>,
}

impl Frontier {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            heap: BinaryHeap::new(),
            seen: HashSet::new(),
            next_seq: 0,
            rules: LinkRules::new(config),
            priority_keywords: config
                .priority_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    /// Queues an entry
    ///
    /// The URL is normalized first. Returns false (and changes nothing) if the
    /// URL cannot be normalized, was already queued in this run, or is
    /// recorded as processed in `state`.
    pub fn push(&mut self, mut entry: FrontierEntry, state: &RunState) -> bool {
        let url = match normalize_url(&entry.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Not queueing {}: {}", entry.url, e);
                return false;
            }
        };
        entry.url = url.to_string();

        if self.seen.contains(&entry.url) || state.is_processed(&entry.url) {
            return false;
        }

        self.seen.insert(entry.url.clone());
        let origin = extract_origin(&url).unwrap_or_default();
        self.enqueue(entry, origin);
        true
    }

    /// Puts back an entry that was popped but never reached a terminal state
    ///
    /// The entry keeps its priority but joins the back of its class.
    pub fn requeue(&mut self, entry: FrontierEntry, origin: String) {
        self.seen.insert(entry.url.clone());
        self.enqueue(entry, origin);
    }

    fn enqueue(&mut self, entry: FrontierEntry, origin: String) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Queued { entry, origin, seq });
    }

    /// Removes and returns the first entry, in priority order, whose origin is
    /// accepted by `admissible`, together with that origin
    ///
    /// `admissible` is asked once per origin. Entries passed over keep their
    /// place in the queue.
    pub fn pop_where<F>(&mut self, mut admissible: F) -> Option<(FrontierEntry, String)>
    where
        F: FnMut(&str) -> bool,
    {
        let mut verdicts: HashMap<String, bool> = HashMap::new();
        let mut passed_over = Vec::new();
        let mut found = None;

        while let Some(queued) = self.heap.pop() {
            let admitted = match verdicts.get(&queued.origin) {
                Some(admitted) => *admitted,
                None => {
                    let admitted = admissible(&queued.origin);
                    verdicts.insert(queued.origin.clone(), admitted);
                    admitted
                }
            };
            if admitted {
                found = Some((queued.entry, queued.origin));
                break;
            }
            passed_over.push(queued);
        }

        // Original sequence numbers go back in, so order is unchanged
        self.heap.extend(passed_over);
        found
    }

    /// Resolves and filters links found on `source`, queueing the survivors
    pub fn discover(
        &mut self,
        links: &[DiscoveredLink],
        source: &Url,
        state: &RunState,
    ) -> DiscoveryStats {
        let mut stats = DiscoveryStats::default();

        for link in links {
            let url = match self.rules.check(&link.url, Some(source)) {
                LinkVerdict::Admit(url) => url,
                verdict => {
                    tracing::trace!("Rejected link {} ({:?})", link.url, verdict);
                    stats.rejected += 1;
                    continue;
                }
            };

            let entry = FrontierEntry {
                priority: self.priority_for(&url, &link.text),
                url: url.to_string(),
                source_url: Some(source.to_string()),
                discovery_text: link.text.trim().to_string(),
            };

            if self.push(entry, state) {
                stats.admitted += 1;
            } else {
                stats.duplicates += 1;
            }
        }

        stats
    }

    /// Priority class for a discovered link
    pub fn priority_for(&self, url: &Url, text: &str) -> u32 {
        let text = text.to_lowercase();
        let path = url.path().to_lowercase();

        let matched = self
            .priority_keywords
            .iter()
            .any(|keyword| text.contains(keyword.as_str()) || path.contains(keyword.as_str()));

        if matched {
            KEYWORD_PRIORITY
        } else {
            DEFAULT_PRIORITY
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Queued entries in the order they would be served
    pub fn snapshot(&self) -> Vec<FrontierEntry> {
        let mut queued: Vec<&Queued> = self.heap.iter().collect();
        // Reverse of the heap order: highest-ranked first
        queued.sort_by(|a, b| b.cmp(a));
        queued.into_iter().map(|q| q.entry.clone()).collect()
    }
}
