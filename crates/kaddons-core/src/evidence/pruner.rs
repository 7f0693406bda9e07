//! Deterministic evidence pruning
//!
//! Reduces a fetched document to at most `max_lines` lines and `max_chars`
//! bytes. The first lines are always kept for context, then lines are
//! chosen around the highest-scoring anchors, then the earliest unused
//! lines fill whatever budget is left. Output keeps document order.

use super::{truncate_on_char_boundary, PruneBudget, PrunedEvidence};
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use once_cell::sync::Lazy;
use regex::Regex;

/// Lines always kept from the top of the document
pub const HEADER_LINES: usize = 12;

/// Neighbor offsets visited around an anchor, nearest first and following
/// lines before preceding ones (tables usually follow their caption).
const CONTEXT_OFFSETS: [isize; 4] = [1, -1, 2, -2];

const SCORE_PLATFORM_VERSION: i32 = 5;
const SCORE_SUPPORT_KEYWORD: i32 = 3;
const SCORE_VERSION_ONLY: i32 = 2;
const SCORE_RELEVANCE: i32 = 1;
const PENALTY_NEGATION: i32 = -4;

static PLATFORM_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:kubernetes|k8s|eks|gke|aks|openshift)\b").expect("valid platform regex")
});

static VERSION_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bv?\d+\.\d+").expect("valid version regex"));

const SUPPORT_KEYWORDS: &[&str] = &[
    "compatib",
    "support",
    "matrix",
    "tested",
    "requires",
    "minimum",
];

const RELEVANCE_KEYWORDS: &[&str] = &[
    "version",
    "release",
    "upgrade",
    "install",
    "prerequisite",
    "requirement",
    "deprecat",
    "changelog",
    "helm",
    "chart",
];

const NEGATION_PHRASES: &[&str] = &[
    "no compatibility matrix",
    "no compatibility information",
    "no compatibility data",
    "no official compatibility",
    "does not publish",
    "not documented",
    "compatibility is not",
    "compatibility information is not available",
];

static SUPPORT_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| keyword_matcher(SUPPORT_KEYWORDS));
static RELEVANCE_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| keyword_matcher(RELEVANCE_KEYWORDS));
static NEGATION_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| keyword_matcher(NEGATION_PHRASES));

fn keyword_matcher(patterns: &[&str]) -> AhoCorasick {
    AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostFirst)
        .build(patterns)
        .expect("valid keyword set")
}

/// Pure, stateless evidence pruner.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvidencePruner;

impl EvidencePruner {
    pub fn new() -> Self {
        Self
    }

    pub fn prune(&self, text: &str, budget: PruneBudget) -> PrunedEvidence {
        let lines = normalize_lines(text);
        if lines.is_empty() || budget.max_lines == 0 || budget.max_chars == 0 {
            return PrunedEvidence::empty();
        }

        let mut selection = Selection::new(lines.len(), budget.max_lines);

        for idx in 0..HEADER_LINES.min(lines.len()) {
            selection.add(idx);
        }

        let mut anchors: Vec<(i32, usize)> = lines
            .iter()
            .enumerate()
            .map(|(idx, line)| (score_line(line), idx))
            .filter(|(score, _)| *score > 0)
            .collect();
        anchors.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        // Header anchors are already kept; their neighbors only get slots
        // left over by anchors further down.
        let (in_header, below_header): (Vec<_>, Vec<_>) =
            anchors.into_iter().partition(|(_, idx)| *idx < HEADER_LINES);

        for (_, anchor) in below_header.into_iter().chain(in_header) {
            if selection.is_full() {
                break;
            }
            selection.add(anchor);
            for offset in CONTEXT_OFFSETS {
                if let Some(neighbor) = anchor.checked_add_signed(offset) {
                    selection.add(neighbor);
                }
            }
        }

        for idx in 0..lines.len() {
            if selection.is_full() {
                break;
            }
            selection.add(idx);
        }

        let joined = selection
            .indices()
            .map(|idx| lines[idx].as_str())
            .collect::<Vec<_>>()
            .join("\n");
        PrunedEvidence(truncate_on_char_boundary(&joined, budget.max_chars).to_string())
    }
}

struct Selection {
    picked: Vec<bool>,
    count: usize,
    limit: usize,
}

impl Selection {
    fn new(len: usize, limit: usize) -> Self {
        Self {
            picked: vec![false; len],
            count: 0,
            limit,
        }
    }

    fn is_full(&self) -> bool {
        self.count >= self.limit
    }

    fn add(&mut self, idx: usize) {
        if self.is_full() {
            return;
        }
        if let Some(slot) = self.picked.get_mut(idx) {
            if !*slot {
                *slot = true;
                self.count += 1;
            }
        }
    }

    fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.picked
            .iter()
            .enumerate()
            .filter(|(_, picked)| **picked)
            .map(|(idx, _)| idx)
    }
}

/// Split into lines, collapse inner whitespace, drop blank lines.
pub fn normalize_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

/// Relevance score of a single normalized line.
pub fn score_line(line: &str) -> i32 {
    let has_platform = PLATFORM_TOKEN.is_match(line);
    let has_version = VERSION_TOKEN.is_match(line);

    let mut score = 0;
    if has_platform && has_version {
        score += SCORE_PLATFORM_VERSION;
    } else if has_version {
        score += SCORE_VERSION_ONLY;
    }
    if SUPPORT_MATCHER.is_match(line) {
        score += SCORE_SUPPORT_KEYWORD;
    }
    if RELEVANCE_MATCHER.is_match(line) {
        score += SCORE_RELEVANCE;
    }
    if NEGATION_MATCHER.is_match(line) {
        score += PENALTY_NEGATION;
    }
    score
}
