//! Walks the backend's `inner_hits` explanation tree and collects, for every
//! matched word, which query term matched it and through which analysis.
//!
//! The tree has no fixed schema. The walk only trusts three shapes: an
//! `inner_hits` wrapper, a `{"field": "words", "offset": n}` word match, and keys
//! named like query terms (`w1`, `w2`, ...) which scope everything below them.
//! Anything else is descended into or ignored.

use crate::model::WordId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Term assigned to word matches found outside any term scope.
pub const DEFAULT_TERM: &str = "w0";

static TERM_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^w[0-9]+$").expect("valid query term pattern"));

/// One reason a word matched: the query term and, when the match came through a
/// specific analysis, that analysis' index. `analysis == None` means the whole
/// word matched.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TermMatch {
    pub term: String,
    pub analysis: Option<usize>,
}

impl TermMatch {
    pub fn new(term: impl Into<String>, analysis: Option<usize>) -> Self {
        Self {
            term: term.into(),
            analysis,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOffsets {
    words: BTreeMap<WordId, BTreeSet<TermMatch>>,
}

impl MatchOffsets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, word: WordId, matched: TermMatch) {
        self.words.entry(word).or_default().insert(matched);
    }

    /// Set union, key by key.
    pub fn merge(&mut self, other: MatchOffsets) {
        for (word, matches) in other.words {
            self.words.entry(word).or_default().extend(matches);
        }
    }

    pub fn get(&self, word: &WordId) -> Option<&BTreeSet<TermMatch>> {
        self.words.get(word)
    }

    pub fn contains(&self, word: &WordId) -> bool {
        self.words.contains_key(word)
    }

    /// Distinct query terms that matched the word.
    pub fn terms(&self, word: &WordId) -> BTreeSet<&str> {
        self.get(word)
            .map(|matches| matches.iter().map(|m| m.term.as_str()).collect())
            .unwrap_or_default()
    }

    /// Indices of the word's analyses that matched some term.
    pub fn matching_analyses(&self, word: &WordId) -> BTreeSet<usize> {
        self.get(word)
            .map(|matches| matches.iter().filter_map(|m| m.analysis).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&WordId, &BTreeSet<TermMatch>)> {
        self.words.iter()
    }
}

impl FromIterator<(WordId, TermMatch)> for MatchOffsets {
    fn from_iter<I: IntoIterator<Item = (WordId, TermMatch)>>(iter: I) -> Self {
        let mut offsets = MatchOffsets::new();
        for (word, matched) in iter {
            offsets.insert(word, matched);
        }
        offsets
    }
}

/// Collects the word matches in `tree` for the sentence numbered `sentence`.
/// Never fails: nodes of an unexpected shape contribute nothing.
pub fn extract(tree: &Value, sentence: usize) -> MatchOffsets {
    visit(tree, sentence, None)
}

fn visit(node: &Value, sentence: usize, scope: Option<&str>) -> MatchOffsets {
    match node {
        Value::Object(map) => visit_object(map, sentence, scope),
        Value::Array(items) => {
            let mut offsets = MatchOffsets::new();
            for item in items.iter().filter(|item| is_branch(item)) {
                offsets.merge(visit(item, sentence, scope));
            }
            offsets
        }
        _ => MatchOffsets::new(),
    }
}

fn visit_object(map: &Map<String, Value>, sentence: usize, scope: Option<&str>) -> MatchOffsets {
    if let Some(inner) = map.get("inner_hits") {
        return visit(inner, sentence, scope);
    }

    let mut offsets = MatchOffsets::new();
    if map.get("field").and_then(Value::as_str) == Some("words") {
        if let Some(word) = map.get("offset").and_then(as_index) {
            let term = scope.unwrap_or(DEFAULT_TERM);
            offsets.insert(
                WordId::new(sentence, word),
                TermMatch::new(term, nested_analysis(map)),
            );
        }
        return offsets;
    }

    for (key, value) in map {
        let mut child_scope = scope;
        if TERM_KEY.is_match(key) {
            match scope {
                // A different term's subtree: its matches are not ours.
                Some(active) if active != key.as_str() => continue,
                Some(_) => {}
                None => child_scope = Some(key.as_str()),
            }
        }
        if is_branch(value) {
            offsets.merge(visit(value, sentence, child_scope));
        }
    }
    offsets
}

fn nested_analysis(map: &Map<String, Value>) -> Option<usize> {
    let nested = map.get("_nested")?;
    if nested.get("field").and_then(Value::as_str) != Some("ana") {
        return None;
    }
    nested.get("offset").and_then(as_index)
}

fn as_index(value: &Value) -> Option<usize> {
    value.as_u64().and_then(|n| usize::try_from(n).ok())
}

fn is_branch(value: &Value) -> bool {
    value.is_object() || value.is_array()
}
