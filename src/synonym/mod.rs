//! Synonym engine: one-way and multi-way expansion plus multi-token reduction.
//!
//! A one-way synonym maps a root token sequence to replacement sequences; a
//! multi-way synonym (empty root) makes every alternative replaceable by
//! every other. Reduction rewrites a query so phrase-level synonyms score on
//! par with direct matches: the result set never contains the input itself,
//! and replacements compose without looping (each replacement target is
//! applied at most once per reduction).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::tokenizer;

/// A synonym definition with normalized token sequences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synonym {
    pub id: String,
    /// Empty for multi-way sets.
    #[serde(default)]
    pub root: Vec<String>,
    pub synonyms: Vec<Vec<String>>,
}

impl Synonym {
    /// Builds a one-way synonym from raw strings, normalizing all tokens.
    pub fn one_way(id: impl Into<String>, root: &str, synonyms: &[&str]) -> Self {
        Self {
            id: id.into(),
            root: tokenizer::tokenize(root),
            synonyms: synonyms.iter().map(|s| tokenizer::tokenize(s)).collect(),
        }
    }

    /// Builds a multi-way synonym set from raw strings.
    pub fn multi_way(id: impl Into<String>, synonyms: &[&str]) -> Self {
        Self {
            id: id.into(),
            root: Vec::new(),
            synonyms: synonyms.iter().map(|s| tokenizer::tokenize(s)).collect(),
        }
    }

    /// Parses and validates the JSON form `{root?, synonyms[]}`.
    pub fn parse(id: &str, json: &Value) -> Result<Self> {
        let root = match json.get("root") {
            None => Vec::new(),
            Some(Value::String(root)) => tokenizer::tokenize(root),
            Some(_) => return Err(Error::invalid("Key `root` should be a string.")),
        };

        let synonyms_json = json
            .get("synonyms")
            .and_then(Value::as_array)
            .filter(|arr| !arr.is_empty())
            .ok_or_else(|| Error::invalid("Could not find an array of `synonyms`"))?;

        let mut synonyms = Vec::with_capacity(synonyms_json.len());
        for item in synonyms_json {
            let tokens = item
                .as_str()
                .map(tokenizer::tokenize)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    Error::invalid("Could not find a valid string array of `synonyms`")
                })?;
            synonyms.push(tokens);
        }

        Ok(Self {
            id: id.to_string(),
            root,
            synonyms,
        })
    }

    fn is_multi_way(&self) -> bool {
        self.root.is_empty()
    }
}

/// Per-collection synonym index with a reverse lookup from any matchable
/// token sequence to the definitions containing it.
#[derive(Debug, Default)]
pub struct SynonymIndex {
    definitions: HashMap<String, Synonym>,
    /// Insertion order of definitions, for deterministic tie-breaks.
    order: Vec<String>,
    /// joined token sequence -> synonym ids, in definition insertion order.
    sequence_index: HashMap<String, Vec<String>>,
}

impl SynonymIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Synonym> {
        self.definitions.get(id)
    }

    /// All definitions in insertion order.
    pub fn list(&self) -> Vec<&Synonym> {
        self.order
            .iter()
            .filter_map(|id| self.definitions.get(id))
            .collect()
    }

    /// Inserts or replaces a definition. Replacement de-registers the old
    /// sequences before indexing the new ones.
    pub fn upsert(&mut self, synonym: Synonym) -> Result<()> {
        if synonym.synonyms.is_empty() {
            return Err(Error::invalid("Could not find an array of `synonyms`"));
        }
        if synonym.synonyms.iter().any(Vec::is_empty) {
            return Err(Error::invalid(
                "Could not find a valid string array of `synonyms`",
            ));
        }

        if self.definitions.contains_key(&synonym.id) {
            self.remove(&synonym.id)?;
        }

        for sequence in self.matchable_sequences(&synonym) {
            self.sequence_index
                .entry(sequence)
                .or_default()
                .push(synonym.id.clone());
        }

        debug!(id = %synonym.id, "registered synonym");
        self.order.push(synonym.id.clone());
        self.definitions.insert(synonym.id.clone(), synonym);
        Ok(())
    }

    /// Removes a definition by id.
    pub fn remove(&mut self, id: &str) -> Result<Synonym> {
        let synonym = self
            .definitions
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("Could not find that `id`: {id}")))?;

        for sequence in self.matchable_sequences(&synonym) {
            if let Some(ids) = self.sequence_index.get_mut(&sequence) {
                ids.retain(|i| i != id);
                if ids.is_empty() {
                    self.sequence_index.remove(&sequence);
                }
            }
        }
        self.order.retain(|i| i != id);
        Ok(synonym)
    }

    /// One-level expansion: every (matchable sequence -> replacement) pair
    /// yields one additional token sequence. The input is not included.
    pub fn expand(&self, tokens: &[String]) -> Vec<Vec<String>> {
        let mut results = Vec::new();
        let max_window = tokens.len();

        for window_len in (1..=max_window).rev() {
            for start in 0..=(tokens.len() - window_len) {
                let window = &tokens[start..start + window_len];
                let key = join(window);
                let Some(ids) = self.sequence_index.get(&key) else {
                    continue;
                };
                for id in ids {
                    let synonym = &self.definitions[id];
                    for target in self.targets(synonym, window) {
                        results.push(splice(tokens, start, window_len, target));
                    }
                }
            }
        }

        results
    }

    /// Full reduction: rewrites with all composable replacements applied.
    ///
    /// Returns the empty set when nothing matches; the input sequence itself
    /// is never part of the result. Applying reduction to any returned
    /// sequence yields nothing new.
    pub fn reduce(&self, tokens: &[String]) -> Vec<Vec<String>> {
        let mut results = Vec::new();
        let mut processed: HashSet<String> = HashSet::new();
        self.reduce_internal(tokens, tokens.len(), 0, &mut processed, &mut results);
        results
    }

    fn reduce_internal(
        &self,
        tokens: &[String],
        start_window_len: usize,
        start_index: usize,
        processed: &mut HashSet<String>,
        results: &mut Vec<Vec<String>>,
    ) {
        let mut recursed = false;
        let mut scan_from = start_index;

        for window_len in (1..=start_window_len.min(tokens.len())).rev() {
            if window_len > tokens.len() {
                continue;
            }
            for start in scan_from..=(tokens.len() - window_len) {
                let window = &tokens[start..start + window_len];
                let window_key = join(window);

                if processed.contains(&window_key) {
                    continue;
                }
                let Some(ids) = self.sequence_index.get(&window_key) else {
                    continue;
                };

                for id in ids.clone() {
                    let synonym = &self.definitions[&id];
                    for target in self.targets(synonym, window) {
                        let target_key = join(target);
                        if processed.contains(&target_key) {
                            continue;
                        }

                        processed.insert(window_key.clone());
                        processed.insert(target_key);

                        let rewritten = splice(tokens, start, window_len, target);
                        recursed = true;
                        // Longer windows win over shorter overlapping ones;
                        // rescanning resumes at the replacement site.
                        self.reduce_internal(&rewritten, window_len, start, processed, results);
                    }
                }
            }
            // Subsequent (shorter) window lengths rescan from the beginning.
            scan_from = 0;
        }

        if !recursed && !processed.is_empty() {
            results.push(tokens.to_vec());
        }
    }

    /// Replacement targets for a matched window: all synonyms of a one-way
    /// root, or the other alternatives of a multi-way set.
    fn targets<'a>(&self, synonym: &'a Synonym, window: &[String]) -> Vec<&'a [String]> {
        synonym
            .synonyms
            .iter()
            .filter(|alt| alt.as_slice() != window)
            .map(Vec::as_slice)
            .collect()
    }

    /// Sequences that can trigger a definition: the root for one-way
    /// synonyms, every alternative for multi-way sets.
    fn matchable_sequences(&self, synonym: &Synonym) -> Vec<String> {
        if synonym.is_multi_way() {
            synonym.synonyms.iter().map(|alt| join(alt)).collect()
        } else {
            vec![join(&synonym.root)]
        }
    }
}

fn join(tokens: &[String]) -> String {
    tokens.join("\u{1}")
}

fn splice(tokens: &[String], start: usize, window_len: usize, target: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len() - window_len + target.len());
    out.extend_from_slice(&tokens[..start]);
    out.extend_from_slice(target);
    out.extend_from_slice(&tokens[start + window_len..]);
    out
}
