//! Override (curation) engine.
//!
//! Overrides rewrite queries, pin or hide specific documents and attach
//! extra filters whose parameters are extracted from the query via `{field}`
//! placeholders. Rules are evaluated in id order against the raw query and
//! every synonym-derived form of it; the first matching form decides a
//! rule's binding and token removal.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::collection::{filter, Collection};
use crate::error::{Error, Result};
use crate::schema::FieldType;
use crate::tokenizer;

/// How a rule query must relate to the request query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Exact,
    Contains,
}

/// One token of a rule query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleToken {
    Literal(String),
    Placeholder(String),
}

/// A pinned document with its 1-based target position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    pub doc_id: String,
    pub position: usize,
}

/// A parsed curation rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub id: String,
    pub rule_query: String,
    pub match_type: MatchType,
    rule_tokens: Vec<RuleToken>,
    pub includes: Vec<Include>,
    pub excludes: Vec<String>,
    pub filter_by: Option<String>,
    pub remove_matched_tokens: bool,
}

impl Override {
    /// Parses and validates the JSON form.
    pub fn parse(id: &str, json: &Value) -> Result<Self> {
        let rule = json
            .get("rule")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::invalid("The `rule` definition must contain a `query` and `match`."))?;

        let rule_query = rule
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid("The `rule` definition must contain a `query` and `match`."))?;

        let match_type = match rule.get("match").and_then(Value::as_str) {
            Some("exact") => MatchType::Exact,
            Some("contains") => MatchType::Contains,
            _ => {
                return Err(Error::invalid(
                    "The `rule.match` value must be `exact` or `contains`.",
                ))
            }
        };

        let has_includes = json.get("includes").is_some();
        let has_excludes = json.get("excludes").is_some();
        let has_filter = json.get("filter_by").is_some();

        if !has_includes && !has_excludes && !has_filter {
            return Err(Error::invalid(
                "Must contain one of:`includes`, `excludes`, `filter_by`.",
            ));
        }

        let mut includes = Vec::new();
        if has_includes {
            let items = json
                .get("includes")
                .and_then(Value::as_array)
                .ok_or_else(|| Error::invalid("The `includes` value must be an array of objects."))?;
            for item in items {
                let obj = item.as_object().ok_or_else(|| {
                    Error::invalid("The `includes` value must be an array of objects.")
                })?;
                if !obj.contains_key("id") || !obj.contains_key("position") {
                    return Err(Error::invalid(
                        "Inclusion definition must define both `id` and `position` keys.",
                    ));
                }
                let doc_id = obj
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::invalid("Inclusion `id` must be a string."))?;
                let position = obj
                    .get("position")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| Error::invalid("Inclusion `position` must be an integer."))?;
                includes.push(Include {
                    doc_id: doc_id.to_string(),
                    position: position as usize,
                });
            }
        }

        let mut excludes = Vec::new();
        if has_excludes {
            let items = json
                .get("excludes")
                .and_then(Value::as_array)
                .ok_or_else(|| Error::invalid("The `excludes` value must be an array of objects."))?;
            for item in items {
                let obj = item.as_object().ok_or_else(|| {
                    Error::invalid("The `excludes` value must be an array of objects.")
                })?;
                let doc_id = obj
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::invalid("Exclusion `id` must be a string."))?;
                excludes.push(doc_id.to_string());
            }
        }

        let filter_by = match json.get("filter_by") {
            None => None,
            Some(Value::String(f)) if f.is_empty() => {
                return Err(Error::invalid("The `filter_by` must be a non-empty string."))
            }
            Some(Value::String(f)) => Some(f.clone()),
            Some(_) => return Err(Error::invalid("The `filter_by` must be a string.")),
        };

        let remove_matched_tokens = json
            .get("remove_matched_tokens")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        Ok(Self {
            id: id.to_string(),
            rule_query: rule_query.to_string(),
            match_type,
            rule_tokens: parse_rule_tokens(rule_query),
            includes,
            excludes,
            filter_by,
            remove_matched_tokens,
        })
    }

    pub fn has_hit_lists(&self) -> bool {
        !self.includes.is_empty() || !self.excludes.is_empty()
    }

    /// Attempts to match this rule against one query form, yielding the
    /// matched window and placeholder bindings.
    fn match_form(&self, form: &[String], coll: &Collection) -> Option<RuleMatch> {
        let rule_len = self.rule_tokens.len();
        if rule_len == 0 || rule_len > form.len() {
            return None;
        }

        let starts: Vec<usize> = match self.match_type {
            MatchType::Exact => {
                if form.len() != rule_len {
                    return None;
                }
                vec![0]
            }
            MatchType::Contains => (0..=form.len() - rule_len).collect(),
        };

        for start in starts {
            if let Some(bindings) = self.bind_window(&form[start..start + rule_len], coll) {
                return Some(RuleMatch {
                    start,
                    len: rule_len,
                    bindings,
                });
            }
        }
        None
    }

    /// Binds rule tokens against one window: literals must equal, each
    /// placeholder must bind a value that is legal for its schema field.
    fn bind_window(
        &self,
        window: &[String],
        coll: &Collection,
    ) -> Option<Vec<(String, String)>> {
        let mut bindings = Vec::new();
        for (rule_token, query_token) in self.rule_tokens.iter().zip(window) {
            match rule_token {
                RuleToken::Literal(literal) => {
                    if literal != query_token {
                        return None;
                    }
                }
                RuleToken::Placeholder(field_name) => {
                    if !binding_is_legal(coll, field_name, query_token) {
                        return None;
                    }
                    bindings.push((field_name.clone(), query_token.clone()));
                }
            }
        }
        Some(bindings)
    }
}

/// The bound value of a matched window within a query form.
struct RuleMatch {
    start: usize,
    len: usize,
    bindings: Vec<(String, String)>,
}

/// True when `value` is a legal value of `field_name` for placeholder binding:
/// the field exists and the value is type-compatible (for text fields, the
/// token must actually occur in the field's index).
fn binding_is_legal(coll: &Collection, field_name: &str, value: &str) -> bool {
    let Some(field) = coll.schema().field(field_name) else {
        return false;
    };
    match field.field_type {
        FieldType::String | FieldType::StringArray => coll.postings(field_name, value).is_some(),
        FieldType::Int32 | FieldType::Int64 => value.parse::<i64>().is_ok(),
        FieldType::Float => value.parse::<f64>().is_ok(),
        FieldType::Bool => value == "true" || value == "false",
        FieldType::Geopoint => false,
    }
}

/// Splits a rule query into literals and `{placeholder}` tokens.
///
/// Spaces inside the braces are tolerated (`{ category }`).
fn parse_rule_tokens(rule_query: &str) -> Vec<RuleToken> {
    let mut tokens = Vec::new();
    let mut rest = rule_query.trim();

    while !rest.is_empty() {
        if let Some(after_open) = rest.strip_prefix('{') {
            if let Some(close) = after_open.find('}') {
                let name = after_open[..close].trim().to_string();
                tokens.push(RuleToken::Placeholder(name));
                rest = after_open[close + 1..].trim_start();
                continue;
            }
        }

        let end = rest.find(['{', ' ']).unwrap_or(rest.len());
        let (word, remainder) = rest.split_at(end.max(1));
        for token in tokenizer::tokenize(word) {
            tokens.push(RuleToken::Literal(token));
        }
        rest = remainder.trim_start();
    }

    tokens
}

/// What curation decided for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurationOutcome {
    /// Effective query tokens after any token removal; empty means wildcard.
    pub query_tokens: Vec<String>,
    /// Combined rule filters, already `&&`-joined and placeholder-substituted.
    pub filter_by: Option<String>,
    pub pinned: Vec<(String, usize)>,
    pub hidden: Vec<String>,
}

/// Per-collection override set, iterated in rule-id order.
#[derive(Debug, Default)]
pub struct OverrideIndex {
    overrides: BTreeMap<String, Override>,
}

impl OverrideIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Override> {
        self.overrides.get(id)
    }

    pub fn list(&self) -> impl Iterator<Item = &Override> {
        self.overrides.values()
    }

    /// Inserts or replaces a rule.
    pub fn upsert(&mut self, rule: Override) {
        debug!(id = %rule.id, "registered override");
        self.overrides.insert(rule.id.clone(), rule);
    }

    pub fn remove(&mut self, id: &str) -> Result<Override> {
        self.overrides
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("Could not find that `id`: {id}")))
    }

    /// Evaluates all rules against the query forms.
    ///
    /// `forms` is the ordered candidate list: the raw query first, synonym
    /// reductions after. Rules run in id order; the first rule carrying hit
    /// lists contributes them, every matching rule's filter is ANDed, and the
    /// first mutating match rewrites the query.
    pub fn apply(
        &self,
        forms: &[Vec<String>],
        coll: &Collection,
    ) -> CurationOutcome {
        let mut outcome = CurationOutcome {
            query_tokens: forms.first().cloned().unwrap_or_default(),
            ..Default::default()
        };

        let mut hit_lists_taken = false;
        let mut query_mutated = false;
        let mut filters: Vec<String> = Vec::new();

        for rule in self.overrides.values() {
            let matched = forms
                .iter()
                .find_map(|form| rule.match_form(form, coll).map(|m| (form, m)));

            let Some((form, rule_match)) = matched else {
                continue;
            };

            debug!(rule = %rule.id, "override matched");

            if rule.has_hit_lists() && !hit_lists_taken {
                hit_lists_taken = true;
                outcome.pinned = rule
                    .includes
                    .iter()
                    .map(|inc| (inc.doc_id.clone(), inc.position))
                    .collect();
                outcome.hidden = rule.excludes.clone();
            }

            if let Some(filter_template) = &rule.filter_by {
                filters.push(substitute(filter_template, &rule_match.bindings));
            }

            if rule.remove_matched_tokens && !query_mutated {
                query_mutated = true;
                let mut mutated = form.clone();
                mutated.drain(rule_match.start..rule_match.start + rule_match.len);
                outcome.query_tokens = mutated;
            }
        }

        if !filters.is_empty() {
            outcome.filter_by = Some(
                filters
                    .into_iter()
                    .reduce(|acc, f| filter::conjoin(&acc, &f))
                    .unwrap_or_default(),
            );
        }

        outcome
    }
}

fn substitute(template: &str, bindings: &[(String, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let (head, tail) = rest.split_at(open);
        out.push_str(head);
        match tail[1..].find('}') {
            Some(close) => {
                let name = tail[1..1 + close].trim();
                match bindings.iter().find(|(field, _)| field == name) {
                    Some((_, value)) => out.push_str(value),
                    None => out.push_str(&tail[..close + 2]),
                }
                rest = &tail[close + 2..];
            }
            None => {
                out.push_str(tail);
                return out;
            }
        }
    }

    out.push_str(rest);
    out
}
