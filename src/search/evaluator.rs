//! Query evaluation and ranking.
//!
//! The evaluator turns an effective parameter map into a ranked, curated,
//! possibly grouped result set: curation rules first, then synonym forms,
//! then per-field token expansion and scoring, then the sort-key comparator,
//! and finally hide/pin/group/paginate shaping.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use crate::collection::{filter, geo, Collection};
use crate::constants::{FREQUENCY_ORDERED_TOP_K, PREFIX_CANDIDATES_CAP};
use crate::curation::OverrideIndex;
use crate::error::{Error, Result};
use crate::schema::FieldType;
use crate::synonym::SynonymIndex;
use crate::tokenizer;

use super::params::SearchParams;
use super::result::{FacetCount, FacetValueCount, GroupedHit, Hit, SearchResponse};
use super::sort::{compare_key_values, resolve_sort_keys, KeyValue, SortKey};

/// Hits per page cap.
const MAX_PER_PAGE: usize = 250;

/// Field count cap baked into the text-match score layout.
const MAX_QUERY_FIELDS: usize = 16;

/// Runs a search against one collection.
pub fn execute(
    coll: &Collection,
    synonyms: &SynonymIndex,
    overrides: &OverrideIndex,
    params: &SearchParams,
) -> Result<SearchResponse> {
    if params.page == 0 {
        return Err(Error::invalid(
            "Page must be an integer of value greater than 0.",
        ));
    }
    if params.per_page > MAX_PER_PAGE {
        return Err(Error::invalid(format!(
            "Only upto {MAX_PER_PAGE} hits can be fetched per page."
        )));
    }

    let sort_keys = resolve_sort_keys(&params.sort_by, coll.schema())?;

    let query_tokens = if params.is_wildcard() {
        Vec::new()
    } else {
        tokenizer::tokenize(&params.q)
    };

    // Curation: rules run against the raw query and its synonym forms.
    let mut effective_tokens = query_tokens.clone();
    let mut rule_filter = None;
    let mut rule_pins: Vec<(String, usize)> = Vec::new();
    let mut rule_hidden: Vec<String> = Vec::new();

    if params.enable_overrides && !query_tokens.is_empty() && !overrides.is_empty() {
        let mut forms = vec![query_tokens.clone()];
        forms.extend(synonyms.reduce(&query_tokens));
        let outcome = overrides.apply(&forms, coll);
        effective_tokens = outcome.query_tokens;
        rule_filter = outcome.filter_by;
        rule_pins = outcome.pinned;
        rule_hidden = outcome.hidden;
    }

    // Caller pins/hides take precedence over rule lists for the same ids.
    let caller_curated: HashSet<&String> = params
        .pinned_hits
        .iter()
        .map(|(id, _)| id)
        .chain(params.hidden_hits.iter())
        .collect();

    let mut pinned = params.pinned_hits.clone();
    pinned.extend(
        rule_pins
            .into_iter()
            .filter(|(id, _)| !caller_curated.contains(id)),
    );

    let mut hidden = params.hidden_hits.clone();
    hidden.extend(
        rule_hidden
            .into_iter()
            .filter(|id| !caller_curated.contains(id)),
    );

    // Caller and rule filters AND-combine.
    let combined_filter = filter::conjoin(&params.filter_by, rule_filter.as_deref().unwrap_or(""));
    let filter_ids: Option<HashSet<u32>> = if combined_filter.trim().is_empty() {
        None
    } else {
        let expr = filter::parse(&combined_filter, coll.schema())?;
        Some(coll.evaluate_filter(&expr))
    };

    // Score candidates.
    let mut scores: HashMap<u32, u64> = HashMap::new();

    if effective_tokens.is_empty() {
        for seq in coll.seq_ids() {
            if passes(&filter_ids, seq) {
                scores.insert(seq, 0);
            }
        }
    } else {
        validate_query_fields(coll, &params.query_by)?;

        let full_credit = effective_tokens.len() as u64;
        let mut forms = vec![effective_tokens.clone()];
        forms.extend(synonyms.reduce(&effective_tokens));

        // Each form drops tokens independently until its own match count
        // reaches the threshold, so a synonym form that already satisfies
        // the query does not suppress recall on the raw form.
        for form in &forms {
            let mut form_matches =
                score_form(coll, params, form, full_credit, &filter_ids, &mut scores);

            for variant in drop_token_variants(form) {
                if form_matches.len() >= params.drop_tokens_threshold as usize {
                    break;
                }
                debug!(remaining = variant.len(), "retrying with dropped tokens");
                let credit = (variant.len() as u64).min(full_credit);
                let matched =
                    score_form(coll, params, &variant, credit, &filter_ids, &mut scores);
                form_matches.extend(matched);
            }
        }
    }

    // Rank: sort keys in order, then ascending sequence id.
    let geo_distances = compute_geo_distances(coll, &sort_keys, &scores);
    let mut ranked: Vec<u32> = scores.keys().copied().collect();
    ranked.sort_by(|a, b| {
        for key in &sort_keys {
            let ord = compare_key_values(
                &key_value(coll, key, *a, &scores, &geo_distances),
                &key_value(coll, key, *b, &scores, &geo_distances),
                key.direction(),
            );
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.cmp(b)
    });

    // Hidden ids drop out before anything is counted.
    let hidden_seqs: HashSet<u32> = hidden
        .iter()
        .filter_map(|id| coll.seq_for_id(id))
        .collect();
    ranked.retain(|seq| !hidden_seqs.contains(seq));

    // Pins resolve to live documents; hidden ids cannot be pinned back in.
    let pins: Vec<(String, usize)> = pinned
        .into_iter()
        .filter(|(id, _)| coll.seq_for_id(id).is_some() && !hidden.contains(id))
        .collect();

    let facet_counts = facet_counts(coll, &params.facet_by, &ranked);

    let response = if params.group_by.is_empty() {
        shape_flat(coll, params, &sort_keys, ranked, &pins, &scores, &geo_distances)
    } else {
        shape_grouped(coll, params, &sort_keys, ranked, &pins, &scores, &geo_distances)?
    };

    Ok(SearchResponse {
        facet_counts,
        ..response
    })
}

fn passes(filter_ids: &Option<HashSet<u32>>, seq: u32) -> bool {
    filter_ids.as_ref().map(|ids| ids.contains(&seq)).unwrap_or(true)
}

fn validate_query_fields(coll: &Collection, query_by: &[String]) -> Result<()> {
    if query_by.is_empty() {
        return Err(Error::invalid("No search fields specified for the query."));
    }
    if query_by.len() > MAX_QUERY_FIELDS {
        return Err(Error::invalid(format!(
            "Only upto {MAX_QUERY_FIELDS} query_by fields can be specified."
        )));
    }
    for field_name in query_by {
        match coll.schema().field(field_name) {
            Some(field) if field.field_type.is_text() => {}
            _ => {
                return Err(Error::invalid(format!(
                    "Could not find a field named `{field_name}` in the schema."
                )))
            }
        }
    }
    Ok(())
}

/// Shorter forms tried when a query form undershoots the drop-tokens
/// threshold: right-to-left truncations first, then left-to-right.
fn drop_token_variants(form: &[String]) -> Vec<Vec<String>> {
    let mut variants = Vec::new();
    let mut right = form.to_vec();
    while right.len() > 1 {
        right.pop();
        variants.push(right.clone());
    }
    let mut left = form.to_vec();
    while left.len() > 1 {
        left.remove(0);
        variants.push(left.clone());
    }
    variants
}

/// Scores every document matching all tokens of `form` in at least one
/// queried field, keeping each document's best score. Returns the matched
/// sequence ids.
fn score_form(
    coll: &Collection,
    params: &SearchParams,
    form: &[String],
    words_credit: u64,
    filter_ids: &Option<HashSet<u32>>,
    scores: &mut HashMap<u32, u64>,
) -> HashSet<u32> {
    let freq_ordered = coll.schema().default_sorting_field().is_none();
    let mut all_matched = HashSet::new();

    for (field_index, field_name) in params.query_by.iter().enumerate() {
        // docs matching every token seen so far, with accumulated typo cost
        let mut matched: Option<HashMap<u32, u32>> = None;

        for token in form {
            let candidates = expand_token(
                coll,
                field_name,
                token,
                params.prefix_for(field_index),
                params.typos_for(field_index),
                freq_ordered,
            );

            let mut token_docs: HashMap<u32, u32> = HashMap::new();
            for (term, cost) in &candidates {
                if let Some(postings) = coll.postings(field_name, term) {
                    for seq in postings {
                        token_docs
                            .entry(*seq)
                            .and_modify(|c| *c = (*c).min(*cost))
                            .or_insert(*cost);
                    }
                }
            }

            matched = Some(match matched {
                None => token_docs,
                Some(prev) => prev
                    .into_iter()
                    .filter_map(|(seq, cost)| {
                        token_docs.get(&seq).map(|extra| (seq, cost + extra))
                    })
                    .collect(),
            });

            if matched.as_ref().map(HashMap::is_empty).unwrap_or(true) {
                break;
            }
        }

        let Some(matched) = matched else { continue };
        for (seq, typo_cost) in matched {
            if !passes(filter_ids, seq) {
                continue;
            }
            let score = text_match_score(words_credit, typo_cost, field_index);
            scores
                .entry(seq)
                .and_modify(|s| *s = (*s).max(score))
                .or_insert(score);
            all_matched.insert(seq);
        }
    }

    all_matched
}

/// Packs `(words, typo quality, field priority)` into one orderable score.
/// More matched words always beat fewer; fewer typos beat more; an earlier
/// field beats a later one at equal token-level quality.
fn text_match_score(words: u64, typos: u32, field_index: usize) -> u64 {
    let typo_quality = 255u64.saturating_sub(typos as u64);
    let field_priority = (MAX_QUERY_FIELDS - field_index.min(MAX_QUERY_FIELDS - 1)) as u64;
    (words << 24) | (typo_quality << 8) | field_priority
}

/// Expands one query token into candidate index terms with their typo cost.
///
/// Exact match is free; a prefix completion costs one typo so direct hits
/// stay ahead; fuzzy candidates cost their edit distance. Without a default
/// sorting field the candidate set is re-ordered by descending document
/// frequency and truncated so low-frequency expansions cannot appear.
fn expand_token(
    coll: &Collection,
    field: &str,
    token: &str,
    prefix: bool,
    num_typos: u32,
    freq_ordered: bool,
) -> Vec<(String, u32)> {
    let mut candidates: Vec<(String, u32, usize)> = Vec::new();

    if let Some(postings) = coll.postings(field, token) {
        candidates.push((token.to_string(), 0, postings.len()));
    }

    if prefix {
        for (term, df) in coll.prefix_terms(field, token) {
            if term != token {
                candidates.push((term, 1, df));
            }
            if !freq_ordered && candidates.len() >= PREFIX_CANDIDATES_CAP {
                break;
            }
        }
    }

    if num_typos > 0 {
        let mut fuzzy: Vec<(String, u32, usize)> = Vec::new();
        for (term, df) in coll.field_terms(field) {
            if candidates.iter().any(|(t, _, _)| t == term) {
                continue;
            }
            if let Some(distance) = levenshtein_within(token, term, num_typos) {
                if distance > 0 {
                    fuzzy.push((term.to_string(), distance, df));
                }
            }
        }
        fuzzy.sort_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)));
        fuzzy.truncate(PREFIX_CANDIDATES_CAP);
        candidates.extend(fuzzy);
    }

    if freq_ordered {
        candidates.sort_by(|a, b| b.2.cmp(&a.2));
        candidates.truncate(FREQUENCY_ORDERED_TOP_K);
    }

    candidates
        .into_iter()
        .map(|(term, cost, _)| (term, cost))
        .collect()
}

/// Edit distance between `a` and `b` when it does not exceed `max`.
fn levenshtein_within(a: &str, b: &str, max: u32) -> Option<u32> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.len().abs_diff(b.len()) > max as usize {
        return None;
    }

    let mut prev: Vec<u32> = (0..=b.len() as u32).collect();
    let mut current = vec![0u32; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i as u32 + 1;
        let mut row_min = current[0];
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + u32::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
            row_min = row_min.min(current[j + 1]);
        }
        if row_min > max {
            return None;
        }
        std::mem::swap(&mut prev, &mut current);
    }

    let distance = prev[b.len()];
    (distance <= max).then_some(distance)
}

/// Raw distances for every geo sort key, used for both comparison and the
/// per-hit `geo_distance_meters` payload.
fn compute_geo_distances(
    coll: &Collection,
    sort_keys: &[SortKey],
    scores: &HashMap<u32, u64>,
) -> HashMap<(String, u32), f64> {
    let mut distances = HashMap::new();
    for key in sort_keys {
        let SortKey::Geo { field, lat, lng, .. } = key else {
            continue;
        };
        for seq in scores.keys() {
            if let Some(point) = coll.geo_value(field, *seq) {
                distances.insert(
                    (field.clone(), *seq),
                    geo::distance_meters(point, (*lat, *lng)),
                );
            }
        }
    }
    distances
}

fn key_value(
    coll: &Collection,
    key: &SortKey,
    seq: u32,
    scores: &HashMap<u32, u64>,
    geo_distances: &HashMap<(String, u32), f64>,
) -> KeyValue {
    match key {
        SortKey::Numeric { field, .. } => KeyValue::Number(coll.numeric_value(field, seq)),
        SortKey::TextMatch { .. } => KeyValue::TextMatch(scores.get(&seq).copied().unwrap_or(0)),
        SortKey::Geo {
            field,
            exclude_radius_meters,
            precision_meters,
            ..
        } => {
            let distance = geo_distances.get(&(field.clone(), seq)).copied();
            KeyValue::Number(distance.map(|d| {
                let effective = match exclude_radius_meters {
                    Some(radius) if d < *radius => 0.0,
                    _ => d,
                };
                match precision_meters {
                    Some(precision) => (effective / precision).floor(),
                    None => effective,
                }
            }))
        }
    }
}

/// Applies pinning and pagination to a flat (non-grouped) ranked list.
fn shape_flat(
    coll: &Collection,
    params: &SearchParams,
    sort_keys: &[SortKey],
    ranked: Vec<u32>,
    pins: &[(String, usize)],
    scores: &HashMap<u32, u64>,
    geo_distances: &HashMap<(String, u32), f64>,
) -> SearchResponse {
    // Without grouping, only the first pin for a position takes effect;
    // later ids for the same position keep their natural rank.
    let mut seen_positions = HashSet::new();
    let effective_pins: Vec<&(String, usize)> = pins
        .iter()
        .filter(|(_, position)| seen_positions.insert(*position))
        .collect();

    let pinned_seqs: HashSet<u32> = effective_pins
        .iter()
        .filter_map(|(id, _)| coll.seq_for_id(id))
        .collect();

    let mut final_list: Vec<(u32, bool)> = ranked
        .into_iter()
        .filter(|seq| !pinned_seqs.contains(seq))
        .map(|seq| (seq, false))
        .collect();

    let mut ordered_pins = effective_pins;
    ordered_pins.sort_by_key(|(_, position)| *position);
    for (id, position) in ordered_pins {
        if let Some(seq) = coll.seq_for_id(id) {
            let index = position.saturating_sub(1).min(final_list.len());
            final_list.insert(index, (seq, true));
        }
    }

    let found = final_list.len();
    let start = (params.page - 1) * params.per_page;
    let hits = final_list
        .into_iter()
        .skip(start)
        .take(params.per_page)
        .map(|(seq, curated)| make_hit(coll, seq, curated, sort_keys, scores, geo_distances))
        .collect();

    SearchResponse {
        found,
        out_of: coll.num_documents(),
        page: params.page,
        hits,
        grouped_hits: Vec::new(),
        facet_counts: Vec::new(),
    }
}

/// Partitions hits by the group-by value tuple; pins at the same position
/// form one curated group placed at that position.
fn shape_grouped(
    coll: &Collection,
    params: &SearchParams,
    sort_keys: &[SortKey],
    ranked: Vec<u32>,
    pins: &[(String, usize)],
    scores: &HashMap<u32, u64>,
    geo_distances: &HashMap<(String, u32), f64>,
) -> Result<SearchResponse> {
    for field_name in &params.group_by {
        let field = coll.schema().field(field_name).ok_or_else(|| {
            Error::invalid(format!(
                "Group by field `{field_name}` should be a facet field."
            ))
        })?;
        if !field.facet {
            return Err(Error::invalid(format!(
                "Group by field `{field_name}` should be a facet field."
            )));
        }
    }

    let group_limit = params.group_limit.max(1);
    let all_pinned_seqs: HashSet<u32> = pins
        .iter()
        .filter_map(|(id, _)| coll.seq_for_id(id))
        .collect();

    // Natural groups in rank order of their best hit.
    let mut group_order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, (Vec<Value>, Vec<(u32, bool)>)> = HashMap::new();

    for seq in ranked {
        if all_pinned_seqs.contains(&seq) {
            continue;
        }
        let key_values = group_key_values(coll, &params.group_by, seq);
        let key = serde_json::to_string(&key_values).unwrap_or_default();
        let entry = groups
            .entry(key.clone())
            .or_insert_with(|| {
                group_order.push(key);
                (key_values, Vec::new())
            });
        if entry.1.len() < group_limit {
            entry.1.push((seq, false));
        }
    }

    let mut final_groups: Vec<(Vec<Value>, Vec<(u32, bool)>)> = group_order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .collect();

    // Pinned groups: all ids sharing a position group together, keyed by
    // the first pinned document of that position.
    let mut by_position: BTreeMap<usize, Vec<u32>> = BTreeMap::new();
    for (id, position) in pins {
        if let Some(seq) = coll.seq_for_id(id) {
            by_position.entry(*position).or_default().push(seq);
        }
    }

    for (position, seqs) in by_position {
        let Some(first) = seqs.first() else { continue };
        let key_values = group_key_values(coll, &params.group_by, *first);
        let hits: Vec<(u32, bool)> = seqs
            .into_iter()
            .take(group_limit)
            .map(|seq| (seq, true))
            .collect();
        let index = position.saturating_sub(1).min(final_groups.len());
        final_groups.insert(index, (key_values, hits));
    }

    let found = final_groups.len();
    let start = (params.page - 1) * params.per_page;
    let grouped_hits = final_groups
        .into_iter()
        .skip(start)
        .take(params.per_page)
        .map(|(group_key, members)| GroupedHit {
            group_key,
            hits: members
                .into_iter()
                .map(|(seq, curated)| {
                    make_hit(coll, seq, curated, sort_keys, scores, geo_distances)
                })
                .collect(),
        })
        .collect();

    Ok(SearchResponse {
        found,
        out_of: coll.num_documents(),
        page: params.page,
        hits: Vec::new(),
        grouped_hits,
        facet_counts: Vec::new(),
    })
}

fn group_key_values(coll: &Collection, group_by: &[String], seq: u32) -> Vec<Value> {
    group_by
        .iter()
        .map(|field_name| {
            let field_type = coll
                .schema()
                .field(field_name)
                .map(|f| f.field_type)
                .unwrap_or(FieldType::String);
            match field_type {
                FieldType::StringArray => Value::Array(
                    coll.string_values(field_name, seq)
                        .unwrap_or_default()
                        .iter()
                        .map(|v| Value::String(v.clone()))
                        .collect(),
                ),
                FieldType::String => coll
                    .string_values(field_name, seq)
                    .and_then(|v| v.first())
                    .map(|v| Value::String(v.clone()))
                    .unwrap_or(Value::Null),
                _ => coll
                    .numeric_value(field_name, seq)
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            }
        })
        .collect()
}

fn make_hit(
    coll: &Collection,
    seq: u32,
    curated: bool,
    sort_keys: &[SortKey],
    scores: &HashMap<u32, u64>,
    geo_distances: &HashMap<(String, u32), f64>,
) -> Hit {
    let mut geo_distance_meters = BTreeMap::new();
    for key in sort_keys {
        if let SortKey::Geo { field, .. } = key {
            if let Some(distance) = geo_distances.get(&(field.clone(), seq)) {
                geo_distance_meters.insert(field.clone(), distance.round() as i64);
            }
        }
    }

    Hit {
        document: coll.doc_by_seq(seq).cloned().unwrap_or(Value::Null),
        curated: curated.then_some(true),
        text_match: scores.get(&seq).copied().unwrap_or(0),
        geo_distance_meters,
    }
}

fn facet_counts(coll: &Collection, facet_by: &[String], ranked: &[u32]) -> Vec<FacetCount> {
    coll.facet_counts(facet_by, ranked)
        .into_iter()
        .map(|(field_name, counts)| FacetCount {
            field_name,
            counts: counts
                .into_iter()
                .map(|(value, count)| FacetValueCount { value, count })
                .collect(),
        })
        .collect()
}
