//! Search request parameters.

use crate::constants::DROP_TOKENS_THRESHOLD;
use crate::error::{Error, Result};
use crate::params::ParamMap;

/// Raw sort entry as supplied by the caller, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSortField {
    pub name: String,
    pub order: String,
}

impl RawSortField {
    pub fn new(name: impl Into<String>, order: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: order.into(),
        }
    }
}

/// Effective parameters of one search request.
///
/// `query_by` is ordered: an earlier field is a stronger ranking signal than
/// a later one. `prefix` and `num_typos` align with `query_by` positionally;
/// a single element broadcasts to all fields.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub q: String,
    pub query_by: Vec<String>,
    pub filter_by: String,
    pub facet_by: Vec<String>,
    pub sort_by: Vec<RawSortField>,
    pub page: usize,
    pub per_page: usize,
    pub prefix: Vec<bool>,
    pub num_typos: Vec<u32>,
    pub drop_tokens_threshold: u32,
    pub group_by: Vec<String>,
    pub group_limit: usize,
    /// Caller-supplied `(doc_id, 1-based position)` pins.
    pub pinned_hits: Vec<(String, usize)>,
    /// Caller-supplied hidden doc ids.
    pub hidden_hits: Vec<String>,
    pub enable_overrides: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            q: "*".to_string(),
            query_by: Vec::new(),
            filter_by: String::new(),
            facet_by: Vec::new(),
            sort_by: Vec::new(),
            page: 1,
            per_page: 10,
            prefix: vec![false],
            num_typos: vec![2],
            drop_tokens_threshold: DROP_TOKENS_THRESHOLD,
            group_by: Vec::new(),
            group_limit: 3,
            pinned_hits: Vec::new(),
            hidden_hits: Vec::new(),
            enable_overrides: true,
        }
    }
}

impl SearchParams {
    pub fn new(q: impl Into<String>, query_by: &[&str]) -> Self {
        Self {
            q: q.into(),
            query_by: query_by.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_sort(mut self, name: &str, order: &str) -> Self {
        self.sort_by.push(RawSortField::new(name, order));
        self
    }

    pub fn with_filter(mut self, filter_by: &str) -> Self {
        self.filter_by = filter_by.to_string();
        self
    }

    pub fn with_page(mut self, page: usize, per_page: usize) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }

    /// Per-field prefix flag, broadcasting a single entry.
    pub fn prefix_for(&self, field_index: usize) -> bool {
        self.prefix
            .get(field_index)
            .or_else(|| self.prefix.first())
            .copied()
            .unwrap_or(false)
    }

    /// Per-field typo budget, broadcasting a single entry.
    pub fn typos_for(&self, field_index: usize) -> u32 {
        self.num_typos
            .get(field_index)
            .or_else(|| self.num_typos.first())
            .copied()
            .unwrap_or(0)
    }

    pub fn is_wildcard(&self) -> bool {
        self.q.trim() == "*"
    }

    /// Parses the `"id:position,id:position"` wire form of pinned hits.
    ///
    /// Only the last `:` separates the position, so ids may contain colons.
    pub fn parse_pinned_hits(raw: &str) -> Vec<(String, usize)> {
        raw.split(',')
            .filter_map(|entry| {
                let entry = entry.trim();
                let (id, pos) = entry.rsplit_once(':')?;
                let position: usize = pos.parse().ok()?;
                Some((id.to_string(), position))
            })
            .collect()
    }

    /// Parses the comma-separated wire form of hidden hits.
    pub fn parse_hidden_hits(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Builds search parameters from a string-valued request parameter map.
    pub fn from_param_map(params: &ParamMap) -> Result<Self> {
        let mut out = Self {
            q: params.get("q").unwrap_or("*").to_string(),
            ..Self::default()
        };

        if let Some(query_by) = params.get("query_by") {
            out.query_by = split_csv(query_by);
        }
        if let Some(filter_by) = params.get("filter_by") {
            out.filter_by = filter_by.to_string();
        }
        if let Some(facet_by) = params.get("facet_by") {
            out.facet_by = split_csv(facet_by);
        }
        if let Some(sort_by) = params.get("sort_by") {
            for entry in split_outside_parens(sort_by) {
                let (name, order) = entry.rsplit_once(':').ok_or_else(|| {
                    Error::invalid(format!("Could not parse the sort field: `{entry}`."))
                })?;
                out.sort_by
                    .push(RawSortField::new(name.trim(), order.trim()));
            }
        }

        out.page = parse_number(params, "page", out.page)?;
        out.per_page = parse_number(params, "per_page", out.per_page)?;
        out.group_limit = parse_number(params, "group_limit", out.group_limit)?;
        out.drop_tokens_threshold =
            parse_number(params, "drop_tokens_threshold", out.drop_tokens_threshold)?;

        if let Some(prefix) = params.get("prefix") {
            out.prefix = split_csv(prefix).iter().map(|v| v == "true").collect();
        }
        if let Some(num_typos) = params.get("num_typos") {
            let mut typos = Vec::new();
            for value in split_csv(num_typos) {
                typos.push(value.parse().map_err(|_| {
                    Error::invalid("Parameter `num_typos` must be an unsigned integer.")
                })?);
            }
            out.num_typos = typos;
        }

        if let Some(group_by) = params.get("group_by") {
            out.group_by = split_csv(group_by);
        }
        if let Some(pinned) = params.get("pinned_hits") {
            out.pinned_hits = Self::parse_pinned_hits(pinned);
        }
        if let Some(hidden) = params.get("hidden_hits") {
            out.hidden_hits = Self::parse_hidden_hits(hidden);
        }
        if let Some(enable_overrides) = params.get("enable_overrides") {
            out.enable_overrides = enable_overrides == "true" || enable_overrides == "1";
        }

        Ok(out)
    }
}

fn parse_number<T: std::str::FromStr>(params: &ParamMap, name: &str, default: T) -> Result<T> {
    match params.get(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::invalid(format!("Parameter `{name}` must be an unsigned integer."))),
        None => Ok(default),
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Splits on commas that sit outside parentheses, so geo sort expressions
/// survive (`loc(48.8, 2.3):asc, points:desc`).
fn split_outside_parens(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();

    for c in raw.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                if !current.trim().is_empty() {
                    parts.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}
