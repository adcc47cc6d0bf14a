//! Sort-key parsing and comparison.
//!
//! A sort key is a single-valued numeric field, the `_text_match` pseudo
//! field, or a geopoint expression of the form
//! `field(lat, lng, exclude_radius: 1 km, precision: 0.9 km)`. At most three
//! keys apply; implicit keys are appended when the caller supplies fewer and
//! the collection declares a default sorting field.

use std::cmp::Ordering;

use crate::constants::{MAX_SORT_FIELDS, METERS_PER_KM, METERS_PER_MI};
use crate::error::{Error, Result};
use crate::schema::{FieldType, Schema};

use super::params::RawSortField;

/// Pseudo-field ranking by textual match quality.
pub const TEXT_MATCH_FIELD: &str = "_text_match";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn parse(field_name: &str, raw: &str) -> Result<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            _ => Err(Error::invalid(format!(
                "Order for field `{field_name}` should be either ASC or DESC."
            ))),
        }
    }
}

/// A validated sort key.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Numeric {
        field: String,
        direction: SortDirection,
    },
    TextMatch {
        direction: SortDirection,
    },
    Geo {
        field: String,
        lat: f64,
        lng: f64,
        exclude_radius_meters: Option<f64>,
        precision_meters: Option<f64>,
        direction: SortDirection,
    },
}

impl SortKey {
    pub fn direction(&self) -> SortDirection {
        match self {
            SortKey::Numeric { direction, .. }
            | SortKey::TextMatch { direction }
            | SortKey::Geo { direction, .. } => *direction,
        }
    }

    fn is_text_match(&self) -> bool {
        matches!(self, SortKey::TextMatch { .. })
    }
}

/// Parses and validates raw sort entries, appending implicit keys.
///
/// When fewer than [`MAX_SORT_FIELDS`] keys are supplied and the schema
/// declares a default sorting field, `_text_match DESC` is appended (unless
/// already present) followed by the default sorting field `DESC`, both
/// bounded by the cap. With no keys and no default sorting field the order
/// degenerates to `_text_match DESC` with the sequence-id tie-break.
pub fn resolve_sort_keys(raw: &[RawSortField], schema: &Schema) -> Result<Vec<SortKey>> {
    if raw.len() > MAX_SORT_FIELDS {
        return Err(Error::invalid(format!(
            "Only upto {MAX_SORT_FIELDS} sort_by fields can be specified."
        )));
    }

    let mut keys = Vec::with_capacity(MAX_SORT_FIELDS);
    for entry in raw {
        keys.push(parse_sort_field(entry, schema)?);
    }

    if keys.len() < MAX_SORT_FIELDS && !keys.iter().any(SortKey::is_text_match) {
        keys.push(SortKey::TextMatch {
            direction: SortDirection::Desc,
        });
    }

    if keys.len() < MAX_SORT_FIELDS {
        if let Some(default_field) = schema.default_sorting_field() {
            let already_used = keys
                .iter()
                .any(|k| matches!(k, SortKey::Numeric { field, .. } if field == default_field));
            if !already_used {
                keys.push(SortKey::Numeric {
                    field: default_field.to_string(),
                    direction: SortDirection::Desc,
                });
            }
        }
    }

    Ok(keys)
}

fn parse_sort_field(entry: &RawSortField, schema: &Schema) -> Result<SortKey> {
    let name = entry.name.trim();
    let direction = SortDirection::parse(name, &entry.order)?;

    if name == TEXT_MATCH_FIELD {
        return Ok(SortKey::TextMatch { direction });
    }

    // `field(...)` is a geopoint expression; anything else is a plain field
    // lookup, including malformed paren fragments.
    if let Some((field_name, inner)) = split_geo_expression(name) {
        if let Some(field) = schema.field(field_name) {
            if field.field_type == FieldType::Geopoint {
                return parse_geo_params(field_name, inner, direction);
            }
        }
        return Err(field_lookup_error(field_name));
    }

    match schema.field(name) {
        Some(field) if field.field_type.is_numeric() => Ok(SortKey::Numeric {
            field: name.to_string(),
            direction,
        }),
        _ => Err(field_lookup_error(name)),
    }
}

fn field_lookup_error(name: &str) -> Error {
    Error::invalid(format!(
        "Could not find a field named `{name}` in the schema for sorting."
    ))
}

/// Splits `field(inner)` into its parts; `None` when the token is not a
/// well-formed paren expression.
fn split_geo_expression(name: &str) -> Option<(&str, &str)> {
    let open = name.find('(')?;
    let inner = name[open + 1..].strip_suffix(')')?;
    Some((&name[..open], inner))
}

fn parse_geo_params(field: &str, inner: &str, direction: SortDirection) -> Result<SortKey> {
    let bad_syntax = || Error::invalid(format!("Bad syntax for geopoint sorting field `{field}`"));

    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    if parts.len() < 2 {
        return Err(bad_syntax());
    }

    let lat: f64 = parts[0].parse().map_err(|_| bad_syntax())?;
    let lng: f64 = parts[1].parse().map_err(|_| bad_syntax())?;
    if !lat.is_finite() || !lng.is_finite() {
        return Err(bad_syntax());
    }

    let mut exclude_radius_meters = None;
    let mut precision_meters = None;

    for part in &parts[2..] {
        let (key, value) = part.split_once(':').ok_or_else(bad_syntax)?;
        let meters = parse_distance_param(value)?;
        match key.trim() {
            "exclude_radius" => exclude_radius_meters = Some(meters),
            "precision" => precision_meters = Some(meters),
            _ => return Err(bad_syntax()),
        }
    }

    Ok(SortKey::Geo {
        field: field.to_string(),
        lat,
        lng,
        exclude_radius_meters,
        precision_meters,
        direction,
    })
}

/// Parses `N km` / `N mi` into meters; `N` must be a positive number.
fn parse_distance_param(value: &str) -> Result<f64> {
    let mut parts = value.split_whitespace();
    let magnitude: f64 = parts
        .next()
        .and_then(|m| m.parse().ok())
        .ok_or_else(|| Error::invalid("Sort field's parameter must be a positive number."))?;

    let unit = parts
        .next()
        .ok_or_else(|| Error::invalid("Sort field's parameter unit must be either `km` or `mi`."))?;

    let per_unit = match unit {
        "km" => METERS_PER_KM,
        "mi" => METERS_PER_MI,
        _ => {
            return Err(Error::invalid(
                "Sort field's parameter unit must be either `km` or `mi`.",
            ))
        }
    };

    if magnitude <= 0.0 {
        return Err(Error::invalid(
            "Sort field's parameter must be a positive number.",
        ));
    }

    Ok(magnitude * per_unit)
}

/// The resolved value of one sort key for one document.
///
/// `None` sorts after all present values regardless of direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyValue {
    Number(Option<f64>),
    TextMatch(u64),
}

/// Compares two documents on one key, honoring direction and missing-last.
pub fn compare_key_values(a: &KeyValue, b: &KeyValue, direction: SortDirection) -> Ordering {
    let ordering = match (a, b) {
        (KeyValue::TextMatch(x), KeyValue::TextMatch(y)) => x.cmp(y),
        (KeyValue::Number(x), KeyValue::Number(y)) => match (x, y) {
            (Some(x), Some(y)) => {
                let ord = x.partial_cmp(y).unwrap_or(Ordering::Equal);
                return apply_direction(ord, direction);
            }
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => return Ordering::Equal,
        },
        _ => Ordering::Equal,
    };
    apply_direction(ordering, direction)
}

fn apply_direction(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}
