//! Filter expression parsing.
//!
//! The evaluator consumes a conjunctive subset: clauses joined with `&&`,
//! each clause either a numeric comparison, a token-sequence string match or
//! a geo-radius test. Clause fields are validated against the schema at
//! parse time so errors surface before any evaluation work.

use crate::constants::{METERS_PER_KM, METERS_PER_MI};
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::tokenizer;

/// Comparison operator of a numeric clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// A single parsed clause.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterClause {
    Numeric {
        field: String,
        op: NumericOp,
        value: f64,
    },
    /// Matches when the numeric value is any of the listed values.
    NumericIn {
        field: String,
        values: Vec<f64>,
    },
    /// Matches when the tokens occur contiguously in one of the field's values.
    Text { field: String, tokens: Vec<String> },
    /// Matches when any listed token sequence matches as in [`FilterClause::Text`].
    TextIn {
        field: String,
        alternatives: Vec<Vec<String>>,
    },
    Bool {
        field: String,
        value: bool,
    },
    GeoRadius {
        field: String,
        lat: f64,
        lng: f64,
        radius_meters: f64,
    },
}

/// A conjunction of clauses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterExpr {
    pub clauses: Vec<FilterClause>,
}

impl FilterExpr {
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// Joins two filter expressions with `&&` at the string level.
pub fn conjoin(left: &str, right: &str) -> String {
    match (left.trim().is_empty(), right.trim().is_empty()) {
        (true, _) => right.to_string(),
        (_, true) => left.to_string(),
        _ => format!("{left} && {right}"),
    }
}

/// Parses a filter expression against the schema.
pub fn parse(expr: &str, schema: &Schema) -> Result<FilterExpr> {
    let mut clauses = Vec::new();

    for raw_clause in expr.split("&&") {
        let raw_clause = raw_clause.trim();
        if raw_clause.is_empty() {
            continue;
        }

        let (field_name, rest) = raw_clause.split_once(':').ok_or_else(|| {
            Error::invalid(format!("Could not parse the filter query: `{raw_clause}`."))
        })?;

        let field_name = field_name.trim();
        let rest = rest.trim();

        let field = schema.field(field_name).ok_or_else(|| {
            Error::invalid(format!(
                "Could not find a filter field named `{field_name}` in the schema."
            ))
        })?;

        let clause = if field.field_type == crate::schema::FieldType::Geopoint {
            parse_geo_clause(field_name, rest)?
        } else if let Some(list) = parse_value_list(rest) {
            if field.field_type.is_numeric() {
                let mut values = Vec::with_capacity(list.len());
                for item in &list {
                    values.push(item.parse().map_err(|_| {
                        Error::invalid(format!(
                            "Value of filter field `{field_name}` must be a number."
                        ))
                    })?);
                }
                FilterClause::NumericIn {
                    field: field_name.to_string(),
                    values,
                }
            } else {
                FilterClause::TextIn {
                    field: field_name.to_string(),
                    alternatives: list.iter().map(|v| tokenizer::tokenize(v)).collect(),
                }
            }
        } else if field.field_type.is_numeric() {
            parse_numeric_clause(field_name, rest)?
        } else if field.field_type == crate::schema::FieldType::Bool {
            let value = match rest {
                "true" => true,
                "false" => false,
                _ => {
                    return Err(Error::invalid(format!(
                        "Value of filter field `{field_name}` must be `true` or `false`."
                    )))
                }
            };
            FilterClause::Bool {
                field: field_name.to_string(),
                value,
            }
        } else {
            let tokens = tokenizer::tokenize(rest);
            if tokens.is_empty() {
                return Err(Error::invalid(format!(
                    "Value of filter field `{field_name}` cannot be empty."
                )));
            }
            FilterClause::Text {
                field: field_name.to_string(),
                tokens,
            }
        };

        clauses.push(clause);
    }

    Ok(FilterExpr { clauses })
}

/// Splits `[a, b, c]` into trimmed elements; `None` when not a list.
fn parse_value_list(rest: &str) -> Option<Vec<String>> {
    let inner = rest.strip_prefix('[')?.strip_suffix(']')?;
    Some(
        inner
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect(),
    )
}

fn parse_numeric_clause(field: &str, rest: &str) -> Result<FilterClause> {
    let (op, value_str) = if let Some(v) = rest.strip_prefix(">=") {
        (NumericOp::Gte, v)
    } else if let Some(v) = rest.strip_prefix("<=") {
        (NumericOp::Lte, v)
    } else if let Some(v) = rest.strip_prefix('>') {
        (NumericOp::Gt, v)
    } else if let Some(v) = rest.strip_prefix('<') {
        (NumericOp::Lt, v)
    } else if let Some(v) = rest.strip_prefix('=') {
        (NumericOp::Eq, v)
    } else {
        (NumericOp::Eq, rest)
    };

    let value: f64 = value_str.trim().parse().map_err(|_| {
        Error::invalid(format!(
            "Value of filter field `{field}` must be a number."
        ))
    })?;

    Ok(FilterClause::Numeric {
        field: field.to_string(),
        op,
        value,
    })
}

/// Parses `( lat, lng, N km )` into a geo-radius clause.
fn parse_geo_clause(field: &str, rest: &str) -> Result<FilterClause> {
    let bad_syntax =
        || Error::invalid(format!("Bad syntax for geopoint filter field `{field}`"));

    let inner = rest
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(bad_syntax)?;

    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(bad_syntax());
    }

    let lat: f64 = parts[0].parse().map_err(|_| bad_syntax())?;
    let lng: f64 = parts[1].parse().map_err(|_| bad_syntax())?;
    if !lat.is_finite() || !lng.is_finite() {
        return Err(bad_syntax());
    }

    let mut radius_parts = parts[2].split_whitespace();
    let magnitude: f64 = radius_parts
        .next()
        .and_then(|m| m.parse().ok())
        .ok_or_else(bad_syntax)?;
    let unit = radius_parts.next().ok_or_else(bad_syntax)?;

    let radius_meters = match unit {
        "km" => magnitude * METERS_PER_KM,
        "mi" => magnitude * METERS_PER_MI,
        _ => {
            return Err(Error::invalid(
                "Filter field's radius unit must be either `km` or `mi`.",
            ))
        }
    };

    Ok(FilterClause::GeoRadius {
        field: field.to_string(),
        lat,
        lng,
        radius_meters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, FieldType};

    fn schema() -> Schema {
        Schema::new(
            vec![
                Field::new("category", FieldType::String).faceted(),
                Field::new("points", FieldType::Int32),
                Field::new("loc", FieldType::Geopoint),
            ],
            Some("points"),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_conjunction() {
        let expr = parse("category: shoes && points:>3", &schema()).unwrap();
        assert_eq!(expr.clauses.len(), 2);
        assert_eq!(
            expr.clauses[0],
            FilterClause::Text {
                field: "category".to_string(),
                tokens: vec!["shoes".to_string()],
            }
        );
        assert_eq!(
            expr.clauses[1],
            FilterClause::Numeric {
                field: "points".to_string(),
                op: NumericOp::Gt,
                value: 3.0,
            }
        );
    }

    #[test]
    fn test_parse_geo_radius() {
        let expr = parse("loc: (48.8, 2.3, 20 km)", &schema()).unwrap();
        assert_eq!(
            expr.clauses[0],
            FilterClause::GeoRadius {
                field: "loc".to_string(),
                lat: 48.8,
                lng: 2.3,
                radius_meters: 20_000.0,
            }
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = parse("color: red", &schema()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not find a filter field named `color` in the schema."
        );
    }

    #[test]
    fn test_conjoin() {
        assert_eq!(conjoin("", "a:1"), "a:1");
        assert_eq!(conjoin("a:1", ""), "a:1");
        assert_eq!(conjoin("a:1", "b:2"), "a:1 && b:2");
    }
}
