//! Collection field schema.
//!
//! The schema drives filter validation, sort-key resolution and override
//! placeholder binding. Creation-time validation of the default sorting
//! field lives here so ranking can rely on its invariants.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    #[serde(rename = "string[]")]
    StringArray,
    Int32,
    Int64,
    Float,
    Bool,
    Geopoint,
}

impl FieldType {
    /// Single-valued numeric types usable as sort keys and default sorting fields.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Int32 | FieldType::Int64 | FieldType::Float)
    }

    /// Text types that participate in the inverted index.
    pub fn is_text(&self) -> bool {
        matches!(self, FieldType::String | FieldType::StringArray)
    }
}

/// A declared collection field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub facet: bool,
    #[serde(default)]
    pub optional: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            facet: false,
            optional: false,
        }
    }

    pub fn faceted(mut self) -> Self {
        self.facet = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Ordered field list plus the optional default sorting field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
    default_sorting_field: Option<String>,
}

impl Schema {
    /// Validates and builds a schema.
    ///
    /// The default sorting field, when declared, must exist and be a
    /// single-valued numeric field.
    pub fn new(fields: Vec<Field>, default_sorting_field: Option<&str>) -> Result<Self> {
        if let Some(sort_field) = default_sorting_field {
            match fields.iter().find(|f| f.name == sort_field) {
                None => {
                    return Err(Error::invalid(format!(
                        "Default sorting field is defined as `{sort_field}` but is not found in the schema."
                    )));
                }
                Some(field) if !field.field_type.is_numeric() => {
                    return Err(Error::invalid(format!(
                        "Default sorting field `{sort_field}` must be a single valued numerical field."
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(Self {
            fields,
            default_sorting_field: default_sorting_field.map(str::to_string),
        })
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn default_sorting_field(&self) -> Option<&str> {
        self.default_sorting_field.as_deref()
    }

    /// Text fields in declaration order.
    pub fn text_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.field_type.is_text())
    }
}
