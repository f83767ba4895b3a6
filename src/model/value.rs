//! Attribute types and values.
//!
//! Every column of an [`AttributeTable`](super::AttributeTable) carries one
//! [`AttrType`] tag. Geographic columns always come in (longitude, latitude)
//! pairs; the table constructor rejects an odd geographic column count.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ============================================================================
// AttrType
// ============================================================================

/// Type tag of one attribute column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrType {
    /// Unordered code (sex, household role, education level code, ...).
    /// Two agents either share the value or they don't.
    Categorical,
    /// Ordered value (age, income, ...). Between-ness is meaningful.
    Ordinal,
    /// One coordinate of a (longitude, latitude) pair in degrees.
    Geographic,
}

impl AttrType {
    /// Parse the single-character tag used by attribute-table files:
    /// `c` = categorical, `o` = ordinal, `g` = geographic.
    pub fn from_tag(tag: char) -> Result<Self> {
        match tag {
            'c' => Ok(AttrType::Categorical),
            'o' => Ok(AttrType::Ordinal),
            'g' => Ok(AttrType::Geographic),
            other => Err(Error::Table(format!(
                "unknown attribute type tag {other:?} (expected 'c', 'o' or 'g')"
            ))),
        }
    }

    /// The single-character tag for this type.
    pub fn tag(self) -> char {
        match self {
            AttrType::Categorical => 'c',
            AttrType::Ordinal => 'o',
            AttrType::Geographic => 'g',
        }
    }
}

/// Parse a tag string such as `"cocccoggggo"` into a type vector.
pub fn parse_tags(tags: &str) -> Result<Vec<AttrType>> {
    tags.chars().map(AttrType::from_tag).collect()
}

// ============================================================================
// AttrValue
// ============================================================================

/// One attribute value. Integers and floats are kept apart so that
/// categorical codes compare exactly, while geographic coordinates and
/// continuous ordinals keep full precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
}

impl AttrValue {
    /// Numeric view, used for ordinal between-ness tests and geographic
    /// coordinates.
    pub fn as_f64(self) -> f64 {
        match self {
            AttrValue::Int(v) => v as f64,
            AttrValue::Float(v) => v,
        }
    }

    /// Exact equality for categorical matching and full-record comparison.
    /// `Int(1)` and `Float(1.0)` are distinct — mixed-representation columns
    /// are a data-preparation bug, not something the metric papers over.
    pub fn same(self, other: AttrValue) -> bool {
        match (self, other) {
            (AttrValue::Int(a), AttrValue::Int(b)) => a == b,
            (AttrValue::Float(a), AttrValue::Float(b)) => a == b,
            _ => false,
        }
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Int(v as i64)
    }
}

// ============================================================================
// Tests
// ============================================================================
