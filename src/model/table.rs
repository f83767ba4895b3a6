//! The attribute table: an ordered, immutable sequence of agent records
//! with named, typed columns.
//!
//! Stored column-major: the similarity engine scans whole columns over the
//! sample, so per-column contiguity is what matters. Validation happens once
//! in [`AttributeTable::new`]; everything downstream may assume a
//! well-formed table.

use hashbrown::HashMap;

use super::value::{parse_tags, AttrType, AttrValue};
use crate::{Error, Result};

// ============================================================================
// AttributeTable
// ============================================================================

/// Ordered sequence of agent records with named, typed attributes.
///
/// Immutable once constructed; owned exclusively by the engine for the
/// duration of a run.
#[derive(Debug, Clone)]
pub struct AttributeTable {
    names: Vec<String>,
    types: Vec<AttrType>,
    /// Column-major values: `columns[c][row]`.
    columns: Vec<Vec<AttrValue>>,
    /// Name → column index.
    by_name: HashMap<String, usize>,
    len: usize,
}

impl AttributeTable {
    /// Build a table from row-major records and a type-tag string
    /// (`'c'`/`'o'`/`'g'` per column, e.g. `"cocccoggggo"`).
    ///
    /// Fails fast on: tag count ≠ column count, unknown tag, odd geographic
    /// column count (they must form (lon,lat) pairs), or ragged rows.
    pub fn new(names: Vec<String>, type_tags: &str, rows: Vec<Vec<AttrValue>>) -> Result<Self> {
        let types = parse_tags(type_tags)?;
        Self::with_types(names, types, rows)
    }

    /// Like [`AttributeTable::new`] but with already-parsed types.
    pub fn with_types(
        names: Vec<String>,
        types: Vec<AttrType>,
        rows: Vec<Vec<AttrValue>>,
    ) -> Result<Self> {
        if names.len() != types.len() {
            return Err(Error::Table(format!(
                "{} attribute names but {} type tags",
                names.len(),
                types.len()
            )));
        }
        let num_geo = types.iter().filter(|t| **t == AttrType::Geographic).count();
        if num_geo % 2 != 0 {
            return Err(Error::Table(format!(
                "number of geographic attributes must be even to hold \
                 (longitude,latitude) pairs, got {num_geo}"
            )));
        }

        let width = names.len();
        let mut columns = vec![Vec::with_capacity(rows.len()); width];
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(Error::Table(format!(
                    "record {row_idx} has {} values, expected {width}",
                    row.len()
                )));
            }
            for (col, value) in row.iter().enumerate() {
                columns[col].push(*value);
            }
        }

        let by_name = names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();

        Ok(Self {
            len: rows.len(),
            names,
            types,
            columns,
            by_name,
        })
    }

    /// Number of agents.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of attribute columns.
    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn types(&self) -> &[AttrType] {
        &self.types
    }

    /// Column index by attribute name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Whole column by index.
    pub fn column(&self, col: usize) -> &[AttrValue] {
        &self.columns[col]
    }

    /// One cell.
    pub fn value(&self, row: usize, col: usize) -> AttrValue {
        self.columns[col][row]
    }

    /// Indices of columns with the given type, in declaration order.
    pub fn columns_of_type(&self, ty: AttrType) -> Vec<usize> {
        self.types
            .iter()
            .enumerate()
            .filter_map(|(idx, t)| (*t == ty).then_some(idx))
            .collect()
    }

    /// Full-record equality: every attribute (geographic ones included)
    /// equal between the two rows. This is the `num_equal` predicate of the
    /// Lin term — an agent "exists in the sample" only as its complete
    /// attribute combination.
    pub fn records_equal(&self, a: usize, b: usize) -> bool {
        self.columns.iter().all(|col| col[a].same(col[b]))
    }
}

// ============================================================================
// Tests
// ============================================================================
