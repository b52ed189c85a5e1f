//! Column descriptors and the merged table schema.
//!
//! Inputs written by different pipeline versions do not always agree on the type of a
//! column. Numeric kinds are promoted along an explicit rank table so the merged output
//! can hold the values of every input; categorical kinds (logicals and strings) are never
//! promoted against anything else.
use std::collections::{btree_map::Entry, BTreeMap};
use std::fmt::Display;

use crate::{Error, Result};

/// Semantic type of a column's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ScalarKind {
    Float64,
    Float32,
    Int32,
    Int64,
    Boolean,
    FixedString,
}

impl ScalarKind {
    /// Promotion rank; a higher rank wins when the same column is seen with two numeric
    /// kinds. Categorical kinds have no rank.
    #[must_use]
    pub fn rank(self) -> Option<u8> {
        match self {
            ScalarKind::Int32 => Some(0),
            ScalarKind::Float32 => Some(1),
            ScalarKind::Int64 => Some(2),
            ScalarKind::Float64 => Some(3),
            ScalarKind::Boolean | ScalarKind::FixedString => None,
        }
    }

    #[must_use]
    pub fn is_numeric(self) -> bool {
        self.rank().is_some()
    }

    /// Size in bytes of a single element as stored in a binary table.
    #[must_use]
    pub fn element_size(self) -> usize {
        match self {
            ScalarKind::Float64 | ScalarKind::Int64 => 8,
            ScalarKind::Float32 | ScalarKind::Int32 => 4,
            ScalarKind::Boolean | ScalarKind::FixedString => 1,
        }
    }

    /// Binary table `TFORM` type code used when writing a column of this kind.
    #[must_use]
    pub fn type_code(self) -> char {
        match self {
            ScalarKind::Float64 => 'D',
            ScalarKind::Float32 => 'E',
            ScalarKind::Int32 => 'J',
            ScalarKind::Int64 => 'K',
            ScalarKind::Boolean => 'L',
            ScalarKind::FixedString => 'A',
        }
    }
}

impl Display for ScalarKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScalarKind::Float64 => "float64",
            ScalarKind::Float32 => "float32",
            ScalarKind::Int32 => "int32",
            ScalarKind::Int64 => "int64",
            ScalarKind::Boolean => "boolean",
            ScalarKind::FixedString => "string",
        };
        f.write_str(name)
    }
}

/// Definition of a single table column.
///
/// For strings `repeat` and `width` are both the number of characters; for other kinds
/// `repeat` is the number of elements per row and `width` the element size in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ColumnDescriptor {
    pub name: String,
    pub kind: ScalarKind,
    pub repeat: usize,
    pub width: usize,
}

impl ColumnDescriptor {
    /// A single element column of `kind`. Use [ColumnDescriptor::string] for strings.
    pub fn new<S: Into<String>>(name: S, kind: ScalarKind) -> Self {
        Self {
            name: name.into(),
            kind,
            repeat: 1,
            width: kind.element_size(),
        }
    }

    /// A fixed width string column of `width` characters.
    pub fn string<S: Into<String>>(name: S, width: usize) -> Self {
        Self {
            name: name.into(),
            kind: ScalarKind::FixedString,
            repeat: width,
            width,
        }
    }

    #[must_use]
    pub fn with_repeat(mut self, repeat: usize) -> Self {
        self.repeat = repeat;
        if self.kind == ScalarKind::FixedString {
            self.width = repeat;
        }
        self
    }

    /// Number of values stored per row; strings count as one value.
    #[must_use]
    pub fn values_per_row(&self) -> usize {
        match self.kind {
            ScalarKind::FixedString => 1,
            _ => self.repeat,
        }
    }

    /// Bytes occupied by this column in every table row.
    #[must_use]
    pub fn row_bytes(&self) -> usize {
        self.repeat * self.kind.element_size()
    }

    #[must_use]
    pub fn tform(&self) -> String {
        format!("{}{}", self.repeat, self.kind.type_code())
    }

    /// Case-insensitive identity of the column.
    #[must_use]
    pub fn key(&self) -> String {
        self.name.to_uppercase()
    }
}

impl Display for ColumnDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.tform())
    }
}

/// Union of the columns seen across a set of tables, keyed case-insensitively and
/// ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Schema {
    columns: BTreeMap<String, ColumnDescriptor>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a column into the schema.
    ///
    /// Unseen names are added as is. For a known name the incoming descriptor replaces
    /// the stored one only if its kind ranks higher; strings widen to the larger width.
    /// The first spelling of a name is kept.
    ///
    /// # Errors
    /// [Error::SchemaConflict] if the two descriptors cannot be reconciled.
    pub fn merge(&mut self, incoming: ColumnDescriptor) -> Result<()> {
        match self.columns.entry(incoming.key()) {
            Entry::Vacant(entry) => {
                entry.insert(incoming);
            }
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                if let Some(mut winner) = promote(existing, &incoming)? {
                    winner.name.clone_from(&existing.name);
                    *existing = winner;
                }
            }
        }
        Ok(())
    }

    /// Add or replace a column without promotion.
    pub fn insert(&mut self, column: ColumnDescriptor) {
        self.columns.insert(column.key(), column);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.get(&name.to_uppercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.values()
    }

    /// Columns in the order they are written to a table.
    #[must_use]
    pub fn columns(&self) -> Vec<ColumnDescriptor> {
        self.columns.values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<ColumnDescriptor> for Schema {
    /// Collects without promotion; later duplicates replace earlier ones.
    fn from_iter<T: IntoIterator<Item = ColumnDescriptor>>(iter: T) -> Self {
        let mut schema = Schema::new();
        for column in iter {
            schema.insert(column);
        }
        schema
    }
}

/// Returns the descriptor that should replace `existing`, if any.
fn promote(
    existing: &ColumnDescriptor,
    incoming: &ColumnDescriptor,
) -> Result<Option<ColumnDescriptor>> {
    let conflict = || Error::SchemaConflict {
        column: existing.name.clone(),
        existing: existing.tform(),
        incoming: incoming.tform(),
    };

    match (existing.kind.rank(), incoming.kind.rank()) {
        (Some(have), Some(got)) => {
            if existing.repeat != incoming.repeat {
                return Err(conflict());
            }
            Ok((got > have).then(|| incoming.clone()))
        }
        (None, None) if existing.kind == incoming.kind => match existing.kind {
            ScalarKind::FixedString => Ok((incoming.width > existing.width).then(|| incoming.clone())),
            _ if existing.repeat != incoming.repeat => Err(conflict()),
            _ => Ok(None),
        },
        _ => Err(conflict()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ScalarKind::Float32, ScalarKind::Float64, ScalarKind::Float64; "float32 then float64")]
    #[test_case(ScalarKind::Float64, ScalarKind::Float32, ScalarKind::Float64; "float64 then float32")]
    #[test_case(ScalarKind::Int32, ScalarKind::Int64, ScalarKind::Int64; "int32 then int64")]
    #[test_case(ScalarKind::Int64, ScalarKind::Int32, ScalarKind::Int64; "int64 then int32")]
    #[test_case(ScalarKind::Int32, ScalarKind::Float32, ScalarKind::Float32; "int32 then float32")]
    #[test_case(ScalarKind::Float32, ScalarKind::Int64, ScalarKind::Int64; "float32 then int64")]
    fn numeric_promotion(first: ScalarKind, second: ScalarKind, expected: ScalarKind) {
        let mut schema = Schema::new();
        schema.merge(ColumnDescriptor::new("TMID", first)).unwrap();
        schema.merge(ColumnDescriptor::new("TMID", second)).unwrap();

        let column = schema.get("TMID").unwrap();
        assert_eq!(column.kind, expected);
        assert_eq!(column.width, expected.element_size());
        assert_eq!(schema.len(), 1);
    }

    #[test]
    fn names_are_case_insensitive() {
        let mut schema = Schema::new();
        schema.merge(ColumnDescriptor::new("Airmass", ScalarKind::Float32)).unwrap();
        schema.merge(ColumnDescriptor::new("AIRMASS", ScalarKind::Float64)).unwrap();

        assert_eq!(schema.len(), 1);
        let column = schema.get("airmass").unwrap();
        assert_eq!(column.name, "Airmass", "first spelling should be kept");
        assert_eq!(column.kind, ScalarKind::Float64);
    }

    #[test]
    fn strings_widen() {
        let mut schema = Schema::new();
        schema.merge(ColumnDescriptor::string("OBJ_ID", 12)).unwrap();
        schema.merge(ColumnDescriptor::string("OBJ_ID", 20)).unwrap();
        schema.merge(ColumnDescriptor::string("OBJ_ID", 16)).unwrap();

        let column = schema.get("OBJ_ID").unwrap();
        assert_eq!(column.width, 20);
        assert_eq!(column.tform(), "20A");
    }

    #[test_case(ColumnDescriptor::string("FLAG", 8), ColumnDescriptor::new("FLAG", ScalarKind::Float64); "string vs number")]
    #[test_case(ColumnDescriptor::new("FLAG", ScalarKind::Boolean), ColumnDescriptor::new("FLAG", ScalarKind::Int32); "bool vs number")]
    #[test_case(ColumnDescriptor::new("FLAG", ScalarKind::Boolean), ColumnDescriptor::string("FLAG", 1); "bool vs string")]
    #[test_case(ColumnDescriptor::new("FLAG", ScalarKind::Float64).with_repeat(3), ColumnDescriptor::new("FLAG", ScalarKind::Float64); "repeat mismatch")]
    fn conflicts(first: ColumnDescriptor, second: ColumnDescriptor) {
        let mut schema = Schema::new();
        schema.merge(first).unwrap();
        let err = schema.merge(second).unwrap_err();
        assert!(matches!(err, Error::SchemaConflict { .. }), "got {err:?}");
    }

    #[test]
    fn columns_are_ordered_by_name() {
        let schema: Schema = [
            ColumnDescriptor::new("TMID", ScalarKind::Float64),
            ColumnDescriptor::new("AIRMASS", ScalarKind::Float32),
            ColumnDescriptor::new("CLOUDS", ScalarKind::Float32),
        ]
        .into_iter()
        .collect();

        let names: Vec<String> = schema.iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["AIRMASS", "CLOUDS", "TMID"]);
    }

    #[test]
    fn tform() {
        assert_eq!(ColumnDescriptor::new("A", ScalarKind::Float64).tform(), "1D");
        assert_eq!(ColumnDescriptor::new("A", ScalarKind::Int64).tform(), "1K");
        assert_eq!(
            ColumnDescriptor::new("A", ScalarKind::Float32)
                .with_repeat(4)
                .tform(),
            "4E"
        );
        assert_eq!(ColumnDescriptor::string("A", 26).tform(), "26A");
        assert_eq!(ColumnDescriptor::string("A", 26).row_bytes(), 26);
        assert_eq!(
            ColumnDescriptor::new("A", ScalarKind::Int32)
                .with_repeat(2)
                .row_bytes(),
            8
        );
    }
}
