use fitsio::tables::ColumnDataType;

use crate::schema::{ColumnDescriptor, ScalarKind};
use crate::{Error, Result};

/// A binary table column as found in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    /// `TFORMn` as written.
    pub tform: String,
    /// Elements per row, characters for strings.
    pub repeat: usize,
    /// Kind holding the physical values, i.e., after `TSCALn`/`TZEROn`. `None` for
    /// columns that cannot be read.
    pub kind: Option<ScalarKind>,
}

impl TableColumn {
    /// Descriptor of the column, or `None` if it cannot be read. Only scalar numeric and
    /// logical columns are supported besides fixed width strings.
    #[must_use]
    pub fn descriptor(&self) -> Option<ColumnDescriptor> {
        match self.kind? {
            ScalarKind::FixedString => Some(ColumnDescriptor::string(&self.name, self.repeat)),
            kind if self.repeat == 1 => Some(ColumnDescriptor::new(&self.name, kind)),
            _ => None,
        }
    }
}

/// Kind that holds the physical values of a column stored as `typ` with the given
/// `TSCALn` and `TZEROn`.
///
/// Unsigned integers are stored signed with an offset zero point, e.g., `1I` with
/// `TZERO = 32768`, so the kind must be wide enough for the offset range.
pub(crate) fn physical_kind(typ: &ColumnDataType, scale: f64, zero: f64) -> Option<ScalarKind> {
    let scaled = scale != 1.0 || zero.fract() != 0.0;
    let kind = match typ {
        ColumnDataType::Logical => ScalarKind::Boolean,
        ColumnDataType::String => ScalarKind::FixedString,
        ColumnDataType::Float if !scaled && zero == 0.0 => ScalarKind::Float32,
        ColumnDataType::Float | ColumnDataType::Double => ScalarKind::Float64,
        ColumnDataType::Byte | ColumnDataType::Short | ColumnDataType::Int | ColumnDataType::Long
            if scaled =>
        {
            ScalarKind::Float64
        }
        ColumnDataType::Byte | ColumnDataType::Short => {
            if zero == 0.0 || zero == -128.0 || zero == 32768.0 {
                ScalarKind::Int32
            } else {
                ScalarKind::Int64
            }
        }
        ColumnDataType::Int => {
            if zero == 0.0 {
                ScalarKind::Int32
            } else {
                ScalarKind::Int64
            }
        }
        // 64 bit, `K`
        ColumnDataType::Long => {
            if zero == 0.0 {
                ScalarKind::Int64
            } else {
                ScalarKind::Float64
            }
        }
        _ => return None,
    };
    Some(kind)
}

/// Column type used to write a column of `kind`.
pub(crate) fn data_type(kind: ScalarKind) -> ColumnDataType {
    match kind {
        ScalarKind::Float64 => ColumnDataType::Double,
        ScalarKind::Float32 => ColumnDataType::Float,
        ScalarKind::Int32 => ColumnDataType::Int,
        ScalarKind::Int64 => ColumnDataType::Long,
        ScalarKind::Boolean => ColumnDataType::Logical,
        ScalarKind::FixedString => ColumnDataType::String,
    }
}

/// Values of a scalar or string column over a range of rows, one value per row.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Float64(Vec<f64>),
    Float32(Vec<f32>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Boolean(Vec<bool>),
    Str(Vec<String>),
}

macro_rules! cast_numeric {
    ($data:expr, $variant:ident, $t:ty) => {
        match $data {
            ColumnData::Float64(v) => Some(ColumnData::$variant(v.iter().map(|&x| x as $t).collect())),
            ColumnData::Float32(v) => Some(ColumnData::$variant(v.iter().map(|&x| x as $t).collect())),
            ColumnData::Int32(v) => Some(ColumnData::$variant(v.iter().map(|&x| x as $t).collect())),
            ColumnData::Int64(v) => Some(ColumnData::$variant(v.iter().map(|&x| x as $t).collect())),
            _ => None,
        }
    };
}

macro_rules! map_values {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ColumnData::Float64($v) => ColumnData::Float64($body),
            ColumnData::Float32($v) => ColumnData::Float32($body),
            ColumnData::Int32($v) => ColumnData::Int32($body),
            ColumnData::Int64($v) => ColumnData::Int64($body),
            ColumnData::Boolean($v) => ColumnData::Boolean($body),
            ColumnData::Str($v) => ColumnData::Str($body),
        }
    };
}

impl ColumnData {
    #[must_use]
    pub fn kind(&self) -> ScalarKind {
        match self {
            ColumnData::Float64(_) => ScalarKind::Float64,
            ColumnData::Float32(_) => ScalarKind::Float32,
            ColumnData::Int32(_) => ScalarKind::Int32,
            ColumnData::Int64(_) => ScalarKind::Int64,
            ColumnData::Boolean(_) => ScalarKind::Boolean,
            ColumnData::Str(_) => ScalarKind::FixedString,
        }
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Float64(v) => v.len(),
            ColumnData::Float32(v) => v.len(),
            ColumnData::Int32(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::Boolean(v) => v.len(),
            ColumnData::Str(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zeroed values of `kind`: 0, false or empty strings.
    #[must_use]
    pub fn zeroed(kind: ScalarKind, len: usize) -> Self {
        match kind {
            ScalarKind::Float64 => ColumnData::Float64(vec![0.0; len]),
            ScalarKind::Float32 => ColumnData::Float32(vec![0.0; len]),
            ScalarKind::Int32 => ColumnData::Int32(vec![0; len]),
            ScalarKind::Int64 => ColumnData::Int64(vec![0; len]),
            ScalarKind::Boolean => ColumnData::Boolean(vec![false; len]),
            ScalarKind::FixedString => ColumnData::Str(vec![String::new(); len]),
        }
    }

    /// Values at `rows`, in the order given.
    ///
    /// # Errors
    /// [Error::RowOutOfRange] if a row is past the end of the data.
    pub fn select(&self, rows: &[usize]) -> Result<Self> {
        let len = self.len();
        if let Some(&bad) = rows.iter().find(|&&r| r >= len) {
            return Err(Error::RowOutOfRange {
                start: bad,
                len: 1,
                rows: len,
            });
        }
        Ok(map_values!(self, v => rows.iter().map(|&r| v[r].clone()).collect()))
    }

    /// Convert to `to`. Numeric kinds convert into each other with `as` semantics,
    /// other kinds only convert to themselves.
    ///
    /// # Errors
    /// [Error::Conversion] between incompatible kinds.
    pub fn convert(self, to: ScalarKind) -> Result<Self> {
        let from = self.kind();
        if from == to {
            return Ok(self);
        }
        let converted = match to {
            ScalarKind::Float64 => cast_numeric!(&self, Float64, f64),
            ScalarKind::Float32 => cast_numeric!(&self, Float32, f32),
            ScalarKind::Int32 => cast_numeric!(&self, Int32, i32),
            ScalarKind::Int64 => cast_numeric!(&self, Int64, i64),
            ScalarKind::Boolean | ScalarKind::FixedString => None,
        };
        converted.ok_or(Error::Conversion { from, to })
    }

    /// Numeric values as `f64`, `None` for logical and string data.
    #[must_use]
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self.clone().convert(ScalarKind::Float64) {
            Ok(ColumnData::Float64(v)) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ColumnDataType::Short, 1.0, 32768.0, Some(ScalarKind::Int32); "unsigned short")]
    #[test_case(ColumnDataType::Byte, 1.0, -128.0, Some(ScalarKind::Int32); "signed byte")]
    #[test_case(ColumnDataType::Int, 1.0, 2_147_483_648.0, Some(ScalarKind::Int64); "unsigned int")]
    #[test_case(ColumnDataType::Int, 1.0, 0.0, Some(ScalarKind::Int32); "int")]
    #[test_case(ColumnDataType::Long, 1.0, 9_223_372_036_854_775_808.0, Some(ScalarKind::Float64); "unsigned long")]
    #[test_case(ColumnDataType::Short, 0.01, 0.0, Some(ScalarKind::Float64); "scaled short")]
    #[test_case(ColumnDataType::Float, 1.0, 0.0, Some(ScalarKind::Float32); "float")]
    #[test_case(ColumnDataType::Float, 2.0, 0.0, Some(ScalarKind::Float64); "scaled float")]
    #[test_case(ColumnDataType::Logical, 1.0, 0.0, Some(ScalarKind::Boolean); "logical")]
    #[test_case(ColumnDataType::Bit, 1.0, 0.0, None; "bits")]
    fn physical_kinds(typ: ColumnDataType, scale: f64, zero: f64, expected: Option<ScalarKind>) {
        assert_eq!(physical_kind(&typ, scale, zero), expected);
    }

    fn column(repeat: usize, kind: Option<ScalarKind>) -> TableColumn {
        TableColumn {
            name: "COL".to_string(),
            tform: String::new(),
            repeat,
            kind,
        }
    }

    #[test]
    fn descriptors() {
        assert_eq!(
            column(1, Some(ScalarKind::Float64)).descriptor(),
            Some(ColumnDescriptor::new("COL", ScalarKind::Float64))
        );
        assert_eq!(
            column(26, Some(ScalarKind::FixedString)).descriptor(),
            Some(ColumnDescriptor::string("COL", 26))
        );
        assert_eq!(column(3, Some(ScalarKind::Int32)).descriptor(), None);
        assert_eq!(column(1, None).descriptor(), None);
    }

    #[test]
    fn select_rows() {
        let data = ColumnData::Str(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(
            data.select(&[2, 0]).unwrap(),
            ColumnData::Str(vec!["c".into(), "a".into()])
        );
        assert!(matches!(
            data.select(&[3]),
            Err(Error::RowOutOfRange { start: 3, .. })
        ));
    }

    #[test]
    fn convert() {
        let data = ColumnData::Float32(vec![1.5, 2.5]);
        assert_eq!(
            data.clone().convert(ScalarKind::Float64).unwrap(),
            ColumnData::Float64(vec![1.5, 2.5])
        );
        assert_eq!(
            ColumnData::Int32(vec![7]).convert(ScalarKind::Int64).unwrap(),
            ColumnData::Int64(vec![7])
        );
        assert!(matches!(
            data.convert(ScalarKind::FixedString),
            Err(Error::Conversion { .. })
        ));
        assert!(ColumnData::Str(vec![]).to_f64().is_none());
        assert_eq!(
            ColumnData::zeroed(ScalarKind::Boolean, 2),
            ColumnData::Boolean(vec![false, false])
        );
    }
}
