use std::path::PathBuf;

use crate::schema::ScalarKind;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failure reported by CFITSIO.
    #[error(transparent)]
    Fits(#[from] fitsio::errors::Error),

    /// A section could not be found by name or index.
    #[error("HDU not found: {0}")]
    HduNotFound(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("keyword {keyword} missing from HDU {hdu}")]
    MissingKeyword { keyword: String, hdu: usize },

    #[error("HDU {name} is not {expected}")]
    WrongHduType { name: String, expected: &'static str },

    /// A column or image data type outside the supported subset.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Aperture counts (or frame counts within one file) disagree.
    #[error("image dimensions do not match in {path:?}: expected {expected}, got {actual}")]
    DimensionMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    /// The same column appears with kinds that cannot be promoted into one another.
    #[error("column {column} has incompatible definitions: {existing} and {incoming}")]
    SchemaConflict {
        column: String,
        existing: String,
        incoming: String,
    },

    #[error("cannot convert {from} values to {to}")]
    Conversion { from: ScalarKind, to: ScalarKind },

    /// Write outside the rows or frames allocated when the section was created.
    #[error("write of {len} rows at {start} exceeds {rows} rows")]
    RowOutOfRange { start: usize, len: usize, rows: usize },

    /// Data does not fit the shape of the section it is written to.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A column the operation depends on, e.g., the time column used for ordering.
    #[error("{0:?} has no {1} column")]
    MissingColumn(PathBuf, String),

    #[error("file opened read-only")]
    ReadOnly,

    #[error("no input files")]
    NoInputs,
}

impl Error {
    /// True for the recoverable "does not exist" conditions.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::HduNotFound(_) | Error::ColumnNotFound(_))
    }

    /// Process exit status for this error. CFITSIO failures keep their CFITSIO status,
    /// the other container faults use the matching CFITSIO number.
    #[must_use]
    pub fn status(&self) -> i32 {
        match self {
            Error::Fits(fitsio::errors::Error::Fits(err)) => err.status,
            Error::Fits(_) => 1,
            Error::HduNotFound(_) => 301,
            Error::ColumnNotFound(_) => 219,
            Error::MissingKeyword { .. } => 202,
            Error::WrongHduType { .. } => 233,
            Error::UnsupportedFormat(_) => 261,
            Error::Conversion { .. } => 410,
            Error::RowOutOfRange { .. } => 307,
            Error::ShapeMismatch(_) => 320,
            Error::ReadOnly => 112,
            Error::DimensionMismatch { .. }
            | Error::SchemaConflict { .. }
            | Error::MissingColumn(..)
            | Error::NoInputs => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
