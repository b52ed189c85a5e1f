use std::path::{Path, PathBuf};

use tracing::debug;

use crate::fits::{ColumnData, FitsFile};
use crate::schema::ScalarKind;
use crate::{Error, Result, IMAGELIST};

/// Order in which input files are merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FileOrder {
    /// As given.
    #[default]
    Arguments,
    /// Ascending by the earliest time of each file.
    Time,
}

/// Minimum and maximum of a file's time column, `None` if the file has no frames
/// or no finite times.
///
/// # Errors
/// [Error::MissingColumn] if `IMAGELIST` has no `time_column`, or if it cannot be read.
pub fn time_range(fits: &mut FitsFile, time_column: &str) -> Result<Option<(f64, f64)>> {
    let imagelist = fits.hdu(IMAGELIST)?;
    let column = imagelist
        .column_index(time_column)
        .ok_or_else(|| Error::MissingColumn(fits.path().to_path_buf(), time_column.into()))?;
    let ColumnData::Float64(times) = fits.read_column(
        &imagelist,
        column,
        0..imagelist.num_rows(),
        ScalarKind::Float64,
    )?
    else {
        return Ok(None);
    };

    let range = times
        .iter()
        .filter(|t| t.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, &t| match acc {
            Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
            None => Some((t, t)),
        });
    Ok(range)
}

/// Processing order for `files`.
///
/// [FileOrder::Time] sorts by the earliest time in each file. The sort is stable, and
/// files without any frames go last.
///
/// # Errors
/// For [FileOrder::Time], if any file cannot be read or lacks the time column.
pub fn order<P: AsRef<Path>>(
    files: &[P],
    order: FileOrder,
    time_column: &str,
) -> Result<Vec<PathBuf>> {
    let files: Vec<PathBuf> = files.iter().map(|p| p.as_ref().to_path_buf()).collect();
    if order == FileOrder::Arguments {
        return Ok(files);
    }

    let mut keyed = Vec::with_capacity(files.len());
    for path in files {
        let start = time_range(&mut FitsFile::open(&path)?, time_column)?.map(|(lo, _)| lo);
        debug!(?path, ?start, "file start time");
        keyed.push((start, path));
    }
    keyed.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    Ok(keyed.into_iter().map(|(_, path)| path).collect())
}
