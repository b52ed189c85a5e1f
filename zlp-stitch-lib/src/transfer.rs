//! Copying single table columns between files.
use tracing::trace;

use crate::fits::{FitsFile, Hdu};
use crate::plan::Frames;
use crate::schema::ColumnDescriptor;
use crate::Result;

/// Read the kept `frames` of `source_column` and write them to `dest_column` from row
/// `dest_offset` on. Values are converted to the kind of `descriptor`, strings are
/// padded or cut to its width by the destination column.
///
/// A `None` source column is a column the input does not have: nothing is written and
/// the destination keeps its zeroed cells.
///
/// # Errors
/// Any read, conversion or write failure, including a write past the end of the
/// destination table.
#[allow(clippy::too_many_arguments)]
pub fn transfer(
    source: &mut FitsFile,
    source_hdu: &Hdu,
    dest: &mut FitsFile,
    dest_hdu: &Hdu,
    frames: &Frames,
    dest_offset: usize,
    source_column: Option<usize>,
    dest_column: usize,
    descriptor: &ColumnDescriptor,
) -> Result<()> {
    let Some(source_column) = source_column else {
        trace!(column = %descriptor.name, "column not in source, skipping");
        return Ok(());
    };

    let data = source.read_column(source_hdu, source_column, 0..frames.total, descriptor.kind)?;
    let data = frames.select(data)?;
    trace!(
        column = %descriptor.name,
        kind = %descriptor.kind,
        rows = data.len(),
        dest_offset,
        "transferring column"
    );
    dest.write_column(dest_hdu, dest_column, dest_offset, &data)
}

/// Copy every row of a column to the start of the destination column.
///
/// # Errors
/// As [transfer]; the destination must have at least as many rows as the source.
pub fn copy_column(
    source: &mut FitsFile,
    source_hdu: &Hdu,
    dest: &mut FitsFile,
    dest_hdu: &Hdu,
    source_column: Option<usize>,
    dest_column: usize,
    descriptor: &ColumnDescriptor,
) -> Result<()> {
    transfer(
        source,
        source_hdu,
        dest,
        dest_hdu,
        &Frames::all(source_hdu.num_rows()),
        0,
        source_column,
        dest_column,
        descriptor,
    )
}
