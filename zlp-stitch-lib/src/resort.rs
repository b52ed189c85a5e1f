//! In-place chronological sort of a stitched file.
//!
//! Files stitched in argument order are not necessarily in time order. Resorting sorts
//! the `IMAGELIST` rows by time and applies the same permutation to the frame axis of
//! every image.
use std::path::Path;

use ndarray::Axis;
use tracing::{debug, info};

use crate::fits::{FitsFile, Hdu};
use crate::schema::ScalarKind;
use crate::{Error, Result, DEFAULT_TIME_COLUMN, IMAGELIST};

/// Images that are not indexed by frame and are left untouched.
pub const UNSORTED_IMAGES: &[&str] = &["CASUDET"];

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResortReport {
    pub frames: usize,
    /// True if the file was already in order and nothing was written.
    pub already_sorted: bool,
    /// Images whose frames were reordered.
    pub images: Vec<String>,
}

/// Stable ordering of `times`, ascending, NaNs last.
#[must_use]
pub fn sort_order(times: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..times.len()).collect();
    order.sort_by(|&a, &b| match (times[a].is_nan(), times[b].is_nan()) {
        (false, false) => times[a].total_cmp(&times[b]),
        (a_nan, b_nan) => a_nan.cmp(&b_nan),
    });
    order
}

/// Sort the file at `path` in place by `TMID`.
///
/// The file is only written once every table column and image has been checked, so a
/// failed check leaves it unchanged.
///
/// # Errors
/// [Error::MissingColumn] if `IMAGELIST` has no time column,
/// [Error::UnsupportedFormat] if an `IMAGELIST` column cannot be read,
/// [Error::DimensionMismatch] if an image's frame count differs from the number of
/// `IMAGELIST` rows, or if the file cannot be read or written.
pub fn resort<P: AsRef<Path>>(path: P) -> Result<ResortReport> {
    let path = path.as_ref();
    info!(?path, "sorting");
    let mut fits = FitsFile::edit(path)?;

    let imagelist = fits.hdu(IMAGELIST)?;
    let frames = imagelist.num_rows();
    let column = imagelist.column_index(DEFAULT_TIME_COLUMN).ok_or_else(|| {
        Error::MissingColumn(path.to_path_buf(), DEFAULT_TIME_COLUMN.to_string())
    })?;
    let times = fits
        .read_column(&imagelist, column, 0..frames, ScalarKind::Float64)?
        .to_f64()
        .unwrap_or_default();

    let order = sort_order(&times);
    if order.iter().enumerate().all(|(i, &j)| i == j) {
        info!(?path, frames, "already sorted");
        fits.close()?;
        return Ok(ResortReport {
            frames,
            already_sorted: true,
            images: Vec::new(),
        });
    }

    let columns = imagelist
        .columns()
        .iter()
        .map(|c| {
            c.descriptor().ok_or_else(|| {
                Error::UnsupportedFormat(format!("cannot sort column {} ({})", c.name, c.tform))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let images = frame_images(&fits);
    for hdu in &images {
        let dims = hdu.dimensions()?;
        if dims.frames != frames {
            return Err(Error::DimensionMismatch {
                path: path.to_path_buf(),
                expected: frames,
                actual: dims.frames,
            });
        }
    }

    info!("sorting {IMAGELIST}");
    for (n, descriptor) in columns.iter().enumerate() {
        let sorted = fits
            .read_column(&imagelist, n, 0..frames, descriptor.kind)?
            .select(&order)?;
        fits.write_column(&imagelist, n, 0, &sorted)?;
    }

    let mut names = Vec::with_capacity(images.len());
    for hdu in &images {
        let name = hdu.name.clone().unwrap_or_else(|| format!("#{}", hdu.index));
        info!("sorting {name}");
        let sorted = fits.read_image(hdu)?.select(Axis(1), &order);
        fits.write_frames(hdu, 0, sorted.view())?;
        names.push(name);
    }

    fits.close()?;
    Ok(ResortReport {
        frames,
        already_sorted: false,
        images: names,
    })
}

/// 2D images indexed by frame.
fn frame_images(fits: &FitsFile) -> Vec<Hdu> {
    fits.hdus()
        .iter()
        .filter(|h| h.is_image_2d())
        .filter(|h| {
            let unsorted = UNSORTED_IMAGES.iter().any(|n| h.is_named(n));
            if unsorted {
                debug!(name = ?h.name, "not sorting");
            }
            !unsorted
        })
        .cloned()
        .collect()
}
