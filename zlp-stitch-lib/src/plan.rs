//! Inspection of the inputs ahead of writing anything.
//!
//! Planning reads the structure of every input and decides the shape of the output:
//! the merged dimensions, the union of the table schemas and the image extensions to
//! carry. All checks that can fail for a whole run happen here, so a failed plan leaves
//! nothing on disk.
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::extensions::ExtensionPolicy;
use crate::fits::{ColumnData, FitsFile, Hdu};
use crate::schema::{ScalarKind, Schema};
use crate::{Error, Result, CATALOGUE, EXPOSURE_COLUMN, IMAGELIST, REFERENCE_IMAGE};

/// Size of a light curve image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Dimensions {
    /// Time samples, `NAXIS1`.
    pub frames: usize,
    /// Targets, `NAXIS2`.
    pub apertures: usize,
}

/// Frames of one input that go into the output.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Frames {
    /// Frames in the input.
    pub total: usize,
    /// Kept frames in input order, `None` if all are kept.
    pub keep: Option<Vec<usize>>,
}

impl Frames {
    #[must_use]
    pub fn all(total: usize) -> Self {
        Self { total, keep: None }
    }

    /// Number of frames written to the output.
    #[must_use]
    pub fn count(&self) -> usize {
        self.keep.as_ref().map_or(self.total, Vec::len)
    }

    /// Kept values of per-frame `data`.
    ///
    /// # Errors
    /// [Error::RowOutOfRange] if `data` is shorter than the kept frames need.
    pub fn select(&self, data: ColumnData) -> Result<ColumnData> {
        match &self.keep {
            Some(rows) => data.select(rows),
            None => Ok(data),
        }
    }
}

/// An input in processing order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Input {
    pub path: PathBuf,
    pub frames: Frames,
}

/// Everything needed to create and fill the output.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Plan {
    pub dimensions: Dimensions,
    /// Inputs in processing order with the frames each contributes.
    pub inputs: Vec<Input>,
    pub imagelist: Schema,
    pub catalogue: Schema,
    pub extensions: BTreeSet<String>,
}

/// Plan the merge of `files`, taken in the given order, keeping every frame.
///
/// # Errors
/// As [plan_with_exposure].
pub fn plan<P: AsRef<Path>>(files: &[P], policy: &ExtensionPolicy) -> Result<Plan> {
    plan_with_exposure(files, policy, None)
}

/// Plan the merge of `files`, taken in the given order. With `exposure` only the frames
/// whose `EXPOSURE` equals it exactly are kept.
///
/// # Errors
/// [Error::NoInputs] for an empty list, [Error::DimensionMismatch] if aperture counts
/// differ between files or a file's `IMAGELIST` disagrees with its frame count,
/// [Error::SchemaConflict] for irreconcilable column types, [Error::MissingColumn] if
/// filtering by exposure and a file has no `EXPOSURE` column, and any error reading the
/// structure of an input.
pub fn plan_with_exposure<P: AsRef<Path>>(
    files: &[P],
    policy: &ExtensionPolicy,
    exposure: Option<f64>,
) -> Result<Plan> {
    if files.is_empty() {
        return Err(Error::NoInputs);
    }

    let mut dimensions: Option<Dimensions> = None;
    let mut inputs = Vec::with_capacity(files.len());
    let mut imagelist = Schema::new();
    let mut catalogue = Schema::new();
    let mut extensions = BTreeSet::new();

    for path in files {
        let path = path.as_ref();
        let mut fits = FitsFile::open(path)?;

        let dims = fits.hdu(REFERENCE_IMAGE)?.dimensions()?;
        debug!(?path, frames = dims.frames, apertures = dims.apertures, "input dimensions");
        if let Some(total) = &dimensions {
            if dims.apertures != total.apertures {
                return Err(Error::DimensionMismatch {
                    path: path.to_path_buf(),
                    expected: total.apertures,
                    actual: dims.apertures,
                });
            }
        }

        let list = fits.hdu(IMAGELIST)?;
        if list.num_rows() != dims.frames {
            return Err(Error::DimensionMismatch {
                path: path.to_path_buf(),
                expected: dims.frames,
                actual: list.num_rows(),
            });
        }
        let frames = match exposure {
            Some(exposure) => exposure_frames(&mut fits, &list, exposure)?,
            None => Frames::all(dims.frames),
        };
        let total = dimensions.get_or_insert(Dimensions {
            frames: 0,
            apertures: dims.apertures,
        });
        total.frames += frames.count();

        merge_columns(&mut imagelist, &list)?;
        merge_columns(&mut catalogue, &fits.hdu(CATALOGUE)?)?;
        extensions.extend(image_extensions(&fits)?);
        inputs.push(Input {
            path: path.to_path_buf(),
            frames,
        });
    }

    let plan = Plan {
        dimensions: dimensions.unwrap_or_default(),
        inputs,
        imagelist,
        catalogue,
        extensions: policy.apply(extensions),
    };
    info!(
        frames = plan.dimensions.frames,
        apertures = plan.dimensions.apertures,
        imagelist_columns = plan.imagelist.len(),
        catalogue_columns = plan.catalogue.len(),
        extensions = plan.extensions.len(),
        "planned stitch"
    );
    Ok(plan)
}

/// Frames of a file whose `EXPOSURE` is exactly `exposure`.
fn exposure_frames(fits: &mut FitsFile, imagelist: &Hdu, exposure: f64) -> Result<Frames> {
    let column = imagelist.column_index(EXPOSURE_COLUMN).ok_or_else(|| {
        Error::MissingColumn(fits.path().to_path_buf(), EXPOSURE_COLUMN.to_string())
    })?;
    let total = imagelist.num_rows();
    let values = fits
        .read_column(imagelist, column, 0..total, ScalarKind::Float64)?
        .to_f64()
        .unwrap_or_default();
    #[allow(clippy::float_cmp)]
    let keep: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|(_, &v)| v == exposure)
        .map(|(i, _)| i)
        .collect();
    debug!(path = ?fits.path(), total, kept = keep.len(), exposure, "filtered by exposure");
    Ok(Frames {
        total,
        keep: Some(keep),
    })
}

fn merge_columns(schema: &mut Schema, table: &Hdu) -> Result<()> {
    for column in table.columns() {
        match column.descriptor() {
            Some(descriptor) => schema.merge(descriptor)?,
            None => warn!(
                column = %column.name,
                tform = %column.tform,
                "skipping column of unsupported type"
            ),
        }
    }
    Ok(())
}

/// Upper cased names of the 2D image extensions after the primary HDU and the first
/// extension.
///
/// # Errors
/// [Error::MissingKeyword] if such an image has no `EXTNAME`.
pub fn image_extensions(fits: &FitsFile) -> Result<BTreeSet<String>> {
    fits.hdus()
        .iter()
        .skip(2)
        .filter(|hdu| hdu.is_image_2d())
        .map(|hdu| {
            hdu.name
                .as_ref()
                .map(|n| n.trim().to_uppercase())
                .ok_or_else(|| Error::MissingKeyword {
                    keyword: "EXTNAME".into(),
                    hdu: hdu.index,
                })
        })
        .collect()
}
