//! Description of a light curve file.
use std::path::{Path, PathBuf};

use hifitime::Epoch;

use crate::fits::{FitsFile, Hdu, HduInfo};
use crate::order::time_range;
use crate::plan::Dimensions;
use crate::{Error, Result, CATALOGUE, DEFAULT_TIME_COLUMN, IMAGELIST, REFERENCE_IMAGE};

/// Observation time span of a file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TimeSpan {
    pub start_mjd: f64,
    pub end_mjd: f64,
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_epoch"))]
    pub start: Epoch,
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_epoch"))]
    pub end: Epoch,
}

impl TimeSpan {
    #[must_use]
    pub fn from_mjd(start_mjd: f64, end_mjd: f64) -> Self {
        Self {
            start_mjd,
            end_mjd,
            start: Epoch::from_mjd_utc(start_mjd),
            end: Epoch::from_mjd_utc(end_mjd),
        }
    }

    /// Length of the span in days.
    #[must_use]
    pub fn days(&self) -> f64 {
        self.end_mjd - self.start_mjd
    }
}

#[cfg(feature = "serde")]
fn serialize_epoch<S: serde::Serializer>(
    epoch: &Epoch,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(epoch)
}

/// A table column as found in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ColumnSummary {
    pub name: String,
    pub tform: String,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Summary {
    pub path: PathBuf,
    /// Dimensions of the reference image, if the file has one.
    pub dimensions: Option<Dimensions>,
    /// `IMAGELIST` rows.
    pub frames: usize,
    /// `CATALOGUE` rows.
    pub apertures: usize,
    pub time: Option<TimeSpan>,
    pub imagelist: Vec<ColumnSummary>,
    pub catalogue: Vec<ColumnSummary>,
    /// Names of all 2D image extensions, in file order.
    pub images: Vec<String>,
    pub hdus: usize,
}

impl Summary {
    /// Summarize the file at `path`. A missing `IMAGELIST`, `CATALOGUE`, reference image
    /// or time column is reported as absent rather than as an error.
    ///
    /// # Errors
    /// If the file cannot be read.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut fits = FitsFile::open(path.as_ref())?;

        let dimensions = fits
            .find_hdu(REFERENCE_IMAGE)
            .map(|hdu| hdu.dimensions())
            .transpose()?;
        let imagelist = fits.find_hdu(IMAGELIST);
        let catalogue = fits.find_hdu(CATALOGUE);

        let time = match imagelist {
            Some(_) => match time_range(&mut fits, DEFAULT_TIME_COLUMN) {
                Ok(range) => range.map(|(lo, hi)| TimeSpan::from_mjd(lo, hi)),
                Err(Error::MissingColumn(..)) => None,
                Err(err) => return Err(err),
            },
            None => None,
        };

        Ok(Summary {
            path: path.as_ref().to_path_buf(),
            dimensions,
            frames: imagelist.as_ref().map_or(0, Hdu::num_rows),
            apertures: catalogue.as_ref().map_or(0, Hdu::num_rows),
            time,
            imagelist: imagelist.as_ref().map(columns).unwrap_or_default(),
            catalogue: catalogue.as_ref().map(columns).unwrap_or_default(),
            images: fits
                .hdus()
                .iter()
                .filter(|h| h.is_image_2d())
                .filter_map(|h| h.name.clone())
                .collect(),
            hdus: fits.hdus().len(),
        })
    }
}

fn columns(hdu: &Hdu) -> Vec<ColumnSummary> {
    match &hdu.info {
        HduInfo::Table { columns, .. } => columns
            .iter()
            .map(|c| ColumnSummary {
                name: c.name.clone(),
                tform: c.tform.clone(),
            })
            .collect(),
        _ => Vec::new(),
    }
}
