//! The stitch engine.
//!
//! An output file is built in a fixed sequence of steps: catalogue, per-frame metadata,
//! image extensions, then optional statistics. [Engine] encodes the sequence in its
//! type, so each step consumes the engine and hands back the next state.
//!
//! Frames are placed using a [Cursor] that starts at zero and advances by the kept
//! frame count of each input in processing order.
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use ndarray::{Array2, Axis};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::extensions::ExtensionPolicy;
use crate::fits::{ColumnData, FitsFile, Hdu};
use crate::order::{order, FileOrder};
use crate::plan::{plan_with_exposure, Dimensions, Frames, Plan};
use crate::schema::{ColumnDescriptor, ScalarKind, Schema};
use crate::transfer::{copy_column, transfer};
use crate::{
    Error, Result, CATALOGUE, DEFAULT_TIME_COLUMN, FLUX_ERROR_IMAGE, IMAGELIST, REFERENCE_IMAGE,
};

/// Catalogue column holding the number of finite flux values of each aperture.
pub const NPTS_COLUMN: &str = "NPTS";
/// Catalogue column holding the error weighted mean flux of each aperture.
pub const FLUX_MEAN_COLUMN: &str = "FLUX_MEAN";

/// Output frame offset at which the next input is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub frame: usize,
}

impl Cursor {
    #[must_use]
    pub fn advance(self, frames: usize) -> Self {
        Cursor {
            frame: self.frame + frames,
        }
    }
}

/// Output file created, nothing written.
#[derive(Debug)]
pub struct Created;
/// `CATALOGUE` written from the first input.
#[derive(Debug)]
pub struct CatalogueWritten;
/// `IMAGELIST` rows of every input written.
#[derive(Debug)]
pub struct MetadataMerged;
/// Every image extension written.
#[derive(Debug)]
pub struct ImagesMerged;

/// Writes a planned stitch to an output file.
#[derive(Debug)]
pub struct Engine<S> {
    output: FitsFile,
    plan: Plan,
    statistics: bool,
    state: PhantomData<S>,
}

impl<S> Engine<S> {
    fn next<T>(self) -> Engine<T> {
        Engine {
            output: self.output,
            plan: self.plan,
            statistics: self.statistics,
            state: PhantomData,
        }
    }

    #[must_use]
    pub fn plan(&self) -> &Plan {
        &self.plan
    }
}

impl Engine<Created> {
    /// Create (or truncate) the output file for `plan`.
    ///
    /// With `statistics` the catalogue gets [NPTS_COLUMN] and [FLUX_MEAN_COLUMN],
    /// filled by [Engine::compute_statistics].
    ///
    /// # Errors
    /// [Error::NoInputs] for a plan without inputs, or if the output cannot be created.
    pub fn create<P: AsRef<Path>>(output: P, plan: Plan, statistics: bool) -> Result<Self> {
        if plan.inputs.is_empty() {
            return Err(Error::NoInputs);
        }
        info!(output = ?output.as_ref(), "creating output");
        Ok(Engine {
            output: FitsFile::create(output)?,
            plan,
            statistics,
            state: PhantomData,
        })
    }

    /// Create `CATALOGUE` with one row per aperture and copy the columns of the first
    /// input into it. Catalogue columns only present in later inputs stay zeroed.
    ///
    /// # Errors
    /// On failure to read the first input or write the output.
    pub fn write_catalogue(mut self) -> Result<Engine<CatalogueWritten>> {
        let mut schema = self.plan.catalogue.clone();
        if self.statistics {
            schema.insert(ColumnDescriptor::new(NPTS_COLUMN, ScalarKind::Int64));
            schema.insert(ColumnDescriptor::new(FLUX_MEAN_COLUMN, ScalarKind::Float64));
        }
        let columns = schema.columns();
        let dest_hdu =
            self.output
                .create_table(CATALOGUE, &columns, self.plan.dimensions.apertures)?;

        let first = &self.plan.inputs[0].path;
        info!(source = ?first, "writing catalogue");
        let mut source = FitsFile::open(first)?;
        let source_hdu = source.hdu(CATALOGUE)?;
        for (dest_column, descriptor) in columns.iter().enumerate() {
            let source_column = source_hdu.column_index(&descriptor.name);
            if source_column.is_none() {
                debug!(column = %descriptor.name, "catalogue column not in first input");
            }
            copy_column(
                &mut source,
                &source_hdu,
                &mut self.output,
                &dest_hdu,
                source_column,
                dest_column,
                descriptor,
            )?;
        }
        Ok(self.next())
    }
}

impl Engine<CatalogueWritten> {
    /// Create `IMAGELIST` with one row per output frame and append the kept rows of each
    /// input at the cursor.
    ///
    /// # Errors
    /// On failure to read an input or write the output.
    pub fn merge_metadata(mut self) -> Result<Engine<MetadataMerged>> {
        let columns = self.plan.imagelist.columns();
        let dest_hdu =
            self.output
                .create_table(IMAGELIST, &columns, self.plan.dimensions.frames)?;

        let mut cursor = Cursor::default();
        for input in &self.plan.inputs {
            let mut source = FitsFile::open(&input.path)?;
            let source_hdu = source.hdu(IMAGELIST)?;
            let frames = input.frames.count();
            info!(source = ?input.path, frames, at = cursor.frame, "merging image list");

            for (dest_column, descriptor) in columns.iter().enumerate() {
                transfer(
                    &mut source,
                    &source_hdu,
                    &mut self.output,
                    &dest_hdu,
                    &input.frames,
                    cursor.frame,
                    source_hdu.column_index(&descriptor.name),
                    dest_column,
                    descriptor,
                )?;
            }
            cursor = cursor.advance(frames);
        }
        Ok(self.next())
    }
}

impl Engine<MetadataMerged> {
    /// Create each planned image extension and copy the kept frames of every input into
    /// it. Inputs without the extension leave their frames zeroed.
    ///
    /// # Errors
    /// [Error::DimensionMismatch] if an input extension's shape differs from the
    /// input's reference image, or on I/O failure.
    pub fn merge_images(mut self) -> Result<Engine<ImagesMerged>> {
        let extensions: Vec<String> = self.plan.extensions.iter().cloned().collect();
        for name in &extensions {
            let dest_hdu = self.output.create_image(name, self.plan.dimensions)?;
            info!(extension = %name, "merging image");

            let mut cursor = Cursor::default();
            for input in &self.plan.inputs {
                let mut source = FitsFile::open(&input.path)?;
                match source.find_hdu(name) {
                    Some(source_hdu) => {
                        let image = read_checked(
                            &mut source,
                            &source_hdu,
                            &input.frames,
                            self.plan.dimensions.apertures,
                        )?;
                        self.output.write_frames(&dest_hdu, cursor.frame, image.view())?;
                    }
                    None => {
                        debug!(source = ?input.path, extension = %name, "extension missing, skipping");
                    }
                }
                cursor = cursor.advance(input.frames.count());
            }
        }
        Ok(self.next())
    }
}

/// Kept frames of an input image, shaped `(apertures, kept)`.
fn read_checked(
    source: &mut FitsFile,
    hdu: &Hdu,
    frames: &Frames,
    apertures: usize,
) -> Result<Array2<f64>> {
    let dims = hdu.dimensions()?;
    let mismatch = |expected, actual| Error::DimensionMismatch {
        path: source.path().to_path_buf(),
        expected,
        actual,
    };
    if dims.apertures != apertures {
        return Err(mismatch(apertures, dims.apertures));
    }
    if dims.frames != frames.total {
        return Err(mismatch(frames.total, dims.frames));
    }
    let image = source.read_image(hdu)?;
    Ok(match &frames.keep {
        Some(keep) => image.select(Axis(1), keep),
        None => image,
    })
}

impl Engine<ImagesMerged> {
    /// Fill [NPTS_COLUMN] and [FLUX_MEAN_COLUMN] from the merged flux and flux error
    /// images. Skipped with a warning if statistics were not requested at creation or
    /// either image is missing.
    ///
    /// # Errors
    /// On failure to read or write the output.
    pub fn compute_statistics(mut self) -> Result<Self> {
        if !self.statistics {
            warn!("statistics columns were not created, skipping");
            return Ok(self);
        }
        let images = match (
            self.output.find_hdu(REFERENCE_IMAGE),
            self.output.find_hdu(FLUX_ERROR_IMAGE),
        ) {
            (Some(flux), Some(flux_err)) => Some((
                self.output.read_image(&flux)?,
                self.output.read_image(&flux_err)?,
            )),
            _ => None,
        };
        let Some((flux, flux_err)) = images else {
            warn!("{REFERENCE_IMAGE} or {FLUX_ERROR_IMAGE} missing from output, skipping statistics");
            return Ok(self);
        };

        let (npts, mean) = statistics(&flux, &flux_err);
        let catalogue = self.output.hdu(CATALOGUE)?;
        for (name, data) in [
            (NPTS_COLUMN, ColumnData::Int64(npts)),
            (FLUX_MEAN_COLUMN, ColumnData::Float64(mean)),
        ] {
            let column = catalogue
                .column_index(name)
                .ok_or_else(|| Error::ColumnNotFound(name.to_string()))?;
            self.output.write_column(&catalogue, column, 0, &data)?;
        }
        info!("wrote lightcurve statistics");
        Ok(self)
    }

    /// Flush and close the output.
    ///
    /// # Errors
    /// On I/O failure.
    pub fn close(self) -> Result<Plan> {
        self.output.close()?;
        Ok(self.plan)
    }
}

/// Per aperture count of finite flux values and their inverse variance weighted mean,
/// NaN for apertures without finite values.
#[must_use]
pub fn statistics(flux: &Array2<f64>, flux_err: &Array2<f64>) -> (Vec<i64>, Vec<f64>) {
    flux.rows()
        .into_iter()
        .zip(flux_err.rows())
        .map(|(lc, err)| {
            let mut npts = 0;
            let mut weighted = 0.0;
            let mut weights = 0.0;
            for (&f, &e) in lc.iter().zip(err.iter()) {
                if f.is_finite() {
                    npts += 1;
                    let w = 1.0 / (e * e);
                    weighted += w * f;
                    weights += w;
                }
            }
            let mean = if npts > 0 { weighted / weights } else { f64::NAN };
            (npts, mean)
        })
        .unzip()
}

/// Result of a successful stitch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StitchReport {
    pub output: PathBuf,
    pub dimensions: Dimensions,
    /// Inputs in processing order with the number of frames each contributed.
    pub files: Vec<(PathBuf, usize)>,
    pub extensions: Vec<String>,
    pub imagelist: Schema,
    pub catalogue: Schema,
}

/// Merges light curve files into one.
///
/// ```no_run
/// use zlp_stitch::{FileOrder, Stitcher};
///
/// let report = Stitcher::builder()
///     .inputs(vec!["a.fits".into(), "b.fits".into()])
///     .output("out.fits")
///     .order(FileOrder::Time)
///     .statistics(true)
///     .build()
///     .run()
///     .unwrap();
/// println!("{} frames", report.dimensions.frames);
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct Stitcher {
    inputs: Vec<PathBuf>,
    #[builder(setter(into))]
    output: PathBuf,
    #[builder(default)]
    order: FileOrder,
    #[builder(default)]
    policy: ExtensionPolicy,
    /// `IMAGELIST` column used for [FileOrder::Time].
    #[builder(default = DEFAULT_TIME_COLUMN.to_string(), setter(into))]
    time_column: String,
    /// Add per aperture statistics to the catalogue.
    #[builder(default)]
    statistics: bool,
    /// Delete the output if the stitch fails after creating it.
    #[builder(default)]
    remove_partial: bool,
    /// Keep only frames whose `EXPOSURE` equals this exactly.
    #[builder(default)]
    exposure: Option<f64>,
}

impl Stitcher {
    /// Order and plan the inputs, then write the output.
    ///
    /// Nothing is written if ordering or planning fails. A failure after the output has
    /// been created leaves a partial file unless `remove_partial` is set.
    ///
    /// # Errors
    /// Any planning error, or any error reading an input or writing the output.
    pub fn run(&self) -> Result<StitchReport> {
        let files = order(&self.inputs, self.order, &self.time_column)?;
        let plan = plan_with_exposure(&files, &self.policy, self.exposure)?;

        let result = self.write(plan);
        if let Err(err) = &result {
            if self.remove_partial && self.output.exists() {
                warn!(output = ?self.output, %err, "removing partial output");
                if let Err(rm_err) = fs::remove_file(&self.output) {
                    warn!(output = ?self.output, %rm_err, "failed to remove partial output");
                }
            }
        }
        result
    }

    fn write(&self, plan: Plan) -> Result<StitchReport> {
        let mut engine = Engine::create(&self.output, plan, self.statistics)?
            .write_catalogue()?
            .merge_metadata()?
            .merge_images()?;
        if self.statistics {
            engine = engine.compute_statistics()?;
        }
        let plan = engine.close()?;

        info!(
            output = ?self.output,
            frames = plan.dimensions.frames,
            apertures = plan.dimensions.apertures,
            "stitch complete"
        );
        Ok(StitchReport {
            output: self.output.clone(),
            dimensions: plan.dimensions,
            files: plan
                .inputs
                .into_iter()
                .map(|input| {
                    let frames = input.frames.count();
                    (input.path, frames)
                })
                .collect(),
            extensions: plan.extensions.into_iter().collect(),
            imagelist: plan.imagelist,
            catalogue: plan.catalogue,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn cursor_advances() {
        let cursor = Cursor::default().advance(10).advance(7);
        assert_eq!(cursor.frame, 17);
    }

    #[test]
    fn statistics_skip_non_finite() {
        let flux = array![[1.0, 3.0, f64::NAN], [f64::NAN, f64::NAN, f64::NAN]];
        let err = array![[1.0, 1.0, 1.0], [1.0, 1.0, 1.0]];
        let (npts, mean) = statistics(&flux, &err);
        assert_eq!(npts, vec![2, 0]);
        assert_eq!(mean[0], 2.0);
        assert!(mean[1].is_nan());
    }

    #[test]
    fn statistics_weighting() {
        let flux = array![[10.0, 20.0]];
        let err = array![[1.0, 2.0]];
        let (_, mean) = statistics(&flux, &err);
        // weights 1 and 1/4
        assert!((mean[0] - 12.0).abs() < 1e-12);
    }

    #[test]
    fn builder_defaults() {
        let stitcher = Stitcher::builder()
            .inputs(vec![PathBuf::from("a.fits")])
            .output("out.fits")
            .build();
        assert_eq!(stitcher.order, FileOrder::Arguments);
        assert_eq!(stitcher.time_column, DEFAULT_TIME_COLUMN);
        assert_eq!(stitcher.policy, ExtensionPolicy::default());
        assert!(!stitcher.statistics);
        assert!(!stitcher.remove_partial);
        assert_eq!(stitcher.exposure, None);
    }
}
