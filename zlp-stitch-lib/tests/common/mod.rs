#![allow(dead_code)]
use std::path::{Path, PathBuf};

use ndarray::Array2;
use zlp_stitch::fits::{ColumnData, FitsFile};
use zlp_stitch::{ColumnDescriptor, Dimensions, ScalarKind};

/// Flux written by [Segment] for an aperture and frame of a segment starting at `start`.
pub fn flux_value(start: f64, aperture: usize, frame: usize) -> f64 {
    start + aperture as f64 * 1000.0 + frame as f64
}

/// Time of a frame of a segment starting at `start`.
pub fn frame_time(start: f64, frame: usize) -> f64 {
    start + frame as f64 * 0.01
}

/// Builder for a single light curve segment file.
///
/// By default the file has a `CATALOGUE` with `OBJ_ID`, an `IMAGELIST` with `TMID`, and
/// `FLUX`/`FLUXERR` images.
pub struct Segment {
    pub frames: usize,
    pub apertures: usize,
    pub start: f64,
    imagelist_rows: Option<usize>,
    time_column: bool,
    imagelist: Vec<(ColumnDescriptor, ColumnData)>,
    catalogue: Vec<(ColumnDescriptor, ColumnData)>,
    images: Vec<(String, Array2<f64>)>,
}

impl Segment {
    pub fn new(frames: usize, apertures: usize, start: f64) -> Self {
        let flux = Array2::from_shape_fn((apertures, frames), |(a, f)| flux_value(start, a, f));
        let flux_err = Array2::from_elem((apertures, frames), 1.0);
        Self {
            frames,
            apertures,
            start,
            imagelist_rows: None,
            time_column: true,
            imagelist: Vec::new(),
            catalogue: vec![(
                ColumnDescriptor::string("OBJ_ID", 12),
                ColumnData::Str((0..apertures).map(|a| format!("NG{start}-{a}")).collect()),
            )],
            images: vec![("FLUX".into(), flux), ("FLUXERR".into(), flux_err)],
        }
    }

    pub fn with_imagelist(mut self, column: ColumnDescriptor, data: ColumnData) -> Self {
        self.imagelist.push((column, data));
        self
    }

    pub fn with_catalogue(mut self, column: ColumnDescriptor, data: ColumnData) -> Self {
        self.catalogue.push((column, data));
        self
    }

    pub fn with_image(mut self, name: &str, data: Array2<f64>) -> Self {
        self.images.retain(|(n, _)| n != name);
        self.images.push((name.to_string(), data));
        self
    }

    pub fn without_time(mut self) -> Self {
        self.time_column = false;
        self
    }

    /// Give `IMAGELIST` a row count different from the frame count.
    pub fn with_imagelist_rows(mut self, rows: usize) -> Self {
        self.imagelist_rows = Some(rows);
        self
    }

    pub fn times(&self) -> Vec<f64> {
        (0..self.frames).map(|f| frame_time(self.start, f)).collect()
    }

    pub fn write(&self, path: &Path) -> PathBuf {
        let mut fits = FitsFile::create(path).unwrap();

        let catalogue: Vec<ColumnDescriptor> =
            self.catalogue.iter().map(|(c, _)| c.clone()).collect();
        let hdu = fits
            .create_table("CATALOGUE", &catalogue, self.apertures)
            .unwrap();
        for (i, (_, data)) in self.catalogue.iter().enumerate() {
            fits.write_column(&hdu, i, 0, data).unwrap();
        }

        let rows = self.imagelist_rows.unwrap_or(self.frames);
        let mut imagelist = Vec::new();
        let mut data = Vec::new();
        if self.time_column {
            imagelist.push(ColumnDescriptor::new("TMID", ScalarKind::Float64));
            data.push(ColumnData::Float64(
                (0..rows).map(|f| frame_time(self.start, f)).collect(),
            ));
        }
        for (column, values) in &self.imagelist {
            imagelist.push(column.clone());
            data.push(values.clone());
        }
        let hdu = fits.create_table("IMAGELIST", &imagelist, rows).unwrap();
        for (i, values) in data.iter().enumerate() {
            fits.write_column(&hdu, i, 0, values).unwrap();
        }

        for (name, pixels) in &self.images {
            let (apertures, frames) = pixels.dim();
            let hdu = fits
                .create_image(name, Dimensions { frames, apertures })
                .unwrap();
            fits.write_frames(&hdu, 0, pixels.view()).unwrap();
        }

        fits.close().unwrap();
        path.to_path_buf()
    }
}

/// Read a whole column of a table in `path`.
pub fn read_column(path: &Path, table: &str, column: &str, kind: ScalarKind) -> ColumnData {
    let mut fits = FitsFile::open(path).unwrap();
    let hdu = fits.hdu(table).unwrap();
    let index = hdu
        .column_index(column)
        .unwrap_or_else(|| panic!("no column {column} in {table}"));
    fits.read_column(&hdu, index, 0..hdu.num_rows(), kind).unwrap()
}

pub fn read_image(path: &Path, name: &str) -> Array2<f64> {
    let mut fits = FitsFile::open(path).unwrap();
    let hdu = fits.hdu(name).unwrap();
    fits.read_image(&hdu).unwrap()
}
