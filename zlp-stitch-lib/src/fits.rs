//! FITS container access on top of [fitsio].
//!
//! Light curve archives use a primary HDU followed by `IMAGE` and `BINTABLE`
//! extensions. Images are exposed as `(NAXIS2, NAXIS1)` arrays, i.e.,
//! `(apertures, frames)`, and tables column by column with `TSCALn`/`TZEROn` applied.
//!
//! New HDUs are always appended and fully initialised so sections can be written
//! piecewise in any order.
mod column;

use std::ops::Range;
use std::path::{Path, PathBuf};

use fitsio::hdu::FitsHdu;
use fitsio::images::{ImageDescription, ImageType};
use fitsio::tables::{ColumnDescription, ConcreteColumnDescription};
use ndarray::{Array2, ArrayView2};
use tracing::trace;

pub use column::{ColumnData, TableColumn};

use crate::plan::Dimensions;
use crate::schema::{ColumnDescriptor, ScalarKind};
use crate::{Error, Result};

/// Layout of the data unit of an HDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HduInfo {
    Image {
        /// `NAXISn` values, fastest varying first.
        axes: Vec<usize>,
    },
    Table {
        columns: Vec<TableColumn>,
        num_rows: usize,
    },
    Other,
}

/// A header data unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hdu {
    /// Zero-based position in the file; 0 is the primary HDU.
    pub index: usize,
    /// `EXTNAME`, if present.
    pub name: Option<String>,
    pub info: HduInfo,
}

impl Hdu {
    fn load(fits: &mut fitsio::FitsFile, index: usize) -> Result<Self> {
        let hdu = fits.hdu(index)?;
        let name = hdu
            .read_key::<String>(fits, "EXTNAME")
            .ok()
            .map(|s| s.trim().to_string());
        let info = match &hdu.info {
            fitsio::hdu::HduInfo::ImageInfo { .. } => {
                let naxis = required(&hdu, fits, "NAXIS", index)?;
                let axes = (1..=naxis)
                    .map(|n| required(&hdu, fits, &format!("NAXIS{n}"), index))
                    .collect::<Result<Vec<_>>>()?;
                HduInfo::Image { axes }
            }
            fitsio::hdu::HduInfo::TableInfo {
                column_descriptions,
                num_rows,
            } => {
                let mut columns = Vec::with_capacity(column_descriptions.len());
                for (i, desc) in column_descriptions.iter().enumerate() {
                    let n = i + 1;
                    let tform = hdu
                        .read_key::<String>(fits, &format!("TFORM{n}"))
                        .unwrap_or_default();
                    let scale = hdu.read_key::<f64>(fits, &format!("TSCAL{n}")).unwrap_or(1.0);
                    let zero = hdu.read_key::<f64>(fits, &format!("TZERO{n}")).unwrap_or(0.0);
                    columns.push(TableColumn {
                        name: desc.name.clone(),
                        tform: tform.trim().to_string(),
                        repeat: desc.data_type.repeat,
                        kind: column::physical_kind(&desc.data_type.typ, scale, zero),
                    });
                }
                HduInfo::Table {
                    columns,
                    num_rows: *num_rows,
                }
            }
            fitsio::hdu::HduInfo::AnyInfo => HduInfo::Other,
        };
        trace!(index, ?name, "loaded hdu");
        Ok(Hdu { index, name, info })
    }

    /// True if the name matches `EXTNAME`, ignoring case. The primary HDU also answers
    /// to `PRIMARY`.
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        match &self.name {
            Some(n) => n.eq_ignore_ascii_case(name),
            None => self.index == 0 && name.eq_ignore_ascii_case("PRIMARY"),
        }
    }

    fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| format!("#{}", self.index))
    }

    #[must_use]
    pub fn is_image_2d(&self) -> bool {
        matches!(&self.info, HduInfo::Image { axes } if axes.len() == 2)
    }

    /// Frames and apertures of a 2D image.
    ///
    /// # Errors
    /// [Error::WrongHduType] if this is not a 2D image.
    pub fn dimensions(&self) -> Result<Dimensions> {
        match &self.info {
            HduInfo::Image { axes } if axes.len() == 2 => Ok(Dimensions {
                frames: axes[0],
                apertures: axes[1],
            }),
            _ => Err(Error::WrongHduType {
                name: self.label(),
                expected: "a 2D image",
            }),
        }
    }

    /// Table columns, empty for anything that is not a table.
    #[must_use]
    pub fn columns(&self) -> &[TableColumn] {
        match &self.info {
            HduInfo::Table { columns, .. } => columns,
            _ => &[],
        }
    }

    /// Number of table rows, 0 for anything that is not a table.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        match &self.info {
            HduInfo::Table { num_rows, .. } => *num_rows,
            _ => 0,
        }
    }

    /// Position of a column by name, ignoring case.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns()
            .iter()
            .position(|c| c.name.trim().eq_ignore_ascii_case(name))
    }

    fn table(&self) -> Result<(&[TableColumn], usize)> {
        match &self.info {
            HduInfo::Table { columns, num_rows } => Ok((columns, *num_rows)),
            _ => Err(Error::WrongHduType {
                name: self.label(),
                expected: "a binary table",
            }),
        }
    }

    fn column(&self, column: usize) -> Result<(&TableColumn, usize)> {
        let (columns, num_rows) = self.table()?;
        let col = columns
            .get(column)
            .ok_or_else(|| Error::ColumnNotFound(format!("#{column}")))?;
        Ok((col, num_rows))
    }
}

fn required(hdu: &FitsHdu, fits: &mut fitsio::FitsFile, keyword: &str, index: usize) -> Result<usize> {
    hdu.read_key::<i64>(fits, keyword)
        .ok()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| Error::MissingKeyword {
            keyword: keyword.to_string(),
            hdu: index,
        })
}

fn check_rows(start: usize, len: usize, rows: usize) -> Result<()> {
    if start + len > rows {
        return Err(Error::RowOutOfRange { start, len, rows });
    }
    Ok(())
}

fn describe(column: &ColumnDescriptor) -> Result<ConcreteColumnDescription> {
    Ok(ColumnDescription::new(column.name.as_str())
        .with_type(column::data_type(column.kind))
        .that_repeats(column.repeat)
        .create()?)
}

/// An open FITS file.
pub struct FitsFile {
    path: PathBuf,
    fits: fitsio::FitsFile,
    writable: bool,
    hdus: Vec<Hdu>,
}

impl std::fmt::Debug for FitsFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitsFile")
            .field("path", &self.path)
            .field("writable", &self.writable)
            .field("hdus", &self.hdus)
            .finish_non_exhaustive()
    }
}

impl FitsFile {
    /// Open an existing file read-only.
    ///
    /// # Errors
    /// If the file cannot be opened or is not a valid FITS file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let fits = fitsio::FitsFile::open(path.as_ref())?;
        Self::load(path.as_ref(), fits, false)
    }

    /// Open an existing file for reading and writing.
    ///
    /// # Errors
    /// If the file cannot be opened or is not a valid FITS file.
    pub fn edit<P: AsRef<Path>>(path: P) -> Result<Self> {
        let fits = fitsio::FitsFile::edit(path.as_ref())?;
        Self::load(path.as_ref(), fits, true)
    }

    /// Create a new file containing only an empty primary HDU, replacing any existing
    /// file at `path`.
    ///
    /// # Errors
    /// If the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let fits = fitsio::FitsFile::create(path.as_ref()).overwrite().open()?;
        Self::load(path.as_ref(), fits, true)
    }

    fn load(path: &Path, mut fits: fitsio::FitsFile, writable: bool) -> Result<Self> {
        let count = fits.iter().count();
        let hdus = (0..count)
            .map(|index| Hdu::load(&mut fits, index))
            .collect::<Result<Vec<_>>>()?;
        Ok(FitsFile {
            path: path.to_path_buf(),
            fits,
            writable,
            hdus,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn hdus(&self) -> &[Hdu] {
        &self.hdus
    }

    /// HDU by `EXTNAME`, ignoring case. Use [FitsFile::find_hdu] where absence is expected.
    ///
    /// # Errors
    /// [Error::HduNotFound] if no HDU has that name.
    pub fn hdu(&self, name: &str) -> Result<Hdu> {
        self.find_hdu(name)
            .ok_or_else(|| Error::HduNotFound(name.to_string()))
    }

    /// HDU by zero-based position.
    ///
    /// # Errors
    /// [Error::HduNotFound] if there are not that many HDUs.
    pub fn hdu_at(&self, index: usize) -> Result<Hdu> {
        self.hdus
            .get(index)
            .cloned()
            .ok_or_else(|| Error::HduNotFound(format!("#{index}")))
    }

    #[must_use]
    pub fn find_hdu(&self, name: &str) -> Option<Hdu> {
        self.hdus.iter().find(|h| h.is_named(name)).cloned()
    }

    fn check_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(Error::ReadOnly)
        }
    }

    /// Append a binary table with the given columns, in order, and `rows` zeroed rows.
    ///
    /// # Errors
    /// [Error::ReadOnly] or if the table cannot be written.
    pub fn create_table(
        &mut self,
        name: &str,
        columns: &[ColumnDescriptor],
        rows: usize,
    ) -> Result<Hdu> {
        self.check_writable()?;
        let descriptions = columns.iter().map(describe).collect::<Result<Vec<_>>>()?;
        self.fits.create_table(name, &descriptions)?;

        let index = self.hdus.len();
        let hdu = Hdu {
            index,
            name: Some(name.to_string()),
            info: HduInfo::Table {
                columns: columns
                    .iter()
                    .map(|c| TableColumn {
                        name: c.name.clone(),
                        tform: c.tform(),
                        repeat: c.repeat,
                        kind: Some(c.kind),
                    })
                    .collect(),
                num_rows: rows,
            },
        };
        self.hdus.push(hdu.clone());
        for (n, column) in columns.iter().enumerate() {
            self.write_column(&hdu, n, 0, &ColumnData::zeroed(column.kind, rows))?;
        }
        trace!(index, name, rows, "created table");
        Ok(hdu)
    }

    /// Append a zeroed double precision image with `dims.frames` as `NAXIS1` and
    /// `dims.apertures` as `NAXIS2`.
    ///
    /// # Errors
    /// [Error::ReadOnly] or if the image cannot be written.
    pub fn create_image(&mut self, name: &str, dims: Dimensions) -> Result<Hdu> {
        self.check_writable()?;
        // row-major, so the last dimension becomes NAXIS1
        let description = ImageDescription {
            data_type: ImageType::Double,
            dimensions: &[dims.apertures, dims.frames],
        };
        // cfitsio zero fills the data unit
        self.fits.create_image(name, &description)?;

        let index = self.hdus.len();
        let hdu = Hdu {
            index,
            name: Some(name.to_string()),
            info: HduInfo::Image {
                axes: vec![dims.frames, dims.apertures],
            },
        };
        self.hdus.push(hdu.clone());
        trace!(index, name, ?dims, "created image");
        Ok(hdu)
    }

    /// Read `rows` of column `column` of a table, converted to `kind`.
    ///
    /// # Errors
    /// [Error::RowOutOfRange] if the rows are not in the table,
    /// [Error::UnsupportedFormat] for vector or unknown columns, [Error::Conversion] if
    /// the column cannot be read as `kind`.
    pub fn read_column(
        &mut self,
        hdu: &Hdu,
        column: usize,
        rows: Range<usize>,
        kind: ScalarKind,
    ) -> Result<ColumnData> {
        let (col, num_rows) = hdu.column(column)?;
        if rows.start > rows.end {
            return Err(Error::RowOutOfRange {
                start: rows.start,
                len: 0,
                rows: num_rows,
            });
        }
        check_rows(rows.start, rows.len(), num_rows)?;
        let stored = col.descriptor().map(|d| d.kind).ok_or_else(|| {
            Error::UnsupportedFormat(format!("cannot read column {} ({})", col.name, col.tform))
        })?;
        if rows.is_empty() {
            return ColumnData::zeroed(stored, 0).convert(kind);
        }

        let fits = &mut self.fits;
        let table = fits.hdu(hdu.index)?;
        let name = col.name.as_str();
        let data = match stored {
            ScalarKind::Float64 => ColumnData::Float64(table.read_col_range(fits, name, &rows)?),
            ScalarKind::Float32 => ColumnData::Float32(table.read_col_range(fits, name, &rows)?),
            ScalarKind::Int32 => ColumnData::Int32(table.read_col_range(fits, name, &rows)?),
            ScalarKind::Int64 => ColumnData::Int64(table.read_col_range(fits, name, &rows)?),
            ScalarKind::Boolean => ColumnData::Boolean(table.read_col_range(fits, name, &rows)?),
            ScalarKind::FixedString => {
                let values: Vec<String> = table.read_col_range(fits, name, &rows)?;
                ColumnData::Str(values.into_iter().map(|s| s.trim_end().to_string()).collect())
            }
        };
        data.convert(kind)
    }

    /// Write `data` to column `column` starting at row `start`. Numeric data is
    /// converted to the column's kind.
    ///
    /// # Errors
    /// [Error::RowOutOfRange] for writes past the end of the table,
    /// [Error::UnsupportedFormat] for vector or unknown columns.
    pub fn write_column(
        &mut self,
        hdu: &Hdu,
        column: usize,
        start: usize,
        data: &ColumnData,
    ) -> Result<()> {
        self.check_writable()?;
        let (col, num_rows) = hdu.column(column)?;
        let kind = col.descriptor().map(|d| d.kind).ok_or_else(|| {
            Error::UnsupportedFormat(format!("cannot write column {} ({})", col.name, col.tform))
        })?;
        let len = data.len();
        check_rows(start, len, num_rows)?;
        if len == 0 {
            return Ok(());
        }

        let rows = start..start + len;
        let fits = &mut self.fits;
        let table = fits.hdu(hdu.index)?;
        let name = col.name.as_str();
        match data.clone().convert(kind)? {
            ColumnData::Float64(v) => table.write_col_range(fits, name, &v, &rows)?,
            ColumnData::Float32(v) => table.write_col_range(fits, name, &v, &rows)?,
            ColumnData::Int32(v) => table.write_col_range(fits, name, &v, &rows)?,
            ColumnData::Int64(v) => table.write_col_range(fits, name, &v, &rows)?,
            ColumnData::Boolean(v) => table.write_col_range(fits, name, &v, &rows)?,
            ColumnData::Str(v) => table.write_col_range(fits, name, &v, &rows)?,
        };
        Ok(())
    }

    /// Read a whole 2D image as `(apertures, frames)`, with `BSCALE`/`BZERO` applied.
    ///
    /// # Errors
    /// [Error::WrongHduType] if the HDU is not a 2D image.
    pub fn read_image(&mut self, hdu: &Hdu) -> Result<Array2<f64>> {
        let dims = hdu.dimensions()?;
        let image = self.fits.hdu(hdu.index)?;
        let values: Vec<f64> = image.read_image(&mut self.fits)?;
        Array2::from_shape_vec((dims.apertures, dims.frames), values)
            .map_err(|e| Error::ShapeMismatch(e.to_string()))
    }

    /// Write `block`, shaped `(apertures, n)`, into frames `[start, start + n)` of a 2D
    /// image for every aperture.
    ///
    /// # Errors
    /// [Error::ShapeMismatch] if the aperture count differs, [Error::RowOutOfRange] if
    /// the frames are past the end of the image.
    pub fn write_frames(&mut self, hdu: &Hdu, start: usize, block: ArrayView2<f64>) -> Result<()> {
        self.check_writable()?;
        let dims = hdu.dimensions()?;
        let (apertures, len) = block.dim();
        if apertures != dims.apertures {
            return Err(Error::ShapeMismatch(format!(
                "block has {apertures} apertures, image {} has {}",
                hdu.label(),
                dims.apertures
            )));
        }
        check_rows(start, len, dims.frames)?;
        if len == 0 {
            return Ok(());
        }

        let image = self.fits.hdu(hdu.index)?;
        for (aperture, lightcurve) in block.rows().into_iter().enumerate() {
            let first = aperture * dims.frames + start;
            let values = lightcurve.to_vec();
            image.write_section(&mut self.fits, first, first + len, &values)?;
        }
        Ok(())
    }

    /// Flush pending writes and release the file. cfitsio flushes on close.
    #[allow(clippy::unnecessary_wraps)]
    pub fn close(self) -> Result<()> {
        drop(self.fits);
        Ok(())
    }
}
